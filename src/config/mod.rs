// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Segmentation configuration
//!
//! Defaults are the fixed values the pipeline was designed around. They can
//! be overridden from a TOML file or from `CAMSEG_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::vision::error::{Result, SegmentationError};
use crate::vision::postprocessing::OVERLAY_ALPHA;

/// Model file shipped in the asset directory
pub const DEFAULT_MODEL_FILE: &str = "deeplabv3_257_mv_gpu.onnx";

/// Default asset directory, relative to the working directory
pub const DEFAULT_ASSET_DIR: &str = "./assets";

/// GPU delegate is off unless explicitly enabled
pub const USE_GPU_DELEGATE: bool = false;

/// Intra-op threads for CPU execution
pub const CPU_THREADS: usize = 2;

/// Segmentation pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Directory holding packaged model assets
    pub asset_dir: PathBuf,
    /// Model file name inside `asset_dir`
    pub model_file: String,
    /// Attach the CUDA execution provider; failure to do so is fatal
    pub use_gpu_delegate: bool,
    /// Intra-op threads when running on CPU
    pub cpu_threads: usize,
    /// Overlay opacity out of 255
    pub overlay_alpha: u8,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            use_gpu_delegate: USE_GPU_DELEGATE,
            cpu_threads: CPU_THREADS,
            overlay_alpha: OVERLAY_ALPHA,
        }
    }
}

impl SegmentationConfig {
    /// Load configuration from a TOML file
    ///
    /// Keys may sit at the top level or under a `[segmentation]` table.
    /// Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SegmentationError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_value: toml::Value = toml::from_str(content)
            .map_err(|e| SegmentationError::Config(format!("invalid TOML: {}", e)))?;

        let section = toml_value
            .get("segmentation")
            .cloned()
            .unwrap_or(toml_value);

        section
            .try_into()
            .map_err(|e| SegmentationError::Config(format!("invalid segmentation config: {}", e)))
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `CAMSEG_*` environment overrides on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = env::var("CAMSEG_ASSET_DIR") {
            self.asset_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("CAMSEG_MODEL_FILE") {
            self.model_file = file;
        }
        if let Ok(val) = env::var("CAMSEG_USE_GPU") {
            self.use_gpu_delegate = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(threads) = env::var("CAMSEG_CPU_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.cpu_threads = threads;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.model_file.is_empty() {
            return Err("model_file must not be empty".to_string());
        }
        if self.model_file.contains('/') || self.model_file.contains('\\') {
            return Err("model_file must be a file name inside asset_dir".to_string());
        }
        if self.cpu_threads == 0 {
            return Err("cpu_threads must be at least 1".to_string());
        }
        if self.cpu_threads > 64 {
            return Err("cpu_threads too large (max 64)".to_string());
        }
        Ok(())
    }

    /// Full path of the model asset
    pub fn model_path(&self) -> PathBuf {
        self.asset_dir.join(&self.model_file)
    }
}
