// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Segmentation error types
//!
//! Every fallible operation in the pipeline returns [`SegmentationError`].
//! Unknown legend labels are not an error: the registry
//! answers them with [`Color::TRANSPARENT`](super::labels::Color::TRANSPARENT).

use thiserror::Error;

/// Crate-wide result alias for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Errors raised while loading, running or post-processing a segmentation model
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// Model asset missing, unreadable or empty. Fatal for initialization.
    #[error("Model asset '{name}' not found: {reason}")]
    AssetNotFound { name: String, reason: String },

    /// GPU execution provider could not be attached. There is no CPU fallback.
    #[error("Failed to initialize GPU delegate: {0}")]
    DelegateInit(String),

    /// Inference attempted before `initialize()` succeeded or after `shutdown()`
    #[error("Inference engine is not initialized")]
    UninitializedEngine,

    /// `initialize()` called on an engine that was already initialized
    #[error("Inference engine is already initialized")]
    AlreadyInitialized,

    /// Overlay construction given an image and map of different sizes
    #[error(
        "Input image size and segmentation map size do not match ({image_width},{image_height}) != ({map_width},{map_height})"
    )]
    DimensionMismatch {
        image_width: u32,
        image_height: u32,
        map_width: usize,
        map_height: usize,
    },

    /// Model declares tensors this pipeline cannot drive
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Caller supplied an input the pipeline cannot encode
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// ONNX Runtime failure during session setup or inference
    #[error("ONNX Runtime error: {0}")]
    Runtime(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Background worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl SegmentationError {
    pub(crate) fn asset_not_found(name: &str, reason: impl ToString) -> Self {
        SegmentationError::AssetNotFound {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for SegmentationError {
    fn from(err: tokio::task::JoinError) -> Self {
        SegmentationError::Worker(err.to_string())
    }
}
