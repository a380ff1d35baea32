// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model asset loading
//!
//! Model files ship as named assets inside an asset directory. Loading maps
//! the file read-only into memory so the runtime can build its session
//! without an extra copy through userspace buffers.

use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{Result, SegmentationError};

/// Read-only, memory-mapped model file
pub struct ModelAsset {
    name: String,
    mmap: Mmap,
}

impl std::fmt::Debug for ModelAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAsset")
            .field("name", &self.name)
            .field("len", &self.mmap.len())
            .finish()
    }
}

impl ModelAsset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Deref for ModelAsset {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

/// Resolves and maps model assets from a single asset directory
#[derive(Debug, Clone)]
pub struct ModelLoader {
    asset_dir: PathBuf,
}

impl ModelLoader {
    pub fn new(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    /// Map the named asset into memory
    ///
    /// # Errors
    /// Returns [`SegmentationError::AssetNotFound`] if the name is not a plain
    /// file name, or the file is missing, unreadable or empty.
    pub fn load(&self, name: &str) -> Result<ModelAsset> {
        // Asset names never address anything outside the asset directory
        if name.is_empty()
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(SegmentationError::asset_not_found(
                name,
                "asset name must be a plain file name",
            ));
        }

        let path = self.asset_dir.join(name);
        info!("Loading model asset from {}", path.display());

        let file = File::open(&path)
            .map_err(|e| SegmentationError::asset_not_found(name, e))?;

        let metadata = file
            .metadata()
            .map_err(|e| SegmentationError::asset_not_found(name, e))?;

        if !metadata.is_file() {
            return Err(SegmentationError::asset_not_found(name, "not a regular file"));
        }
        if metadata.len() == 0 {
            return Err(SegmentationError::asset_not_found(name, "file is empty"));
        }

        // SAFETY: the mapping is read-only and assets are not rewritten while
        // the process runs.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| SegmentationError::asset_not_found(name, e))?;

        debug!(
            "Model asset size: {:.2} MB",
            mmap.len() as f64 / (1024.0 * 1024.0)
        );

        Ok(ModelAsset {
            name: name.to_string(),
            mmap,
        })
    }
}
