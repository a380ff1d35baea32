// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod version;
pub mod vision;

// Re-export main types
pub use config::SegmentationConfig;
pub use vision::{
    InferenceEngine, LabelColorRegistry, Result, SegmentationError, SegmentationResult,
    SegmentationSession,
};
