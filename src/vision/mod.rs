// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Semantic segmentation pipeline
//!
//! This module provides:
//! - Model asset loading (memory-mapped)
//! - An inference engine over ONNX Runtime (CPU or CUDA)
//! - Image preprocessing and logit post-processing
//! - The PASCAL VOC label and color registry
//! - An async session that ties the stages together

pub mod engine;
pub mod error;
pub mod labels;
pub mod model_loader;
pub mod postprocessing;
pub mod preprocessing;
pub mod session;

pub use engine::{
    ExecutionTarget, InferenceEngine, ModelInputShape, OrtSegmentationModel, SegmentationModel,
};
pub use error::{Result, SegmentationError};
pub use labels::{Color, LabelColorRegistry, LabelEntry, LabelSet, LegendEntry, NUM_CLASSES};
pub use model_loader::{ModelAsset, ModelLoader};
pub use postprocessing::{OutputTensor, SegmentationMap, SegmentationPostprocessor, OVERLAY_ALPHA};
pub use preprocessing::{resize_and_encode, InputTensor, IMAGE_MEAN, IMAGE_OFFSET};
pub use session::{
    run_segmentation, SegmentationResult, SegmentationSession, SegmentationSummary, StageTimings,
};
