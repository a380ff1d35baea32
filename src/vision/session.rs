// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Asynchronous segmentation session
//!
//! A [`SegmentationSession`] owns one [`InferenceEngine`] and runs its
//! blocking work (model load, inference, post-processing) on tokio's blocking
//! pool. Callers chain `initialize().await` and `segment(image).await`, then
//! `close().await` to release the model.

use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

use super::engine::{InferenceEngine, SegmentationModel};
use super::error::{Result, SegmentationError};
use super::labels::{LabelColorRegistry, LabelSet, LegendEntry};
use super::postprocessing::{SegmentationMap, SegmentationPostprocessor};
use super::preprocessing::resize_and_encode;
use crate::config::SegmentationConfig;

/// Wall-clock time spent in each pipeline stage, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub preprocess_ms: u64,
    pub inference_ms: u64,
    pub postprocess_ms: u64,
    pub visualization_ms: u64,
}

impl StageTimings {
    pub fn total_ms(&self) -> u64 {
        self.preprocess_ms + self.inference_ms + self.postprocess_ms + self.visualization_ms
    }
}

/// Output of one segmentation run
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// Class colors blended over the resized input
    pub overlay: RgbImage,
    pub segmentation_map: SegmentationMap,
    /// Distinct class names present in `segmentation_map`
    pub labels: LabelSet,
    pub timings: StageTimings,
}

/// Serializable digest of a [`SegmentationResult`]
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationSummary {
    pub width: u32,
    pub height: u32,
    pub legend: Vec<LegendEntry>,
    pub timings: StageTimings,
}

impl SegmentationResult {
    /// Legend rows for the labels in this result
    pub fn legend(&self, registry: &LabelColorRegistry) -> Vec<LegendEntry> {
        registry.legend(&self.labels)
    }

    pub fn summary(&self, registry: &LabelColorRegistry) -> SegmentationSummary {
        SegmentationSummary {
            width: self.overlay.width(),
            height: self.overlay.height(),
            legend: self.legend(registry),
            timings: self.timings,
        }
    }
}

/// Scoped owner of one inference engine
pub struct SegmentationSession {
    config: Arc<SegmentationConfig>,
    engine: Arc<Mutex<InferenceEngine>>,
    // Mirrors the engine state so callers never wait on a running inference
    ready: Arc<AtomicBool>,
    postprocessor: Arc<SegmentationPostprocessor>,
}

impl std::fmt::Debug for SegmentationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationSession")
            .field("config", &self.config)
            .field("overlay_alpha", &self.postprocessor.overlay_alpha())
            .finish_non_exhaustive()
    }
}

impl SegmentationSession {
    /// Session with the built-in PASCAL VOC label registry
    pub fn new(config: SegmentationConfig) -> Self {
        Self::with_registry(config, Arc::new(LabelColorRegistry::pascal_voc()))
    }

    /// Session for a model trained on a custom label set
    ///
    /// The model must emit one logit per registered label.
    pub fn with_registry(config: SegmentationConfig, registry: Arc<LabelColorRegistry>) -> Self {
        let num_classes = registry.len();
        let postprocessor =
            SegmentationPostprocessor::new(registry).with_overlay_alpha(config.overlay_alpha);
        let config = Arc::new(config);
        let engine = InferenceEngine::with_num_classes(config.clone(), num_classes);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            ready: Arc::new(AtomicBool::new(false)),
            config,
            postprocessor: Arc::new(postprocessor),
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LabelColorRegistry> {
        self.postprocessor.registry()
    }

    /// Load the configured model on the blocking pool
    pub async fn initialize(&self) -> Result<()> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || lock_engine(&engine)?.initialize()).await??;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Initialize from an already constructed model backend
    pub async fn initialize_with(&self, model: Box<dyn SegmentationModel>) -> Result<()> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || lock_engine(&engine)?.initialize_with(model)).await??;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Whether a model is loaded; never waits for a running inference
    pub fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Segment one image
    ///
    /// Resizes the image to the model input, runs inference and builds the
    /// overlay. Runs are serialized on the session's engine.
    pub async fn segment(&self, image: DynamicImage) -> Result<SegmentationResult> {
        let engine = self.engine.clone();
        let postprocessor = self.postprocessor.clone();
        tokio::task::spawn_blocking(move || {
            let mut engine = lock_engine(&engine)?;
            run_segmentation(&mut engine, &postprocessor, &image)
        })
        .await?
    }

    /// Shut the engine down and drop the session
    ///
    /// Safe whether or not initialization or earlier runs succeeded.
    pub async fn close(self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        let engine = self.engine;
        tokio::task::spawn_blocking(move || {
            lock_engine(&engine)?.shutdown();
            Ok(())
        })
        .await?
    }
}

fn lock_engine(engine: &Mutex<InferenceEngine>) -> Result<MutexGuard<'_, InferenceEngine>> {
    engine
        .lock()
        .map_err(|e| SegmentationError::Worker(format!("engine lock poisoned: {}", e)))
}

/// Full synchronous pipeline: preprocess, infer, classify, overlay
pub fn run_segmentation(
    engine: &mut InferenceEngine,
    postprocessor: &SegmentationPostprocessor,
    image: &DynamicImage,
) -> Result<SegmentationResult> {
    let shape = engine.input_shape()?;
    let mut timings = StageTimings::default();

    let start = Instant::now();
    let (resized, input) = resize_and_encode(image, shape.width, shape.height)?;
    timings.preprocess_ms = start.elapsed().as_millis() as u64;
    debug!("Preprocessing took {}ms", timings.preprocess_ms);

    let start = Instant::now();
    let output = engine.infer(&input)?;
    timings.inference_ms = start.elapsed().as_millis() as u64;
    debug!("Inference took {}ms", timings.inference_ms);

    let start = Instant::now();
    let (segmentation_map, labels) = postprocessor.classify(&output)?;
    timings.postprocess_ms = start.elapsed().as_millis() as u64;
    debug!("Postprocessing took {}ms", timings.postprocess_ms);

    let start = Instant::now();
    let overlay = postprocessor.build_overlay(&resized, &segmentation_map)?;
    timings.visualization_ms = start.elapsed().as_millis() as u64;
    debug!("Visualization took {}ms", timings.visualization_ms);

    info!(
        "Segmented {}x{} image in {}ms, labels: {:?}",
        image.width(),
        image.height(),
        timings.total_ms(),
        labels
    );

    Ok(SegmentationResult {
        overlay,
        segmentation_map,
        labels,
        timings,
    })
}
