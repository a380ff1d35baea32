// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Segmentation inference engine
//!
//! [`InferenceEngine`] owns one loaded model for its whole lifetime:
//! `initialize()` once, `infer()` any number of times, `shutdown()` once.
//! The runtime behind it is the [`SegmentationModel`] trait; production uses
//! [`OrtSegmentationModel`] (ONNX Runtime), tests plug in mocks.

use ndarray::Array4;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Value, ValueType};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::{Result, SegmentationError};
use super::labels::NUM_CLASSES;
use super::model_loader::{ModelAsset, ModelLoader};
use super::postprocessing::OutputTensor;
use super::preprocessing::{tensor_len, InputTensor, FLOAT_TYPE_SIZE, PIXEL_SIZE};
use crate::config::SegmentationConfig;

/// Spatial input size declared by a model, `[1, width, height, 3]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl ModelInputShape {
    /// Derive from a declared `[1, width, height, 3]` shape
    ///
    /// Dynamic (negative) or zero dimensions are rejected.
    pub fn from_dims(dims: &[i64]) -> Result<Self> {
        match dims {
            [1, width, height, channels]
                if *width > 0 && *height > 0 && *channels == PIXEL_SIZE as i64 =>
            {
                let width = u32::try_from(*width)
                    .map_err(|_| SegmentationError::InvalidModel(format!("input width {} too large", width)))?;
                let height = u32::try_from(*height)
                    .map_err(|_| SegmentationError::InvalidModel(format!("input height {} too large", height)))?;
                Ok(Self {
                    width,
                    height,
                    channels: PIXEL_SIZE as u32,
                })
            }
            other => Err(SegmentationError::InvalidModel(format!(
                "expected input shape [1, width, height, 3], got {:?}",
                other
            ))),
        }
    }

    /// Number of f32 values in one input tensor
    pub fn tensor_len(&self) -> usize {
        tensor_len(self.width, self.height)
    }

    /// `4 * width * height * 3`
    pub fn byte_size(&self) -> usize {
        FLOAT_TYPE_SIZE * self.tensor_len()
    }
}

/// Where a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// CPU with a fixed intra-op thread count
    Cpu { threads: usize },
    /// CUDA execution provider; registration failure is an error
    Gpu,
}

impl ExecutionTarget {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        if config.use_gpu_delegate {
            ExecutionTarget::Gpu
        } else {
            ExecutionTarget::Cpu {
                threads: config.cpu_threads,
            }
        }
    }
}

/// A runnable segmentation model
pub trait SegmentationModel: Send {
    /// Declared input shape
    fn input_shape(&self) -> ModelInputShape;

    /// Synchronous forward pass
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor>;
}

/// ONNX Runtime backed segmentation model
pub struct OrtSegmentationModel {
    session: Session,
    input_name: String,
    input_shape: ModelInputShape,
    target: ExecutionTarget,
}

impl std::fmt::Debug for OrtSegmentationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtSegmentationModel")
            .field("input_name", &self.input_name)
            .field("input_shape", &self.input_shape)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl OrtSegmentationModel {
    /// Build an ONNX Runtime session from a mapped model asset
    ///
    /// # Errors
    /// - [`SegmentationError::DelegateInit`] if the GPU provider cannot be attached
    /// - [`SegmentationError::Runtime`] if the session cannot be created
    /// - [`SegmentationError::InvalidModel`] if the model does not have one
    ///   `[1, width, height, 3]` input and one output
    pub fn from_asset(asset: &ModelAsset, target: ExecutionTarget) -> Result<Self> {
        info!("Creating ONNX Runtime session for {} ({:?})", asset.name(), target);

        let builder = Session::builder()
            .map_err(|e| SegmentationError::Runtime(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SegmentationError::Runtime(format!("Failed to set optimization level: {}", e)))?;

        let builder = match target {
            ExecutionTarget::Gpu => builder
                .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
                .map_err(|e| SegmentationError::DelegateInit(e.to_string()))?,
            ExecutionTarget::Cpu { threads } => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .map_err(|e| SegmentationError::Runtime(format!("Failed to set CPU execution provider: {}", e)))?
                .with_intra_threads(threads)
                .map_err(|e| SegmentationError::Runtime(format!("Failed to set intra threads: {}", e)))?,
        };

        // Provider registration is done; failures from here on are about the model
        let session = builder
            .commit_from_memory(asset.as_bytes())
            .map_err(|e| SegmentationError::Runtime(format!("Failed to load model {}: {}", asset.name(), e)))?;

        if session.inputs.len() != 1 || session.outputs.len() != 1 {
            return Err(SegmentationError::InvalidModel(format!(
                "expected 1 input and 1 output, model has {} and {}",
                session.inputs.len(),
                session.outputs.len()
            )));
        }

        let input = &session.inputs[0];
        let dims: Vec<i64> = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            other => {
                return Err(SegmentationError::InvalidModel(format!(
                    "model input is not a tensor: {:?}",
                    other
                )))
            }
        };
        let input_shape = ModelInputShape::from_dims(&dims)?;
        let input_name = input.name.clone();

        info!(
            "Segmentation model loaded - input '{}' {}x{}x{}",
            input_name, input_shape.width, input_shape.height, input_shape.channels
        );

        Ok(Self {
            session,
            input_name,
            input_shape,
            target,
        })
    }
}

impl SegmentationModel for OrtSegmentationModel {
    fn input_shape(&self) -> ModelInputShape {
        self.input_shape
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor> {
        let shape = self.input_shape;
        let array = Array4::from_shape_vec(
            (1, shape.width as usize, shape.height as usize, PIXEL_SIZE),
            input.as_slice().to_vec(),
        )
        .map_err(|e| SegmentationError::InvalidInput(format!("Failed to create input array: {}", e)))?;

        let input_value = Value::from_array(array)
            .map_err(|e| SegmentationError::Runtime(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| SegmentationError::Runtime(format!("Segmentation inference failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| SegmentationError::Runtime(format!("Failed to extract output tensor: {}", e)))?;

        debug!("Segmentation output shape: {:?}", output.shape());

        OutputTensor::from_shape_vec(output.shape(), output.iter().copied().collect())
    }
}

enum EngineState {
    Uninitialized,
    Ready {
        model: Box<dyn SegmentationModel>,
        input_shape: ModelInputShape,
    },
    Shutdown,
}

/// Owns one segmentation model from initialization to shutdown
pub struct InferenceEngine {
    config: Arc<SegmentationConfig>,
    num_classes: usize,
    state: EngineState,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready { .. } => "ready",
            EngineState::Shutdown => "shutdown",
        };
        f.debug_struct("InferenceEngine")
            .field("model_file", &self.config.model_file)
            .field("num_classes", &self.num_classes)
            .field("state", &state)
            .finish()
    }
}

impl InferenceEngine {
    /// Engine expecting the 21 PASCAL VOC classes
    pub fn new(config: Arc<SegmentationConfig>) -> Self {
        Self::with_num_classes(config, NUM_CLASSES)
    }

    /// Engine for a model with a custom label set
    pub fn with_num_classes(config: Arc<SegmentationConfig>, num_classes: usize) -> Self {
        Self {
            config,
            num_classes,
            state: EngineState::Uninitialized,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Load the configured model asset and create the ONNX Runtime session
    ///
    /// Uses the GPU delegate when `use_gpu_delegate` is set, otherwise CPU
    /// with `cpu_threads` intra-op threads. There is no fallback between the
    /// two.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_uninitialized()?;
        self.config.validate().map_err(SegmentationError::Config)?;

        let start = Instant::now();
        let loader = ModelLoader::new(&self.config.asset_dir);
        let asset = loader.load(&self.config.model_file)?;
        let model = OrtSegmentationModel::from_asset(&asset, ExecutionTarget::from_config(&self.config))?;

        self.install(Box::new(model))?;
        info!("Inference engine initialized in {}ms", start.elapsed().as_millis());
        Ok(())
    }

    /// Initialize with an already constructed model backend
    pub fn initialize_with(&mut self, model: Box<dyn SegmentationModel>) -> Result<()> {
        self.ensure_uninitialized()?;
        self.install(model)
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        match self.state {
            EngineState::Uninitialized => Ok(()),
            EngineState::Ready { .. } => Err(SegmentationError::AlreadyInitialized),
            // A torn-down engine is never revived
            EngineState::Shutdown => Err(SegmentationError::UninitializedEngine),
        }
    }

    fn install(&mut self, model: Box<dyn SegmentationModel>) -> Result<()> {
        let input_shape = model.input_shape();
        if input_shape.width == 0 || input_shape.height == 0 {
            return Err(SegmentationError::InvalidModel(format!(
                "model declares an empty input {}x{}",
                input_shape.width, input_shape.height
            )));
        }
        debug!(
            "Model input {}x{}, {} bytes per input tensor",
            input_shape.width,
            input_shape.height,
            input_shape.byte_size()
        );
        self.state = EngineState::Ready { model, input_shape };
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }

    pub fn input_shape(&self) -> Result<ModelInputShape> {
        match &self.state {
            EngineState::Ready { input_shape, .. } => Ok(*input_shape),
            _ => Err(SegmentationError::UninitializedEngine),
        }
    }

    pub fn input_width(&self) -> Result<u32> {
        self.input_shape().map(|shape| shape.width)
    }

    pub fn input_height(&self) -> Result<u32> {
        self.input_shape().map(|shape| shape.height)
    }

    /// Bytes in one encoded input tensor: `4 * width * height * 3`
    pub fn model_input_byte_size(&self) -> Result<usize> {
        self.input_shape().map(|shape| shape.byte_size())
    }

    /// Run one forward pass, blocking until it completes
    ///
    /// # Errors
    /// - [`SegmentationError::UninitializedEngine`] before `initialize()` or after `shutdown()`
    /// - [`SegmentationError::InvalidInput`] if the tensor does not match the model input
    /// - [`SegmentationError::InvalidModel`] if the output class count is not
    ///   the one the engine was built for
    pub fn infer(&mut self, input: &InputTensor) -> Result<OutputTensor> {
        let (model, input_shape) = match &mut self.state {
            EngineState::Ready { model, input_shape } => (model, *input_shape),
            _ => return Err(SegmentationError::UninitializedEngine),
        };

        if input.width() != input_shape.width
            || input.height() != input_shape.height
            || input.len() != input_shape.tensor_len()
        {
            return Err(SegmentationError::InvalidInput(format!(
                "input tensor is {}x{} ({} values), model expects {}x{} ({} values)",
                input.width(),
                input.height(),
                input.len(),
                input_shape.width,
                input_shape.height,
                input_shape.tensor_len()
            )));
        }

        let output = model.run(input)?;

        if output.num_classes() != self.num_classes {
            return Err(SegmentationError::InvalidModel(format!(
                "model emitted {} classes, expected {}",
                output.num_classes(),
                self.num_classes
            )));
        }

        Ok(output)
    }

    /// Release the model and its execution provider
    ///
    /// Later calls to `infer()` fail with `UninitializedEngine`. Calling this
    /// again is a no-op.
    pub fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, EngineState::Shutdown) {
            EngineState::Ready { model, .. } => {
                drop(model);
                info!("Inference engine shut down");
            }
            EngineState::Uninitialized => {
                debug!("Shutting down an engine that was never initialized");
            }
            EngineState::Shutdown => {
                warn!("Inference engine already shut down");
            }
        }
    }
}
