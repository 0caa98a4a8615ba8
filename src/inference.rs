// src/inference.rs

use crate::error::ModelError;
use crate::types::Config;
use anyhow::{Context, Result};
use ndarray::Array2;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::{DynValue, Tensor},
};
use tracing::{debug, info};

/// Input tensor names of the driving model export
pub const INPUT_IMGS: &str = "input_imgs";
pub const INPUT_DESIRE: &str = "desire";
pub const INPUT_TRAFFIC_CONVENTION: &str = "traffic_convention";
pub const INPUT_RECURRENT_STATE: &str = "initial_state";

/// Everything fed to one forward pass. Optional slots are present only when
/// the matching runtime flag is enabled.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorInputs<'a> {
    pub frames: &'a [f32],
    pub desire: Option<&'a [f32]>,
    pub traffic_convention: Option<&'a [f32]>,
    pub recurrent_state: Option<&'a [f32]>,
}

/// Runs the network. Opaque to the decoder: given inputs, it synchronously
/// fills `output`, which is always exactly `output_len()` floats.
pub trait Executor {
    /// Number of floats this executor writes per forward pass
    fn output_len(&self) -> usize;

    fn execute(&mut self, inputs: &ExecutorInputs<'_>, output: &mut [f32]) -> Result<()>;
}

pub struct OnnxExecutor {
    session: Session,
    output_len: usize,
}

impl OnnxExecutor {
    pub fn new(config: &Config) -> Result<Self> {
        info!("Initializing driving model executor");
        info!("Model path: {}", config.model.path);

        let mut session_builder = Session::builder()?;

        if config.inference.use_cuda {
            info!("Enabling CUDA execution provider");
            session_builder =
                session_builder.with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(config.inference.device_id)
                    .build()])?;
        }

        let session = session_builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.inference.num_threads)?
            .with_inter_threads(1)?
            .commit_from_file(&config.model.path)
            .context("Failed to load driving model")?;

        info!("✓ Executor initialized ({} output floats)", config.model.output_size);

        Ok(Self {
            session,
            output_len: config.model.output_size,
        })
    }
}

/// `[1, len]` tensor, the shape every input of the driving model takes
fn row_tensor(values: &[f32]) -> Result<DynValue> {
    let array = Array2::from_shape_vec((1, values.len()), values.to_vec())?;
    Ok(Tensor::from_array(array)?.into_dyn())
}

impl Executor for OnnxExecutor {
    fn output_len(&self) -> usize {
        self.output_len
    }

    fn execute(&mut self, inputs: &ExecutorInputs<'_>, output: &mut [f32]) -> Result<()> {
        let mut feeds: Vec<(&str, DynValue)> = Vec::with_capacity(4);
        feeds.push((INPUT_IMGS, row_tensor(inputs.frames)?));
        if let Some(desire) = inputs.desire {
            feeds.push((INPUT_DESIRE, row_tensor(desire)?));
        }
        if let Some(tc) = inputs.traffic_convention {
            feeds.push((INPUT_TRAFFIC_CONVENTION, row_tensor(tc)?));
        }
        if let Some(state) = inputs.recurrent_state {
            feeds.push((INPUT_RECURRENT_STATE, row_tensor(state)?));
        }

        let outputs = self
            .session
            .run(feeds)
            .map_err(|e| ModelError::executor(e.to_string()))?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        if data.len() != output.len() {
            return Err(ModelError::LayoutMismatch {
                expected: output.len(),
                actual: data.len(),
            }
            .into());
        }
        output.copy_from_slice(data);

        debug!("Forward pass produced {} floats", data.len());
        Ok(())
    }
}
