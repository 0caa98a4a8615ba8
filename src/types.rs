use crate::frame_buffer::MODEL_FRAME_SIZE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub runtime: RuntimeFlags,
    #[serde(default)]
    pub params: ParamsConfig,
    pub frames: FrameSourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    /// Floats per prepared frame
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Floats the exported network writes per forward pass
    pub output_size: usize,
}

fn default_frame_size() -> usize {
    MODEL_FRAME_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub use_cuda: bool,
    pub device_id: i32,
    pub num_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            use_cuda: false,
            device_id: 0,
            num_threads: 4,
        }
    }
}

/// Optional model slots, resolved once at construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeFlags {
    #[serde(default)]
    pub temporal: bool,
    #[serde(default)]
    pub desire: bool,
    #[serde(default)]
    pub traffic_convention: bool,
    /// Publish raw path samples next to each fit
    #[serde(default)]
    pub debug_dump: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Directory of persisted params (one file per key)
    pub dir: Option<String>,
    /// Used when the persisted flag is missing
    #[serde(default)]
    pub is_rhd: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSourceConfig {
    pub input_dir: String,
    #[serde(default = "default_frame_extension")]
    pub extension: String,
}

fn default_frame_extension() -> String {
    "raw".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON-lines file; stdout when unset
    pub path: Option<String>,
    /// Capacity of the in-memory event bus
    pub max_pending: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_pending: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "drive_modeld=info,ort=warn".to_string(),
        }
    }
}

/// One prepared camera frame, ready for the temporal window
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub frame_id: u32,
    /// End-of-frame timestamp, nanoseconds
    pub timestamp_eof: u64,
    pub data: Vec<f32>,
    /// Requested desire index, when the source carries one
    pub desire: Option<usize>,
}
