// src/frame_buffer.rs
//
// Two-frame sliding window handed to the executor.
//
// Layout: [older frame | newer frame], one flat f32 buffer. Each push moves
// the newer half into the older half and copies the new frame into the
// newer half. On the very first push the older half is still the zeroed
// startup state; that transient is accepted.

use crate::error::ModelError;
use tracing::debug;

pub const MODEL_WIDTH: usize = 512;
pub const MODEL_HEIGHT: usize = 256;
/// YUV420 frame flattened for the network
pub const MODEL_FRAME_SIZE: usize = MODEL_WIDTH * MODEL_HEIGHT * 3 / 2;

pub struct TemporalFrameBuffer {
    frames: Vec<f32>,
    frame_size: usize,
    /// Frames pushed since startup
    pushed: u64,
}

impl TemporalFrameBuffer {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frames: vec![0.0; frame_size * 2],
            frame_size,
            pushed: 0,
        }
    }

    /// Shift the window and place `frame` in the newer half.
    pub fn push(&mut self, frame: &[f32]) -> Result<(), ModelError> {
        if frame.len() != self.frame_size {
            return Err(ModelError::FrameSize {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }

        self.frames.copy_within(self.frame_size.., 0);
        self.frames[self.frame_size..].copy_from_slice(frame);
        self.pushed += 1;

        if self.pushed == 1 {
            debug!("First frame buffered; older half is still zero");
        }
        Ok(())
    }

    /// The concatenated input, oldest frame first
    pub fn as_slice(&self) -> &[f32] {
        &self.frames
    }
}
