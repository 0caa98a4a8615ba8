// src/error.rs
//
// Structural errors. These mean the build or configuration is wrong and a
// frame cannot be decoded correctly; numeric edge cases are clamped instead
// and never show up here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Executor output size disagrees with the computed output layout
    #[error("Output layout mismatch: layout needs {expected} floats, executor provides {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    /// A prepared frame has the wrong number of floats
    #[error("Frame size mismatch: expected {expected} floats, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    /// An auxiliary input has the wrong width
    #[error("Input '{name}' has {actual} values, expected {expected}")]
    InputSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Executor failed: {0}")]
    Executor(String),
}

impl ModelError {
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        ModelError::Executor(msg.into())
    }
}
