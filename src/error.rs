use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the segmentation and compositing pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Weights could not be found, fetched or loaded. Fatal at construction.
    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// The underlying model invocation failed for a single frame
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unknown segmentation backend '{name}' (registered: {registered})")]
    UnknownBackend { name: String, registered: String },

    #[error("unsupported background resize mode '{0}' (expected 'stretch' or 'fill')")]
    UnsupportedResizeMode(String),

    #[error("mask is {mask_width}x{mask_height} but frame is {frame_width}x{frame_height}")]
    MaskSizeMismatch {
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("failed to read background image {path}: {reason}")]
    BackgroundImage { path: PathBuf, reason: String },
}

impl PipelineError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn inference(reason: impl ToString) -> Self {
        Self::Inference(reason.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
