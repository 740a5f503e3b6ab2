use data_contracts::RasterError;
use models::ModelError;
use std::path::PathBuf;
use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("ratio {ratio} is invalid for a {height}x{width} mosaic")]
    InvalidRatio {
        ratio: usize,
        height: usize,
        width: usize,
    },
    #[error("resampled map is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("mosaic has {actual} channels, model expects {expected}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("model emits {0} classes; foreground channel is missing")]
    MissingForeground(usize),
    #[error("tensor readback failed: {0}")]
    TensorData(String),
    #[error("artifact {path}: {message}")]
    Recorder { path: PathBuf, message: String },
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Model(#[from] ModelError),
}
