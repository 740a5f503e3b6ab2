//! Memory-bounded inference for segmentation models.
//!
//! - [`TiledSegmenter`]: tile-by-tile segmentation with progress events.
//! - [`resample`]: resolution-ratio down/up sampling.
//! - [`ArtifactStore`]: weights keyed by network, ratio and held-out case.

#![recursion_limit = "256"]

pub mod artifact;
pub mod engine;
pub mod error;
pub mod progress;
pub mod resample;
pub mod tiling;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use artifact::{ArtifactKey, ArtifactStore};
pub use engine::{foreground_and_uncertainty, CasePrediction, TiledSegmenter};
pub use error::{InferenceError, InferenceResult};
pub use progress::{
    format_duration, linear_eta, LogProgress, NullProgress, ProgressSink, RecordingProgress,
    TileProgress,
};
pub use tiling::{tile_boundaries, Tile, TilePlan, DEFAULT_TILE_SIZE};

pub mod prelude {
    pub use crate::{
        ArtifactKey, ArtifactStore, CasePrediction, InferenceBackend, LogProgress, ProgressSink,
        TiledSegmenter, DEFAULT_TILE_SIZE,
    };
}
