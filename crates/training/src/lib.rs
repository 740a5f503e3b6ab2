#![recursion_limit = "256"]

pub mod config;
pub mod cross_validation;
pub mod fit;
pub mod outputs;

use burn::backend::Autodiff;

pub use config::{validate_backend_choice, BackendKind, CliArgs, ExperimentConfig, CONFIG_ENV};
pub use cross_validation::{CrossValidator, FoldOutcome, FoldState};
pub use fit::{evaluate, fit, EpochStats, FitConfig, FitReport};
pub use outputs::{prediction_path, uncertainty_path, write_summary, SUMMARY_FILE};

/// Backend alias for training/testing (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type ADBackend = Autodiff<TrainBackend>;
