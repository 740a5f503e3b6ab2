//! Mosaic loading, leave-one-out folds, and Burn patch batching for tree segmentation.
//!
//! This crate provides:
//! - Experiment directory indexing and decoding (`mosaic{id}`, `DEM{id}`, tagged ground truth)
//! - Leave-one-mosaic-out folds with a positional validation split
//! - Overlapping square patch extraction with optional empty-patch filtering
//! - Burn-compatible batch iteration

pub mod folds;
pub mod loading;
pub mod patches;
pub mod types;

pub use folds::{leave_one_out, split_by_position, Fold};
pub use loading::{
    index_cases, load_case, load_mosaic_set, parse_case_id, parse_case_label, CaseFiles,
};
pub use patches::{patch_origins, BatchIter, PatchBatch, PatchDataset, PatchRef};
pub use types::{DatasetResult, MosaicDatasetError};
