//! Error definitions and shared result alias for mosaic_dataset.

use data_contracts::{MosaicValidationError, RasterError};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, MosaicDatasetError>;

#[derive(Debug, Error)]
pub enum MosaicDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no ground-truth files tagged {tag:?} under {dir}")]
    NoCases { dir: PathBuf, tag: String },
    #[error("ground-truth file {0} has no numeric case id")]
    MissingCaseId(PathBuf),
    #[error("case {case_id}: no {kind} file found (tried {stem}.{{jpg,jpeg,png,tif,tiff}})")]
    MissingFile {
        case_id: u32,
        kind: &'static str,
        stem: String,
    },
    #[error("case {case_id}: {kind} is {actual:?}, mosaic is {expected:?}")]
    ShapeMismatch {
        case_id: u32,
        kind: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("mosaic {case_id} ({height}x{width}) is smaller than the {patch}px patch")]
    PatchTooLarge {
        case_id: u32,
        height: usize,
        width: usize,
        patch: usize,
    },
    #[error("mosaic {0} has no ground-truth mask")]
    MissingMask(u32),
    #[error("invalid patch geometry: size {patch}, overlap {overlap}")]
    PatchGeometry { patch: usize, overlap: usize },
    #[error(transparent)]
    Validation(#[from] MosaicValidationError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("{0}")]
    Other(String),
}
