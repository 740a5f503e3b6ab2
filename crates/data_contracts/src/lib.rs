//! Shared data contracts for mosaics, rasters and ground-truth masks.
//!
//! Everything here is plain data: no tensor framework, no file formats. The
//! dataset, inference and training crates all exchange these types.

pub mod mosaic;
pub mod preprocess;
pub mod raster;

pub use mosaic::{Mosaic, MosaicSet, MosaicValidationError};
pub use preprocess::{standardize, ChannelStats};
pub use raster::{BinaryMask, Raster, RasterError};
