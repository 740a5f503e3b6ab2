use crate::raster::{BinaryMask, Raster, RasterError};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MosaicValidationError {
    #[error("mosaic {case_id} has an empty raster")]
    EmptyRaster { case_id: u32 },
    #[error("mosaic {case_id}: mask is {mask:?} but image is {image:?}")]
    MaskShape {
        case_id: u32,
        image: (usize, usize),
        mask: (usize, usize),
    },
    #[error("mosaic {case_id}: {source}")]
    Buffer {
        case_id: u32,
        #[source]
        source: RasterError,
    },
    #[error("leave-one-out needs at least 2 mosaics, got {0}")]
    TooFewMosaics(usize),
    #[error("case id {0} appears more than once")]
    DuplicateCase(u32),
    #[error("mosaic {case_id} has {actual} channels, expected {expected}")]
    ChannelCount {
        case_id: u32,
        expected: usize,
        actual: usize,
    },
}

/// One case: the stacked network input and, when annotated, its ground truth.
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub case_id: u32,
    /// The id as spelled in file names (`"01"` for `mosaic01.png`).
    pub label: String,
    pub image: Raster,
    pub mask: Option<BinaryMask>,
}

impl Mosaic {
    /// Mosaic whose label is the decimal id.
    pub fn new(case_id: u32, image: Raster, mask: Option<BinaryMask>) -> Self {
        Self {
            case_id,
            label: case_id.to_string(),
            image,
            mask,
        }
    }

    pub fn validate(&self) -> Result<(), MosaicValidationError> {
        if self.image.is_empty() || self.image.height == 0 || self.image.width == 0 {
            return Err(MosaicValidationError::EmptyRaster {
                case_id: self.case_id,
            });
        }
        let buffer = |source| MosaicValidationError::Buffer {
            case_id: self.case_id,
            source,
        };
        self.image.check_buffer().map_err(buffer)?;
        if let Some(mask) = &self.mask {
            mask.check_buffer().map_err(buffer)?;
            if mask.spatial_shape() != self.image.spatial_shape() {
                return Err(MosaicValidationError::MaskShape {
                    case_id: self.case_id,
                    image: self.image.spatial_shape(),
                    mask: mask.spatial_shape(),
                });
            }
        }
        Ok(())
    }
}

/// Validated, ordered collection of mosaics. Order defines fold order.
#[derive(Debug, Clone)]
pub struct MosaicSet {
    mosaics: Vec<Mosaic>,
}

impl MosaicSet {
    pub fn new(mosaics: Vec<Mosaic>) -> Result<Self, MosaicValidationError> {
        if mosaics.len() < 2 {
            return Err(MosaicValidationError::TooFewMosaics(mosaics.len()));
        }
        let expected = mosaics[0].image.channels;
        let mut seen = BTreeSet::new();
        for mosaic in &mosaics {
            mosaic.validate()?;
            if !seen.insert(mosaic.case_id) {
                return Err(MosaicValidationError::DuplicateCase(mosaic.case_id));
            }
            if mosaic.image.channels != expected {
                return Err(MosaicValidationError::ChannelCount {
                    case_id: mosaic.case_id,
                    expected,
                    actual: mosaic.image.channels,
                });
            }
        }
        Ok(Self { mosaics })
    }

    pub fn len(&self) -> usize {
        self.mosaics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mosaics.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.mosaics[0].image.channels
    }

    pub fn get(&self, index: usize) -> Option<&Mosaic> {
        self.mosaics.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mosaic> {
        self.mosaics.iter()
    }

    pub fn case_ids(&self) -> Vec<u32> {
        self.mosaics.iter().map(|m| m.case_id).collect()
    }
}

impl std::ops::Index<usize> for MosaicSet {
    type Output = Mosaic;

    fn index(&self, index: usize) -> &Mosaic {
        &self.mosaics[index]
    }
}
