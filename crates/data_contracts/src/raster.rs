use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RasterError {
    #[error("buffer holds {actual} values, expected {expected} for shape {shape:?}")]
    BufferLength {
        shape: (usize, usize, usize),
        expected: usize,
        actual: usize,
    },
    #[error("window rows {rows:?} cols {cols:?} exceeds raster of {height}x{width}")]
    WindowOutOfBounds {
        rows: Range<usize>,
        cols: Range<usize>,
        height: usize,
        width: usize,
    },
    #[error("tile shape {tile:?} does not match window shape {window:?}")]
    TileShape {
        tile: (usize, usize, usize),
        window: (usize, usize, usize),
    },
    #[error("cannot stack rasters of {0}x{1} and {2}x{3}")]
    SpatialMismatch(usize, usize, usize, usize),
}

/// Multi-channel float raster in CHW layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Raster {
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<f32>,
    ) -> Result<Self, RasterError> {
        let raster = Self {
            channels,
            height,
            width,
            data,
        };
        raster.check_buffer()?;
        Ok(raster)
    }

    /// The buffer holds exactly `channels * height * width` values.
    pub fn check_buffer(&self) -> Result<(), RasterError> {
        let expected = self.channels * self.height * self.width;
        if self.data.len() != expected {
            return Err(RasterError::BufferLength {
                shape: self.shape(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// (channels, height, width)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn spatial_shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        let len = self.height * self.width;
        &self.data[channel * len..(channel + 1) * len]
    }

    pub fn plane_mut(&mut self, channel: usize) -> &mut [f32] {
        let len = self.height * self.width;
        &mut self.data[channel * len..(channel + 1) * len]
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[(channel * self.height + y) * self.width + x]
    }

    fn check_window(&self, rows: &Range<usize>, cols: &Range<usize>) -> Result<(), RasterError> {
        if rows.start > rows.end
            || cols.start > cols.end
            || rows.end > self.height
            || cols.end > self.width
        {
            return Err(RasterError::WindowOutOfBounds {
                rows: rows.clone(),
                cols: cols.clone(),
                height: self.height,
                width: self.width,
            });
        }
        Ok(())
    }

    /// Copy of the `rows` x `cols` window across all channels.
    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Raster, RasterError> {
        self.check_window(&rows, &cols)?;
        let h = rows.len();
        let w = cols.len();
        let mut data = Vec::with_capacity(self.channels * h * w);
        for c in 0..self.channels {
            let plane = self.plane(c);
            for y in rows.clone() {
                let start = y * self.width;
                data.extend_from_slice(&plane[start + cols.start..start + cols.end]);
            }
        }
        Ok(Raster {
            channels: self.channels,
            height: h,
            width: w,
            data,
        })
    }

    /// Write `tile` into the `rows` x `cols` window. Channel counts must agree.
    pub fn paste(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        tile: &Raster,
    ) -> Result<(), RasterError> {
        self.check_window(&rows, &cols)?;
        let window = (self.channels, rows.len(), cols.len());
        if tile.shape() != window {
            return Err(RasterError::TileShape {
                tile: tile.shape(),
                window,
            });
        }
        let width = self.width;
        for c in 0..self.channels {
            let src = tile.plane(c);
            let dst = self.plane_mut(c);
            for (ty, y) in rows.clone().enumerate() {
                let row = &src[ty * tile.width..(ty + 1) * tile.width];
                dst[y * width + cols.start..y * width + cols.end].copy_from_slice(row);
            }
        }
        Ok(())
    }

    /// Concatenate rasters along the channel axis.
    pub fn stack_channels(parts: &[&Raster]) -> Result<Raster, RasterError> {
        let Some(first) = parts.first() else {
            return Ok(Raster::zeros(0, 0, 0));
        };
        let mut data = Vec::new();
        let mut channels = 0;
        for part in parts {
            if part.spatial_shape() != first.spatial_shape() {
                return Err(RasterError::SpatialMismatch(
                    first.height,
                    first.width,
                    part.height,
                    part.width,
                ));
            }
            channels += part.channels;
            data.extend_from_slice(&part.data);
        }
        Ok(Raster {
            channels,
            height: first.height,
            width: first.width,
            data,
        })
    }
}

/// Binary ground-truth mask, 1 marks foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMask {
    pub height: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl BinaryMask {
    pub fn new(height: usize, width: usize, data: Vec<u8>) -> Result<Self, RasterError> {
        let mask = Self {
            height,
            width,
            data,
        };
        mask.check_buffer()?;
        Ok(mask)
    }

    pub fn check_buffer(&self) -> Result<(), RasterError> {
        if self.data.len() != self.height * self.width {
            return Err(RasterError::BufferLength {
                shape: (1, self.height, self.width),
                expected: self.height * self.width,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn spatial_shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|v| **v > 0).count()
    }

    /// True when the window contains at least one foreground pixel.
    pub fn window_has_foreground(&self, rows: Range<usize>, cols: Range<usize>) -> bool {
        rows.into_iter().any(|y| {
            let start = y * self.width;
            self.data[start + cols.start..start + cols.end]
                .iter()
                .any(|v| *v > 0)
        })
    }

    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> Result<BinaryMask, RasterError> {
        if rows.end > self.height || cols.end > self.width {
            return Err(RasterError::WindowOutOfBounds {
                rows,
                cols,
                height: self.height,
                width: self.width,
            });
        }
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for y in rows.clone() {
            let start = y * self.width;
            data.extend_from_slice(&self.data[start + cols.start..start + cols.end]);
        }
        Ok(BinaryMask {
            height: rows.len(),
            width: cols.len(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(channels: usize, height: usize, width: usize) -> Raster {
        let data = (0..channels * height * width).map(|v| v as f32).collect();
        Raster::new(channels, height, width, data).unwrap()
    }

    #[test]
    fn crop_then_paste_restores_window() {
        let src = ramp(2, 5, 7);
        let tile = src.crop(1..4, 2..6).unwrap();
        assert_eq!(tile.shape(), (2, 3, 4));
        assert_eq!(tile.get(1, 0, 0), src.get(1, 1, 2));

        let mut dst = Raster::zeros(2, 5, 7);
        dst.paste(1..4, 2..6, &tile).unwrap();
        assert_eq!(dst.get(0, 3, 5), src.get(0, 3, 5));
        assert_eq!(dst.get(0, 0, 0), 0.0);
    }

    #[test]
    fn paste_rejects_wrong_tile_shape() {
        let mut dst = Raster::zeros(1, 4, 4);
        let tile = Raster::zeros(1, 2, 3);
        assert!(matches!(
            dst.paste(0..2, 0..2, &tile),
            Err(RasterError::TileShape { .. })
        ));
    }

    #[test]
    fn crop_out_of_bounds_is_rejected() {
        let src = ramp(1, 4, 4);
        assert!(src.crop(0..5, 0..4).is_err());
    }

    #[test]
    fn mask_window_foreground() {
        let mut data = vec![0u8; 16];
        data[2 * 4 + 3] = 1;
        let mask = BinaryMask::new(4, 4, data).unwrap();
        assert!(mask.window_has_foreground(2..4, 2..4));
        assert!(!mask.window_has_foreground(0..2, 0..4));
        assert_eq!(mask.foreground_count(), 1);
    }
}
