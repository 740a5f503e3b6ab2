//! Per-channel statistics used to z-score each mosaic independently.

use crate::raster::Raster;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl ChannelStats {
    pub fn from_raster(raster: &Raster) -> Self {
        let mut mean = Vec::with_capacity(raster.channels);
        let mut std = Vec::with_capacity(raster.channels);
        for c in 0..raster.channels {
            let plane = raster.plane(c);
            let n = plane.len().max(1) as f64;
            let m = plane.iter().map(|v| *v as f64).sum::<f64>() / n;
            let var = plane
                .iter()
                .map(|v| {
                    let d = *v as f64 - m;
                    d * d
                })
                .sum::<f64>()
                / n;
            mean.push(m as f32);
            std.push(var.sqrt() as f32);
        }
        Self { mean, std }
    }

    /// Subtract the mean and divide by the std of every channel in place.
    /// Constant channels (std == 0) are only centered.
    pub fn normalize(&self, raster: &mut Raster) {
        for c in 0..raster.channels {
            let m = self.mean[c];
            let s = if self.std[c] > f32::EPSILON {
                self.std[c]
            } else {
                1.0
            };
            for v in raster.plane_mut(c) {
                *v = (*v - m) / s;
            }
        }
    }
}

/// Compute stats for `raster` and normalize it with them.
pub fn standardize(raster: &mut Raster) -> ChannelStats {
    let stats = ChannelStats::from_raster(raster);
    stats.normalize(raster);
    stats
}
