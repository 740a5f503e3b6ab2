//! Square training patches cut from mosaics, and Burn batch iteration over them.

use crate::types::{DatasetResult, MosaicDatasetError};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use data_contracts::{BinaryMask, Mosaic, Raster};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Patch origins along one axis: `0, step, 2*step, ...` plus `extent - size`
/// so the far edge is always covered. `step = max(1, size - overlap)`.
pub fn patch_origins(extent: usize, size: usize, overlap: usize) -> Vec<usize> {
    if size == 0 || size > extent {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let last = extent - size;
    let mut origins: Vec<usize> = (0..=last).step_by(step).collect();
    if origins.last() != Some(&last) {
        origins.push(last);
    }
    origins
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRef {
    pub source: usize,
    pub row: usize,
    pub col: usize,
}

/// Patches from a group of mosaics (one fold's training or validation part).
#[derive(Debug, Clone)]
pub struct PatchDataset<'a> {
    images: Vec<&'a Raster>,
    masks: Vec<&'a BinaryMask>,
    size: usize,
    channels: usize,
    patches: Vec<PatchRef>,
}

impl<'a> PatchDataset<'a> {
    /// With `filtered`, patches whose mask window holds no foreground are dropped.
    pub fn new(
        mosaics: &[&'a Mosaic],
        patch_size: usize,
        overlap: usize,
        filtered: bool,
    ) -> DatasetResult<Self> {
        if patch_size == 0 || overlap >= patch_size {
            return Err(MosaicDatasetError::PatchGeometry {
                patch: patch_size,
                overlap,
            });
        }
        let mut images = Vec::with_capacity(mosaics.len());
        let mut masks = Vec::with_capacity(mosaics.len());
        let mut patches = Vec::new();
        let mut dropped = 0usize;
        for (source, mosaic) in mosaics.iter().enumerate() {
            let mask = mosaic
                .mask
                .as_ref()
                .ok_or(MosaicDatasetError::MissingMask(mosaic.case_id))?;
            let (height, width) = mosaic.image.spatial_shape();
            if height < patch_size || width < patch_size {
                return Err(MosaicDatasetError::PatchTooLarge {
                    case_id: mosaic.case_id,
                    height,
                    width,
                    patch: patch_size,
                });
            }
            let cols = patch_origins(width, patch_size, overlap);
            for row in patch_origins(height, patch_size, overlap) {
                for col in &cols {
                    let rows = row..row + patch_size;
                    let keep = !filtered
                        || mask.window_has_foreground(rows, *col..*col + patch_size);
                    if keep {
                        patches.push(PatchRef {
                            source,
                            row,
                            col: *col,
                        });
                    } else {
                        dropped += 1;
                    }
                }
            }
            images.push(&mosaic.image);
            masks.push(mask);
        }
        debug!(
            "patch dataset: {} patches from {} mosaics ({} empty patches dropped)",
            patches.len(),
            mosaics.len(),
            dropped
        );
        let channels = images.first().map(|r| r.channels).unwrap_or(0);
        Ok(Self {
            images,
            masks,
            size: patch_size,
            channels,
            patches,
        })
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn patch_size(&self) -> usize {
        self.size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn patches(&self) -> &[PatchRef] {
        &self.patches
    }

    fn push_sample(&self, patch: PatchRef, inputs: &mut Vec<f32>, targets: &mut Vec<f32>) {
        let image = self.images[patch.source];
        let mask = self.masks[patch.source];
        let cols = patch.col..patch.col + self.size;
        for c in 0..image.channels {
            let plane = image.plane(c);
            for y in patch.row..patch.row + self.size {
                let start = y * image.width;
                inputs.extend_from_slice(&plane[start + cols.start..start + cols.end]);
            }
        }
        for y in patch.row..patch.row + self.size {
            let start = y * mask.width;
            targets.extend(
                mask.data[start + cols.start..start + cols.end]
                    .iter()
                    .map(|v| *v as f32),
            );
        }
    }

    /// One pass over the patches, shuffled when `shuffle` is set.
    pub fn batches(&self, shuffle: bool, seed: Option<u64>) -> BatchIter<'_> {
        let mut order: Vec<usize> = (0..self.patches.len()).collect();
        if shuffle {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            order.shuffle(&mut rng);
        }
        BatchIter {
            dataset: self,
            order,
            cursor: 0,
            inputs_buf: Vec::new(),
            targets_buf: Vec::new(),
        }
    }
}

pub struct PatchBatch<B: Backend> {
    /// `[N, C, p, p]` normalized mosaic windows.
    pub inputs: Tensor<B, 4>,
    /// `[N, 1, p, p]` binary masks as floats.
    pub targets: Tensor<B, 4>,
}

pub struct BatchIter<'a> {
    dataset: &'a PatchDataset<'a>,
    order: Vec<usize>,
    cursor: usize,
    inputs_buf: Vec<f32>,
    targets_buf: Vec<f32>,
}

impl BatchIter<'_> {
    pub fn remaining(&self) -> usize {
        self.order.len() - self.cursor
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> Option<PatchBatch<B>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + batch_size.max(1)).min(self.order.len());
        let n = end - self.cursor;
        self.inputs_buf.clear();
        self.targets_buf.clear();
        for &idx in &self.order[self.cursor..end] {
            self.dataset.push_sample(
                self.dataset.patches[idx],
                &mut self.inputs_buf,
                &mut self.targets_buf,
            );
        }
        self.cursor = end;

        let p = self.dataset.size;
        let c = self.dataset.channels;
        let inputs = Tensor::<B, 4>::from_data(
            TensorData::new(self.inputs_buf.clone(), [n, c, p, p]),
            device,
        );
        let targets = Tensor::<B, 4>::from_data(
            TensorData::new(self.targets_buf.clone(), [n, 1, p, p]),
            device,
        );
        Some(PatchBatch { inputs, targets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_cover_the_far_edge() {
        assert_eq!(patch_origins(64, 32, 16), vec![0, 16, 32]);
        assert_eq!(patch_origins(70, 32, 16), vec![0, 16, 32, 38]);
        assert_eq!(patch_origins(32, 32, 0), vec![0]);
        assert!(patch_origins(31, 32, 0).is_empty());
    }
}
