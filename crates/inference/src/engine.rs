//! Tiled segmentation of whole mosaics.
//!
//! Each mosaic is cut into non-overlapping tiles ([`TilePlan`]); every tile is
//! moved to the model's device, segmented, read back, and pasted into a
//! host-resident probability buffer. Only one tile lives on the device at a
//! time, so peak device memory depends on the tile size rather than the
//! mosaic size.

use crate::error::{InferenceError, InferenceResult};
use crate::progress::{linear_eta, ProgressSink, TileProgress};
use crate::resample::{downsample, raster_to_tensor, tensor_to_raster, upsample_probabilities};
use crate::tiling::TilePlan;
use burn::tensor::backend::Backend;
use data_contracts::Raster;
use models::{SegmentationModel, FOREGROUND_CHANNEL};
use std::time::Instant;

/// Per-pixel outputs for one case at full resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CasePrediction {
    /// Probability of the tree class, in `[0, 1]`.
    pub foreground: Raster,
    /// `1 - max_c p_c`, in `[0, 1]`.
    pub uncertainty: Raster,
}

impl CasePrediction {
    /// Hard tree / non-tree labels at `threshold`.
    pub fn binary(&self, threshold: f32) -> Vec<u8> {
        self.foreground
            .data
            .iter()
            .map(|p| u8::from(*p >= threshold))
            .collect()
    }
}

/// Split a probability map into the foreground and uncertainty planes.
pub fn foreground_and_uncertainty(probs: &Raster) -> InferenceResult<(Raster, Raster)> {
    if probs.channels <= FOREGROUND_CHANNEL {
        return Err(InferenceError::MissingForeground(probs.channels));
    }
    let (h, w) = probs.spatial_shape();
    let foreground = Raster::new(1, h, w, probs.plane(FOREGROUND_CHANNEL).to_vec())?;
    let mut max = vec![f32::MIN; h * w];
    for c in 0..probs.channels {
        for (m, p) in max.iter_mut().zip(probs.plane(c)) {
            *m = m.max(*p);
        }
    }
    let uncertainty = Raster::new(1, h, w, max.into_iter().map(|m| 1.0 - m).collect())?;
    Ok((foreground, uncertainty))
}

/// Runs a segmentation model over mosaics tile by tile.
///
/// The model should be an inference copy (for autodiff backends, the result of
/// `AutodiffModule::valid`), so no graph is recorded across tiles.
pub struct TiledSegmenter<'m, B: Backend> {
    model: &'m SegmentationModel<B>,
    device: B::Device,
}

impl<'m, B: Backend> TiledSegmenter<'m, B> {
    pub fn new(model: &'m SegmentationModel<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Class probabilities `[n_outputs, H, W]` for each mosaic, in input order.
    ///
    /// `tile_size = None` segments each mosaic in one pass.
    pub fn segment(
        &self,
        mosaics: &[&Raster],
        tile_size: Option<usize>,
        sink: &mut dyn ProgressSink,
    ) -> InferenceResult<Vec<Raster>> {
        let started = Instant::now();
        let n_cases = mosaics.len();
        mosaics
            .iter()
            .enumerate()
            .map(|(case_index, mosaic)| {
                self.segment_case(mosaic, tile_size, case_index, n_cases, started, sink)
            })
            .collect()
    }

    fn segment_case(
        &self,
        mosaic: &Raster,
        tile_size: Option<usize>,
        case_index: usize,
        n_cases: usize,
        started: Instant,
        sink: &mut dyn ProgressSink,
    ) -> InferenceResult<Raster> {
        if mosaic.channels != self.model.n_inputs() {
            return Err(InferenceError::ChannelMismatch {
                expected: self.model.n_inputs(),
                actual: mosaic.channels,
            });
        }
        let (h, w) = mosaic.spatial_shape();
        let plan = TilePlan::new(h, w, tile_size);
        let n_tiles = plan.len();
        let mut probs = Raster::zeros(self.model.n_outputs(), h, w);
        let case_started = Instant::now();
        for (i, tile) in plan.tiles().enumerate() {
            let input = mosaic.crop(tile.rows.clone(), tile.cols.clone())?;
            let output = self.run_tile(&input)?;
            probs.paste(tile.rows, tile.cols, &output)?;
            let elapsed = case_started.elapsed();
            sink.on_tile(&TileProgress {
                case_index,
                n_cases,
                tile_index: i + 1,
                n_tiles,
                elapsed,
                total_elapsed: started.elapsed(),
                eta: linear_eta(elapsed, i + 1, n_tiles),
            });
        }
        sink.on_case_finished(case_index, case_started.elapsed());
        Ok(probs)
    }

    fn run_tile(&self, tile: &Raster) -> InferenceResult<Raster> {
        B::sync(&self.device);
        let input = raster_to_tensor::<B>(tile, &self.device);
        let output = self.model.forward(input);
        let raster = tensor_to_raster(output)?;
        B::sync(&self.device);
        Ok(raster)
    }

    /// Segment one mosaic at `1 / ratio` resolution and bring the foreground
    /// and uncertainty maps back to the mosaic's own size.
    pub fn predict_case(
        &self,
        mosaic: &Raster,
        ratio: usize,
        tile_size: Option<usize>,
        sink: &mut dyn ProgressSink,
    ) -> InferenceResult<CasePrediction> {
        let (h, w) = mosaic.spatial_shape();
        let reduced = downsample::<B>(mosaic, ratio, &self.device)?;
        let probs = self.segment_case(&reduced, tile_size, 0, 1, Instant::now(), sink)?;
        let (foreground, uncertainty) = foreground_and_uncertainty(&probs)?;
        let foreground = upsample_probabilities::<B>(&foreground, h, w, &self.device)?;
        let uncertainty = upsample_probabilities::<B>(&uncertainty, h, w, &self.device)?;
        log::debug!(
            "predicted {}x{} mosaic at ratio {} ({}x{} network input)",
            h,
            w,
            ratio,
            reduced.height,
            reduced.width
        );
        Ok(CasePrediction {
            foreground,
            uncertainty,
        })
    }
}
