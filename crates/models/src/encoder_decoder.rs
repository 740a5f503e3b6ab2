//! Symmetric encoder-decoder with channel-concatenated skip connections.
//!
//! Given filter widths `[c0, c1, ..., c_{L-1}]` the down path has `L-1`
//! convolutional stages (`n_inputs -> c0 -> ... -> c_{L-2}`), the bottleneck maps
//! `c_{L-2} -> c_{L-1}`, and the up path walks back through the skip buffers in
//! reverse. Up stage `k` takes `upstream ++ skip` and produces the skip's width,
//! so the final output has `c0` channels.
//!
//! With pooling enabled every down stage output is max-pooled by 2 before the
//! next stage; skips keep their pre-pooling size and the up path resamples its
//! upstream input to the skip size before concatenating.

use crate::block::{ConvBlock, TransposeConvBlock};
use crate::error::{ModelError, Result};
use burn::module::Module;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderDecoderConfig {
    pub conv_filters: Vec<usize>,
    pub n_inputs: usize,
    pub kernel_size: usize,
    pub pooling: bool,
}

impl Default for EncoderDecoderConfig {
    fn default() -> Self {
        Self {
            conv_filters: vec![32, 64, 128, 256],
            n_inputs: 4,
            kernel_size: 3,
            pooling: false,
        }
    }
}

/// `(in, out)` channel pairs for every stage of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWidths {
    pub down: Vec<(usize, usize)>,
    pub bottleneck: (usize, usize),
    pub up: Vec<(usize, usize)>,
}

impl EncoderDecoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.conv_filters.len() < 2 {
            return Err(ModelError::TooFewStages(self.conv_filters.len()));
        }
        if let Some(stage) = self.conv_filters.iter().position(|c| *c == 0) {
            return Err(ModelError::ZeroWidth(stage));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(ModelError::EvenKernel(self.kernel_size));
        }
        if self.n_inputs == 0 {
            return Err(ModelError::NoInputs);
        }
        Ok(())
    }

    pub fn stage_widths(&self) -> Result<StageWidths> {
        self.validate()?;
        let filters = &self.conv_filters;
        let last = filters.len() - 1;

        let down = (0..last)
            .map(|j| {
                let f_in = if j == 0 { self.n_inputs } else { filters[j - 1] };
                (f_in, filters[j])
            })
            .collect();
        let bottleneck = (filters[last - 1], filters[last]);
        // Up stage k consumes (previous up output ++ skip[last-1-k]) and emits
        // the skip's width; the previous output of stage 0 is the bottleneck.
        let up = (0..last)
            .map(|k| {
                let skip = filters[last - 1 - k];
                let upstream = filters[last - k];
                (skip + upstream, skip)
            })
            .collect();

        Ok(StageWidths {
            down,
            bottleneck,
            up,
        })
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<EncoderDecoder<B>> {
        let widths = self.stage_widths()?;
        let k = self.kernel_size;
        let down = widths
            .down
            .iter()
            .map(|(f_in, f_out)| ConvBlock::new(*f_in, *f_out, k, device))
            .collect();
        let bottleneck = ConvBlock::new(widths.bottleneck.0, widths.bottleneck.1, k, device);
        let up = widths
            .up
            .iter()
            .map(|(f_in, f_out)| TransposeConvBlock::new(*f_in, *f_out, k, device))
            .collect();
        let pool = self
            .pooling
            .then(|| MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init());
        Ok(EncoderDecoder {
            down,
            bottleneck,
            up,
            pool,
        })
    }
}

#[derive(Debug, Module)]
pub struct EncoderDecoder<B: Backend> {
    down: Vec<ConvBlock<B>>,
    bottleneck: ConvBlock<B>,
    up: Vec<TransposeConvBlock<B>>,
    pool: Option<MaxPool2d>,
}

impl<B: Backend> EncoderDecoder<B> {
    pub fn depth(&self) -> usize {
        self.down.len() + 1
    }

    pub fn pooling(&self) -> bool {
        self.pool.is_some()
    }

    /// `dropout` is read once per call and applied after every block.
    pub fn forward(&self, input: Tensor<B, 4>, dropout: f64) -> Tensor<B, 4> {
        let mut x = input;
        let mut skips = Vec::with_capacity(self.down.len());
        for block in &self.down {
            x = block.forward(x, dropout);
            skips.push(x.clone());
            // A 2x2 window needs two rows and two columns; smaller maps pass through.
            if let Some(pool) = &self.pool {
                let [_, _, h, w] = x.dims();
                if h >= 2 && w >= 2 {
                    x = pool.forward(x);
                }
            }
        }

        x = self.bottleneck.forward(x, dropout);

        for (block, skip) in self.up.iter().zip(skips.into_iter().rev()) {
            let [_, _, h, w] = skip.dims();
            let [_, _, xh, xw] = x.dims();
            if (xh, xw) != (h, w) {
                x = interpolate(x, [h, w], InterpolateOptions::new(InterpolateMode::Nearest));
            }
            x = block.forward(Tensor::cat(vec![x, skip], 1), dropout);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_widths_mirror_down_path() {
        let cfg = EncoderDecoderConfig {
            conv_filters: vec![32, 64, 128, 256],
            n_inputs: 4,
            kernel_size: 3,
            pooling: false,
        };
        let widths = cfg.stage_widths().unwrap();
        assert_eq!(widths.down, vec![(4, 32), (32, 64), (64, 128)]);
        assert_eq!(widths.bottleneck, (128, 256));
        assert_eq!(widths.up, vec![(384, 128), (192, 64), (96, 32)]);
    }

    #[test]
    fn two_stage_network() {
        let cfg = EncoderDecoderConfig {
            conv_filters: vec![8, 16],
            n_inputs: 4,
            ..Default::default()
        };
        let widths = cfg.stage_widths().unwrap();
        assert_eq!(widths.down, vec![(4, 8)]);
        assert_eq!(widths.bottleneck, (8, 16));
        assert_eq!(widths.up, vec![(24, 8)]);
    }

    #[test]
    fn invalid_configs_rejected() {
        let mut cfg = EncoderDecoderConfig {
            conv_filters: vec![8],
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ModelError::TooFewStages(1)));
        cfg.conv_filters = vec![8, 16];
        cfg.kernel_size = 4;
        assert_eq!(cfg.validate(), Err(ModelError::EvenKernel(4)));
        cfg.kernel_size = 3;
        cfg.conv_filters = vec![8, 0];
        assert_eq!(cfg.validate(), Err(ModelError::ZeroWidth(1)));
    }
}
