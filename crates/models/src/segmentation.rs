//! Full segmentation network: encoder-decoder body plus a 1x1 classification head.

use crate::encoder_decoder::{EncoderDecoder, EncoderDecoderConfig};
use crate::error::{ModelError, Result};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationModelConfig {
    pub conv_filters: Vec<usize>,
    pub n_inputs: usize,
    pub n_outputs: usize,
    pub kernel_size: usize,
    pub pooling: bool,
    pub dropout: f64,
}

impl Default for SegmentationModelConfig {
    fn default() -> Self {
        Self {
            conv_filters: vec![32, 64, 128, 256],
            n_inputs: 4,
            n_outputs: 2,
            kernel_size: 3,
            pooling: false,
            dropout: 0.0,
        }
    }
}

impl SegmentationModelConfig {
    pub fn encoder_decoder(&self) -> EncoderDecoderConfig {
        EncoderDecoderConfig {
            conv_filters: self.conv_filters.clone(),
            n_inputs: self.n_inputs,
            kernel_size: self.kernel_size,
            pooling: self.pooling,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.encoder_decoder().validate()?;
        if self.n_outputs < 2 {
            return Err(ModelError::TooFewOutputs(self.n_outputs));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::DropoutRange(self.dropout.to_string()));
        }
        Ok(())
    }
}

/// `c0 -> c0 -> n_outputs` head with batch norm between the two 1x1 convolutions.
#[derive(Debug, Module)]
pub struct SegmentationHead<B: Backend> {
    reduce: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    classify: Conv2d<B>,
}

impl<B: Backend> SegmentationHead<B> {
    pub fn new(width: usize, n_outputs: usize, device: &B::Device) -> Self {
        Self {
            reduce: Conv2dConfig::new([width, width], [1, 1]).init(device),
            norm: BatchNormConfig::new(width).init(device),
            classify: Conv2dConfig::new([width, n_outputs], [1, 1]).init(device),
        }
    }

    /// Per-pixel class probabilities (softmax over the channel axis).
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.reduce.forward(input));
        let x = self.norm.forward(x);
        softmax(self.classify.forward(x), 1)
    }
}

#[derive(Debug, Module)]
pub struct SegmentationModel<B: Backend> {
    body: EncoderDecoder<B>,
    head: SegmentationHead<B>,
    n_inputs: usize,
    n_outputs: usize,
    dropout: f64,
}

impl<B: Backend> SegmentationModel<B> {
    /// Build every sub-module on `device`; nothing is moved afterwards.
    pub fn new(cfg: &SegmentationModelConfig, device: &B::Device) -> Result<Self> {
        cfg.validate()?;
        let body = cfg.encoder_decoder().init(device)?;
        let head = SegmentationHead::new(cfg.conv_filters[0], cfg.n_outputs, device);
        Ok(Self {
            body,
            head,
            n_inputs: cfg.n_inputs,
            n_outputs: cfg.n_outputs,
            dropout: cfg.dropout,
        })
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn dropout(&self) -> f64 {
        self.dropout
    }

    /// The single dropout rate every block reads on its next forward call.
    pub fn set_dropout(&mut self, rate: f64) -> Result<()> {
        if !(0.0..1.0).contains(&rate) {
            return Err(ModelError::DropoutRange(rate.to_string()));
        }
        self.dropout = rate;
        Ok(())
    }

    /// `[N, n_inputs, H, W] -> [N, n_outputs, H, W]`, softmax over classes.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.body.forward(input, self.dropout);
        self.head.forward(features)
    }
}
