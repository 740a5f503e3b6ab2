//! Convolution + ReLU + channel dropout units for the encoder and decoder paths.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

/// Zero whole feature maps with probability `rate` and rescale the survivors.
///
/// Only active while autodiff is enabled on the backend (training); on a plain
/// inference backend it is the identity, the same rule `burn::nn::Dropout`
/// follows.
pub fn channel_dropout<B: Backend>(input: Tensor<B, 4>, rate: f64) -> Tensor<B, 4> {
    if !B::ad_enabled() || rate <= 0.0 {
        return input;
    }
    if rate >= 1.0 {
        return input.zeros_like();
    }
    let [batch, channels, height, width] = input.dims();
    let keep = 1.0 - rate;
    let mask = Tensor::<B, 4>::random(
        [batch, channels, 1, 1],
        Distribution::Bernoulli(keep),
        &input.device(),
    )
    .div_scalar(keep)
    .repeat_dim(2, height)
    .repeat_dim(3, width);
    input * mask
}

/// Encoder unit: `k x k` convolution with `k / 2` padding, so spatial size is kept.
#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(f_in: usize, f_out: usize, kernel_size: usize, device: &B::Device) -> Self {
        let pad = kernel_size / 2;
        let conv = Conv2dConfig::new([f_in, f_out], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .init(device);
        Self { conv }
    }

    pub fn forward(&self, input: Tensor<B, 4>, dropout: f64) -> Tensor<B, 4> {
        channel_dropout(relu(self.conv.forward(input)), dropout)
    }
}

/// Decoder unit: transpose convolution with the same size-preserving padding.
#[derive(Debug, Module)]
pub struct TransposeConvBlock<B: Backend> {
    conv: ConvTranspose2d<B>,
}

impl<B: Backend> TransposeConvBlock<B> {
    pub fn new(f_in: usize, f_out: usize, kernel_size: usize, device: &B::Device) -> Self {
        let pad = kernel_size / 2;
        let conv = ConvTranspose2dConfig::new([f_in, f_out], [kernel_size, kernel_size])
            .with_padding([pad, pad])
            .init(device);
        Self { conv }
    }

    pub fn forward(&self, input: Tensor<B, 4>, dropout: f64) -> Tensor<B, 4> {
        channel_dropout(relu(self.conv.forward(input)), dropout)
    }
}
