//! Burn models for pixel-wise tree / non-tree segmentation of aerial mosaics.
//!
//! - [`ConvBlock`] / [`TransposeConvBlock`]: conv + ReLU + channel dropout units.
//! - [`EncoderDecoder`]: depth-parametric down/bottleneck/up network with skips.
//! - [`SegmentationModel`]: encoder-decoder plus a softmax classification head.
//! - [`LossTerms`]: weighted sum of named loss strategies.
//!
//! Models are plain Burn modules generic over the backend; placement happens
//! once, at construction, through the `device` argument.

pub mod block;
pub mod encoder_decoder;
pub mod error;
pub mod loss;
pub mod segmentation;

pub use block::{channel_dropout, ConvBlock, TransposeConvBlock};
pub use encoder_decoder::{EncoderDecoder, EncoderDecoderConfig, StageWidths};
pub use error::{ModelError, Result};
pub use loss::{LossBreakdown, LossKind, LossTerm, LossTerms, FOREGROUND_CHANNEL};
pub use segmentation::{SegmentationHead, SegmentationModel, SegmentationModelConfig};

pub mod prelude {
    pub use super::{
        LossKind, LossTerm, LossTerms, SegmentationModel, SegmentationModelConfig,
        FOREGROUND_CHANNEL,
    };
}
