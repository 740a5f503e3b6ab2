use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("need at least 2 filter widths (down path + bottleneck), got {0}")]
    TooFewStages(usize),
    #[error("filter width at stage {0} is zero")]
    ZeroWidth(usize),
    #[error("kernel size must be odd and positive, got {0}")]
    EvenKernel(usize),
    #[error("n_inputs must be positive")]
    NoInputs,
    #[error("binary segmentation needs at least 2 output classes, got {0}")]
    TooFewOutputs(usize),
    #[error("dropout rate {0} outside [0, 1)")]
    DropoutRange(String),
    #[error("at least one loss term is required")]
    NoLossTerms,
    #[error("loss term {name} has a non-finite or negative weight {weight}")]
    LossWeight { name: String, weight: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
