//! Weighted loss terms evaluated on the foreground probability channel.

use crate::error::{ModelError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Index of the tree class in the softmax output.
pub const FOREGROUND_CHANNEL: usize = 1;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    BinaryCrossEntropy,
    SoftDice,
}

impl LossKind {
    /// `prediction` is `[N, C, H, W]` class probabilities, `target` the
    /// `[N, 1, H, W]` binary mask as floats. Returns a single-element tensor.
    pub fn compute<B: Backend>(
        &self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        let fg = foreground(prediction);
        match self {
            LossKind::BinaryCrossEntropy => {
                let p = fg.clamp(EPS, 1.0 - EPS);
                let not_t = target.clone().neg().add_scalar(1.0);
                let not_p = p.clone().neg().add_scalar(1.0);
                (target * p.log() + not_t * not_p.log()).mean().neg()
            }
            LossKind::SoftDice => {
                let inter = (fg.clone() * target.clone()).sum();
                let denom = fg.sum() + target.sum();
                inter
                    .mul_scalar(2.0)
                    .add_scalar(1.0)
                    .div(denom.add_scalar(1.0))
                    .neg()
                    .add_scalar(1.0)
            }
        }
    }
}

fn foreground<B: Backend>(prediction: Tensor<B, 4>) -> Tensor<B, 4> {
    let [n, _, h, w] = prediction.dims();
    prediction.slice([0..n, FOREGROUND_CHANNEL..FOREGROUND_CHANNEL + 1, 0..h, 0..w])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossTerm {
    pub name: String,
    pub weight: f32,
    pub kind: LossKind,
}

/// Total loss plus each term's unweighted value.
#[derive(Debug, Clone)]
pub struct LossBreakdown<B: Backend> {
    pub total: Tensor<B, 1>,
    pub terms: Vec<(String, Tensor<B, 1>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LossTerms(Vec<LossTerm>);

impl Default for LossTerms {
    fn default() -> Self {
        Self(vec![LossTerm {
            name: "xentr".to_string(),
            weight: 1.0,
            kind: LossKind::BinaryCrossEntropy,
        }])
    }
}

impl LossTerms {
    pub fn new(terms: Vec<LossTerm>) -> Result<Self> {
        let terms = Self(terms);
        terms.validate()?;
        Ok(terms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(ModelError::NoLossTerms);
        }
        for term in &self.0 {
            if !term.weight.is_finite() || term.weight < 0.0 {
                return Err(ModelError::LossWeight {
                    name: term.name.clone(),
                    weight: term.weight.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LossTerm> {
        self.0.iter()
    }

    pub fn evaluate<B: Backend>(
        &self,
        prediction: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> LossBreakdown<B> {
        let device = prediction.device();
        let mut total = Tensor::<B, 1>::zeros([1], &device);
        let mut terms = Vec::with_capacity(self.0.len());
        for term in &self.0 {
            let value = term.kind.compute(prediction.clone(), target.clone());
            total = total + value.clone().mul_scalar(term.weight);
            terms.push((term.name.clone(), value));
        }
        LossBreakdown { total, terms }
    }
}
