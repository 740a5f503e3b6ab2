//! Fit loop: Adam over patch batches with validation-driven early stopping.

use std::time::Instant;

use anyhow::bail;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use inference::format_duration;
use models::{LossTerms, SegmentationModel};
use mosaic_dataset::PatchDataset;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    /// Epochs without validation improvement tolerated before stopping.
    pub patience: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_terms: Vec<(String, f32)>,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub history: Vec<EpochStats>,
    pub best_epoch: usize,
    pub best_val_loss: f32,
    pub stopped_early: bool,
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(f32::NAN)
}

/// Mean total loss (and mean per-term values) over one pass of `dataset`.
pub fn evaluate<B: Backend>(
    model: &SegmentationModel<B>,
    dataset: &PatchDataset<'_>,
    losses: &LossTerms,
    batch_size: usize,
    device: &B::Device,
) -> (f32, Vec<(String, f32)>) {
    let mut iter = dataset.batches(false, None);
    let mut total = 0.0f32;
    let mut terms: Vec<(String, f32)> = losses.iter().map(|t| (t.name.clone(), 0.0)).collect();
    let mut n = 0usize;
    while let Some(batch) = iter.next_batch::<B>(batch_size, device) {
        let pred = model.forward(batch.inputs);
        let breakdown = losses.evaluate(pred, batch.targets);
        total += scalar(breakdown.total);
        for (slot, (_, value)) in terms.iter_mut().zip(breakdown.terms) {
            slot.1 += scalar(value);
        }
        n += 1;
    }
    if n == 0 {
        return (f32::NAN, terms);
    }
    for slot in terms.iter_mut() {
        slot.1 /= n as f32;
    }
    (total / n as f32, terms)
}

/// Train `model` and return the snapshot with the lowest validation loss.
pub fn fit<B: AutodiffBackend>(
    mut model: SegmentationModel<B>,
    train: &PatchDataset<'_>,
    val: &PatchDataset<'_>,
    train_losses: &LossTerms,
    val_losses: &LossTerms,
    cfg: &FitConfig,
    device: &B::Device,
) -> anyhow::Result<(SegmentationModel<B>, FitReport)> {
    if train.is_empty() {
        bail!("training dataset has no patches");
    }
    log::info!(
        "training {} parameters on {} patches ({} validation)",
        model.num_params(),
        train.len(),
        val.len()
    );
    let mut optim = AdamConfig::new().init();
    let batch_size = cfg.batch_size.max(1);

    let mut history = Vec::with_capacity(cfg.epochs);
    let mut best: Option<(usize, f32, SegmentationModel<B>)> = None;
    let mut stale = 0usize;
    let mut stopped_early = false;

    for epoch in 0..cfg.epochs {
        let started = Instant::now();
        let seed = cfg.seed.map(|s| s.wrapping_add(epoch as u64));
        let mut batches = train.batches(true, seed);
        let mut losses = Vec::new();
        while let Some(batch) = batches.next_batch::<B>(batch_size, device) {
            let pred = model.forward(batch.inputs);
            let loss = train_losses.evaluate(pred, batch.targets).total;
            let loss_val = scalar(loss.clone().detach());
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.learning_rate, model, grads);
            losses.push(loss_val);
        }
        let train_loss = losses.iter().sum::<f32>() / losses.len().max(1) as f32;
        let (val_loss, val_terms) = evaluate(&model.valid(), val, val_losses, batch_size, device);
        if !train_loss.is_finite() || !val_loss.is_finite() {
            log::warn!("epoch {epoch}: non-finite loss (train {train_loss}, val {val_loss})");
        }

        let improved = match &best {
            Some((_, best_loss, _)) => val_loss < *best_loss,
            None => val_loss.is_finite(),
        };
        if improved {
            best = Some((epoch, val_loss, model.clone()));
            stale = 0;
        } else {
            stale += 1;
        }
        let stats = EpochStats {
            epoch,
            train_loss,
            val_loss,
            val_terms,
            seconds: started.elapsed().as_secs_f64(),
        };
        log::info!(
            "epoch {epoch}: train {train_loss:.4} val {val_loss:.4}{} ({})",
            if improved { " *" } else { "" },
            format_duration(started.elapsed())
        );
        for (name, value) in &stats.val_terms {
            log::debug!("epoch {epoch}: val {name} {value:.4}");
        }
        history.push(stats);

        if stale > cfg.patience {
            log::info!("early stopping after {} epochs without improvement", stale);
            stopped_early = true;
            break;
        }
    }

    let (best_epoch, best_val_loss, model) = match best {
        Some(best) => best,
        None => (history.len().saturating_sub(1), f32::NAN, model),
    };
    Ok((
        model,
        FitReport {
            history,
            best_epoch,
            best_val_loss,
            stopped_early,
        },
    ))
}
