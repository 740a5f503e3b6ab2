//! Leave-one-mosaic-out cross-validation.
//!
//! Each fold walks `Init -> ModelLookup -> (Train) -> Test -> Done`: a stored
//! artifact for `(net_name, ratio, case)` skips training, otherwise a model is
//! fit on the fold's training mosaics and saved. The held-out mosaic is then
//! segmented at the configured ratio and its maps are written next to it.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use data_contracts::{Mosaic, MosaicSet};
use inference::{format_duration, ArtifactKey, ArtifactStore, ProgressSink, TiledSegmenter};
use models::SegmentationModel;
use mosaic_dataset::{leave_one_out, Fold, PatchDataset};
use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::fit::{fit, FitConfig, FitReport};
use crate::outputs::{prediction_path, uncertainty_path, write_probability_png};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldState {
    Init,
    ModelLookup,
    Train,
    Test,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldOutcome {
    pub fold: usize,
    pub case_id: u32,
    pub label: String,
    /// `false` when a stored artifact was reused.
    pub trained: bool,
    pub artifact: PathBuf,
    pub prediction: PathBuf,
    pub uncertainty: PathBuf,
    pub best_val_loss: Option<f32>,
    pub best_epoch: Option<usize>,
    /// Share of pixels with foreground probability >= 0.5.
    pub foreground_fraction: f32,
    pub states: Vec<FoldState>,
}

pub struct CrossValidator<'a, B: AutodiffBackend> {
    config: &'a ExperimentConfig,
    mosaics: &'a MosaicSet,
    store: ArtifactStore,
    device: B::Device,
}

impl<'a, B: AutodiffBackend> CrossValidator<'a, B> {
    pub fn new(config: &'a ExperimentConfig, mosaics: &'a MosaicSet, device: B::Device) -> Self {
        Self {
            config,
            mosaics,
            store: ArtifactStore::new(config.artifacts_directory()),
            device,
        }
    }

    pub fn folds(&self) -> Vec<Fold> {
        leave_one_out(self.mosaics.len(), self.config.val_split)
    }

    /// Every fold in order; the first failing fold aborts the run.
    pub fn run(&self, sink: &mut dyn ProgressSink) -> anyhow::Result<Vec<FoldOutcome>> {
        if self.mosaics.channels() != self.config.model.n_inputs {
            bail!(
                "mosaics have {} channels but the model expects {}",
                self.mosaics.channels(),
                self.config.model.n_inputs
            );
        }
        let folds = self.folds();
        log::info!(
            "starting cross-validation (leave-one-mosaic-out) - {} mosaics",
            folds.len()
        );
        folds
            .iter()
            .map(|fold| {
                let case = self.mosaics[fold.test].case_id;
                self.run_fold(fold, sink)
                    .with_context(|| format!("fold {} (mosaic {case})", fold.index + 1))
            })
            .collect()
    }

    pub fn run_fold(
        &self,
        fold: &Fold,
        sink: &mut dyn ProgressSink,
    ) -> anyhow::Result<FoldOutcome> {
        let n_folds = self.mosaics.len();
        let test = &self.mosaics[fold.test];
        let key = ArtifactKey::new(&self.config.net_name, self.config.ratio, test.case_id);
        let dir = &self.config.mosaics_directory;

        let mut outcome = FoldOutcome {
            fold: fold.index,
            case_id: test.case_id,
            label: test.label.clone(),
            trained: false,
            artifact: self.store.path(&key),
            prediction: prediction_path(dir, self.config.ratio, &test.label),
            uncertainty: uncertainty_path(dir, self.config.ratio, &test.label),
            best_val_loss: None,
            best_epoch: None,
            foreground_fraction: 0.0,
            states: Vec::new(),
        };
        let mut model: Option<SegmentationModel<B>> = None;
        let mut state = FoldState::Init;
        let started = Instant::now();

        loop {
            outcome.states.push(state);
            log::debug!("fold {}/{}: {:?}", fold.index + 1, n_folds, state);
            state = match state {
                FoldState::Init => FoldState::ModelLookup,
                FoldState::ModelLookup => {
                    match self
                        .store
                        .try_load::<B>(&key, &self.config.model, &self.device)
                    {
                        Some(loaded) => {
                            model = Some(loaded);
                            FoldState::Test
                        }
                        None => FoldState::Train,
                    }
                }
                FoldState::Train => {
                    log::info!(
                        "starting training for mosaic {} ({}/{})",
                        test.case_id,
                        fold.index + 1,
                        n_folds
                    );
                    let (trained, report) = self.train(fold)?;
                    self.store.save(&key, &trained)?;
                    outcome.trained = true;
                    outcome.best_val_loss = Some(report.best_val_loss);
                    outcome.best_epoch = Some(report.best_epoch);
                    log::info!(
                        "training finished (total time {})",
                        format_duration(started.elapsed())
                    );
                    model = Some(trained);
                    FoldState::Test
                }
                FoldState::Test => {
                    let Some(trained) = model.as_ref() else {
                        bail!("no model available for mosaic {}", test.case_id);
                    };
                    log::info!(
                        "starting testing with mosaic {} ({}/{})",
                        test.case_id,
                        fold.index + 1,
                        n_folds
                    );
                    outcome.foreground_fraction = self.test(trained, test, &outcome, sink)?;
                    FoldState::Done
                }
                FoldState::Done => break,
            };
        }
        Ok(outcome)
    }

    fn train(&self, fold: &Fold) -> anyhow::Result<(SegmentationModel<B>, FitReport)> {
        let cfg = self.config;
        let pick = |indices: &[usize]| -> Vec<&Mosaic> {
            indices.iter().map(|&i| &self.mosaics[i]).collect()
        };
        let train_mosaics = pick(&fold.train);
        let val_mosaics = pick(&fold.val);

        let train = PatchDataset::new(&train_mosaics, cfg.patch_size, cfg.overlap, cfg.filtered)?;
        let val_filtered = cfg.filtered && !fold.val_from_train;
        let mut val = PatchDataset::new(&val_mosaics, cfg.patch_size, cfg.overlap, val_filtered)?;
        if val.is_empty() {
            log::warn!("validation set has no patches; validating on the training patches");
            val = PatchDataset::new(&train_mosaics, cfg.patch_size, cfg.overlap, cfg.filtered)?;
        }
        log::info!(
            "training dataset: {} patches from {} mosaics; validation: {} patches",
            train.len(),
            train_mosaics.len(),
            val.len()
        );

        let model = SegmentationModel::<B>::new(&cfg.model, &self.device)?;
        let fit_cfg = FitConfig {
            epochs: cfg.epochs,
            patience: cfg.patience,
            batch_size: cfg.batch_size,
            learning_rate: cfg.learning_rate,
            seed: cfg.seed,
        };
        fit(
            model,
            &train,
            &val,
            &cfg.train_losses,
            &cfg.val_losses,
            &fit_cfg,
            &self.device,
        )
    }

    /// Segments the held-out mosaic and writes its maps; returns the foreground share.
    fn test(
        &self,
        model: &SegmentationModel<B>,
        mosaic: &Mosaic,
        outcome: &FoldOutcome,
        sink: &mut dyn ProgressSink,
    ) -> anyhow::Result<f32> {
        let inference_model = model.valid();
        let segmenter = TiledSegmenter::new(&inference_model, self.device.clone());
        let prediction = segmenter.predict_case(
            &mosaic.image,
            self.config.ratio,
            self.config.test_tile_size,
            sink,
        )?;
        write_probability_png(&outcome.prediction, &prediction.foreground)?;
        write_probability_png(&outcome.uncertainty, &prediction.uncertainty)?;
        let labels = prediction.binary(0.5);
        let positives = labels.iter().filter(|v| **v == 1).count();
        Ok(positives as f32 / labels.len().max(1) as f32)
    }
}
