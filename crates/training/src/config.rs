//! Experiment configuration: TOML file, environment override, CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use models::{LossTerms, SegmentationModelConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_NAME: &str = "treeseg.toml";
pub const CONFIG_ENV: &str = "TREESEG_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory holding `mosaic{id}`, `DEM{id}` and the tagged ground truth.
    pub mosaics_directory: PathBuf,
    /// Where model artifacts live; defaults to `mosaics_directory`.
    pub artifacts_directory: Option<PathBuf>,
    pub labels_tag: String,
    pub net_name: String,
    /// Integer downsampling factor applied to each held-out mosaic.
    pub ratio: usize,
    pub epochs: usize,
    pub patience: usize,
    pub batch_size: usize,
    pub patch_size: usize,
    pub overlap: usize,
    pub val_split: f64,
    pub learning_rate: f64,
    /// Drop training patches without any tree pixel.
    pub filtered: bool,
    /// Tile stride at test time; `None` segments the (downsampled) mosaic whole.
    pub test_tile_size: Option<usize>,
    pub seed: Option<u64>,
    pub model: SegmentationModelConfig,
    pub train_losses: LossTerms,
    pub val_losses: LossTerms,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            mosaics_directory: PathBuf::from("."),
            artifacts_directory: None,
            labels_tag: "top".to_string(),
            net_name: "tree-detection.unet".to_string(),
            ratio: 10,
            epochs: 20,
            patience: 5,
            batch_size: 32,
            patch_size: 64,
            overlap: 32,
            val_split: 0.1,
            learning_rate: 1e-3,
            filtered: true,
            test_tile_size: None,
            seed: None,
            model: SegmentationModelConfig::default(),
            train_losses: LossTerms::default(),
            val_losses: LossTerms::default(),
        }
    }
}

impl ExperimentConfig {
    /// `explicit`, else `$TREESEG_CONFIG`, else `treeseg.toml`.
    ///
    /// An explicit path must exist and parse. The implicit locations fall back
    /// to defaults when absent or unreadable.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME));
        Ok(Self::load_or_default(&path))
    }

    fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::from_path(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("ignoring config {}: {err:#}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: ExperimentConfig = toml::from_str(raw)?;
        cfg.mosaics_directory = expand_path(&cfg.mosaics_directory.to_string_lossy());
        cfg.artifacts_directory = cfg
            .artifacts_directory
            .map(|p| expand_path(&p.to_string_lossy()));
        Ok(cfg)
    }

    pub fn artifacts_directory(&self) -> &Path {
        self.artifacts_directory
            .as_deref()
            .unwrap_or(&self.mosaics_directory)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ratio == 0 {
            bail!("ratio must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.patch_size == 0 || self.overlap >= self.patch_size {
            bail!(
                "overlap ({}) must be smaller than patch_size ({})",
                self.overlap,
                self.patch_size
            );
        }
        if !(0.0..1.0).contains(&self.val_split) {
            bail!("val_split must be in [0, 1), got {}", self.val_split);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.test_tile_size == Some(0) {
            bail!("test_tile_size must be positive");
        }
        if self.net_name.trim().is_empty() {
            bail!("net_name is empty");
        }
        self.model.validate().context("model")?;
        self.train_losses.validate().context("train_losses")?;
        self.val_losses.validate().context("val_losses")?;
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(
    name = "cross_validate",
    about = "Leave-one-mosaic-out training and testing of the tree segmentation network"
)]
pub struct CliArgs {
    /// TOML experiment file (overrides $TREESEG_CONFIG and ./treeseg.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory containing the mosaics.
    #[arg(short = 'd', long)]
    pub mosaics_directory: Option<PathBuf>,
    /// Number of epochs.
    #[arg(short = 'e', long)]
    pub epochs: Option<usize>,
    /// Patience for early stopping.
    #[arg(short = 'p', long)]
    pub patience: Option<usize>,
    /// Number of samples per batch.
    #[arg(short = 'B', long)]
    pub batch_size: Option<usize>,
    /// Training patch size.
    #[arg(short = 't', long)]
    pub patch_size: Option<usize>,
    /// Tag found in every ground-truth file name.
    #[arg(short = 'l', long)]
    pub labels_tag: Option<String>,
    /// Downsampling ratio for testing.
    #[arg(long)]
    pub ratio: Option<usize>,
    #[arg(long)]
    pub net_name: Option<String>,
    /// Overlap between training patches.
    #[arg(long)]
    pub overlap: Option<usize>,
    /// Fraction of the training pool kept for validation.
    #[arg(long)]
    pub val_split: Option<f64>,
    #[arg(long)]
    pub learning_rate: Option<f64>,
    #[arg(long)]
    pub dropout: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Tile stride at test time (whole-mosaic inference when omitted).
    #[arg(long)]
    pub test_tile_size: Option<usize>,
    /// Keep patches without tree pixels.
    #[arg(long)]
    pub no_filter: bool,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

impl CliArgs {
    /// Flags given on the command line win over the file.
    pub fn apply(&self, cfg: &mut ExperimentConfig) {
        if let Some(dir) = &self.mosaics_directory {
            cfg.mosaics_directory = dir.clone();
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.patience {
            cfg.patience = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.patch_size {
            cfg.patch_size = v;
        }
        if let Some(tag) = &self.labels_tag {
            cfg.labels_tag = tag.clone();
        }
        if let Some(v) = self.ratio {
            cfg.ratio = v;
        }
        if let Some(name) = &self.net_name {
            cfg.net_name = name.clone();
        }
        if let Some(v) = self.overlap {
            cfg.overlap = v;
        }
        if let Some(v) = self.val_split {
            cfg.val_split = v;
        }
        if let Some(v) = self.learning_rate {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.dropout {
            cfg.model.dropout = v;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.test_tile_size.is_some() {
            cfg.test_tile_size = self.test_tile_size;
        }
        if self.no_filter {
            cfg.filtered = false;
        }
    }
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            bail!(
                "backend-wgpu feature not enabled; \
                 rebuild with --features backend-wgpu or choose ndarray backend"
            )
        }
        (BackendKind::NdArray, true) => {
            log::warn!(
                "built with backend-wgpu; the WGPU backend is used despite --backend nd-array"
            );
        }
        _ => {}
    }
    Ok(())
}

/// `~` prefix and `${VAR}` references are expanded; unknown variables stay verbatim.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(rest) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{rest}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find('}') {
            Some(end) => {
                let key = &tail[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_references_expand() {
        std::env::set_var("TREESEG_TEST_ROOT", "/data/trees");
        assert_eq!(
            expand_path("${TREESEG_TEST_ROOT}/site1"),
            PathBuf::from("/data/trees/site1")
        );
        assert_eq!(expand_env("${TREESEG_UNSET_VAR}/x"), "${TREESEG_UNSET_VAR}/x");
        assert_eq!(expand_env("a${b"), "a${b");
    }

    #[test]
    fn defaults_validate() {
        ExperimentConfig::default().validate().unwrap();
    }
}
