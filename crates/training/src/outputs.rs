//! Files written back into the experiment directory.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use data_contracts::Raster;
use image::GrayImage;

use crate::cross_validation::FoldOutcome;

pub const SUMMARY_FILE: &str = "cv_summary.json";

/// `label` is the case id as spelled in the input file names.
pub fn prediction_path(dir: &Path, ratio: usize, label: &str) -> PathBuf {
    dir.join(format!("pred.d{ratio}_trees{label}.png"))
}

pub fn uncertainty_path(dir: &Path, ratio: usize, label: &str) -> PathBuf {
    dir.join(format!("unc.d{ratio}_trees{label}.png"))
}

/// Single-channel `[0, 1]` map as 8-bit grayscale (`value * 255`).
pub fn write_probability_png(path: &Path, map: &Raster) -> anyhow::Result<()> {
    if map.channels != 1 {
        bail!("expected a single-channel map, got {} channels", map.channels);
    }
    let bytes: Vec<u8> = map
        .data
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
        .collect();
    let img = GrayImage::from_raw(map.width as u32, map.height as u32, bytes)
        .context("map buffer does not match its shape")?;
    img.save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn write_summary(dir: &Path, outcomes: &[FoldOutcome]) -> anyhow::Result<PathBuf> {
    let path = dir.join(SUMMARY_FILE);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), outcomes)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_carry_ratio_and_case() {
        let dir = Path::new("/exp");
        assert_eq!(
            prediction_path(dir, 10, "3"),
            PathBuf::from("/exp/pred.d10_trees3.png")
        );
        assert_eq!(
            uncertainty_path(dir, 2, "14"),
            PathBuf::from("/exp/unc.d2_trees14.png")
        );
        assert_eq!(
            prediction_path(dir, 4, "01"),
            PathBuf::from("/exp/pred.d4_trees01.png")
        );
    }

    #[test]
    fn probability_png_round_trips_extremes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.png");
        let map = Raster::new(1, 1, 3, vec![0.0, 1.0, 1.5]).unwrap();
        write_probability_png(&path, &map).unwrap();
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.as_raw(), &vec![0u8, 255, 255]);
    }
}
