//! End-to-end loading of a synthetic experiment directory and patch batching.

use burn::backend::NdArray;
use burn::tensor::backend::Backend;
use image::{GrayImage, Luma, Rgb, RgbImage};
use mosaic_dataset::{
    index_cases, leave_one_out, load_mosaic_set, MosaicDatasetError, PatchDataset,
};
use std::path::Path;

type B = NdArray<f32>;

/// Writes `mosaic{id}.png`, `DEM{id}.png` and `top{id}.png` with a dark tree
/// square at rows/cols 8..24.
fn write_case(dir: &Path, id: u32, size: u32) -> anyhow::Result<()> {
    write_labeled_case(dir, &id.to_string(), (id * 40) as u8, size)
}

fn write_labeled_case(dir: &Path, label: &str, blue: u8, size: u32) -> anyhow::Result<()> {
    let mosaic = RgbImage::from_fn(size, size, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, blue]));
    mosaic.save(dir.join(format!("mosaic{label}.png")))?;
    let dem = GrayImage::from_fn(size, size, |x, y| Luma([((x + y) * 2) as u8]));
    dem.save(dir.join(format!("DEM{label}.png")))?;
    let gt = RgbImage::from_fn(size, size, |x, y| {
        if (8..24).contains(&x) && (8..24).contains(&y) {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    gt.save(dir.join(format!("top{label}.png")))?;
    Ok(())
}

#[test]
fn loads_normalized_four_channel_mosaics() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for id in [3, 1, 2] {
        write_case(tmp.path(), id, 32)?;
    }

    let cases = index_cases(tmp.path(), "top")?;
    let ids: Vec<u32> = cases.iter().map(|c| c.case_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let set = load_mosaic_set(tmp.path(), "top")?;
    assert_eq!(set.len(), 3);
    assert_eq!(set.channels(), 4);
    let first = &set[0];
    assert_eq!(first.image.spatial_shape(), (32, 32));
    let mask = first.mask.as_ref().expect("mask loaded");
    assert_eq!(mask.foreground_count(), 16 * 16);

    let plane = first.image.plane(0);
    let mean = plane.iter().sum::<f32>() / plane.len() as f32;
    assert!(mean.abs() < 1e-4);
    Ok(())
}

#[test]
fn missing_dem_is_fatal() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_case(tmp.path(), 1, 16)?;
    write_case(tmp.path(), 2, 16)?;
    std::fs::remove_file(tmp.path().join("DEM2.png"))?;
    let err = load_mosaic_set(tmp.path(), "top").unwrap_err();
    assert!(matches!(
        err,
        MosaicDatasetError::MissingFile { case_id: 2, kind: "DEM", .. }
    ));
    Ok(())
}

#[test]
fn single_case_cannot_cross_validate() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_case(tmp.path(), 1, 16)?;
    let err = load_mosaic_set(tmp.path(), "top").unwrap_err();
    assert!(matches!(err, MosaicDatasetError::Validation(_)));
    Ok(())
}

#[test]
fn filtered_patches_and_batches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_case(tmp.path(), 1, 48)?;
    write_case(tmp.path(), 2, 48)?;
    let set = load_mosaic_set(tmp.path(), "top")?;
    let fold = &leave_one_out(set.len(), 0.1)[0];
    let train: Vec<_> = fold.train.iter().map(|i| &set[*i]).collect();

    // 16px patches, overlap 8 -> origins 0, 8, ..., 32 (5 per axis).
    let all = PatchDataset::new(&train, 16, 8, false)?;
    assert_eq!(all.len(), 25);
    // The tree square spans 8..24, so only windows starting at 0, 8 or 16 touch it.
    let filtered = PatchDataset::new(&train, 16, 8, true)?;
    assert_eq!(filtered.len(), 9);

    let device = <B as Backend>::Device::default();
    let mut iter = filtered.batches(true, Some(7));
    let mut seen = 0;
    while let Some(batch) = iter.next_batch::<B>(4, &device) {
        let [n, c, h, w] = batch.inputs.dims();
        assert_eq!((c, h, w), (4, 16, 16));
        assert_eq!(batch.targets.dims(), [n, 1, 16, 16]);
        let fg: f32 = batch.targets.sum().into_scalar();
        assert!(fg > 0.0);
        seen += n;
    }
    assert_eq!(seen, 9);
    Ok(())
}

#[test]
fn patch_larger_than_mosaic_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_case(tmp.path(), 1, 16)?;
    write_case(tmp.path(), 2, 16)?;
    let set = load_mosaic_set(tmp.path(), "top")?;
    let all: Vec<_> = set.iter().collect();
    assert!(matches!(
        PatchDataset::new(&all, 32, 0, false),
        Err(MosaicDatasetError::PatchTooLarge { .. })
    ));
    Ok(())
}

#[test]
fn zero_padded_case_names_resolve_to_matching_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_labeled_case(tmp.path(), "01", 40, 32)?;
    write_labeled_case(tmp.path(), "02", 80, 32)?;

    let cases = index_cases(tmp.path(), "top")?;
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].case_id, 1);
    assert_eq!(cases[0].label, "01");
    assert!(cases[0].mosaic.ends_with("mosaic01.png"));
    assert!(cases[0].dem.ends_with("DEM01.png"));

    let set = load_mosaic_set(tmp.path(), "top")?;
    let labels: Vec<&str> = set.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["01", "02"]);
    assert_eq!(set[1].case_id, 2);
    Ok(())
}
