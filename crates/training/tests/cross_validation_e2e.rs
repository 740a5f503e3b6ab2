//! Three 64x64 mosaics through the whole leave-one-out pipeline.

use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use image::{GrayImage, Luma, Rgb, RgbImage};
use inference::{ArtifactKey, ArtifactStore, NullProgress, RecordingProgress, TiledSegmenter};
use models::SegmentationModelConfig;
use mosaic_dataset::load_mosaic_set;
use training::{write_summary, CrossValidator, ExperimentConfig, FoldState, SUMMARY_FILE};

type B = Autodiff<NdArray<f32>>;

fn write_case(dir: &Path, id: u32, size: u32) -> anyhow::Result<()> {
    let mosaic = RgbImage::from_fn(size, size, |x, y| {
        let tree = (8..24).contains(&x) && (8..24).contains(&y);
        let g = if tree { 200 } else { (y * 2) as u8 };
        Rgb([(x * 3) as u8, g, (id * 40) as u8])
    });
    mosaic.save(dir.join(format!("mosaic{id}.png")))?;
    let dem = GrayImage::from_fn(size, size, |x, y| Luma([((x + y) * 2) as u8]));
    dem.save(dir.join(format!("DEM{id}.png")))?;
    let gt = RgbImage::from_fn(size, size, |x, y| {
        if (8..24).contains(&x) && (8..24).contains(&y) {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    gt.save(dir.join(format!("top{id}.png")))?;
    Ok(())
}

fn experiment(dir: &Path) -> ExperimentConfig {
    ExperimentConfig {
        mosaics_directory: dir.to_path_buf(),
        net_name: "unet".to_string(),
        ratio: 2,
        epochs: 2,
        patience: 1,
        batch_size: 4,
        patch_size: 32,
        overlap: 16,
        seed: Some(11),
        model: SegmentationModelConfig {
            conv_filters: vec![8, 16],
            n_inputs: 4,
            n_outputs: 2,
            ..SegmentationModelConfig::default()
        },
        ..ExperimentConfig::default()
    }
}

#[test]
fn every_fold_trains_once_then_reuses_its_artifact() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for id in 1..=3 {
        write_case(tmp.path(), id, 64)?;
    }
    let cfg = experiment(tmp.path());
    cfg.validate()?;
    let mosaics = load_mosaic_set(tmp.path(), &cfg.labels_tag)?;

    let validator = CrossValidator::<B>::new(&cfg, &mosaics, Default::default());
    let mut progress = RecordingProgress::default();
    let outcomes = validator.run(&mut progress)?;

    assert_eq!(outcomes.len(), 3);
    let mut tested: Vec<u32> = outcomes.iter().map(|o| o.case_id).collect();
    tested.sort();
    assert_eq!(tested, vec![1, 2, 3]);
    for o in &outcomes {
        assert!(o.trained);
        assert_eq!(
            o.states,
            vec![
                FoldState::Init,
                FoldState::ModelLookup,
                FoldState::Train,
                FoldState::Test,
                FoldState::Done
            ]
        );
        let key = ArtifactKey::new("unet", 2, o.case_id);
        assert_eq!(o.artifact, tmp.path().join(key.file_name()));
        assert!(o.artifact.is_file());
        assert!((0.0..=1.0).contains(&o.foreground_fraction));

        assert_eq!(o.label, o.case_id.to_string());

        // The written maps match a fresh prediction from the stored weights.
        let stored = ArtifactStore::new(tmp.path())
            .try_load::<NdArray<f32>>(&key, &cfg.model, &Default::default())
            .expect("stored artifact loads");
        let mosaic = mosaics
            .iter()
            .find(|m| m.case_id == o.case_id)
            .expect("tested mosaic");
        let expected = TiledSegmenter::new(&stored, Default::default()).predict_case(
            &mosaic.image,
            2,
            None,
            &mut NullProgress,
        )?;
        let to_bytes = |data: &[f32]| -> Vec<u8> {
            data.iter().map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8).collect()
        };

        let pred = image::open(&o.prediction)?.to_luma8();
        assert_eq!(pred.dimensions(), (64, 64));
        assert_eq!(pred.as_raw(), &to_bytes(&expected.foreground.data[..]));
        let unc = image::open(&o.uncertainty)?.to_luma8();
        assert_eq!(unc.dimensions(), (64, 64));
        assert_eq!(unc.as_raw(), &to_bytes(&expected.uncertainty.data[..]));

        let positives = expected.binary(0.5).iter().filter(|v| **v == 1).count();
        assert_eq!(o.foreground_fraction, positives as f32 / (64 * 64) as f32);
    }
    // Whole-mosaic inference: one tile per fold.
    assert_eq!(progress.tiles.len(), 3);
    assert!(progress.tiles.iter().all(|p| p.n_tiles == 1));

    let summary = write_summary(tmp.path(), &outcomes)?;
    assert_eq!(summary, tmp.path().join(SUMMARY_FILE));
    let parsed: serde_json::Value = serde_json::from_reader(std::fs::File::open(&summary)?)?;
    assert_eq!(parsed.as_array().map(|a| a.len()), Some(3));

    let rerun = validator.run(&mut NullProgress)?;
    for o in &rerun {
        assert!(!o.trained);
        assert_eq!(o.best_val_loss, None);
        assert_eq!(
            o.states,
            vec![
                FoldState::Init,
                FoldState::ModelLookup,
                FoldState::Test,
                FoldState::Done
            ]
        );
    }
    Ok(())
}

#[test]
fn tiled_testing_reports_each_tile() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for id in 1..=2 {
        write_case(tmp.path(), id, 64)?;
    }
    let cfg = ExperimentConfig {
        epochs: 1,
        test_tile_size: Some(8),
        val_split: 0.0,
        ..experiment(tmp.path())
    };
    let mosaics = load_mosaic_set(tmp.path(), &cfg.labels_tag)?;
    let validator = CrossValidator::<B>::new(&cfg, &mosaics, Default::default());
    let folds = validator.folds();
    assert!(folds.iter().all(|f| f.val_from_train));

    let mut progress = RecordingProgress::default();
    let outcome = validator.run_fold(&folds[0], &mut progress)?;
    assert_eq!(outcome.case_id, 1);
    // Ratio 2 gives a 32x32 input; stride 8 -> [0, 8, 16, 32] on each axis.
    assert_eq!(progress.tiles.len(), 9);
    assert_eq!(progress.tiles.last().map(|p| p.tile_index), Some(9));
    Ok(())
}

#[test]
fn channel_mismatch_aborts_before_any_fold() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for id in 1..=2 {
        write_case(tmp.path(), id, 32)?;
    }
    let mut cfg = experiment(tmp.path());
    cfg.model.n_inputs = 3;
    let mosaics = load_mosaic_set(tmp.path(), &cfg.labels_tag)?;
    let validator = CrossValidator::<B>::new(&cfg, &mosaics, Default::default());
    assert!(validator.run(&mut NullProgress).is_err());
    assert!(!tmp.path().join("unet.d2.mosaic1.bin").exists());
    Ok(())
}
