use std::fs;
use std::path::PathBuf;

use clap::Parser;
use models::LossKind;
use training::{CliArgs, ExperimentConfig, CONFIG_ENV};

#[test]
fn loads_nested_model_and_loss_sections() {
    std::env::set_var("TREESEG_CONFIG_TEST_ROOT", "/srv/annotations");
    let raw = r#"
mosaics_directory = "${TREESEG_CONFIG_TEST_ROOT}/site"
epochs = 3
ratio = 4
test_tile_size = 128

[model]
conv_filters = [8, 16]
pooling = true

[[train_losses]]
name = "xentr"
weight = 1.0
kind = "binary_cross_entropy"

[[train_losses]]
name = "dice"
weight = 0.5
kind = "soft_dice"
"#;
    let cfg = ExperimentConfig::from_toml(raw).expect("parse config");
    assert_eq!(cfg.mosaics_directory, PathBuf::from("/srv/annotations/site"));
    assert_eq!(cfg.epochs, 3);
    assert_eq!(cfg.ratio, 4);
    assert_eq!(cfg.test_tile_size, Some(128));
    assert_eq!(cfg.model.conv_filters, vec![8, 16]);
    assert!(cfg.model.pooling);
    assert_eq!(cfg.model.n_inputs, 4);
    let kinds: Vec<LossKind> = cfg.train_losses.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![LossKind::BinaryCrossEntropy, LossKind::SoftDice]);
    assert_eq!(cfg.val_losses.iter().count(), 1);
    cfg.validate().expect("valid");
}

#[test]
fn explicit_config_must_exist_and_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "epochs = \"many\"").unwrap();
    let err = ExperimentConfig::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"), "{err:#}");

    let missing = dir.path().join("absent.toml");
    let err = ExperimentConfig::load(Some(&missing)).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"), "{err:#}");

    let good = dir.path().join("good.toml");
    fs::write(&good, "epochs = 5\n").unwrap();
    assert_eq!(ExperimentConfig::load(Some(&good)).unwrap().epochs, 5);
}

#[test]
fn unreadable_environment_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "epochs = \"many\"").unwrap();
    std::env::set_var(CONFIG_ENV, &path);
    let loaded = ExperimentConfig::load(None);
    std::env::remove_var(CONFIG_ENV);
    assert_eq!(loaded.unwrap(), ExperimentConfig::default());
}

#[test]
fn cli_flags_override_file_values() {
    let mut cfg = ExperimentConfig::from_toml("epochs = 3\npatience = 9\n").unwrap();
    let args = CliArgs::try_parse_from([
        "cross_validate",
        "-d",
        "/data/mosaics",
        "-e",
        "7",
        "-B",
        "4",
        "-t",
        "48",
        "-l",
        "gt",
        "--ratio",
        "2",
        "--dropout",
        "0.2",
        "--no-filter",
    ])
    .unwrap();
    args.apply(&mut cfg);
    assert_eq!(cfg.mosaics_directory, PathBuf::from("/data/mosaics"));
    assert_eq!(cfg.epochs, 7);
    assert_eq!(cfg.patience, 9);
    assert_eq!(cfg.batch_size, 4);
    assert_eq!(cfg.patch_size, 48);
    assert_eq!(cfg.labels_tag, "gt");
    assert_eq!(cfg.ratio, 2);
    assert_eq!(cfg.model.dropout, 0.2);
    assert!(!cfg.filtered);
}

#[test]
fn invalid_geometry_is_rejected() {
    let cfg = ExperimentConfig {
        patch_size: 32,
        overlap: 32,
        ..ExperimentConfig::default()
    };
    assert!(cfg.validate().is_err());
    let cfg = ExperimentConfig {
        ratio: 0,
        ..ExperimentConfig::default()
    };
    assert!(cfg.validate().is_err());
}
