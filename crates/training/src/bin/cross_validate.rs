use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use inference::{format_duration, LogProgress};
use mosaic_dataset::load_mosaic_set;
use training::{
    validate_backend_choice, write_summary, ADBackend, CliArgs, CrossValidator, ExperimentConfig,
};

fn main() -> anyhow::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    let args = CliArgs::parse();
    validate_backend_choice(args.backend)?;
    let mut cfg = ExperimentConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let started = std::time::Instant::now();
    log::info!("<Tree detection pipeline> {}", cfg.net_name);
    let mosaics = load_mosaic_set(&cfg.mosaics_directory, &cfg.labels_tag).with_context(|| {
        format!("loading mosaics from {}", cfg.mosaics_directory.display())
    })?;

    let device = Default::default();
    let validator = CrossValidator::<ADBackend>::new(&cfg, &mosaics, device);
    let outcomes = validator.run(&mut LogProgress)?;
    let summary = write_summary(&cfg.mosaics_directory, &outcomes)?;

    for o in &outcomes {
        println!(
            "mosaic {:>4}: {} foreground {:.3} -> {}",
            o.label,
            if o.trained { "trained" } else { "loaded " },
            o.foreground_fraction,
            o.prediction.display()
        );
    }
    println!(
        "{} folds in {}; summary at {}",
        outcomes.len(),
        format_duration(started.elapsed()),
        summary.display()
    );
    Ok(())
}
