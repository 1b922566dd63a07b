//! Randomized hyperparameter search for one model family

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use training::{init_logging, run_tuning, TrainingConfig};

#[derive(Debug, Parser)]
#[command(name = "tune", version, about = "Tune one student outcome classifier family")]
struct Args {
    /// YAML parameter file
    #[arg(long, default_value = "params.yaml")]
    params: PathBuf,

    /// Training CSV (overrides paths.train_data)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Artifact directory (overrides paths.artifacts_dir)
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Family to tune (overrides tuning.model; default GradientBoosting)
    #[arg(long)]
    model: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let config = TrainingConfig::load(&args.params, true)
        .with_context(|| format!("loading {}", args.params.display()))?;
    let family = config.tuning_family(args.model.as_deref())?;
    let data = args.data.unwrap_or_else(|| config.paths.train_data.clone());
    let artifacts = args
        .artifacts
        .unwrap_or_else(|| config.paths.artifacts_dir.clone());

    info!("Tuning {} on {}", family, data.display());
    let outcome = run_tuning(&config, family, &data, &artifacts).context("tuning failed")?;
    info!(
        "Best CV score {:.4} with {:?}; validation accuracy {:.4}",
        outcome.report.best_score, outcome.report.best_params, outcome.metrics.accuracy
    );
    Ok(())
}
