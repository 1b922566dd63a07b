//! Train every model family and keep the most accurate pipeline

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use training::{init_logging, run_training, TrainingConfig};

#[derive(Debug, Parser)]
#[command(name = "train", version, about = "Train and select a student outcome classifier")]
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

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!("=== Student Risk Training v{} ===", env!("CARGO_PKG_VERSION"));
    let config = TrainingConfig::load(&args.params, false)
        .with_context(|| format!("loading {}", args.params.display()))?;
    let data = args.data.unwrap_or_else(|| config.paths.train_data.clone());
    let artifacts = args
        .artifacts
        .unwrap_or_else(|| config.paths.artifacts_dir.clone());

    let selection = run_training(&config, &data, &artifacts).context("training failed")?;
    info!(
        "Run {} finished: best model {} (accuracy {:.4})",
        selection.summary.run_id, selection.summary.best_model, selection.summary.best_accuracy
    );
    Ok(())
}
