//! Student Risk API - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "student-risk-api", version, about = "Student outcome prediction API")]
struct Args {
    /// Optional YAML server configuration
    #[arg(long, default_value = "server.yaml")]
    config: PathBuf,

    /// Listen address (overrides server.bind_addr)
    #[arg(long)]
    bind: Option<String>,

    /// Artifact directory (overrides server.artifacts_dir)
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(artifacts) = args.artifacts {
        config.artifacts_dir = artifacts;
    }
    config.log_json |= args.log_json;

    init_logging(config.log_json);
    info!("=== Student Risk API v{} ===", env!("CARGO_PKG_VERSION"));

    run_server(config).await.context("server failed")?;
    Ok(())
}
