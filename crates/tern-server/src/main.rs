use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use tern_observe::logger_init;

mod app;
mod config;

use app::App;
use config::ServerConfig;

#[derive(Parser)]
#[command(name = "tern-server")]
#[command(version)]
#[command(about = "CI job orchestrator daemon")]
struct Cli {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1) Config + logger
    let cfg = ServerConfig::load(cli.config.as_deref())?;
    logger_init(&cfg.logger)?;
    info!(config = ?cli.config, "logger initialized");

    // 2) Executor, service and transports
    let app = App::build(cfg).await?;

    // 3) Keep running until Ctrl+C
    info!("press Ctrl+C to stop");
    app.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C, shutting down");
        }
    })
    .await
}
