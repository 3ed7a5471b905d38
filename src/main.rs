//! Nextcloud Dev Tools API
//!
//! Serves health, upstream status, host resource and developer tool
//! endpoints for a Nextcloud instance.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use ncdev::{api, telemetry, AppConfig};

#[derive(Parser)]
#[command(name = "nextcloud-devtools-api")]
#[command(about = "HTTP facade for Nextcloud health, status and developer tooling")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "NCDEV_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
        config.validate()?;
    }

    // Initialize logging
    let log_sink = telemetry::init(&config.logging, cli.verbose)?;
    info!(
        log_file = %log_sink.path().display(),
        executor = ?config.executor.mode,
        upstream = %config.nextcloud.base_url,
        "Starting Nextcloud dev tools API..."
    );

    let result = api::start_api_server(&config).await;
    if let Err(e) = &result {
        error!("Server error: {:#}", e);
    }

    log_sink.shutdown()?;
    result
}
