//! Depthcast Server
//!
//! Run with: cargo run -- --config depthcast.toml
//!
//! # Configuration
//!
//! Settings come from the config file (see `--print-config`), then
//! environment variables, then command-line flags:
//! - `DEPTHCAST_HOST`: Host to bind to (default: 0.0.0.0)
//! - `DEPTHCAST_PORT`: Port to listen on (default: 9002)
//! - `DEPTHCAST_LOG_LEVEL`: Log level (default: info)
//! - `DEPTHCAST_LOG_FORMAT`: pretty or json (default: pretty)
//! - `RUST_LOG`: Full filter directive, overrides the log level

use anyhow::Context;
use clap::Parser;
use depthcast::config::{generate_default_config, Config, DeviceBackend, LogFormat};
use depthcast::device::{DeviceProxy, SyntheticDevice};
use depthcast::server::BroadcastServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "depthcast", version, about = "Broadcast depth and video frames over WebSocket")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Capture rate in frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = load_config(&cli)?;
    init_tracing(&config);

    tracing::info!("Starting Depthcast v{}", env!("CARGO_PKG_VERSION"));

    let device = create_device(&config)?;
    let server = Arc::new(BroadcastServer::new(config.server.clone(), device));

    tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            shutdown_signal().await;
            server.stop();
        }
    });

    server
        .run()
        .await
        .with_context(|| format!("Server on {} failed", config.server.addr()))?;

    tracing::info!("Depthcast shutdown complete");
    Ok(())
}

/// Config file (explicit or default location), then env, then CLI flags
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::load_default()?,
    };

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(width) = cli.width {
        config.device.width = width;
    }
    if let Some(height) = cli.height {
        config.device.height = height;
    }
    if let Some(fps) = cli.fps {
        config.device.fps = fps;
    }

    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("depthcast={},tower_http=info", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn create_device(config: &Config) -> anyhow::Result<Arc<dyn DeviceProxy>> {
    match config.device.backend {
        DeviceBackend::Synthetic => {
            let mode = config.device.synthetic_config();
            let device = SyntheticDevice::new(mode).context("Failed to open synthetic device")?;
            tracing::info!(
                width = mode.width,
                height = mode.height,
                fps = mode.fps,
                "Using synthetic device"
            );
            Ok(Arc::new(device))
        }
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
