//! Shroud - Handshake-framed tunnel relay and API facade
//!
//! This is the main entry point for the Shroud application.

use anyhow::{Context, Result};
use clap::Parser;
use shroud::config::load_config;
use shroud::facade::FacadeServer;
use shroud::tunnel::{RelayServer, TunnelConnector};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shroud - Tunnel relay with SOCKS chaining and a credential-substituting facade
#[derive(Parser, Debug)]
#[command(name = "shroud")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Shroud v{}", shroud::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel(1);

    let mut servers = JoinSet::new();

    if let Some(relay_config) = &config.relay {
        let relay = RelayServer::bind(relay_config)
            .await
            .context("Failed to start relay")?;
        servers.spawn(relay.run(shutdown_tx.subscribe()));
    }

    if let Some(facade_config) = &config.facade {
        let connector = TunnelConnector::from_config(&config.connector)
            .context("Failed to build tunnel connector")?;
        info!("Facade connects through relay at {}", connector.relay_addr());

        let facade = FacadeServer::bind(facade_config, connector)
            .await
            .context("Failed to start facade")?;
        servers.spawn(facade.run(shutdown_tx.subscribe()));
    }

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!("Failed to listen for shutdown signals: {:#}", e);
        }
        let _ = shutdown_tx_clone.send(true);
    });

    while let Some(result) = servers.join_next().await {
        match result {
            Ok(Err(e)) => error!("Server error: {:#}", e),
            Err(e) => error!("Server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    info!("Shroud stopped");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
