// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Replicated catalog replica entry point

use clap::Parser;
use rdc_catalog::CatalogRegistry;
use rdc_coordination::MemoryStore;
use rdc_replication::ReplicatedDatabase;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "conf/replica.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting replicated catalog replica");
    let version = rdc_common::version::VersionInfo::new();
    info!("Version: {}", version.version);
    info!("Git Commit: {}", version.git_commit);
    info!("Build Time: {}", version.build_time);

    // Load configuration
    let config = load_config(&args.config)?;
    info!("Database: {}", config.database);
    info!("Store path: {}", config.store_path);
    info!("Replica: {}|{}", config.shard, config.replica);
    info!("Meta directory: {:?}", config.meta_dir);

    // Validate configuration
    config.validate()?;

    // Attach the local catalog registry
    let registry = CatalogRegistry::new(config.meta_dir.clone());

    // Standalone mode runs against the in-process store; a deployment
    // against an external coordination service plugs its client in here.
    let store = Arc::new(MemoryStore::new());

    let database = ReplicatedDatabase::open(config, store, registry)?;
    database.startup()?;
    info!("Replica registered as {}", database.replica_name());
    info!("Replicated catalog is ready");

    // Wait for shutdown signal
    wait_for_shutdown().await;

    info!("Shutting down");
    database.shutdown();
    info!("Shutdown complete");

    Ok(())
}

/// Initialize logging
fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Load configuration from file
fn load_config(config_path: &PathBuf) -> anyhow::Result<rdc_common::ReplicaConfig> {
    if config_path.exists() {
        rdc_common::ReplicaConfig::from_file(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    } else {
        warn!("Config file not found: {:?}, using defaults", config_path);
        Ok(rdc_common::ReplicaConfig::default())
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
