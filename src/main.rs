//! Accord Daemon
//!
//! Serves the proposal negotiation API over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! accord
//!
//! # Start with custom config
//! accord --config /path/to/config.toml
//!
//! # Start with custom HTTP port and storage directory
//! accord --http-port 8096 --storage-dir /data/accord
//!
//! # Throwaway in-memory database
//! accord --in-memory
//! ```
//!
//! See `accord::http` for the routes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use accord::services::spawn_logging_listener;
use accord::{AccordDb, Config, HttpServer, Services};
use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "accord")]
#[command(about = "Proposal negotiation service for collaborative projects")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "ACCORD_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory (database and config file)
    #[arg(long, env = "ACCORD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "ACCORD_HTTP_PORT")]
    http_port: Option<u16>,

    /// Use an in-memory database (state is lost on exit)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("accord=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        in_memory = args.in_memory,
        "Starting accord"
    );

    let db = if args.in_memory {
        AccordDb::open_in_memory()?
    } else {
        // Ensure storage directory exists
        tokio::fs::create_dir_all(&config.storage_dir)
            .await
            .with_context(|| format!("Failed to create {}", config.storage_dir.display()))?;

        // Save default config if it doesn't exist
        let config_path = config.config_path();
        if !config_path.exists() {
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Created default config");
        }

        AccordDb::open(&config)?
    };
    let db = Arc::new(db);

    let services = Arc::new(Services::new(db.clone(), config.retry_policy()));
    let _listener = spawn_logging_listener(services.events.clone());

    let bind_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address))?;

    let http_server = Arc::new(
        HttpServer::new(services, bind_addr).with_max_body_bytes(config.max_body_bytes),
    );

    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    // Print stats before exit
    if let Ok(stats) = db.stats() {
        info!(
            projects = stats.project_count,
            pending = stats.pending_proposals,
            accepted = stats.accepted_proposals,
            rejected = stats.rejected_proposals,
            "Final negotiation stats"
        );
    }

    Ok(())
}
