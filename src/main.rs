//! HabitQuest Daemon
//!
//! Serves the habit tracker API and live snapshot stream.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (sled store under the data directory)
//! habitquest
//!
//! # Start with custom config
//! habitquest --config /path/to/config.toml
//!
//! # Custom port and storage directory
//! habitquest --http-port 8096 --storage-dir /data/habitquest
//!
//! # Throwaway in-memory store
//! habitquest --memory
//! ```

use clap::Parser;
use habitquest::services::events::spawn_logging_listener;
use habitquest::store::sled_store::SledStoreConfig;
use habitquest::{
    Backend, Config, DocumentStore, HttpServer, LiveView, LiveViewConfig, MemoryStore, Roster,
    Services, SessionStore, SledStore, SystemClock,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "habitquest")]
#[command(about = "Shared habit tracker with levels, streaks and a live feed")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "HABITQUEST_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "HABITQUEST_HTTP_PORT")]
    http_port: Option<u16>,

    /// Keep all data in memory (lost on exit)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("habitquest=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
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
    if args.memory {
        config.backend = Backend::Memory;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        backend = ?config.backend,
        "Starting habitquest"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if args.config.is_none() && !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    // Open the document store
    let store: Arc<dyn DocumentStore> = match config.backend {
        Backend::Sled => Arc::new(
            SledStore::open(SledStoreConfig {
                db_path: config.documents_db_path(),
                namespace: config.namespace.clone(),
                cache_size: config.cache_size,
            })
            .await?,
        ),
        Backend::Memory => {
            warn!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let roster = Roster::new(config.roster.clone())?;
    let services = Arc::new(Services::new(store.clone(), Arc::new(SystemClock), roster));
    let listener_handle = spawn_logging_listener(services.events.clone());

    let live = Arc::new(LiveView::start(
        &store,
        LiveViewConfig {
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
            ..Default::default()
        },
    ));

    let sessions = Arc::new(SessionStore::new(services.clone(), config.session_ttl_secs));

    // Sweep expired sessions
    let cleanup_sessions = sessions.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_sessions.cleanup();
        }
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(
        services.clone(),
        sessions.clone(),
        live.clone(),
        http_addr,
    ));

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  GET  /health               - Health check");
    info!("  GET  /roster               - Members");
    info!("  POST /login                - Open a session");
    info!("  GET  /dashboard            - Level and partner summary");
    info!("  POST /habits/{{id}}/toggle   - Complete or undo a habit");
    info!("  PUT  /logs/today           - Save today's log");
    info!("  WS   /live                 - Live snapshots");

    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    // Run HTTP server until interrupted
    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    cleanup_handle.abort();
    listener_handle.abort();

    if let Err(e) = store.flush().await {
        error!(error = %e, "Failed to flush document store");
    }

    for collection in habitquest::Collection::ALL {
        info!(
            collection = %collection,
            documents = live.snapshot(collection).await.len(),
            "Final collection size"
        );
    }

    Ok(())
}
