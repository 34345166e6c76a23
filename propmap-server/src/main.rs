//! propmap-server - log ingestion, link aggregation and live notification
//!
//! Endpoints:
//! - `GET /api/map`, `GET /api/link` windowed views
//! - `POST /api/ingest/log` log upload
//! - `GET /ws` ingestion notifications
//! - `GET /health`

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use propmap_common::config::{self, DATABASE_FILE};
use propmap_common::events::EventBus;
use propmap_server::{build_router, db, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "propmap_server=info,tower_http=info";

/// Command-line arguments for propmap-server
#[derive(Parser, Debug)]
#[command(name = "propmap-server")]
#[command(about = "Station activity map server")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "PROPMAP_BIND")]
    bind: Option<SocketAddr>,

    /// Directory holding propmap.db
    #[arg(short, long, env = "PROPMAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Database file (overrides the data directory)
    #[arg(long, env = "PROPMAP_DATABASE")]
    database: Option<PathBuf>,

    /// Config file
    #[arg(short, long, env = "PROPMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Advisory ingest token, logged on mismatch but never enforced
    #[arg(long, env = "PROPMAP_INGEST_TOKEN")]
    ingest_token: Option<String>,

    /// Per-client WebSocket event buffer
    #[arg(long, env = "PROPMAP_EVENT_CAPACITY")]
    event_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = config::load_toml_config(args.config.as_deref())
        .context("Failed to load config file")?;

    let default_filter = toml_config
        .logging
        .filter
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting propmap-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("PROPMAP_GIT_REV"),
        env!("PROPMAP_BUILT_AT"),
        env!("PROPMAP_PROFILE")
    );

    let server = toml_config.server;
    let db_path = match args.database {
        Some(path) => path,
        None => {
            // clap already folded PROPMAP_DATA_DIR into args.data_dir
            config::resolve_data_dir(args.data_dir.as_deref(), "PROPMAP_DATA_DIR", server.data_dir.as_deref())
                .join(DATABASE_FILE)
        }
    };
    info!("Database: {}", db_path.display());

    let pool = db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let capacity = args.event_capacity.unwrap_or(server.event_capacity);
    let bus = EventBus::new(capacity);
    info!("Event bus initialized (capacity {})", capacity);

    let ingest_token = args.ingest_token.or(server.ingest_token);
    if ingest_token.is_some() {
        info!("Ingest token configured (advisory only)");
    }

    let state = AppState::new(pool.clone(), bus)
        .with_ingest_token(ingest_token)
        .with_max_body_bytes(server.max_body_bytes);
    let app = build_router(state);

    let addr = match args.bind {
        Some(addr) => addr,
        None => server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", server.bind))?,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
