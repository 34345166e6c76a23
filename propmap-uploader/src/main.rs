//! propmap-uploader - deliver station logs from watched directories
//!
//! Scans the configured log directories on an interval and POSTs every new
//! or changed file to the propmap server. Runs until Ctrl-C/SIGTERM, or for
//! a single pass with `--once`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use propmap_common::config::{self, UPLOADER_STATE_FILE};
use propmap_uploader::scanner::LogScanner;
use propmap_uploader::state::SendStateStore;
use propmap_uploader::submitter::HttpSubmitter;
use propmap_uploader::Watcher;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "propmap_uploader=info";

/// Command-line arguments for propmap-uploader
#[derive(Parser, Debug)]
#[command(name = "propmap-uploader")]
#[command(about = "Uploads station logs to a propmap server")]
#[command(version)]
struct Args {
    /// Base URL of the propmap server
    #[arg(short, long, env = "PROPMAP_SERVER_URL")]
    server_url: Option<String>,

    /// Directory to watch (repeat for each; normally two)
    #[arg(short, long = "watch-dir", env = "PROPMAP_WATCH_DIRS", value_delimiter = ',')]
    watch_dirs: Vec<PathBuf>,

    /// File extensions to submit
    #[arg(short, long, env = "PROPMAP_EXTENSIONS", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Seconds between scans
    #[arg(short, long, env = "PROPMAP_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Directory holding uploader_state.json
    #[arg(short, long, env = "PROPMAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Send-state file (overrides the data directory)
    #[arg(long, env = "PROPMAP_UPLOADER_STATE")]
    state_file: Option<PathBuf>,

    /// Config file
    #[arg(short, long, env = "PROPMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Bearer token sent with uploads
    #[arg(long, env = "PROPMAP_INGEST_TOKEN")]
    token: Option<String>,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,
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

    info!("Starting propmap-uploader v{}", env!("CARGO_PKG_VERSION"));

    let settings = toml_config.uploader;
    let watch_dirs = if args.watch_dirs.is_empty() {
        settings.watch_dirs
    } else {
        args.watch_dirs
    };
    if watch_dirs.is_empty() {
        bail!("No watch directories configured (use --watch-dir or [uploader].watch_dirs)");
    }
    for dir in &watch_dirs {
        info!("Watching {}", dir.display());
    }

    let extensions = if args.extensions.is_empty() {
        settings.extensions
    } else {
        args.extensions
    };

    let state_path = match args.state_file {
        Some(path) => path,
        None => config::resolve_data_dir(
            args.data_dir.as_deref(),
            "PROPMAP_DATA_DIR",
            settings.data_dir.as_deref(),
        )
        .join(UPLOADER_STATE_FILE),
    };
    let state = SendStateStore::load(&state_path)
        .await
        .context("Failed to load send-state")?;
    info!(
        "Send-state: {} ({} files delivered)",
        state_path.display(),
        state.len()
    );

    let server_url = args.server_url.unwrap_or(settings.server_url);
    let submitter = HttpSubmitter::new(
        &server_url,
        args.token.or(settings.token),
        Duration::from_secs(settings.request_timeout_secs),
    )
    .context("Failed to create HTTP client")?;
    info!("Submitting to {}", submitter.endpoint());

    let scanner = LogScanner::new(watch_dirs, extensions, args.recursive || settings.recursive);
    let mut watcher = Watcher::new(scanner, state, submitter);
    let cancel = CancellationToken::new();

    if args.once {
        let report = watcher.run_cycle(&cancel).await?;
        info!(
            "Scanned {}: {} sent, {} duplicates, {} failed, {} unchanged",
            report.scanned, report.sent, report.duplicates, report.failed, report.unchanged
        );
        return Ok(());
    }

    let stopper = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.cancel();
    });

    let interval = Duration::from_secs(args.interval_secs.unwrap_or(settings.interval_secs).max(1));
    watcher.run(interval, cancel).await?;
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
            info!("Received Ctrl+C, stopping after current file");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping after current file");
        },
    }
}
