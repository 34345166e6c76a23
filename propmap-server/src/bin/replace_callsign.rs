//! replace-callsign - rename or merge a station across the propmap database
//!
//! Usage: replace-callsign OLD NEW [--yes]
//!
//! Rewrites every station, presence, contact and ingested-log row that
//! mentions OLD so it names NEW instead. If NEW already exists the two
//! stations are merged. Runs in one transaction.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use propmap_common::config::{self, DATABASE_FILE};
use propmap_common::Callsign;
use propmap_server::db;
use propmap_server::store::LinkStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "replace-callsign")]
#[command(about = "Replace a callsign throughout the propmap database")]
#[command(version)]
struct Args {
    /// Callsign to replace
    old: String,

    /// Replacement callsign
    new: String,

    /// Directory holding propmap.db
    #[arg(short, long, env = "PROPMAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Database file (overrides the data directory)
    #[arg(long, env = "PROPMAP_DATABASE")]
    database: Option<PathBuf>,

    /// Config file
    #[arg(short, long, env = "PROPMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} (yes/no): ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let old = Callsign::parse(&args.old).context("Invalid old callsign")?;
    let new = Callsign::parse(&args.new).context("Invalid new callsign")?;
    if old == new {
        bail!("Old and new callsigns are the same ({})", old);
    }

    let db_path = match args.database {
        Some(path) => path,
        None => {
            let toml_config = config::load_toml_config(args.config.as_deref())?;
            config::resolve_data_dir(
                args.data_dir.as_deref(),
                "PROPMAP_DATA_DIR",
                toml_config.server.data_dir.as_deref(),
            )
            .join(DATABASE_FILE)
        }
    };
    if !db_path.exists() {
        bail!("Database not found at {}", db_path.display());
    }

    let pool = db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    let store = LinkStore::new(pool.clone());

    let usage = store.callsign_usage(&old).await?;
    match &usage.station {
        Some(station) => println!(
            "Found station: {} ({})",
            station.callsign,
            station.grid.as_deref().unwrap_or("no grid")
        ),
        None => println!("Warning: callsign {} not found in stations table", old),
    }
    println!(
        "Found {} contacts as TX, {} as RX, {} presence records, {} logs",
        usage.contacts_as_tx, usage.contacts_as_rx, usage.presence, usage.ingested_logs
    );

    if usage.is_unused() {
        println!("No data to replace.");
        return Ok(());
    }

    if store.station(&new).await?.is_some() {
        println!("Warning: {} already exists, stations will be merged", new);
    }

    if !args.yes && !confirm(&format!("Replace {} with {}?", old, new))? {
        println!("Cancelled.");
        return Ok(());
    }

    let report = store.replace_callsign(&old, &new).await?;
    if report.station_merged {
        println!("Merged station {} into {}", old, new);
    } else if report.station_renamed {
        println!("Renamed station {} to {}", old, new);
    }
    println!("Updated {} contacts", report.contacts_updated);
    if report.self_contacts_removed > 0 {
        println!("Removed {} contacts between {} and {}", report.self_contacts_removed, old, new);
    }
    println!("Updated {} presence records", report.presence_updated);
    println!("Updated {} ingested logs", report.ingested_logs_updated);

    pool.close().await;
    println!("Successfully replaced {} with {}", old, new);
    Ok(())
}
