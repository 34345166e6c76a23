//! Database initialization
//!
//! Creates the SQLite database on first run and applies the schema
//! idempotently on every start.

use propmap_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Current schema version, recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 10;

/// Open (or create) the database at `db_path` and apply the schema
///
/// Every pooled connection runs in WAL mode so readers never block the
/// single writer and only ever see committed transactions.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Private in-memory database with the full schema
///
/// Limited to a single connection that is never recycled: every connection
/// to `sqlite::memory:` is a separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_stations_table(pool).await?;
    create_presence_table(pool).await?;
    create_contacts_table(pool).await?;
    create_ingested_logs_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version, applied_at_ms) VALUES (?, ?)")
        .bind(SCHEMA_VERSION)
        .bind(propmap_common::time::to_millis(propmap_common::time::now()))
        .execute(pool)
        .await?;

    debug!("Schema version {} ready", SCHEMA_VERSION);
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_stations_table(pool: &SqlitePool) -> Result<()> {
    // grid_seen_ms is the observation time of the entry that set grid
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            callsign TEXT PRIMARY KEY,
            grid TEXT,
            grid_seen_ms INTEGER,
            first_seen_ms INTEGER NOT NULL,
            last_seen_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_presence_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS presence (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            callsign TEXT NOT NULL,
            seen_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_presence_seen ON presence(seen_ms)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_presence_callsign ON presence(callsign)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_contacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_callsign TEXT NOT NULL,
            rx_callsign TEXT NOT NULL,
            ts_ms INTEGER NOT NULL,
            snr_db REAL,
            frequency_hz INTEGER,
            mode TEXT,
            ingest_fingerprint TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_ts ON contacts(ts_ms)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contacts_pair ON contacts(tx_callsign, rx_callsign, ts_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ingested_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingested_logs (
            fingerprint TEXT PRIMARY KEY,
            callsign TEXT NOT NULL,
            accepted_at_ms INTEGER NOT NULL,
            contacts_written INTEGER NOT NULL DEFAULT 0,
            contacts_skipped INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ingested_logs_callsign ON ingested_logs(callsign)")
        .execute(pool)
        .await?;

    Ok(())
}
