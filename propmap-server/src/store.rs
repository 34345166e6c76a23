//! Link store
//!
//! Durable, time-indexed record of station presence and directional
//! TX→RX contact events. Contact events are immutable once written and are
//! never merged at write time; aggregation happens at query time.

use chrono::{DateTime, Utc};
use propmap_common::payload::{ContactEvent, SignalReport};
use propmap_common::time::{from_millis, to_millis};
use propmap_common::{Callsign, Error, Grid, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

/// Stored station row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub callsign: String,
    pub grid: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A station active inside a queried time range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveStation {
    pub callsign: String,
    /// Current grid, if one has ever been reported
    pub grid: Option<String>,
    /// Latest presence or contact inside the range
    pub last_seen: DateTime<Utc>,
}

/// Where a callsign appears across the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallsignUsage {
    pub station: Option<Station>,
    pub presence: u64,
    pub contacts_as_tx: u64,
    pub contacts_as_rx: u64,
    pub ingested_logs: u64,
}

impl CallsignUsage {
    pub fn is_unused(&self) -> bool {
        self.station.is_none()
            && self.presence == 0
            && self.contacts_as_tx == 0
            && self.contacts_as_rx == 0
            && self.ingested_logs == 0
    }
}

/// What `replace_callsign` changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaceReport {
    /// Old station row was renamed to the new callsign
    pub station_renamed: bool,
    /// Old station row was folded into an existing new one
    pub station_merged: bool,
    pub presence_updated: u64,
    pub contacts_updated: u64,
    /// Contacts between old and new that became self-contacts
    pub self_contacts_removed: u64,
    pub ingested_logs_updated: u64,
}

type StationRow = (String, Option<String>, Option<i64>, i64, i64);
type ContactRow = (String, String, i64, Option<f64>, Option<i64>, Option<String>);

#[derive(Clone)]
pub struct LinkStore {
    db: SqlitePool,
}

impl LinkStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append one contact event
    pub async fn write(&self, event: &ContactEvent) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Self::write_in(&mut conn, event, None).await
    }

    /// Append one contact event inside the caller's transaction
    pub async fn write_in(
        conn: &mut SqliteConnection,
        event: &ContactEvent,
        fingerprint: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contacts
                (tx_callsign, rx_callsign, ts_ms, snr_db, frequency_hz, mode, ingest_fingerprint)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.tx.as_str())
        .bind(event.rx.as_str())
        .bind(to_millis(event.timestamp))
        .bind(event.signal.snr_db)
        .bind(event.signal.frequency_hz)
        .bind(event.signal.mode.as_deref())
        .bind(fingerprint)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Record that a station was present at `seen_at`
    pub async fn write_station(
        &self,
        callsign: &Callsign,
        grid: Option<&Grid>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.db.begin().await?;
        Self::write_station_in(&mut tx, callsign, grid, seen_at).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Presence event plus station upsert, inside the caller's transaction
    pub async fn write_station_in(
        conn: &mut SqliteConnection,
        callsign: &Callsign,
        grid: Option<&Grid>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        Self::upsert_station_in(conn, callsign, grid, seen_at).await?;

        sqlx::query("INSERT INTO presence (callsign, seen_ms) VALUES (?, ?)")
            .bind(callsign.as_str())
            .bind(to_millis(seen_at))
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Create or update a station row without recording presence
    ///
    /// First/last seen widen to include `seen_at`. A supplied grid replaces
    /// the stored one unless the stored grid came from a later observation;
    /// a missing grid never clears it.
    pub async fn upsert_station_in(
        conn: &mut SqliteConnection,
        callsign: &Callsign,
        grid: Option<&Grid>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let seen_ms = to_millis(seen_at);
        let grid_seen_ms = grid.map(|_| seen_ms);

        sqlx::query(
            r#"
            INSERT INTO stations (callsign, grid, grid_seen_ms, first_seen_ms, last_seen_ms)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(callsign) DO UPDATE SET
                grid = CASE
                    WHEN excluded.grid IS NOT NULL
                         AND (stations.grid_seen_ms IS NULL
                              OR excluded.grid_seen_ms >= stations.grid_seen_ms)
                    THEN excluded.grid ELSE stations.grid END,
                grid_seen_ms = CASE
                    WHEN excluded.grid IS NOT NULL
                         AND (stations.grid_seen_ms IS NULL
                              OR excluded.grid_seen_ms >= stations.grid_seen_ms)
                    THEN excluded.grid_seen_ms ELSE stations.grid_seen_ms END,
                first_seen_ms = MIN(stations.first_seen_ms, excluded.first_seen_ms),
                last_seen_ms = MAX(stations.last_seen_ms, excluded.last_seen_ms)
            "#,
        )
        .bind(callsign.as_str())
        .bind(grid.map(Grid::as_str))
        .bind(grid_seen_ms)
        .bind(seen_ms)
        .bind(seen_ms)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Contact events with `since <= timestamp <= until`, oldest first
    pub async fn query_contacts(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ContactEvent>> {
        let rows: Vec<ContactRow> = sqlx::query_as(
            r#"
            SELECT tx_callsign, rx_callsign, ts_ms, snr_db, frequency_hz, mode
            FROM contacts
            WHERE ts_ms BETWEEN ? AND ?
            ORDER BY ts_ms, id
            "#,
        )
        .bind(to_millis(since))
        .bind(to_millis(until))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(contact_from_row).collect()
    }

    /// Stations with a presence event or a contact (either end) in range
    ///
    /// Sorted by callsign.
    pub async fn query_stations(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActiveStation>> {
        let since_ms = to_millis(since);
        let until_ms = to_millis(until);

        let rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT a.callsign, MAX(a.seen_ms) AS last_seen_ms, s.grid
            FROM (
                SELECT callsign, seen_ms FROM presence WHERE seen_ms BETWEEN ? AND ?
                UNION ALL
                SELECT tx_callsign, ts_ms FROM contacts WHERE ts_ms BETWEEN ? AND ?
                UNION ALL
                SELECT rx_callsign, ts_ms FROM contacts WHERE ts_ms BETWEEN ? AND ?
            ) AS a
            LEFT JOIN stations s ON s.callsign = a.callsign
            GROUP BY a.callsign, s.grid
            ORDER BY a.callsign
            "#,
        )
        .bind(since_ms)
        .bind(until_ms)
        .bind(since_ms)
        .bind(until_ms)
        .bind(since_ms)
        .bind(until_ms)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(callsign, last_seen_ms, grid)| {
                Ok(ActiveStation {
                    callsign,
                    grid,
                    last_seen: from_millis(last_seen_ms)?,
                })
            })
            .collect()
    }

    pub async fn station(&self, callsign: &Callsign) -> Result<Option<Station>> {
        let mut conn = self.db.acquire().await?;
        fetch_station(&mut conn, callsign.as_str()).await
    }

    /// Total contact events stored
    pub async fn contact_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.db)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Count every row that mentions `callsign`
    pub async fn callsign_usage(&self, callsign: &Callsign) -> Result<CallsignUsage> {
        let mut conn = self.db.acquire().await?;
        let call = callsign.as_str();

        let station = fetch_station(&mut conn, call).await?;
        let presence = count_where(&mut conn, "SELECT COUNT(*) FROM presence WHERE callsign = ?", call).await?;
        let contacts_as_tx =
            count_where(&mut conn, "SELECT COUNT(*) FROM contacts WHERE tx_callsign = ?", call).await?;
        let contacts_as_rx =
            count_where(&mut conn, "SELECT COUNT(*) FROM contacts WHERE rx_callsign = ?", call).await?;
        let ingested_logs =
            count_where(&mut conn, "SELECT COUNT(*) FROM ingested_logs WHERE callsign = ?", call).await?;

        Ok(CallsignUsage {
            station,
            presence,
            contacts_as_tx,
            contacts_as_rx,
            ingested_logs,
        })
    }

    /// Rename `old` to `new` across every table in one transaction
    ///
    /// If `new` already has a station row the two are merged: earliest first
    /// seen, latest last seen, and the grid from the later observation
    /// (whichever exists if only one does).
    pub async fn replace_callsign(&self, old: &Callsign, new: &Callsign) -> Result<ReplaceReport> {
        if old == new {
            return Err(Error::InvalidInput(format!(
                "old and new callsigns are both {}",
                old
            )));
        }

        let mut tx = self.db.begin().await?;
        let mut report = ReplaceReport::default();

        let old_station = fetch_station_row(&mut tx, old.as_str()).await?;
        let new_station = fetch_station_row(&mut tx, new.as_str()).await?;

        match (old_station, new_station) {
            (Some(old_row), Some(new_row)) => {
                let (grid, grid_seen_ms) = newer_grid(&new_row, &old_row);
                sqlx::query(
                    r#"
                    UPDATE stations
                    SET grid = ?, grid_seen_ms = ?, first_seen_ms = ?, last_seen_ms = ?
                    WHERE callsign = ?
                    "#,
                )
                .bind(grid)
                .bind(grid_seen_ms)
                .bind(old_row.3.min(new_row.3))
                .bind(old_row.4.max(new_row.4))
                .bind(new.as_str())
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM stations WHERE callsign = ?")
                    .bind(old.as_str())
                    .execute(&mut *tx)
                    .await?;
                report.station_merged = true;
            }
            (Some(_), None) => {
                sqlx::query("UPDATE stations SET callsign = ? WHERE callsign = ?")
                    .bind(new.as_str())
                    .bind(old.as_str())
                    .execute(&mut *tx)
                    .await?;
                report.station_renamed = true;
            }
            (None, _) => {}
        }

        report.presence_updated = rename_column(&mut tx, "presence", "callsign", old, new).await?;
        report.contacts_updated = rename_column(&mut tx, "contacts", "tx_callsign", old, new).await?
            + rename_column(&mut tx, "contacts", "rx_callsign", old, new).await?;
        report.ingested_logs_updated =
            rename_column(&mut tx, "ingested_logs", "callsign", old, new).await?;

        report.self_contacts_removed = sqlx::query(
            "DELETE FROM contacts WHERE tx_callsign = ? AND rx_callsign = ?",
        )
        .bind(new.as_str())
        .bind(new.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(
            old = %old,
            new = %new,
            merged = report.station_merged,
            contacts = report.contacts_updated,
            "Replaced callsign"
        );
        Ok(report)
    }
}

async fn fetch_station_row(conn: &mut SqliteConnection, callsign: &str) -> Result<Option<StationRow>> {
    let row = sqlx::query_as(
        r#"
        SELECT callsign, grid, grid_seen_ms, first_seen_ms, last_seen_ms
        FROM stations
        WHERE callsign = ?
        "#,
    )
    .bind(callsign)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

async fn fetch_station(conn: &mut SqliteConnection, callsign: &str) -> Result<Option<Station>> {
    fetch_station_row(conn, callsign)
        .await?
        .map(|(callsign, grid, _, first_ms, last_ms)| {
            Ok(Station {
                callsign,
                grid,
                first_seen: from_millis(first_ms)?,
                last_seen: from_millis(last_ms)?,
            })
        })
        .transpose()
}

async fn count_where(conn: &mut SqliteConnection, sql: &str, callsign: &str) -> Result<u64> {
    let count: i64 = sqlx::query_scalar(sql)
        .bind(callsign)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count.max(0) as u64)
}

/// `table` and `column` are always compile-time constants
async fn rename_column(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    old: &Callsign,
    new: &Callsign,
) -> Result<u64> {
    let sql = format!("UPDATE {table} SET {column} = ? WHERE {column} = ?");
    let result = sqlx::query(&sql)
        .bind(new.as_str())
        .bind(old.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Grid to keep when merging two station rows; `preferred` wins ties
fn newer_grid(preferred: &StationRow, other: &StationRow) -> (Option<String>, Option<i64>) {
    match (&preferred.1, &other.1) {
        (Some(_), Some(_)) if other.2 > preferred.2 => (other.1.clone(), other.2),
        (Some(_), _) => (preferred.1.clone(), preferred.2),
        (None, _) => (other.1.clone(), other.2),
    }
}

fn contact_from_row(row: ContactRow) -> Result<ContactEvent> {
    let (tx, rx, ts_ms, snr_db, frequency_hz, mode) = row;
    let stored = |call: &str| {
        Callsign::parse(call)
            .map_err(|e| Error::Internal(format!("stored callsign is invalid: {}", e)))
    };

    Ok(ContactEvent {
        tx: stored(&tx)?,
        rx: stored(&rx)?,
        timestamp: from_millis(ts_ms)?,
        signal: SignalReport {
            snr_db,
            frequency_hz,
            mode,
        },
    })
}
