//! Dedup ledger
//!
//! Records which log payloads have already been ingested, keyed by content
//! fingerprint. Entries never expire.

use chrono::{DateTime, Utc};
use propmap_common::time::{from_millis, to_millis};
use propmap_common::{Callsign, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

/// Result of offering a fingerprint to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// Fingerprint was not known; it is now recorded
    FirstTime,
    /// Fingerprint was already recorded; nothing changed
    Duplicate,
}

/// A fingerprint being offered to the ledger
#[derive(Debug, Clone)]
pub struct DedupEntry {
    pub fingerprint: String,
    pub source: Callsign,
    pub accepted_at: DateTime<Utc>,
}

/// A stored ledger row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupRecord {
    pub fingerprint: String,
    pub source: String,
    pub accepted_at: DateTime<Utc>,
    pub contacts_written: u64,
    pub contacts_skipped: u64,
}

#[derive(Clone)]
pub struct DedupLedger {
    db: SqlitePool,
}

impl DedupLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a fingerprint on its own connection
    pub async fn accept(&self, entry: &DedupEntry) -> Result<DedupOutcome> {
        let mut conn = self.db.acquire().await?;
        Self::accept_in(&mut conn, entry).await
    }

    /// Record a fingerprint inside the caller's transaction
    ///
    /// Check and insert are one `INSERT OR IGNORE` on the primary key, so two
    /// concurrent ingestions of the same payload can never both see
    /// `FirstTime`.
    pub async fn accept_in(conn: &mut SqliteConnection, entry: &DedupEntry) -> Result<DedupOutcome> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO ingested_logs (fingerprint, callsign, accepted_at_ms)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&entry.fingerprint)
        .bind(entry.source.as_str())
        .bind(to_millis(entry.accepted_at))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            Ok(DedupOutcome::Duplicate)
        } else {
            Ok(DedupOutcome::FirstTime)
        }
    }

    /// Store the write/skip counts of an accepted payload
    pub async fn record_counts(
        conn: &mut SqliteConnection,
        fingerprint: &str,
        contacts_written: u64,
        contacts_skipped: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE ingested_logs SET contacts_written = ?, contacts_skipped = ? WHERE fingerprint = ?",
        )
        .bind(contacts_written as i64)
        .bind(contacts_skipped as i64)
        .bind(fingerprint)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn lookup(&self, fingerprint: &str) -> Result<Option<DedupRecord>> {
        let row: Option<(String, String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT fingerprint, callsign, accepted_at_ms, contacts_written, contacts_skipped
            FROM ingested_logs
            WHERE fingerprint = ?
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.db)
        .await?;

        row.map(|(fingerprint, source, accepted_ms, written, skipped)| {
            Ok(DedupRecord {
                fingerprint,
                source,
                accepted_at: from_millis(accepted_ms)?,
                contacts_written: written.max(0) as u64,
                contacts_skipped: skipped.max(0) as u64,
            })
        })
        .transpose()
    }

    /// Number of fingerprints recorded
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingested_logs")
            .fetch_one(&self.db)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
