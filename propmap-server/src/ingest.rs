//! Ingestion engine
//!
//! Turns a parsed log payload into link store rows. Every write belonging
//! to one payload, including the dedup ledger insert, shares a single
//! database transaction; the `ingested` event goes out only after commit.

use chrono::{DateTime, Utc};
use propmap_common::events::{EventBus, PropmapEvent};
use propmap_common::payload::LogPayload;
use propmap_common::{time, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::ledger::{DedupEntry, DedupLedger, DedupOutcome};
use crate::store::LinkStore;

/// Result of one ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub duplicate: bool,
    pub contacts_written: u64,
    pub contacts_skipped: u64,
    pub fingerprint: String,
}

impl IngestOutcome {
    /// "accepted" or "duplicate"
    pub fn status(&self) -> &'static str {
        if self.duplicate {
            "duplicate"
        } else {
            "accepted"
        }
    }
}

#[derive(Clone)]
pub struct IngestEngine {
    db: SqlitePool,
    bus: EventBus,
}

impl IngestEngine {
    pub fn new(db: SqlitePool, bus: EventBus) -> Self {
        Self { db, bus }
    }

    /// Parse raw bytes and ingest them
    ///
    /// Structural problems surface as `Error::MalformedPayload` before any
    /// database work starts.
    pub async fn ingest_bytes(&self, body: &[u8]) -> Result<IngestOutcome> {
        let payload = LogPayload::from_slice(body)?;
        self.ingest(&payload).await
    }

    pub async fn ingest(&self, payload: &LogPayload) -> Result<IngestOutcome> {
        self.ingest_at(payload, time::now()).await
    }

    /// Ingest with an explicit receipt time
    ///
    /// `received_at` is the presence time of the source station when the
    /// payload carries neither `observed_at` nor any contacts.
    pub async fn ingest_at(
        &self,
        payload: &LogPayload,
        received_at: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let contacts_skipped = payload.skipped.len() as u64;
        let mut tx = self.db.begin().await?;

        let entry = DedupEntry {
            fingerprint: payload.fingerprint.clone(),
            source: payload.source.clone(),
            accepted_at: received_at,
        };

        if DedupLedger::accept_in(&mut tx, &entry).await? == DedupOutcome::Duplicate {
            tx.rollback().await?;
            debug!(
                source = %payload.source,
                fingerprint = %payload.fingerprint,
                "Duplicate payload ignored"
            );
            return Ok(IngestOutcome {
                accepted: false,
                duplicate: true,
                contacts_written: 0,
                contacts_skipped,
                fingerprint: payload.fingerprint.clone(),
            });
        }

        let mut contacts_written = 0u64;
        for record in &payload.contacts {
            let event = &record.event;
            LinkStore::write_in(&mut tx, event, Some(payload.fingerprint.as_str())).await?;
            LinkStore::upsert_station_in(&mut tx, &event.tx, record.tx_grid.as_ref(), event.timestamp)
                .await?;
            LinkStore::upsert_station_in(&mut tx, &event.rx, record.rx_grid.as_ref(), event.timestamp)
                .await?;
            contacts_written += 1;
        }

        let seen_at = payload.presence_time().unwrap_or(received_at);
        LinkStore::write_station_in(&mut tx, &payload.source, payload.grid.as_ref(), seen_at).await?;

        DedupLedger::record_counts(&mut tx, &payload.fingerprint, contacts_written, contacts_skipped)
            .await?;

        tx.commit().await?;

        info!(
            source = %payload.source,
            fingerprint = %payload.fingerprint,
            contacts_written,
            contacts_skipped,
            "Ingested log"
        );

        self.bus.emit_lossy(PropmapEvent::Ingested {
            source: payload.source.to_string(),
            fingerprint: payload.fingerprint.clone(),
            contacts_written,
            timestamp: time::now(),
        });

        Ok(IngestOutcome {
            accepted: true,
            duplicate: false,
            contacts_written,
            contacts_skipped,
            fingerprint: payload.fingerprint.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, init_memory_database};
    use chrono::TimeZone;
    use propmap_common::{Callsign, Error};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_payload() -> serde_json::Value {
        json!({
            "station_callsign": "g4abc",
            "grid": "IO91",
            "contacts": [
                {"tx_callsign": "K1XYZ", "rx_callsign": "G4ABC",
                 "timestamp": "2026-10-19T11:58:15Z", "snr_db": -12, "tx_grid": "FN42"},
                {"tx_callsign": "W1AW", "rx_callsign": "G4ABC",
                 "timestamp": "2026-10-19T11:59:00Z", "snr_db": -3}
            ]
        })
    }

    async fn setup_engine() -> (IngestEngine, LinkStore, DedupLedger, EventBus) {
        let pool = init_memory_database().await.unwrap();
        let bus = EventBus::new(16);
        (
            IngestEngine::new(pool.clone(), bus.clone()),
            LinkStore::new(pool.clone()),
            DedupLedger::new(pool),
            bus,
        )
    }

    #[tokio::test]
    async fn test_second_ingestion_is_duplicate() {
        let (engine, store, ledger, _bus) = setup_engine().await;
        let body = serde_json::to_vec(&sample_payload()).unwrap();

        let first = engine.ingest_bytes(&body).await.unwrap();
        assert!(first.accepted);
        assert_eq!(first.status(), "accepted");
        assert_eq!(first.contacts_written, 2);

        let second = engine.ingest_bytes(&body).await.unwrap();
        assert!(!second.accepted);
        assert!(second.duplicate);
        assert_eq!(second.contacts_written, 0);
        assert_eq!(second.fingerprint, first.fingerprint);

        assert_eq!(store.contact_count().await.unwrap(), 2);
        assert_eq!(ledger.len().await.unwrap(), 1);
        let record = ledger.lookup(&first.fingerprint).await.unwrap().unwrap();
        assert_eq!(record.contacts_written, 2);
    }

    #[tokio::test]
    async fn test_partial_payload_writes_valid_records() {
        let (engine, store, _ledger, _bus) = setup_engine().await;
        let mut payload = sample_payload();
        let contacts = payload["contacts"].as_array_mut().unwrap();
        contacts.push(json!({"tx_callsign": "VK2XX", "rx_callsign": "G4ABC",
                             "timestamp": "2026-10-19T12:00:00Z"}));
        contacts.push(json!({"tx_callsign": "VK2XX", "timestamp": "2026-10-19T12:00:00Z"}));

        let outcome = engine
            .ingest_bytes(&serde_json::to_vec(&payload).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.contacts_written, 3);
        assert_eq!(outcome.contacts_skipped, 1);
        assert_eq!(store.contact_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_malformed_payload_writes_nothing() {
        let (engine, store, ledger, _bus) = setup_engine().await;
        let result = engine.ingest_bytes(br#"{"contacts": "nope"}"#).await;

        assert!(matches!(result, Err(Error::MalformedPayload(_))));
        assert_eq!(store.contact_count().await.unwrap(), 0);
        assert!(ledger.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_grids_and_presence_recorded() {
        let (engine, store, _ledger, _bus) = setup_engine().await;
        engine
            .ingest_bytes(&serde_json::to_vec(&sample_payload()).unwrap())
            .await
            .unwrap();

        let source = store.station(&Callsign::parse("G4ABC").unwrap()).await.unwrap().unwrap();
        assert_eq!(source.grid.as_deref(), Some("IO91"));
        // Presence falls back to the latest contact when observed_at is absent
        assert_eq!(source.last_seen, Utc.with_ymd_and_hms(2026, 10, 19, 11, 59, 0).unwrap());

        let k1 = store.station(&Callsign::parse("K1XYZ").unwrap()).await.unwrap().unwrap();
        assert_eq!(k1.grid.as_deref(), Some("FN42"));
        let w1 = store.station(&Callsign::parse("W1AW").unwrap()).await.unwrap().unwrap();
        assert_eq!(w1.grid, None);
    }

    #[tokio::test]
    async fn test_empty_log_uses_receipt_time_and_is_announced() {
        let (engine, store, _ledger, bus) = setup_engine().await;
        let mut rx = bus.subscribe();
        let received = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();

        let payload = LogPayload::from_value(json!({"station_callsign": "M0XYZ"})).unwrap();
        let outcome = engine.ingest_at(&payload, received).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.contacts_written, 0);

        let station = store.station(&Callsign::parse("M0XYZ").unwrap()).await.unwrap().unwrap();
        assert_eq!(station.last_seen, received);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "ingested");
    }

    #[tokio::test]
    async fn test_heartbeats_need_observed_at_to_refresh_presence() {
        let (engine, store, _ledger, _bus) = setup_engine().await;
        let m0xyz = Callsign::parse("M0XYZ").unwrap();
        let first = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();

        // Identical unstamped heartbeats share one fingerprint
        let bare = LogPayload::from_value(json!({"station_callsign": "M0XYZ"})).unwrap();
        assert!(engine.ingest_at(&bare, first).await.unwrap().accepted);
        let again = engine.ingest_at(&bare, first + chrono::Duration::hours(1)).await.unwrap();
        assert!(again.duplicate);
        let station = store.station(&m0xyz).await.unwrap().unwrap();
        assert_eq!(station.last_seen, first);

        // Stamped heartbeats are distinct payloads and move last_seen
        for hour in [9, 10] {
            let stamped = LogPayload::from_value(json!({
                "station_callsign": "M0XYZ",
                "observed_at": format!("2026-10-19T{:02}:00:00Z", hour)
            }))
            .unwrap();
            assert!(engine.ingest(&stamped).await.unwrap().accepted);
        }
        let station = store.station(&m0xyz).await.unwrap().unwrap();
        assert_eq!(station.last_seen, Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_events_follow_accepted_ingestions_only() {
        let (engine, _store, _ledger, bus) = setup_engine().await;
        let mut rx = bus.subscribe();
        let body = serde_json::to_vec(&sample_payload()).unwrap();

        engine.ingest_bytes(&body).await.unwrap();
        engine.ingest_bytes(&body).await.unwrap();

        match rx.try_recv().unwrap() {
            PropmapEvent::Ingested { source, contacts_written, .. } => {
                assert_eq!(source, "G4ABC");
                assert_eq!(contacts_written, 2);
            }
        }
        assert!(rx.try_recv().is_err(), "duplicate must not be announced");
    }

    #[tokio::test]
    async fn test_concurrent_identical_ingestions_accept_once() {
        let temp = TempDir::new().unwrap();
        let pool = init_database(&temp.path().join("ingest.db")).await.unwrap();
        let engine = IngestEngine::new(pool.clone(), EventBus::new(16));
        let body = serde_json::to_vec(&sample_payload()).unwrap();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let engine = engine.clone();
                let body = body.clone();
                tokio::spawn(async move { engine.ingest_bytes(&body).await.unwrap() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().accepted {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(LinkStore::new(pool).contact_count().await.unwrap(), 2);
    }
}
