//! Aggregation engine: windowed map and link views
//!
//! Views are a pure function of link store contents and the query time.
//! The `_at` variants take that time explicitly.

use chrono::{DateTime, Utc};
use propmap_common::payload::ContactEvent;
use propmap_common::{time, Callsign, Result, TimeWindow};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::store::{ActiveStation, LinkStore};

/// Stations active in a window
#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub range: TimeWindow,
    /// Sorted by callsign
    pub stations: Vec<ActiveStation>,
    pub as_of: DateTime<Utc>,
}

/// Optional narrowing of a link view
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub tx: Option<Callsign>,
    pub rx: Option<Callsign>,
    /// Collapse A→B and B→A into one pair
    pub bidirectional: bool,
}

/// Aggregated statistics for one station pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkPair {
    /// In bidirectional views, the lexicographically smaller endpoint
    pub tx: String,
    pub rx: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Mean over the contacts that reported SNR
    pub avg_snr_db: Option<f64>,
    pub best_snr_db: Option<f64>,
}

/// Pairs active in a window
#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    pub range: TimeWindow,
    pub bidirectional: bool,
    pub tx: Option<String>,
    pub rx: Option<String>,
    /// Sorted by (tx, rx)
    pub pairs: Vec<LinkPair>,
    pub as_of: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Aggregator {
    store: LinkStore,
}

impl Aggregator {
    pub fn new(store: LinkStore) -> Self {
        Self { store }
    }

    pub async fn map_view(&self, window: TimeWindow) -> Result<MapView> {
        self.map_view_at(window, time::now()).await
    }

    pub async fn map_view_at(&self, window: TimeWindow, now: DateTime<Utc>) -> Result<MapView> {
        let stations = self.store.query_stations(window.cutoff(now), now).await?;
        Ok(MapView {
            range: window,
            stations,
            as_of: now,
        })
    }

    pub async fn link_view(&self, window: TimeWindow, filter: &LinkFilter) -> Result<LinkView> {
        self.link_view_at(window, filter, time::now()).await
    }

    pub async fn link_view_at(
        &self,
        window: TimeWindow,
        filter: &LinkFilter,
        now: DateTime<Utc>,
    ) -> Result<LinkView> {
        let contacts = self.store.query_contacts(window.cutoff(now), now).await?;
        Ok(LinkView {
            range: window,
            bidirectional: filter.bidirectional,
            tx: filter.tx.as_ref().map(Callsign::to_string),
            rx: filter.rx.as_ref().map(Callsign::to_string),
            pairs: aggregate_pairs(&contacts, filter),
            as_of: now,
        })
    }
}

#[derive(Default)]
struct PairStats {
    count: u64,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    snr_sum: f64,
    snr_count: u64,
    best_snr: Option<f64>,
}

impl PairStats {
    fn add(&mut self, contact: &ContactEvent) {
        self.count += 1;
        let ts = contact.timestamp;
        self.first_seen = Some(self.first_seen.map_or(ts, |t| t.min(ts)));
        self.last_seen = Some(self.last_seen.map_or(ts, |t| t.max(ts)));

        if let Some(snr) = contact.signal.snr_db {
            self.snr_sum += snr;
            self.snr_count += 1;
            self.best_snr = Some(self.best_snr.map_or(snr, |b| b.max(snr)));
        }
    }
}

fn filter_matches(contact: &ContactEvent, filter: &LinkFilter) -> bool {
    let direct = |tx: &Callsign, rx: &Callsign| {
        filter.tx.as_ref().map_or(true, |f| f == tx) && filter.rx.as_ref().map_or(true, |f| f == rx)
    };

    direct(&contact.tx, &contact.rx) || (filter.bidirectional && direct(&contact.rx, &contact.tx))
}

/// Fold contact events into per-pair statistics, sorted by (tx, rx)
pub fn aggregate_pairs(contacts: &[ContactEvent], filter: &LinkFilter) -> Vec<LinkPair> {
    let mut pairs: BTreeMap<(&str, &str), PairStats> = BTreeMap::new();

    for contact in contacts.iter().filter(|c| filter_matches(c, filter)) {
        let (tx, rx) = (contact.tx.as_str(), contact.rx.as_str());
        let key = if filter.bidirectional && rx < tx { (rx, tx) } else { (tx, rx) };
        pairs.entry(key).or_default().add(contact);
    }

    pairs
        .into_iter()
        .filter_map(|((tx, rx), stats)| {
            Some(LinkPair {
                tx: tx.to_string(),
                rx: rx.to_string(),
                count: stats.count,
                first_seen: stats.first_seen?,
                last_seen: stats.last_seen?,
                avg_snr_db: (stats.snr_count > 0).then(|| stats.snr_sum / stats.snr_count as f64),
                best_snr_db: stats.best_snr,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use chrono::{Duration, TimeZone};
    use propmap_common::payload::SignalReport;
    use propmap_common::Grid;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn contact(tx: &str, rx: &str, at: DateTime<Utc>, snr: Option<f64>) -> ContactEvent {
        ContactEvent {
            tx: call(tx),
            rx: call(rx),
            timestamp: at,
            signal: SignalReport {
                snr_db: snr,
                ..Default::default()
            },
        }
    }

    async fn setup() -> (Aggregator, LinkStore) {
        let store = LinkStore::new(init_memory_database().await.unwrap());
        (Aggregator::new(store.clone()), store)
    }

    #[test]
    fn test_directional_pairs_are_distinct() {
        let contacts = vec![
            contact("AA1A", "BB1B", now(), Some(-10.0)),
            contact("BB1B", "AA1A", now(), Some(-4.0)),
            contact("AA1A", "BB1B", now() - Duration::hours(1), Some(-2.0)),
        ];

        let pairs = aggregate_pairs(&contacts, &LinkFilter::default());
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].tx.as_str(), pairs[0].rx.as_str()), ("AA1A", "BB1B"));
        assert_eq!(pairs[0].count, 2);
        assert_eq!(pairs[0].avg_snr_db, Some(-6.0));
        assert_eq!(pairs[0].best_snr_db, Some(-2.0));
        assert_eq!(pairs[0].first_seen, now() - Duration::hours(1));
        assert_eq!(pairs[0].last_seen, now());
        assert_eq!((pairs[1].tx.as_str(), pairs[1].rx.as_str()), ("BB1B", "AA1A"));
    }

    #[test]
    fn test_bidirectional_collapses_with_ordered_endpoints() {
        let contacts = vec![
            contact("BB1B", "AA1A", now(), None),
            contact("AA1A", "BB1B", now(), Some(-8.0)),
        ];
        let filter = LinkFilter {
            bidirectional: true,
            ..Default::default()
        };

        let pairs = aggregate_pairs(&contacts, &filter);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].tx.as_str(), pairs[0].rx.as_str()), ("AA1A", "BB1B"));
        assert_eq!(pairs[0].count, 2);
        // Only one contact carried SNR
        assert_eq!(pairs[0].avg_snr_db, Some(-8.0));
    }

    #[test]
    fn test_filters_respect_direction() {
        let contacts = vec![
            contact("AA1A", "BB1B", now(), None),
            contact("BB1B", "AA1A", now(), None),
            contact("CC1C", "AA1A", now(), None),
        ];

        let tx_only = LinkFilter {
            tx: Some(call("AA1A")),
            ..Default::default()
        };
        let pairs = aggregate_pairs(&contacts, &tx_only);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].rx, "BB1B");

        let both_ways = LinkFilter {
            tx: Some(call("AA1A")),
            rx: Some(call("BB1B")),
            bidirectional: true,
        };
        let pairs = aggregate_pairs(&contacts, &both_ways);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].count, 2);
    }

    #[test]
    fn test_no_snr_gives_no_averages() {
        let pairs = aggregate_pairs(&[contact("AA1A", "BB1B", now(), None)], &LinkFilter::default());
        assert_eq!(pairs[0].avg_snr_db, None);
        assert_eq!(pairs[0].best_snr_db, None);
    }

    #[tokio::test]
    async fn test_contact_25h_old_is_outside_day_window_only() {
        let (aggregator, store) = setup().await;
        store
            .write(&contact("K1XYZ", "G4ABC", now() - Duration::hours(25), Some(-5.0)))
            .await
            .unwrap();

        let filter = LinkFilter::default();
        let day = aggregator.link_view_at(TimeWindow::Day, &filter, now()).await.unwrap();
        let week = aggregator.link_view_at(TimeWindow::Week, &filter, now()).await.unwrap();
        let month = aggregator.link_view_at(TimeWindow::Month, &filter, now()).await.unwrap();
        assert!(day.pairs.is_empty());
        assert_eq!(week.pairs.len(), 1);
        assert_eq!(month.pairs.len(), 1);

        let map_day = aggregator.map_view_at(TimeWindow::Day, now()).await.unwrap();
        let map_week = aggregator.map_view_at(TimeWindow::Week, now()).await.unwrap();
        assert!(map_day.stations.is_empty());
        assert_eq!(map_week.stations.len(), 2);
        assert_eq!(map_week.range, TimeWindow::Week);
    }

    #[tokio::test]
    async fn test_window_edges_are_inclusive() {
        let (aggregator, store) = setup().await;
        store
            .write(&contact("K1XYZ", "G4ABC", now() - Duration::hours(24), None))
            .await
            .unwrap();
        store.write(&contact("W1AW", "G4ABC", now(), None)).await.unwrap();
        store
            .write(&contact("VK2XX", "G4ABC", now() + Duration::seconds(1), None))
            .await
            .unwrap();

        let view = aggregator
            .link_view_at(TimeWindow::Day, &LinkFilter::default(), now())
            .await
            .unwrap();
        let senders: Vec<&str> = view.pairs.iter().map(|p| p.tx.as_str()).collect();
        assert_eq!(senders, vec!["K1XYZ", "W1AW"]);
    }

    #[tokio::test]
    async fn test_map_view_includes_known_grids_sorted() {
        let (aggregator, store) = setup().await;
        store
            .write_station(&call("W1AW"), Some(&Grid::parse("FN31").unwrap()), now())
            .await
            .unwrap();
        store
            .write(&contact("K1XYZ", "G4ABC", now() - Duration::hours(2), None))
            .await
            .unwrap();

        let view = aggregator.map_view_at(TimeWindow::Day, now()).await.unwrap();
        let calls: Vec<&str> = view.stations.iter().map(|s| s.callsign.as_str()).collect();
        assert_eq!(calls, vec!["G4ABC", "K1XYZ", "W1AW"]);
        assert_eq!(view.stations[2].grid.as_deref(), Some("FN31"));
        assert_eq!(view.as_of, now());
    }
}
