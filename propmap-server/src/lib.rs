//! propmap-server library
//!
//! Ingests station activity logs, keeps the time-indexed link store and
//! serves windowed map/link views plus live ingestion notifications.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use propmap_common::events::EventBus;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod aggregate;
pub mod api;
pub mod db;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod store;

use aggregate::Aggregator;
use ingest::IngestEngine;
use ledger::DedupLedger;
use store::LinkStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub ledger: DedupLedger,
    pub store: LinkStore,
    pub engine: IngestEngine,
    pub aggregator: Aggregator,
    /// Ingestion notifications for WebSocket clients
    pub bus: EventBus,
    /// Advisory upload token; never enforced
    pub ingest_token: Option<String>,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
    /// Reported as uptime by `/health`
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state over an initialized database
    pub fn new(db: SqlitePool, bus: EventBus) -> Self {
        let store = LinkStore::new(db.clone());
        Self {
            ledger: DedupLedger::new(db.clone()),
            engine: IngestEngine::new(db.clone(), bus.clone()),
            aggregator: Aggregator::new(store.clone()),
            store,
            db,
            bus,
            ingest_token: None,
            max_body_bytes: propmap_common::config::DEFAULT_MAX_BODY_BYTES,
            startup_time: Utc::now(),
        }
    }

    pub fn with_ingest_token(mut self, token: Option<String>) -> Self {
        self.ingest_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        .route("/api/map", get(api::get_map))
        .route("/api/link", get(api::get_link))
        .route("/api/ingest/log", post(api::ingest_log))
        .route("/ws", get(api::ws_handler))
        .merge(api::health_routes())
        .with_state(state)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
