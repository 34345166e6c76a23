//! HTTP and WebSocket API handlers for propmap-server

pub mod health;
pub mod ingest;
pub mod link;
pub mod map;
pub mod ws;

pub use health::health_routes;
pub use ingest::ingest_log;
pub use link::get_link;
pub use map::get_map;
pub use ws::ws_handler;

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use propmap_common::TimeWindow;

use crate::error::{ApiError, ApiResult};

/// Unwrap query parameters, reporting bad ones in the JSON error format
fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(inner)| inner)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// `range` query parameter; absent or empty means 24h
fn parse_range(range: Option<&str>) -> ApiResult<TimeWindow> {
    match range.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(TimeWindow::default()),
        Some(raw) => Ok(raw.parse()?),
    }
}
