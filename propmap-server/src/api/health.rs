//! Liveness check with build identity and uptime

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

pub const MODULE_NAME: &str = "propmap-server";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub git_rev: &'static str,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = propmap_common::time::now() - state.startup_time;
    Json(HealthResponse {
        status: "ok",
        module: MODULE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        git_rev: env!("PROPMAP_GIT_REV"),
        uptime_secs: uptime.num_seconds().max(0) as u64,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
