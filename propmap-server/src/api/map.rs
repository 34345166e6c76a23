//! Map view endpoint

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::{parse_range, query_params};
use crate::aggregate::MapView;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MapParams {
    pub range: Option<String>,
}

/// GET /api/map?range={24h|7d|30d}
pub async fn get_map(
    State(state): State<AppState>,
    params: Result<Query<MapParams>, QueryRejection>,
) -> ApiResult<Json<MapView>> {
    let params = query_params(params)?;
    let window = parse_range(params.range.as_deref())?;
    let view = state.aggregator.map_view(window).await?;
    Ok(Json(view))
}
