//! Link view endpoint

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use propmap_common::Callsign;
use serde::Deserialize;

use super::{parse_range, query_params};
use crate::aggregate::{LinkFilter, LinkView};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LinkParams {
    pub tx: Option<String>,
    pub rx: Option<String>,
    pub range: Option<String>,
    #[serde(default)]
    pub bidirectional: bool,
}

fn optional_callsign(raw: Option<&str>) -> ApiResult<Option<Callsign>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(call) => Ok(Some(Callsign::parse(call)?)),
    }
}

/// GET /api/link?tx=CALL&rx=CALL&range=...&bidirectional=bool
pub async fn get_link(
    State(state): State<AppState>,
    params: Result<Query<LinkParams>, QueryRejection>,
) -> ApiResult<Json<LinkView>> {
    let params = query_params(params)?;
    let window = parse_range(params.range.as_deref())?;
    let filter = LinkFilter {
        tx: optional_callsign(params.tx.as_deref())?,
        rx: optional_callsign(params.rx.as_deref())?,
        bidirectional: params.bidirectional,
    };

    let view = state.aggregator.link_view(window, &filter).await?;
    Ok(Json(view))
}
