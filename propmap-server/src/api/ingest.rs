//! Log ingestion endpoint
//!
//! Uploads are public: an `Authorization: Bearer` token is compared against
//! the configured one only for logging. No token, a wrong token and the
//! right token are all ingested the same way.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiResult;
use crate::ingest::IngestOutcome;
use crate::AppState;

/// POST /api/ingest/log response
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// "accepted" or "duplicate"
    pub status: &'static str,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// How the request's token compared to the configured one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// No token configured on the server
    NotConfigured,
    Missing,
    Matched,
    Mismatched,
}

impl TokenCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenCheck::NotConfigured => "not_configured",
            TokenCheck::Missing => "missing",
            TokenCheck::Matched => "matched",
            TokenCheck::Mismatched => "mismatched",
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub fn check_token(configured: Option<&str>, headers: &HeaderMap) -> TokenCheck {
    match (configured, bearer_token(headers)) {
        (None, _) => TokenCheck::NotConfigured,
        (Some(_), None) => TokenCheck::Missing,
        (Some(expected), Some(given)) if expected == given => TokenCheck::Matched,
        (Some(_), Some(_)) => TokenCheck::Mismatched,
    }
}

/// POST /api/ingest/log
pub async fn ingest_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<IngestResponse>> {
    let token = check_token(state.ingest_token.as_deref(), &headers);
    debug!(bytes = body.len(), token = token.as_str(), "Ingest request");
    if token == TokenCheck::Mismatched || token == TokenCheck::Missing {
        info!(token = token.as_str(), "Ingest token not matched, accepting anyway");
    }

    let outcome = state.engine.ingest_bytes(&body).await?;
    Ok(Json(IngestResponse {
        status: outcome.status(),
        outcome,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = auth {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_token_check() {
        assert_eq!(check_token(None, &headers_with(Some("Bearer x"))), TokenCheck::NotConfigured);
        assert_eq!(check_token(Some("s3cret"), &headers_with(None)), TokenCheck::Missing);
        assert_eq!(
            check_token(Some("s3cret"), &headers_with(Some("Bearer s3cret"))),
            TokenCheck::Matched
        );
        assert_eq!(
            check_token(Some("s3cret"), &headers_with(Some("Bearer nope"))),
            TokenCheck::Mismatched
        );
        assert_eq!(
            check_token(Some("s3cret"), &headers_with(Some("Basic s3cret"))),
            TokenCheck::Missing
        );
    }
}
