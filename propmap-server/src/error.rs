//! Error types for propmap-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use propmap_common::Error as CommonError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request parameter (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// propmap-common error, mapped by kind
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Common(CommonError::MalformedPayload(msg)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD", msg)
            }
            ApiError::Common(CommonError::InvalidRange(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_RANGE", msg)
            }
            ApiError::Common(CommonError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        if status.is_server_error() {
            error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
