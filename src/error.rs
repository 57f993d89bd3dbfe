//! Domain error type shared by the quota, knowledge, training, and chat paths.
//!
//! [`KoaError`] implements [`axum::response::IntoResponse`], so handlers return
//! `Result<T, KoaError>` directly. Store and completion failures are logged in
//! full; the caller only sees a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::quota::ClientStatus;

#[derive(Debug, Error)]
pub enum KoaError {
    /// Caller contract violation (empty client id, empty query, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The client has used its daily allowance. Carries the current status.
    #[error("daily message limit reached ({} of {})", .0.message_count, .0.daily_limit)]
    QuotaExceeded(ClientStatus),

    /// The backing store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    /// The external text-completion service failed.
    #[error("completion failed: {0}")]
    Completion(String),
}

impl From<rusqlite::Error> for KoaError {
    fn from(e: rusqlite::Error) -> Self {
        KoaError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for KoaError {
    fn from(e: serde_json::Error) -> Self {
        KoaError::StoreUnavailable(format!("corrupt stored json: {e}"))
    }
}

impl IntoResponse for KoaError {
    fn into_response(self) -> Response {
        match self {
            KoaError::InvalidArgument(m) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "success": false, "error": m })))
                    .into_response()
            }
            KoaError::QuotaExceeded(status) => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "success": false,
                    "error": "Daily message limit reached",
                    "data": status,
                })),
            )
                .into_response(),
            KoaError::NotFound(m) => {
                (StatusCode::NOT_FOUND, Json(json!({ "success": false, "error": m })))
                    .into_response()
            }
            KoaError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "Unauthorized" })),
            )
                .into_response(),
            KoaError::StoreUnavailable(m) => {
                error!(error = %m, "store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "success": false, "error": "storage temporarily unavailable" })),
                )
                    .into_response()
            }
            KoaError::Completion(m) => {
                error!(error = %m, "completion error");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "success": false, "error": "completion service error" })),
                )
                    .into_response()
            }
        }
    }
}
