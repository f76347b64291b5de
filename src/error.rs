//! Error types for the fetch cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Fetch Error Enum ==
/// Terminal outcome of a failed fetch.
///
/// `Clone` so that one failure can be handed to every caller that joined the
/// same in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The network is unreachable or the connection could not be established
    #[error("Connectivity unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The key cannot be turned into a request
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The upstream answered with a non-success status
    #[error("Upstream returned HTTP {status}")]
    HttpStatus { status: u16, body: String },

    /// The request was sent but no usable response came back
    #[error("No response from upstream")]
    NoResponse,

    /// The response body is larger than the transport accepts
    #[error("Response body of {size} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { size: u64, limit: u64 },

    /// The response could not be decoded or validated
    #[error("Decode error: {0}")]
    Decode(String),

    /// The fetch was cancelled by the party driving it
    #[error("Fetch cancelled")]
    Cancelled,

    /// Unexpected failure inside the fetch machinery
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Returns true for transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Unavailable(_) | FetchError::Timeout(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for FetchError {
    fn into_response(self) -> Response {
        let status = match &self {
            FetchError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            FetchError::Unavailable(_)
            | FetchError::NoResponse
            | FetchError::HttpStatus { .. }
            | FetchError::BodyTooLarge { .. } => StatusCode::BAD_GATEWAY,
            FetchError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            FetchError::Decode(_) | FetchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            FetchError::HttpStatus { status: upstream, .. } => json!({
                "error": self.to_string(),
                "upstream_status": upstream,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

// == Config Error Enum ==
/// Configuration values rejected at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Entry lifetime must be positive
    #[error("max_age must be greater than zero")]
    ZeroMaxAge,

    /// Entry count bound must be positive
    #[error("max_entry_count must be greater than zero")]
    ZeroMaxEntryCount,

    /// Total cost bound must be positive
    #[error("max_total_cost must be greater than zero")]
    ZeroMaxTotalCost,

    /// A retry policy needs at least one attempt
    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,

    /// A duration setting is out of range
    #[error("invalid duration for {field}: {reason}")]
    InvalidDuration { field: &'static str, reason: String },
}

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
