//! API Handlers
//!
//! HTTP request handlers for each fetch cache endpoint.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::Config;
use crate::error::{ConfigError, FetchError, Result};
use crate::fetch::{Fetcher, HttpTransport};
use crate::models::{
    ConfigResponse, HealthResponse, InvalidateResponse, ReconfigureRequest, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Fetcher,
}

impl AppState {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Creates an AppState backed by an HTTP transport to the configured upstream.
    ///
    /// Upstream bodies larger than the configured `max_total_cost` are
    /// rejected before they are buffered.
    ///
    /// # Errors
    /// An unusable retry policy or HTTP client configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config.upstream_url.clone(), config.request_timeout)?
            .with_max_body(config.cache.max_total_cost());
        let policy = config
            .retry_policy()
            .map_err(|e| FetchError::Internal(format!("invalid retry policy: {}", e)))?;
        Ok(Self::new(Fetcher::new(transport, config.cache, policy)))
    }
}

/// Handler for GET /fetch/*key
///
/// Serves the bytes for `key` through the cache.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let value = state.fetcher.fetch(&key).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        value,
    )
        .into_response())
}

/// Handler for DELETE /cache/*key
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.fetcher.invalidate(&key).await;
    Json(InvalidateResponse::new(key, removed))
}

/// Handler for PUT /config
///
/// Replaces the cache bounds. Entries violating the new bounds are removed
/// before the response is sent.
pub async fn reconfigure_handler(
    State(state): State<AppState>,
    Json(req): Json<ReconfigureRequest>,
) -> std::result::Result<Json<ConfigResponse>, ConfigError> {
    let config = req.into_config()?;
    let evicted = state.fetcher.reconfigure(config).await;

    Ok(Json(ConfigResponse::new(&config, evicted)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.fetcher.stats().await;
    Json(StatsResponse::new(cache, state.fetcher.fetch_stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
