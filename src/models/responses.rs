//! Response DTOs for the fetch cache API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::config::CacheConfig;
use crate::fetch::FetchStats;

/// Response body for DELETE /cache/*key
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// The invalidated key
    pub key: String,
    /// Whether a cached value was dropped
    pub removed: bool,
}

impl InvalidateResponse {
    pub fn new(key: impl Into<String>, removed: bool) -> Self {
        Self {
            key: key.into(),
            removed,
        }
    }
}

/// Response body for PUT /config
#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub max_age_secs: u64,
    pub max_entry_count: usize,
    pub max_total_cost: u64,
    /// Entries removed to satisfy the new bounds
    pub evicted: usize,
}

impl ConfigResponse {
    pub fn new(config: &CacheConfig, evicted: usize) -> Self {
        Self {
            max_age_secs: config.max_age().as_secs(),
            max_entry_count: config.max_entry_count(),
            max_total_cost: config.max_total_cost(),
            evicted,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Cache counters and occupancy
    pub cache: CacheStats,
    /// Network activity behind the cache
    pub fetch: FetchStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, fetch: FetchStats) -> Self {
        let hit_rate = cache.hit_rate();
        Self {
            cache,
            fetch,
            hit_rate,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
