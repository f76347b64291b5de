//! Request DTOs for the fetch cache API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;

use crate::config::CacheConfig;
use crate::error::ConfigError;

/// Request body for PUT /config
///
/// All three bounds are required; the new configuration replaces the old one
/// as a whole.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconfigureRequest {
    /// Entry lifetime in seconds
    pub max_age_secs: u64,
    /// Maximum number of cached entries
    pub max_entry_count: usize,
    /// Maximum summed entry size in bytes
    pub max_total_cost: u64,
}

impl ReconfigureRequest {
    /// Validates the request into a cache configuration.
    pub fn into_config(self) -> Result<CacheConfig, ConfigError> {
        CacheConfig::new(
            Duration::from_secs(self.max_age_secs),
            self.max_entry_count,
            self.max_total_cost,
        )
    }
}
