//! Fetch Cache - a client-side cache in front of a slow or flaky source
//!
//! Keeps fetched bytes under an LRU and max-age policy, coalesces concurrent
//! requests for the same key into one network call, and retries transient
//! failures with exponential backoff and jitter.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use config::{CacheConfig, Config};
pub use error::{ConfigError, FetchError};
pub use fetch::{Fetcher, HttpTransport, RetryPolicy, Transport};
pub use tasks::spawn_expiry_task;
