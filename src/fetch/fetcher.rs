//! Fetch Orchestrator
//!
//! Public entry point: serves fresh cached bytes, otherwise runs one
//! deduplicated, retried transport call per key and caches the result.
//!
//! The cache lock is taken only around cache reads and writes, never across
//! a transport call or a backoff sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::fetch::{retry, InFlightRegistry, RetryPolicy, Transport};

// == Fetch Stats ==
/// Counters describing network activity behind the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Transport invocations, retries included
    pub transport_calls: u64,
    /// Transport invocations after the first attempt of a fetch
    pub retries: u64,
    /// Callers that joined an already running fetch
    pub coalesced: u64,
    /// Fetches currently running
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct FetchCounters {
    transport_calls: AtomicU64,
    retries: AtomicU64,
}

// == Fetcher ==
/// Shared state needed by a running fetch task.
struct Loader {
    cache: Mutex<CacheStore>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    counters: FetchCounters,
}

/// Cheaply cloneable handle to one fetch cache.
#[derive(Clone)]
pub struct Fetcher {
    loader: Arc<Loader>,
    in_flight: Arc<InFlightRegistry<Bytes>>,
}

impl Fetcher {
    // == Constructor ==
    pub fn new(transport: impl Transport, config: CacheConfig, policy: RetryPolicy) -> Self {
        Self::with_transport(Arc::new(transport), config, policy)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        config: CacheConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            loader: Arc::new(Loader {
                cache: Mutex::new(CacheStore::new(config)),
                transport,
                policy,
                counters: FetchCounters::default(),
            }),
            in_flight: Arc::new(InFlightRegistry::new()),
        }
    }

    // == Fetch ==
    /// Returns the bytes for `key`, from the cache when fresh.
    ///
    /// On a miss, concurrent callers for the same key share one retried
    /// transport call and all observe its outcome. Failures are not cached.
    pub async fn fetch(&self, key: &str) -> Result<Bytes> {
        {
            let mut cache = self.loader.cache.lock().await;
            cache.evict_expired();
            if let Some(value) = cache.get(key) {
                return Ok(value);
            }
        }

        let loader = Arc::clone(&self.loader);
        let owned_key = key.to_string();
        self.in_flight
            .join_or_start(key, move |cancel| loader.load(owned_key, cancel))
            .await
    }

    // == Cache Operations ==
    /// Drops the cached value for `key`. Returns false if nothing was cached.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.loader.cache.lock().await.remove(key)
    }

    /// Removes every expired entry. Returns the number removed.
    pub async fn evict_expired(&self) -> usize {
        self.loader.cache.lock().await.evict_expired()
    }

    /// Applies new cache bounds. Returns the number of entries removed.
    pub async fn reconfigure(&self, config: CacheConfig) -> usize {
        self.loader.cache.lock().await.reconfigure(config)
    }

    /// Whether a fresh value is cached, without counting a hit or miss.
    pub async fn contains(&self, key: &str) -> bool {
        self.loader.cache.lock().await.contains(key)
    }

    pub async fn config(&self) -> CacheConfig {
        self.loader.cache.lock().await.config()
    }

    pub async fn stats(&self) -> CacheStats {
        self.loader.cache.lock().await.stats()
    }

    pub fn fetch_stats(&self) -> FetchStats {
        let counters = &self.loader.counters;
        FetchStats {
            transport_calls: counters.transport_calls.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            coalesced: self.in_flight.coalesced(),
            in_flight: self.in_flight.len(),
        }
    }

    // == Cancellation ==
    /// Cancels the running fetch for `key` for all of its waiters.
    pub fn cancel(&self, key: &str) -> bool {
        self.in_flight.cancel(key)
    }

    /// Cancels every running fetch; later fetches that miss fail as cancelled.
    pub fn shutdown(&self) {
        info!(in_flight = self.in_flight.len(), "Cancelling in-flight fetches");
        self.in_flight.shutdown();
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl Loader {
    /// Body of a fetch task: transport with retries, then store.
    async fn load(self: Arc<Self>, key: String, cancel: CancellationToken) -> Result<Bytes> {
        // A task for this key may have finished between our miss and registration
        if let Some(value) = self.cache.lock().await.peek(&key) {
            debug!(key = %key, "Served by a fetch that just completed");
            return Ok(value);
        }

        let value = retry::execute(&self.policy, &cancel, |attempt| {
            self.counters.transport_calls.fetch_add(1, Ordering::Relaxed);
            if attempt > 1 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
            }
            self.transport.fetch(&key)
        })
        .await?;

        let cost = value.len() as u64;
        self.cache.lock().await.put(&key, value.clone(), cost);
        debug!(key = %key, cost, "Fetched and cached");
        Ok(value)
    }
}
