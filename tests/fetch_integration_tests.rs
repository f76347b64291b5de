//! Integration Tests for the Fetch Orchestrator
//!
//! Drives `Fetcher` end to end with stub transports: request coalescing,
//! retries, cancellation and cache bounds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fetch_cache::fetch::transport_fn;
use fetch_cache::{CacheConfig, FetchError, Fetcher, RetryPolicy};
use tokio::time::Instant;

// == Helper Functions ==

fn cache_config(max_age: Duration, max_entries: usize) -> CacheConfig {
    CacheConfig::new(max_age, max_entries, 1 << 20).unwrap()
}

/// Transport answering every key after `delay`, counting calls.
fn slow_fetcher(calls: Arc<AtomicU32>, delay: Duration, config: CacheConfig) -> Fetcher {
    let transport = transport_fn(move |key: String| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok::<_, FetchError>(Bytes::from(format!("value:{}", key)))
        }
    });
    Fetcher::new(transport, config, RetryPolicy::default())
}

/// Transport returning `failures` in order, then succeeding.
fn scripted_fetcher(calls: Arc<AtomicU32>, failures: Vec<FetchError>, policy: RetryPolicy) -> Fetcher {
    let failures = Arc::new(failures);
    let transport = transport_fn(move |_key: String| {
        let calls = Arc::clone(&calls);
        let failures = Arc::clone(&failures);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            match failures.get(n) {
                Some(err) => Err(err.clone()),
                None => Ok(Bytes::from_static(b"ok")),
            }
        }
    });
    Fetcher::new(transport, cache_config(Duration::from_secs(300), 100), policy)
}

fn unavailable() -> FetchError {
    FetchError::Unavailable("connection refused".into())
}

// == Coalescing ==

#[tokio::test]
async fn test_concurrent_fetches_share_one_transport_call() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = slow_fetcher(
        calls.clone(),
        Duration::from_millis(100),
        cache_config(Duration::from_secs(300), 100),
    );

    let mut handles = Vec::new();
    for _ in 0..10 {
        let fetcher = fetcher.clone();
        handles.push(tokio::spawn(async move { fetcher.fetch("shared").await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(Bytes::from("value:shared")));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.in_flight_count(), 0);

    let fetch_stats = fetcher.fetch_stats();
    assert_eq!(fetch_stats.transport_calls, 1);
    assert_eq!(fetch_stats.coalesced, 9);

    // Later calls are cache hits
    fetcher.fetch("shared").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// == Retries ==

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_backoff() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = scripted_fetcher(
        calls.clone(),
        vec![unavailable(), FetchError::Timeout(Duration::from_secs(30))],
        RetryPolicy::default(),
    );

    let start = Instant::now();
    let value = fetcher.fetch("flaky").await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(value, Bytes::from_static(b"ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(fetcher.fetch_stats().retries, 2);

    // 2s + 4s of backoff plus at most 0.5s of jitter per sleep
    assert!(elapsed >= Duration::from_secs(6), "elapsed {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(7010), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_http_status_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let not_found = FetchError::HttpStatus {
        status: 404,
        body: "no such key".into(),
    };
    let fetcher = scripted_fetcher(calls.clone(), vec![not_found.clone()], RetryPolicy::default());

    let start = Instant::now();
    assert_eq!(fetcher.fetch("gone").await, Err(not_found));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!fetcher.contains("gone").await);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_return_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let failures = vec![
        unavailable(),
        unavailable(),
        FetchError::Timeout(Duration::from_secs(1)),
    ];
    let policy = RetryPolicy::builder()
        .max_attempts(3)
        .jitter(Duration::ZERO)
        .build()
        .unwrap();
    let fetcher = scripted_fetcher(calls.clone(), failures, policy);

    let result = fetcher.fetch("down").await;

    assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(1))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(fetcher.stats().await.entry_count, 0);
}

// == Cancellation ==

#[tokio::test(start_paused = true)]
async fn test_dropped_waiter_does_not_affect_others() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = slow_fetcher(
        calls.clone(),
        Duration::from_secs(1),
        cache_config(Duration::from_secs(300), 100),
    );

    let impatient = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move { fetcher.fetch("k").await })
    };
    let patient = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move { fetcher.fetch("k").await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    impatient.abort();
    assert!(impatient.await.unwrap_err().is_cancelled());

    assert_eq!(patient.await.unwrap(), Ok(Bytes::from("value:k")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(fetcher.contains("k").await);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let failures = vec![unavailable(); 10];
    let fetcher = scripted_fetcher(calls.clone(), failures, RetryPolicy::default());

    let waiter = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move { fetcher.fetch("slow").await })
    };

    // First attempt fails immediately, the fetch is now sleeping >= 2s
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(fetcher.cancel("slow"));

    assert_eq!(waiter.await.unwrap(), Err(FetchError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.in_flight_count(), 0);
}

// == Cache Bounds ==

#[tokio::test]
async fn test_reconfigure_keeps_most_recently_used() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = slow_fetcher(
        calls.clone(),
        Duration::ZERO,
        cache_config(Duration::from_secs(300), 100),
    );

    for key in ["a", "b", "c"] {
        fetcher.fetch(key).await.unwrap();
    }
    // Touch "a" so it becomes the most recently used
    fetcher.fetch("a").await.unwrap();

    let evicted = fetcher
        .reconfigure(cache_config(Duration::from_secs(300), 1))
        .await;

    assert_eq!(evicted, 2);
    assert!(fetcher.contains("a").await);
    assert!(!fetcher.contains("b").await);
    assert!(!fetcher.contains("c").await);
    assert_eq!(fetcher.stats().await.evictions, 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entries_are_refetched() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = slow_fetcher(
        calls.clone(),
        Duration::ZERO,
        cache_config(Duration::from_secs(1), 100),
    );

    fetcher.fetch("ttl").await.unwrap();
    tokio::time::advance(Duration::from_millis(500)).await;
    fetcher.fetch("ttl").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(500)).await;
    fetcher.fetch("ttl").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = fetcher.stats().await;
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_shutdown_cancels_future_misses() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = slow_fetcher(
        calls.clone(),
        Duration::ZERO,
        cache_config(Duration::from_secs(300), 100),
    );
    fetcher.fetch("warm").await.unwrap();

    fetcher.shutdown();

    assert!(fetcher.fetch("warm").await.is_ok());
    assert_eq!(fetcher.fetch("cold").await, Err(FetchError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
