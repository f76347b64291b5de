//! Configuration Module
//!
//! Explicit configuration values. Environment overrides are parsed once at
//! startup; rejected overrides keep the default and are reported back as
//! [`ConfigWarning`]s instead of being printed.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;
use crate::fetch::retry::MAX_SLEEP;
use crate::fetch::RetryPolicy;

// == Limits ==
/// Upper bound for `max_age`; keeps `now + max_age` far from overflow.
pub const MAX_AGE_LIMIT: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

// == Cache Configuration ==
/// Bounds enforced by the cache coordinator.
///
/// Only constructible through [`CacheConfig::new`], so every value in
/// circulation has already been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    max_age: Duration,
    max_entry_count: usize,
    max_total_cost: u64,
}

impl CacheConfig {
    /// Validates and creates a cache configuration.
    ///
    /// # Errors
    /// Zero bounds, or a `max_age` above [`MAX_AGE_LIMIT`].
    pub fn new(
        max_age: Duration,
        max_entry_count: usize,
        max_total_cost: u64,
    ) -> Result<Self, ConfigError> {
        if max_age.is_zero() {
            return Err(ConfigError::ZeroMaxAge);
        }
        if max_age > MAX_AGE_LIMIT {
            return Err(ConfigError::InvalidDuration {
                field: "max_age",
                reason: format!("must not exceed {}s", MAX_AGE_LIMIT.as_secs()),
            });
        }
        if max_entry_count == 0 {
            return Err(ConfigError::ZeroMaxEntryCount);
        }
        if max_total_cost == 0 {
            return Err(ConfigError::ZeroMaxTotalCost);
        }

        Ok(Self {
            max_age,
            max_entry_count,
            max_total_cost,
        })
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn max_entry_count(&self) -> usize {
        self.max_entry_count
    }

    pub fn max_total_cost(&self) -> u64 {
        self.max_total_cost
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(300),
            max_entry_count: 1000,
            max_total_cost: 64 * 1024 * 1024,
        }
    }
}

// == Config Warning ==
/// An environment override that was rejected in favour of the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ignoring {}={:?}: {}",
            self.variable, self.value, self.reason
        )
    }
}

/// A configuration together with the overrides that were rejected.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

// == Application Config ==
/// Application configuration parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache bounds
    pub cache: CacheConfig,
    /// Total attempts per fetch, including the first
    pub retry_max_attempts: u32,
    /// Cap applied to each backoff delay
    pub retry_max_delay: Duration,
    /// Upper bound of the random delay added to each backoff
    pub retry_jitter: Duration,
    /// Base URL keys are resolved against
    pub upstream_url: Url,
    /// Per-request timeout of the HTTP transport
    pub request_timeout: Duration,
    /// HTTP server port
    pub server_port: u16,
    /// Interval between background expiry sweeps
    pub cleanup_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_AGE_SECS` - Entry lifetime (default: 300)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `CACHE_MAX_TOTAL_COST` - Maximum summed entry size in bytes (default: 64 MiB)
    /// - `RETRY_MAX_ATTEMPTS` - Attempts per fetch (default: 4)
    /// - `RETRY_MAX_DELAY_SECS` - Backoff cap (default: 60)
    /// - `RETRY_JITTER_MS` - Jitter bound (default: 500)
    /// - `UPSTREAM_URL` - Base URL for fetched keys (default: http://127.0.0.1:8080/)
    /// - `REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 30)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL_SECS` - Expiry sweep frequency (default: 1)
    pub fn from_env() -> LoadedConfig {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoadedConfig {
        let defaults = Config::default();
        let mut loader = Loader {
            lookup: &lookup,
            warnings: Vec::new(),
        };

        let max_age = loader.parse("CACHE_MAX_AGE_SECS", defaults.cache.max_age.as_secs(), |v| {
            if *v == 0 {
                Err("must be greater than zero".to_string())
            } else if *v > MAX_AGE_LIMIT.as_secs() {
                Err(format!("must not exceed {}", MAX_AGE_LIMIT.as_secs()))
            } else {
                Ok(())
            }
        });
        let max_entry_count =
            loader.parse("CACHE_MAX_ENTRIES", defaults.cache.max_entry_count, positive);
        let max_total_cost =
            loader.parse("CACHE_MAX_TOTAL_COST", defaults.cache.max_total_cost, positive);
        let cache = CacheConfig::new(Duration::from_secs(max_age), max_entry_count, max_total_cost)
            .unwrap_or(defaults.cache);

        let retry_max_attempts =
            loader.parse("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts, positive);
        let retry_max_delay = Duration::from_secs(loader.parse(
            "RETRY_MAX_DELAY_SECS",
            defaults.retry_max_delay.as_secs(),
            |secs| within_max_sleep(Duration::from_secs(*secs)),
        ));
        let retry_jitter = Duration::from_millis(loader.parse(
            "RETRY_JITTER_MS",
            defaults.retry_jitter.as_millis() as u64,
            |millis| within_max_sleep(Duration::from_millis(*millis)),
        ));
        let upstream_url = loader.parse("UPSTREAM_URL", defaults.upstream_url.clone(), |url| {
            if url.cannot_be_a_base() {
                Err("must be a base URL".to_string())
            } else {
                Ok(())
            }
        });
        let request_timeout = Duration::from_secs(loader.parse(
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
            positive,
        ));
        let server_port = loader.parse("SERVER_PORT", defaults.server_port, |_| Ok(()));
        let cleanup_interval = Duration::from_secs(loader.parse(
            "CLEANUP_INTERVAL_SECS",
            defaults.cleanup_interval.as_secs(),
            positive,
        ));

        LoadedConfig {
            config: Config {
                cache,
                retry_max_attempts,
                retry_max_delay,
                retry_jitter,
                upstream_url,
                request_timeout,
                server_port,
                cleanup_interval,
            },
            warnings: loader.warnings,
        }
    }

    /// Retry policy built from the retry settings.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::builder()
            .max_attempts(self.retry_max_attempts)
            .max_delay(self.retry_max_delay)
            .jitter(self.retry_jitter)
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry_max_attempts: 4,
            retry_max_delay: Duration::from_secs(60),
            retry_jitter: Duration::from_millis(500),
            upstream_url: default_upstream_url(),
            request_timeout: Duration::from_secs(30),
            server_port: 3000,
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

fn default_upstream_url() -> Url {
    Url::parse("http://127.0.0.1:8080/").expect("default upstream URL is valid")
}

fn positive<T: Default + PartialEq>(value: &T) -> Result<(), String> {
    if *value == T::default() {
        Err("must be greater than zero".to_string())
    } else {
        Ok(())
    }
}

fn within_max_sleep(delay: Duration) -> Result<(), String> {
    if delay > MAX_SLEEP {
        Err(format!("must not exceed {}s", MAX_SLEEP.as_secs()))
    } else {
        Ok(())
    }
}

// == Loader ==
struct Loader<'a, F> {
    lookup: &'a F,
    warnings: Vec<ConfigWarning>,
}

impl<F: Fn(&str) -> Option<String>> Loader<'_, F> {
    fn parse<T: FromStr>(
        &mut self,
        variable: &'static str,
        default: T,
        validate: impl Fn(&T) -> Result<(), String>,
    ) -> T {
        let Some(raw) = (self.lookup)(variable) else {
            return default;
        };

        let outcome = raw
            .trim()
            .parse::<T>()
            .map_err(|_| "not a valid value".to_string())
            .and_then(|value| validate(&value).map(|()| value));

        match outcome {
            Ok(value) => value,
            Err(reason) => {
                self.warnings.push(ConfigWarning {
                    variable,
                    value: raw,
                    reason,
                });
                default
            }
        }
    }
}
