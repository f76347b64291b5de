//! Fetch Module
//!
//! Network side of the cache: request coalescing, retries and the transport
//! boundary, composed by [`Fetcher`].

mod fetcher;
mod in_flight;
pub mod retry;
mod transport;

pub use fetcher::{FetchStats, Fetcher};
pub use in_flight::InFlightRegistry;
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use transport::{transport_fn, FnTransport, HttpTransport, Transport, MAX_KEY_LENGTH};
