//! API Module
//!
//! HTTP handlers and routing for the caching proxy.
//!
//! # Endpoints
//! - `GET /fetch/*key` - Fetch a key through the cache
//! - `DELETE /cache/*key` - Drop a cached key
//! - `PUT /config` - Replace the cache bounds
//! - `GET /stats` - Cache and fetch statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
