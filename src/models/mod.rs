//! Request and Response models for the fetch cache API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::ReconfigureRequest;
pub use responses::{ConfigResponse, HealthResponse, InvalidateResponse, StatsResponse};
