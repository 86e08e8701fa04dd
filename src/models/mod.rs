//! Response models for the mirror's HTTP API
//!
//! This module defines the DTOs (Data Transfer Objects) serialized into
//! HTTP response bodies.

pub mod responses;

// Re-export commonly used types
pub use responses::{ErrorResponse, GetResponse, HealthResponse, StatsResponse, SyncResponse};
