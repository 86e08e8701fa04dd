//! Response DTOs for the mirror's HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::StatsSnapshot;
use crate::sync::{SubscriberState, SyncReport};

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The mirrored value, in wire form
    pub value: String,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response body for a triggered resync (POST /sync)
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    /// Success message
    pub message: String,
    #[serde(flatten)]
    pub report: SyncReport,
}

impl SyncResponse {
    pub fn new(report: SyncReport) -> Self {
        Self {
            message: format!("Synchronized {} keys", report.stored),
            report,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Current number of mirrored entries
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a counter snapshot
    pub fn new(counters: StatsSnapshot, total_entries: usize) -> Self {
        Self {
            hit_rate: counters.hit_rate(),
            counters,
            total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" while notifications are flowing, "degraded" otherwise
    pub status: String,
    /// Position of the event loop
    pub subscriber: SubscriberState,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn from_state(subscriber: SubscriberState) -> Self {
        let status = match subscriber {
            SubscriberState::Receiving => "healthy",
            _ => "degraded",
        };
        Self {
            status: status.to_string(),
            subscriber,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
