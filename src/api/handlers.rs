//! API Handlers
//!
//! HTTP request handlers for each mirror endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::backend::Backend;
use crate::error::Result;
use crate::format::Formatter;
use crate::models::{GetResponse, HealthResponse, StatsResponse, SyncResponse};
use crate::Mirror;

/// Application state shared across all handlers.
pub struct AppState<F: Formatter, B: Backend> {
    /// The mirror; internally synchronized
    pub mirror: Arc<Mirror<F, B>>,
}

impl<F: Formatter, B: Backend> AppState<F, B> {
    /// Creates a new AppState around a shared mirror.
    pub fn new(mirror: Arc<Mirror<F, B>>) -> Self {
        Self { mirror }
    }
}

impl<F: Formatter, B: Backend> Clone for AppState<F, B> {
    fn clone(&self) -> Self {
        Self {
            mirror: Arc::clone(&self.mirror),
        }
    }
}

/// Handler for GET /get/:key
///
/// Read-through lookup; the key and value cross the wire in their string form.
pub async fn get_handler<F: Formatter, B: Backend>(
    State(state): State<AppState<F, B>>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let formatter = state.mirror.formatter();
    let domain_key = formatter.to_key(&key)?;
    let value = state.mirror.get(&domain_key).await?;

    Ok(Json(GetResponse::new(key, formatter.from_value(&value))))
}

/// Handler for POST /sync
///
/// Runs a full bootstrap scan and reports what it stored.
pub async fn sync_handler<F: Formatter, B: Backend>(
    State(state): State<AppState<F, B>>,
) -> Result<Json<SyncResponse>> {
    let report = state.mirror.sync().await?;
    Ok(Json(SyncResponse::new(report)))
}

/// Handler for GET /stats
pub async fn stats_handler<F: Formatter, B: Backend>(
    State(state): State<AppState<F, B>>,
) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.mirror.stats(),
        state.mirror.store().len(),
    ))
}

/// Handler for GET /health
pub async fn health_handler<F: Formatter, B: Backend>(
    State(state): State<AppState<F, B>>,
) -> Json<HealthResponse> {
    Json(HealthResponse::from_state(state.mirror.subscriber_state()))
}
