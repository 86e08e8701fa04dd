//! Error types for the mirror
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Mirror Error Enum ==
/// Unified error type for the mirror.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Key is absent from the backing store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached or rejected a command
    #[error("Transport error: {0}")]
    Transport(String),

    /// A subscription connection was closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// A key supplied by the caller or a notification could not be decoded
    #[error("Invalid key {input:?}: {reason}")]
    InvalidKey { input: String, reason: String },

    /// A value read from the backing store could not be decoded
    #[error("Decode error for {input:?}: {reason}")]
    Decode { input: String, reason: String },

    /// The backing store answered with data that breaks the client contract
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MirrorError {
    /// Builds an invalid-key error for the given wire key.
    pub fn invalid_key(input: impl Into<String>, reason: impl ToString) -> Self {
        MirrorError::InvalidKey {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a decode error for the given wire value.
    pub fn decode(input: impl Into<String>, reason: impl ToString) -> Self {
        MirrorError::Decode {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true when the error only signals an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MirrorError::NotFound(_))
    }
}

impl From<redis::RedisError> for MirrorError {
    fn from(err: redis::RedisError) -> Self {
        MirrorError::Transport(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for MirrorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MirrorError::NotFound(_) => StatusCode::NOT_FOUND,
            MirrorError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
            MirrorError::Decode { .. }
            | MirrorError::Transport(_)
            | MirrorError::ConnectionClosed => StatusCode::BAD_GATEWAY,
            MirrorError::Protocol(_) | MirrorError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the mirror.
pub type Result<T> = std::result::Result<T, MirrorError>;
