//! API Module
//!
//! Read-only HTTP surface over a running mirror.
//!
//! # Endpoints
//! - `GET /get/:key` - Read-through lookup of a key
//! - `POST /sync` - Run a full resync of the mirror
//! - `GET /stats` - Get mirror statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
