//! Redis Mirror - A read-through local mirror of a Redis keyspace
//!
//! Bootstraps an in-process copy of a database with a full `SCAN`, then keeps
//! it approximately coherent by consuming keyevent notifications
//! (`del`, `expired`, `expire`). Misses fall through to the server.
//!
//! ```no_run
//! use redis_mirror::{IdentityFormatter, Mirror, MirrorOptions, Transport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> redis_mirror::error::Result<()> {
//! let transport = Transport::new("tcp", "127.0.0.1:6379", 0)?;
//! let mirror = Mirror::connect(&transport, IdentityFormatter, MirrorOptions::default()).await?;
//! mirror.sync().await?;
//!
//! let cancel = CancellationToken::new();
//! let key = "user:1".to_string();
//! tokio::select! {
//!     _ = mirror.process_events(cancel.clone()) => {}
//!     value = mirror.get(&key) => println!("{:?}", value),
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod mirror;
pub mod models;
pub mod sync;
pub mod tasks;

pub use api::AppState;
pub use config::{Config, MirrorOptions, Transport};
pub use error::MirrorError;
pub use format::{Formatter, IdentityFormatter, ParseFormatter};
pub use mirror::Mirror;
pub use sync::{SubscriberState, SyncReport};
pub use tasks::{spawn_event_task, spawn_resync_task};
