//! Backend Module
//!
//! The client capabilities the mirror needs from the backing store: single and
//! batched reads, cursor-based key enumeration and pattern subscriptions to
//! keyevent notifications.
//!
//! # Implementations
//! - [`RedisBackend`]: a real Redis server through the `redis` crate
//! - [`MemoryBackend`]: an in-process store with fault injection

mod memory;
mod redis;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::{MemoryBackend, MemorySubscriber};
pub use self::redis::{RedisBackend, RedisSubscriber};

/// Channel prefix of keyevent notifications.
pub const KEYEVENT_PREFIX: &str = "__keyevent";

// == Scan Page ==
/// One page of a cursor-based key enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; 0 once the iteration is complete
    pub cursor: u64,
    /// Keys returned in this page
    pub keys: Vec<String>,
}

// == Notification ==
/// A published message received on a pattern subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the message was published on, e.g. `__keyevent@0__:del`
    pub channel: String,
    /// Message body; for keyevent notifications this is the key
    pub payload: String,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

// == Backend Trait ==
/// Command side of the backing store client.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Connection type handed to the event loop.
    type Subscriber: Subscriber;

    /// `GET key`; `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `MGET key...`; one slot per requested key, in request order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// One `SCAN` step. Cursor 0 starts a new iteration.
    async fn scan(&self, cursor: u64, count: usize) -> Result<ScanPage>;

    /// Acquires a dedicated connection for a subscription.
    async fn subscriber(&self) -> Result<Self::Subscriber>;
}

// == Subscriber Trait ==
/// A connection in subscriber mode. Dropping it releases the connection.
#[async_trait]
pub trait Subscriber: Send + 'static {
    /// `PSUBSCRIBE pattern`
    async fn psubscribe(&mut self, pattern: &str) -> Result<()>;

    /// Waits for the next message. A lost connection is an error.
    async fn receive(&mut self) -> Result<Notification>;
}

// == Channel Helpers ==
/// Channel on which `event` notifications for database `db` are published.
pub fn keyevent_channel(db: i64, event: &str) -> String {
    format!("{}@{}__:{}", KEYEVENT_PREFIX, db, event)
}

/// Pattern matching every keyevent notification of database `db`.
pub fn keyevent_pattern(db: i64) -> String {
    keyevent_channel(db, "*")
}

/// Event kind of a keyevent channel: the suffix after the first `:`.
pub fn event_kind(channel: &str) -> Option<&str> {
    channel.split_once(':').map(|(_, kind)| kind)
}
