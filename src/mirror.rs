//! Mirror Coordinator
//!
//! Composition root tying the store, the formatter and the backing store
//! together. Exposes read-through [`Mirror::get`], the bootstrap
//! [`Mirror::sync`] and the event loop [`Mirror::process_events`].
//!
//! # Consistency
//! The mirror is eventually consistent. `sync` and `process_events` may run
//! at the same time and are not ordered against each other: a scan batch
//! fetched before a notification but written after it overwrites the newer
//! value until the next event or resync for that key.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{Backend, RedisBackend};
use crate::cache::{MirrorStats, MirrorStore, StatsSnapshot};
use crate::config::{MirrorOptions, Transport};
use crate::error::{MirrorError, Result};
use crate::format::Formatter;
use crate::sync::{BootstrapScanner, EventSubscriber, SubscriberState, SyncReport};

pub struct Mirror<F: Formatter, B: Backend> {
    backend: Arc<B>,
    store: Arc<MirrorStore<F::Key, F::Value>>,
    formatter: Arc<F>,
    stats: Arc<MirrorStats>,
    state: Arc<watch::Sender<SubscriberState>>,
    options: MirrorOptions,
}

impl<F: Formatter> Mirror<F, RedisBackend> {
    /// Connects to a Redis server and builds an empty mirror of `transport`'s database.
    pub async fn connect(
        transport: &Transport,
        formatter: F,
        mut options: MirrorOptions,
    ) -> Result<Self> {
        options.db_index = transport.db();
        let backend = RedisBackend::connect(transport).await?;
        Ok(Self::with_backend(backend, formatter, options))
    }
}

impl<F: Formatter, B: Backend> Mirror<F, B> {
    /// Builds an empty mirror over any backend.
    pub fn with_backend(backend: B, formatter: F, options: MirrorOptions) -> Self {
        let (state, _) = watch::channel(SubscriberState::Disconnected);
        Self {
            backend: Arc::new(backend),
            store: Arc::new(MirrorStore::new()),
            formatter: Arc::new(formatter),
            stats: Arc::new(MirrorStats::new()),
            state: Arc::new(state),
            options,
        }
    }

    // == Get ==
    /// Read-through lookup.
    ///
    /// A hit is answered locally. A miss queries the backing store and caches
    /// the value; a key absent upstream yields [`MirrorError::NotFound`] and
    /// leaves the store untouched. Concurrent misses on one key may each
    /// fetch; the last write wins.
    pub async fn get(&self, key: &F::Key) -> Result<F::Value> {
        if let Some(value) = self.store.get(key) {
            self.stats.record_hit();
            return Ok(value);
        }
        self.stats.record_miss();

        let wire_key = self.formatter.from_key(key);
        self.stats.record_remote_fetch();
        match self.backend.get(&wire_key).await? {
            Some(raw) => {
                let value = self.formatter.to_value(&raw)?;
                self.store.set(key.clone(), value.clone());
                debug!(key = %wire_key, "Read-through populated key");
                Ok(value)
            }
            None => {
                self.stats.record_not_found();
                Err(MirrorError::NotFound(wire_key))
            }
        }
    }

    // == Sync ==
    /// Runs a full bootstrap scan. Safe to call again to refresh everything;
    /// every call starts a fresh cursor.
    pub async fn sync(&self) -> Result<SyncReport> {
        BootstrapScanner::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.store),
            Arc::clone(&self.formatter),
            Arc::clone(&self.stats),
            self.options.batch_size,
            self.options.scan_count,
        )
        .scan()
        .await
    }

    // == Process Events ==
    /// Consumes keyevent notifications until `cancel` fires.
    ///
    /// Connection errors are absorbed and trigger a resubscribe; the future
    /// only completes on cancellation.
    pub async fn process_events(&self, cancel: CancellationToken) {
        EventSubscriber::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.store),
            Arc::clone(&self.formatter),
            Arc::clone(&self.stats),
            Arc::clone(&self.state),
            &self.options,
        )
        .run(cancel)
        .await
    }

    // == Accessors ==

    /// The underlying store, e.g. to take a snapshot.
    pub fn store(&self) -> &MirrorStore<F::Key, F::Value> {
        &self.store
    }

    pub fn formatter(&self) -> &F {
        &self.formatter
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current event-loop state.
    pub fn subscriber_state(&self) -> SubscriberState {
        *self.state.borrow()
    }

    /// Receiver notified on every event-loop state change.
    pub fn watch_subscriber_state(&self) -> watch::Receiver<SubscriberState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::format::{IdentityFormatter, ParseFormatter};

    fn mirror(backend: &MemoryBackend) -> Mirror<IdentityFormatter, MemoryBackend> {
        Mirror::with_backend(backend.clone(), IdentityFormatter, MirrorOptions::default())
    }

    #[tokio::test]
    async fn test_get_hit_skips_backend() {
        let backend = MemoryBackend::new();
        let mirror = mirror(&backend);
        mirror.store().set("a".to_string(), "cached".to_string());

        let value = mirror.get(&"a".to_string()).await.unwrap();

        assert_eq!(value, "cached");
        assert_eq!(backend.get_calls(), 0);
        assert_eq!(mirror.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_miss_populates_store() {
        let backend = MemoryBackend::new();
        backend.insert_silent("a", "1");
        let mirror = mirror(&backend);

        assert_eq!(mirror.get(&"a".to_string()).await.unwrap(), "1");
        assert_eq!(mirror.get(&"a".to_string()).await.unwrap(), "1");

        assert_eq!(backend.get_calls(), 1);
        assert!(mirror.store().contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn test_get_absent_key_is_not_found() {
        let backend = MemoryBackend::new();
        let mirror = mirror(&backend);

        let err = mirror.get(&"missing".to_string()).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(mirror.store().is_empty());
        assert_eq!(mirror.stats().not_found, 1);
    }

    #[tokio::test]
    async fn test_get_propagates_transport_error() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        let mirror = mirror(&backend);

        let result = mirror.get(&"a".to_string()).await;
        assert!(matches!(result, Err(MirrorError::Transport(_))));
    }

    #[tokio::test]
    async fn test_get_decode_error_does_not_cache() {
        let backend = MemoryBackend::new();
        backend.insert_silent("n", "twelve");
        let mirror = Mirror::with_backend(
            backend.clone(),
            ParseFormatter::<String, u64>::new(),
            MirrorOptions::default(),
        );

        let result = mirror.get(&"n".to_string()).await;

        assert!(matches!(result, Err(MirrorError::Decode { .. })));
        assert!(mirror.store().is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_state_starts_disconnected() {
        let backend = MemoryBackend::new();
        let mirror = mirror(&backend);
        assert_eq!(mirror.subscriber_state(), SubscriberState::Disconnected);
    }
}
