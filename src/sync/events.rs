//! Event Subscriber
//!
//! Keeps a pattern subscription to the keyevent namespace of one database and
//! applies each notification to the store. The connection lifecycle is an
//! explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Receiving
//!      ^              |             |            |
//!      +--------------+-------------+------------+   (any error)
//!
//! any state -> Terminated                            (cancellation)
//! ```
//!
//! Reconnects are paced by [`Backoff`], and connection attempts are rejected
//! while its breaker is open. Cancellation is observed before every
//! transition and interrupts any wait or in-flight refresh, so `run` returns
//! within one receive timeout of the token being cancelled.

use std::sync::Arc;
use std::time::Duration;

use recloser::Error as RecloserError;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::{Backoff, BackoffConfig, BreakerState};
use crate::backend::{event_kind, keyevent_pattern, Backend, Notification, Subscriber};
use crate::cache::{MirrorStats, MirrorStore};
use crate::config::MirrorOptions;
use crate::format::Formatter;

// == Subscriber State ==
/// Observable position of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
    Terminated,
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Receiving => "receiving",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Loop state, owning the connection while one is held.
enum Phase<S> {
    Disconnected,
    Connecting,
    Subscribed(S),
    Receiving(S),
    Terminated,
}

impl<S> Phase<S> {
    fn state(&self) -> SubscriberState {
        match self {
            Phase::Disconnected => SubscriberState::Disconnected,
            Phase::Connecting => SubscriberState::Connecting,
            Phase::Subscribed(_) => SubscriberState::Subscribed,
            Phase::Receiving(_) => SubscriberState::Receiving,
            Phase::Terminated => SubscriberState::Terminated,
        }
    }
}

// == Key Event ==
/// Event kinds the mirror reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    /// TTL changed on a live key: refresh the value
    Expire,
    /// TTL ran out: drop the key
    Expired,
    /// Key deleted: drop the key
    Del,
    /// Anything else is ignored
    Other(String),
}

impl KeyEvent {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "expire" => KeyEvent::Expire,
            "expired" => KeyEvent::Expired,
            "del" => KeyEvent::Del,
            other => KeyEvent::Other(other.to_string()),
        }
    }

    /// Reads the event kind from a keyevent channel name.
    pub fn from_channel(channel: &str) -> Option<Self> {
        event_kind(channel).map(Self::parse)
    }
}

// == Event Subscriber ==
pub struct EventSubscriber<F: Formatter, B: Backend> {
    backend: Arc<B>,
    store: Arc<MirrorStore<F::Key, F::Value>>,
    formatter: Arc<F>,
    stats: Arc<MirrorStats>,
    state: Arc<watch::Sender<SubscriberState>>,
    pattern: String,
    receive_timeout: Duration,
    backoff: Backoff,
    subscribed_before: bool,
}

impl<F: Formatter, B: Backend> EventSubscriber<F, B> {
    pub fn new(
        backend: Arc<B>,
        store: Arc<MirrorStore<F::Key, F::Value>>,
        formatter: Arc<F>,
        stats: Arc<MirrorStats>,
        state: Arc<watch::Sender<SubscriberState>>,
        options: &MirrorOptions,
    ) -> Self {
        let backoff = match options.backoff.validate() {
            Ok(()) => options.backoff.clone(),
            Err(e) => {
                warn!(error = %e, "Invalid backoff configuration, using defaults");
                BackoffConfig::default()
            }
        };
        Self {
            backend,
            store,
            formatter,
            stats,
            state,
            pattern: keyevent_pattern(options.db_index),
            receive_timeout: options.receive_timeout,
            backoff: Backoff::new(backoff),
            subscribed_before: false,
        }
    }

    /// Runs the state machine until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(pattern = %self.pattern, "Event subscriber starting");
        let mut phase: Phase<B::Subscriber> = Phase::Disconnected;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.state.send_replace(phase.state());
            phase = match phase {
                Phase::Disconnected => self.wait_to_reconnect(&cancel).await,
                Phase::Connecting => self.connect(&cancel).await,
                Phase::Subscribed(conn) => self.subscribe(conn, &cancel).await,
                Phase::Receiving(conn) => self.receive(conn, &cancel).await,
                Phase::Terminated => break,
            };
        }

        // Releases the connection if one is still held.
        drop(phase);
        self.state.send_replace(SubscriberState::Terminated);
        info!("Event subscriber terminated");
    }

    // == Transitions ==

    /// Disconnected: wait out the backoff delay, then connect.
    async fn wait_to_reconnect(&self, cancel: &CancellationToken) -> Phase<B::Subscriber> {
        let Some(delay) = self.backoff.delay() else {
            return Phase::Connecting;
        };
        if self.backoff.state() == BreakerState::Open {
            warn!(
                failures = self.backoff.failures(),
                wait_ms = delay.as_millis() as u64,
                "Reconnect breaker open"
            );
        } else {
            debug!(
                failures = self.backoff.failures(),
                wait_ms = delay.as_millis() as u64,
                "Waiting before reconnect"
            );
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Phase::Terminated,
            _ = tokio::time::sleep(delay) => Phase::Connecting,
        }
    }

    /// Connecting: acquire a dedicated connection.
    async fn connect(&mut self, cancel: &CancellationToken) -> Phase<B::Subscriber> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.backoff.call(self.backend.subscriber()) => Some(result),
        };

        match outcome {
            None => Phase::Terminated,
            Some(Ok(conn)) => Phase::Subscribed(conn),
            Some(Err(RecloserError::Rejected)) => {
                debug!("Connection attempt rejected, breaker open");
                Phase::Disconnected
            }
            Some(Err(RecloserError::Inner(e))) => {
                warn!(error = %e, "Failed to acquire subscription connection");
                Phase::Disconnected
            }
        }
    }

    /// Subscribed: issue the pattern subscription on the held connection.
    async fn subscribe(
        &mut self,
        mut conn: B::Subscriber,
        cancel: &CancellationToken,
    ) -> Phase<B::Subscriber> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.backoff.call(conn.psubscribe(&self.pattern)) => Some(result),
        };

        match outcome {
            None => Phase::Terminated,
            Some(Ok(())) => {
                if self.subscribed_before {
                    self.stats.record_reconnect();
                    info!(pattern = %self.pattern, "Resubscribed to keyevent notifications");
                } else {
                    info!(pattern = %self.pattern, "Subscribed to keyevent notifications");
                }
                self.subscribed_before = true;
                Phase::Receiving(conn)
            }
            Some(Err(RecloserError::Rejected)) => {
                debug!("Subscription attempt rejected, breaker open");
                Phase::Disconnected
            }
            Some(Err(RecloserError::Inner(e))) => {
                warn!(error = %e, pattern = %self.pattern, "Failed to subscribe");
                Phase::Disconnected
            }
        }
    }

    /// Receiving: wait up to one receive timeout for the next notification.
    async fn receive(
        &mut self,
        mut conn: B::Subscriber,
        cancel: &CancellationToken,
    ) -> Phase<B::Subscriber> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = timeout(self.receive_timeout, conn.receive()) => Some(result),
        };

        match outcome {
            None => Phase::Terminated,
            // Quiet period, the connection is healthy.
            Some(Err(_elapsed)) => {
                self.backoff.reset();
                Phase::Receiving(conn)
            }
            Some(Ok(Ok(notification))) => {
                self.backoff.reset();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Phase::Terminated,
                    _ = self.dispatch(notification) => Phase::Receiving(conn),
                }
            }
            Some(Ok(Err(e))) => {
                warn!(error = %e, "Subscription connection lost");
                self.backoff.record_failure();
                Phase::Disconnected
            }
        }
    }

    // == Dispatch ==

    /// Applies one notification to the store.
    async fn dispatch(&self, notification: Notification) {
        self.stats.record_event_received();
        let Notification { channel, payload } = notification;

        let event = match KeyEvent::from_channel(&channel) {
            Some(KeyEvent::Other(kind)) => {
                debug!(event = %kind, key = %payload, "Ignoring event");
                self.stats.record_event_ignored();
                return;
            }
            Some(event) => event,
            None => {
                debug!(channel = %channel, "Ignoring message on unexpected channel");
                self.stats.record_event_ignored();
                return;
            }
        };

        let key = match self.formatter.to_key(&payload) {
            Ok(key) => key,
            Err(e) => {
                error!(error = %e, channel = %channel, "Rejected notification");
                self.stats.record_decode_error();
                return;
            }
        };

        debug!(event = ?event, key = %payload, "Applying event");
        match event {
            KeyEvent::Expire => self.refresh(key, &payload).await,
            KeyEvent::Expired | KeyEvent::Del => {
                self.store.delete(&key);
                self.stats.record_event_applied();
            }
            KeyEvent::Other(_) => {}
        }
    }

    /// Re-reads a key whose TTL changed.
    ///
    /// A transport failure keeps the current entry; it stays stale until the
    /// next event or resync for that key.
    async fn refresh(&self, key: F::Key, wire_key: &str) {
        self.stats.record_remote_fetch();
        match self.backend.get(wire_key).await {
            Ok(Some(raw)) => match self.formatter.to_value(&raw) {
                Ok(value) => {
                    self.store.set(key, value);
                    self.stats.record_event_applied();
                }
                Err(e) => {
                    error!(error = %e, key = %wire_key, "Rejected refreshed value");
                    self.stats.record_decode_error();
                }
            },
            Ok(None) => {
                self.store.delete(&key);
                self.stats.record_event_applied();
            }
            Err(e) => {
                warn!(error = %e, key = %wire_key, "Refresh failed, keeping stale entry");
                self.stats.record_refresh_failure();
            }
        }
    }
}
