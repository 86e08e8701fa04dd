//! In-process backing store.
//!
//! Behaves like a single Redis database with keyevent notifications enabled:
//! every mutation publishes `set`, `del`, `expire` or `expired` on
//! `__keyevent@<db>__:<event>`. Faults can be injected to exercise the
//! mirror's failure handling without a server.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::{keyevent_channel, Backend, Notification, ScanPage, Subscriber};
use crate::error::{MirrorError, Result};

struct Registration {
    pattern: String,
    tx: mpsc::UnboundedSender<Notification>,
}

#[derive(Default)]
struct Inner {
    db: i64,
    data: RwLock<BTreeMap<String, String>>,
    registrations: Mutex<Vec<Registration>>,
    /// Open scan cursors, each mapped to the last key it returned
    cursors: Mutex<HashMap<u64, String>>,
    next_cursor: AtomicU64,
    get_delay_ms: AtomicU64,
    connect_failures: AtomicUsize,
    unavailable: AtomicBool,
    short_mget: AtomicBool,
    get_calls: AtomicUsize,
    mget_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    subscribe_count: AtomicUsize,
}

impl Inner {
    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MirrorError::Transport("backing store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Cloneable handle to an in-memory database. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Creates an empty database with index 0.
    pub fn new() -> Self {
        Self::with_db(0)
    }

    /// Creates an empty database publishing on the namespace of `db`.
    pub fn with_db(db: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                ..Inner::default()
            }),
        }
    }

    // == Data ==

    /// Writes `key` and publishes `set`.
    pub fn set(&self, key: &str, value: &str) {
        self.insert_silent(key, value);
        self.publish("set", key);
    }

    /// Removes `key` and publishes `del` if it existed.
    pub fn delete(&self, key: &str) -> bool {
        let existed = self.remove_silent(key);
        if existed {
            self.publish("del", key);
        }
        existed
    }

    /// Removes `key` as if its TTL ran out and publishes `expired`.
    pub fn expire(&self, key: &str) -> bool {
        let existed = self.remove_silent(key);
        if existed {
            self.publish("expired", key);
        }
        existed
    }

    /// Publishes `expire` for a live key, as an `EXPIRE` command would.
    pub fn touch(&self, key: &str) -> bool {
        let exists = self.inner.data.read().contains_key(key);
        if exists {
            self.publish("expire", key);
        }
        exists
    }

    /// Writes `key` without publishing anything.
    pub fn insert_silent(&self, key: &str, value: &str) {
        self.inner
            .data
            .write()
            .insert(key.to_string(), value.to_string());
    }

    /// Removes `key` without publishing anything.
    pub fn remove_silent(&self, key: &str) -> bool {
        self.inner.data.write().remove(key).is_some()
    }

    /// Current value of `key`.
    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.data.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    // == Notifications ==

    /// Publishes a keyevent notification for `key`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: &str, key: &str) -> usize {
        let channel = keyevent_channel(self.inner.db, event);
        let mut delivered = 0;
        self.inner.registrations.lock().retain(|registration| {
            if !pattern_matches(&registration.pattern, &channel) {
                return !registration.tx.is_closed();
            }
            let sent = registration
                .tx
                .send(Notification::new(channel.clone(), key))
                .is_ok();
            if sent {
                delivered += 1;
            }
            sent
        });
        delivered
    }

    /// Number of live pattern subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut registrations = self.inner.registrations.lock();
        registrations.retain(|registration| !registration.tx.is_closed());
        registrations.len()
    }

    // == Fault Injection ==

    /// Drops every subscription connection server-side.
    pub fn disconnect_subscribers(&self) {
        self.inner.registrations.lock().clear();
    }

    /// Makes the next `n` subscriber connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.connect_failures.store(n, Ordering::SeqCst);
    }

    /// While set, every command and connection attempt fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every GET by `delay`, as a slow server would.
    pub fn set_get_delay(&self, delay: Duration) {
        self.inner
            .get_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// While set, MGET answers one value short of the keys requested.
    pub fn set_short_mget(&self, short: bool) {
        self.inner.short_mget.store(short, Ordering::SeqCst);
    }

    // == Call Counters ==

    pub fn get_calls(&self) -> usize {
        self.inner.get_calls.load(Ordering::SeqCst)
    }

    pub fn mget_calls(&self) -> usize {
        self.inner.mget_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.inner.scan_calls.load(Ordering::SeqCst)
    }

    /// Number of successful PSUBSCRIBE calls so far.
    pub fn subscribe_count(&self) -> usize {
        self.inner.subscribe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Subscriber = MemorySubscriber;

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_calls.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.inner.get_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        self.inner.check_available()?;
        Ok(self.value(key))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.inner.mget_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.check_available()?;
        let data = self.inner.data.read();
        let mut values: Vec<Option<String>> = keys.iter().map(|k| data.get(k).cloned()).collect();
        if self.inner.short_mget.load(Ordering::SeqCst) {
            values.pop();
        }
        Ok(values)
    }

    /// Cursors resume after the last key returned, so a key present for the
    /// whole iteration is reported even if earlier keys are removed.
    async fn scan(&self, cursor: u64, count: usize) -> Result<ScanPage> {
        self.inner.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.check_available()?;
        let resume = if cursor == 0 {
            None
        } else {
            let last = self.inner.cursors.lock().remove(&cursor).ok_or_else(|| {
                MirrorError::Protocol(format!("unknown scan cursor {}", cursor))
            })?;
            Some(last)
        };

        let data = self.inner.data.read();
        let lower = match &resume {
            Some(last) => Bound::Excluded(last.as_str()),
            None => Bound::Unbounded,
        };
        let mut remaining = data
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(key, _)| key);
        let keys: Vec<String> = remaining.by_ref().take(count.max(1)).cloned().collect();
        let more = remaining.next().is_some();

        let cursor = match keys.last() {
            Some(last) if more => {
                let id = self.inner.next_cursor.fetch_add(1, Ordering::SeqCst) + 1;
                self.inner.cursors.lock().insert(id, last.clone());
                id
            }
            _ => 0,
        };
        Ok(ScanPage { cursor, keys })
    }

    async fn subscriber(&self) -> Result<MemorySubscriber> {
        self.inner.check_available()?;
        let failed = self
            .inner
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(MirrorError::Transport("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(MemorySubscriber {
            inner: Arc::clone(&self.inner),
            pending: Some(tx),
            rx,
        })
    }
}

/// Subscription connection to a [`MemoryBackend`].
pub struct MemorySubscriber {
    inner: Arc<Inner>,
    pending: Option<mpsc::UnboundedSender<Notification>>,
    rx: mpsc::UnboundedReceiver<Notification>,
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn psubscribe(&mut self, pattern: &str) -> Result<()> {
        self.inner.check_available()?;
        let tx = self
            .pending
            .take()
            .ok_or_else(|| MirrorError::Protocol("connection already subscribed".to_string()))?;
        self.inner.registrations.lock().push(Registration {
            pattern: pattern.to_string(),
            tx,
        });
        self.inner.subscribe_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Notification> {
        if self.pending.is_some() {
            return Err(MirrorError::Protocol(
                "receive on a connection with no subscription".to_string(),
            ));
        }
        self.rx.recv().await.ok_or(MirrorError::ConnectionClosed)
    }
}

/// Glob match supporting `*` as "any run of characters".
fn pattern_matches(pattern: &str, channel: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == channel,
        Some((head, rest)) => {
            let Some(tail) = channel.strip_prefix(head) else {
                return false;
            };
            if rest.is_empty() {
                return true;
            }
            (0..=tail.len())
                .filter(|&i| tail.is_char_boundary(i))
                .any(|i| pattern_matches(rest, &tail[i..]))
        }
    }
}
