//! Bootstrap Scanner
//!
//! Walks the whole keyspace with a server-side cursor, fetches values in
//! fixed-size MGET batches and fills the store. Runs on the caller's task,
//! one batch in flight at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::cache::{MirrorStats, MirrorStore};
use crate::error::{MirrorError, Result};
use crate::format::Formatter;

// == Key Scan ==
/// Lazy, finite sequence of wire keys driven by `SCAN`.
///
/// Not snapshot-consistent: keys written or removed during the walk may or
/// may not be reported. Build a new one to restart from the beginning.
pub struct KeyScan<'a, B: Backend> {
    backend: &'a B,
    count: usize,
    cursor: u64,
    buffered: std::vec::IntoIter<String>,
    finished: bool,
}

impl<'a, B: Backend> KeyScan<'a, B> {
    pub fn new(backend: &'a B, count: usize) -> Self {
        Self {
            backend,
            count: count.max(1),
            cursor: 0,
            buffered: Vec::new().into_iter(),
            finished: false,
        }
    }

    /// Next key, fetching pages as needed. `Ok(None)` ends the sequence.
    pub async fn next_key(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(key) = self.buffered.next() {
                return Ok(Some(key));
            }
            if self.finished {
                return Ok(None);
            }
            let page = self.backend.scan(self.cursor, self.count).await?;
            self.cursor = page.cursor;
            self.finished = page.cursor == 0;
            self.buffered = page.keys.into_iter();
        }
    }
}

// == Sync Report ==
/// Outcome of one full bootstrap scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Keys enumerated by the cursor
    pub scanned: u64,
    /// Keys that still had a value when fetched
    pub stored: u64,
    /// MGET round-trips issued
    pub batches: u64,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

// == Bootstrap Scanner ==
pub struct BootstrapScanner<F: Formatter, B: Backend> {
    backend: Arc<B>,
    store: Arc<MirrorStore<F::Key, F::Value>>,
    formatter: Arc<F>,
    stats: Arc<MirrorStats>,
    batch_size: usize,
    scan_count: usize,
}

impl<F: Formatter, B: Backend> BootstrapScanner<F, B> {
    pub fn new(
        backend: Arc<B>,
        store: Arc<MirrorStore<F::Key, F::Value>>,
        formatter: Arc<F>,
        stats: Arc<MirrorStats>,
        batch_size: usize,
        scan_count: usize,
    ) -> Self {
        Self {
            backend,
            store,
            formatter,
            stats,
            batch_size: batch_size.max(1),
            scan_count: scan_count.max(1),
        }
    }

    /// Runs one full scan. Any transport, decode or protocol error aborts it.
    pub async fn scan(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();
        let mut keys = KeyScan::new(self.backend.as_ref(), self.scan_count);
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(key) = keys.next_key().await? {
            report.scanned += 1;
            batch.push(key);
            if batch.len() == self.batch_size {
                report.stored += self.fetch_and_store(&batch).await?;
                report.batches += 1;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            report.stored += self.fetch_and_store(&batch).await?;
            report.batches += 1;
        }

        report.elapsed = started.elapsed();
        self.stats.record_sync(report.stored);
        info!(
            scanned = report.scanned,
            stored = report.stored,
            batches = report.batches,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Bootstrap scan complete"
        );
        Ok(report)
    }

    /// Fetches one batch and stores every key that still has a value.
    ///
    /// The whole batch is decoded before anything is written.
    async fn fetch_and_store(&self, keys: &[String]) -> Result<u64> {
        let values = self.backend.mget(keys).await?;
        if values.len() != keys.len() {
            return Err(MirrorError::Protocol(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        let mut decoded = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            // Absent here means the key vanished between SCAN and MGET.
            let Some(value) = value else {
                debug!(key = %key, "Key gone before fetch");
                continue;
            };
            decoded.push((self.formatter.to_key(key)?, self.formatter.to_value(&value)?));
        }

        let stored = decoded.len() as u64;
        for (key, value) in decoded {
            self.store.set(key, value);
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::format::{IdentityFormatter, ParseFormatter};

    fn scanner<F: Formatter>(
        backend: &MemoryBackend,
        formatter: F,
        batch_size: usize,
    ) -> (BootstrapScanner<F, MemoryBackend>, Arc<MirrorStore<F::Key, F::Value>>) {
        let store = Arc::new(MirrorStore::new());
        let scanner = BootstrapScanner::new(
            Arc::new(backend.clone()),
            Arc::clone(&store),
            Arc::new(formatter),
            Arc::new(MirrorStats::new()),
            batch_size,
            4,
        );
        (scanner, store)
    }

    #[tokio::test]
    async fn test_key_scan_yields_all_keys() {
        let backend = MemoryBackend::new();
        for i in 0..9 {
            backend.insert_silent(&format!("k{}", i), "v");
        }

        let mut scan = KeyScan::new(&backend, 4);
        let mut count = 0;
        while let Some(_key) = scan.next_key().await.unwrap() {
            count += 1;
        }

        assert_eq!(count, 9);
        assert_eq!(scan.next_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_batches_and_flushes_remainder() {
        let backend = MemoryBackend::new();
        for i in 0..23 {
            backend.insert_silent(&format!("key{:02}", i), &i.to_string());
        }
        let (scanner, store) = scanner(&backend, IdentityFormatter, 10);

        let report = scanner.scan().await.unwrap();

        assert_eq!(report.scanned, 23);
        assert_eq!(report.stored, 23);
        assert_eq!(report.batches, 3);
        assert_eq!(backend.mget_calls(), 3);
        assert_eq!(store.len(), 23);
        assert_eq!(store.get(&"key07".to_string()), Some("7".to_string()));
    }

    #[tokio::test]
    async fn test_scan_empty_keyspace() {
        let backend = MemoryBackend::new();
        let (scanner, store) = scanner(&backend, IdentityFormatter, 10);

        let report = scanner.scan().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(backend.mget_calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_rejects_short_mget() {
        let backend = MemoryBackend::new();
        backend.insert_silent("a", "1");
        backend.insert_silent("b", "2");
        backend.set_short_mget(true);
        let (scanner, store) = scanner(&backend, IdentityFormatter, 10);

        let result = scanner.scan().await;

        assert!(matches!(result, Err(MirrorError::Protocol(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_decode_error_rejects_whole_batch() {
        let backend = MemoryBackend::new();
        backend.insert_silent("a", "1");
        backend.insert_silent("b", "not-a-number");
        let (scanner, store) = scanner(&backend, ParseFormatter::<String, i64>::new(), 10);

        let result = scanner.scan().await;

        assert!(matches!(result, Err(MirrorError::Decode { .. })));
        assert!(!store.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn test_scan_propagates_transport_error() {
        let backend = MemoryBackend::new();
        backend.insert_silent("a", "1");
        backend.set_unavailable(true);
        let (scanner, _store) = scanner(&backend, IdentityFormatter, 10);

        assert!(matches!(
            scanner.scan().await,
            Err(MirrorError::Transport(_))
        ));
    }
}
