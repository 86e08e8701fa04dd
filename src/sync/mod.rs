//! Sync Module
//!
//! The two ways the mirror learns about the backing store: a full bootstrap
//! scan and the live keyevent subscription.

mod backoff;
mod events;
mod scanner;

pub use backoff::{Backoff, BackoffConfig, BreakerState};
pub use events::{EventSubscriber, KeyEvent, SubscriberState};
pub use scanner::{BootstrapScanner, KeyScan, SyncReport};
