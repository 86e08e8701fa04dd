//! Cache Module
//!
//! Holds the mirrored entries and the counters describing how they got there.

mod stats;
mod store;


// Re-export public types
pub use stats::{MirrorStats, StatsSnapshot};
pub use store::MirrorStore;
