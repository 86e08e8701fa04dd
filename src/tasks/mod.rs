//! Background Tasks Module
//!
//! Long-running tasks that keep the mirror coherent while the process runs.
//!
//! # Tasks
//! - Event processing: applies keyevent notifications as they arrive
//! - Resync: re-runs the bootstrap scan at a configured interval

mod events;
mod resync;

pub use events::spawn_event_task;
pub use resync::spawn_resync_task;
