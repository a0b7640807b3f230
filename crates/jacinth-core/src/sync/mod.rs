//! Synchronization primitives for managed threads
//!
//! Monitors back `synchronized` methods and the locked path of reference
//! field compare-and-swap. Unlike the atomics in [`crate::atomic`], entering
//! a monitor blocks the calling OS thread.

mod guard;
mod monitor;

pub use guard::MonitorGuard;
pub use monitor::{Monitor, MonitorError};
