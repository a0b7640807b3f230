//! RAII guard for automatic monitor exit

use crate::sync::{Monitor, MonitorError};
use crate::thread::ThreadId;

/// RAII guard for Monitor (exits on drop)
///
/// One guard accounts for exactly one `enter`, so nested guards on a
/// reentrant monitor unwind one level each.
pub struct MonitorGuard<'a> {
    /// Reference to the monitor
    monitor: &'a Monitor,
    /// Thread that entered the monitor
    thread: ThreadId,
    /// Whether the guard has been manually released
    released: bool,
}

impl<'a> MonitorGuard<'a> {
    /// Create a new monitor guard
    ///
    /// The caller must have entered `monitor` on behalf of `thread`.
    pub(crate) fn new(monitor: &'a Monitor, thread: ThreadId) -> Self {
        Self {
            monitor,
            thread,
            released: false,
        }
    }

    /// Release the monitor early (before drop)
    pub fn release(mut self) -> Result<(), MonitorError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.monitor.exit(self.thread)
    }

    /// Thread holding this guard
    pub fn thread(&self) -> ThreadId {
        self.thread
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            // Ignore any errors on drop - we're already cleaning up
            let _ = self.monitor.exit(self.thread);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_guard_auto_exit() {
        let monitor = Monitor::new();
        let t = ThreadId::new();

        {
            let _guard = monitor.enter_guard(t);
            assert!(monitor.is_held_by(t));
        } // Guard dropped here

        assert!(!monitor.is_locked());
    }

    #[test]
    fn test_monitor_guard_manual_release() {
        let monitor = Monitor::new();
        let t = ThreadId::new();

        let guard = monitor.enter_guard(t);
        assert_eq!(guard.thread(), t);
        guard.release().unwrap();
        assert!(!monitor.is_locked());
    }

    #[test]
    fn test_nested_guards_unwind_one_level_each() {
        let monitor = Monitor::new();
        let t = ThreadId::new();

        let outer = monitor.enter_guard(t);
        {
            let _inner = monitor.enter_guard(t);
            assert_eq!(monitor.entry_count(), 2);
        }
        assert_eq!(monitor.entry_count(), 1);
        drop(outer);
        assert!(!monitor.is_locked());
    }
}
