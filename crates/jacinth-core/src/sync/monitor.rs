//! Reentrant thread-aware monitor

use crate::sync::MonitorGuard;
use crate::thread::ThreadId;
use parking_lot::{Condvar, Mutex};

/// Errors that can occur when using a Monitor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// Exit called by a thread that does not hold the monitor
    #[error("Monitor exit by non-owner thread {thread:?} (owner: {owner:?})")]
    NotOwner {
        /// Thread that attempted the exit
        thread: ThreadId,
        /// Current owner, if any
        owner: Option<ThreadId>,
    },
}

#[derive(Debug, Default)]
struct MonitorState {
    /// Current owner thread (None if free)
    owner: Option<ThreadId>,
    /// Recursion count of the owner
    entries: usize,
    /// Threads blocked in `enter`
    waiters: usize,
}

/// Reentrant monitor associated with an object or a class
///
/// Blocks the calling OS thread until the monitor is available. The owning
/// thread may enter again; each `enter` must be matched by one `exit`.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    released: Condvar,
}

impl Monitor {
    /// Create a free monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the monitor, blocking until it is available
    ///
    /// Reentrant: if `thread` already holds the monitor the recursion count
    /// is incremented.
    pub fn enter(&self, thread: ThreadId) {
        let mut state = self.state.lock();
        if state.owner == Some(thread) {
            state.entries += 1;
            return;
        }

        if let Some(owner) = state.owner {
            log::debug!("thread {:?} blocked on monitor held by {:?}", thread, owner);
        }
        while state.owner.is_some() {
            state.waiters += 1;
            self.released.wait(&mut state);
            state.waiters -= 1;
        }

        state.owner = Some(thread);
        state.entries = 1;
    }

    /// Acquire the monitor without blocking
    ///
    /// Returns `false` if another thread holds it.
    pub fn try_enter(&self, thread: ThreadId) -> bool {
        let mut state = self.state.lock();
        match state.owner {
            Some(owner) if owner == thread => {
                state.entries += 1;
                true
            }
            Some(_) => false,
            None => {
                state.owner = Some(thread);
                state.entries = 1;
                true
            }
        }
    }

    /// Release one level of ownership
    ///
    /// When the recursion count reaches zero the monitor is freed and one
    /// blocked thread is woken.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::NotOwner` if `thread` does not hold the monitor.
    pub fn exit(&self, thread: ThreadId) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread) {
            return Err(MonitorError::NotOwner {
                thread,
                owner: state.owner,
            });
        }

        state.entries -= 1;
        if state.entries == 0 {
            state.owner = None;
            if state.waiters > 0 {
                self.released.notify_one();
            }
        }
        Ok(())
    }

    /// Acquire the monitor and return a guard that exits on drop
    pub fn enter_guard(&self, thread: ThreadId) -> MonitorGuard<'_> {
        self.enter(thread);
        MonitorGuard::new(self, thread)
    }

    /// Check current owner
    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    /// Recursion count of the current owner (0 when free)
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries
    }

    /// Number of threads blocked in `enter`
    pub fn waiting_count(&self) -> usize {
        self.state.lock().waiters
    }

    /// Check if the monitor is held
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Check if held by a specific thread
    pub fn is_held_by(&self, thread: ThreadId) -> bool {
        self.state.lock().owner == Some(thread)
    }
}
