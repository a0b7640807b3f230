//! Cross-thread suspension signals
//!
//! Each thread has one [`ThreadSignals`], shared with any
//! [`ThreadHandle`](crate::thread::ThreadHandle) given out to other threads.
//! The state is a small machine guarded by a private lock:
//!
//! ```text
//!            sleep()                 park()
//! Sleeping ◄────────── Running ──────────► Parked
//!    │  timeout /         ▲   unpark / interrupt /  │
//!    │  interrupt         │        timeout          │
//!    └────────────────────┴─────────────────────────┘
//! ```
//!
//! plus two flags that survive across states: `interrupted` and the unpark
//! permit. A bounded wake channel carries no data; it only wakes the
//! suspended thread, which then re-reads the flags under the lock.

use crate::{VmError, VmResult};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// What a thread is currently doing, as seen by other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Executing (or blocked somewhere outside sleep/park)
    Running,
    /// Inside `sleep`
    Sleeping,
    /// Inside `park`
    Parked,
}

/// Why `park` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkResult {
    /// An unpark permit was consumed
    Unparked,
    /// The thread has a pending interrupt (the flag is left set)
    Interrupted,
    /// The timeout elapsed
    TimedOut,
}

#[derive(Debug)]
struct SignalState {
    activity: Activity,
    interrupted: bool,
    unpark_permit: bool,
}

/// Sleep / park / interrupt state of one thread
#[derive(Debug)]
pub struct ThreadSignals {
    state: Mutex<SignalState>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl ThreadSignals {
    /// Create signals for a running thread
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            state: Mutex::new(SignalState {
                activity: Activity::Running,
                interrupted: false,
                unpark_permit: false,
            }),
            wake_tx,
            wake_rx,
        }
    }

    /// Current activity
    pub fn activity(&self) -> Activity {
        self.state.lock().activity
    }

    /// Check the interrupt flag, clearing it if `clear` is set
    pub fn interrupted(&self, clear: bool) -> bool {
        let mut state = self.state.lock();
        let was = state.interrupted;
        if clear {
            state.interrupted = false;
        }
        was
    }

    /// Check the interrupt flag without clearing it
    pub fn is_interrupted(&self) -> bool {
        self.interrupted(false)
    }

    /// Set the interrupt flag and wake the thread if it is sleeping or parked
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        if state.activity != Activity::Running {
            self.wake();
        }
    }

    /// Grant the unpark permit and wake the thread if it is parked
    ///
    /// Permits do not accumulate.
    pub fn unpark(&self) {
        let mut state = self.state.lock();
        state.unpark_permit = true;
        if state.activity == Activity::Parked {
            self.wake();
        }
    }

    fn wake(&self) {
        // A full channel already holds a pending wake
        let _ = self.wake_tx.try_send(());
    }

    /// Discard a wake left over from an earlier suspension
    fn drain(&self) {
        while self.wake_rx.try_recv().is_ok() {}
    }

    /// Sleep for `duration`
    ///
    /// # Errors
    ///
    /// Returns `VmError::Interrupted` if the thread is interrupted before or
    /// during the sleep. The interrupt flag is cleared.
    pub fn sleep(&self, duration: Duration) -> VmResult<()> {
        let deadline = Instant::now().checked_add(duration);
        {
            let mut state = self.state.lock();
            if state.interrupted {
                state.interrupted = false;
                return Err(VmError::Interrupted);
            }
            self.drain();
            state.activity = Activity::Sleeping;
        }

        loop {
            let woke = match deadline {
                Some(deadline) => self.wake_rx.recv_deadline(deadline).is_ok(),
                None => self.wake_rx.recv().is_ok(),
            };

            let mut state = self.state.lock();
            if state.interrupted {
                state.interrupted = false;
                state.activity = Activity::Running;
                return Err(VmError::Interrupted);
            }
            if !woke {
                state.activity = Activity::Running;
                return Ok(());
            }
        }
    }

    /// Park until unparked, interrupted, or `timeout` elapses
    ///
    /// Returns immediately if a permit is available (consuming it) or an
    /// interrupt is pending (leaving the flag set).
    pub fn park(&self, timeout: Option<Duration>) -> ParkResult {
        {
            let mut state = self.state.lock();
            if state.unpark_permit {
                state.unpark_permit = false;
                return ParkResult::Unparked;
            }
            if state.interrupted {
                return ParkResult::Interrupted;
            }
            self.drain();
            state.activity = Activity::Parked;
        }

        match timeout {
            Some(timeout) => {
                let _ = self.wake_rx.recv_timeout(timeout);
            }
            None => {
                let _ = self.wake_rx.recv();
            }
        }

        let mut state = self.state.lock();
        state.activity = Activity::Running;
        if state.unpark_permit {
            state.unpark_permit = false;
            ParkResult::Unparked
        } else if state.interrupted {
            ParkResult::Interrupted
        } else {
            ParkResult::TimedOut
        }
    }
}

impl Default for ThreadSignals {
    fn default() -> Self {
        Self::new()
    }
}
