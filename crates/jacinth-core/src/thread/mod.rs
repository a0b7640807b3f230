//! Managed threads
//!
//! A [`Thread`] exclusively owns its call stack, frame cache and program
//! counter; nothing in it is shared except the [`ThreadSignals`] used for
//! sleep, park and interrupt. Other threads reach those through a cloned
//! [`ThreadHandle`].
//!
//! The dispatcher drives a thread through the invocation protocol in
//! [`invoke`]: `invoke_method` to call, `pop_frame` to return or unwind.

mod invoke;
mod signals;

pub use invoke::PoppedFrame;
pub use signals::{Activity, ParkResult, ThreadSignals};

use crate::class::Method;
use crate::frame::{Frame, FrameKind};
use crate::frame_cache::{FrameCache, FrameCacheStats};
use crate::object::{ObjectId, ObjectRef};
use crate::runtime::Runtime;
use crate::stack::CallStack;
use crate::{VmError, VmResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a Thread
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

impl ThreadId {
    /// Generate a new unique ThreadId
    pub fn new() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a ThreadId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        ThreadId(id)
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shareable handle for signaling a thread from elsewhere
#[derive(Debug, Clone)]
pub struct ThreadHandle {
    id: ThreadId,
    signals: Arc<ThreadSignals>,
}

impl ThreadHandle {
    /// Target thread ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Interrupt the thread
    pub fn interrupt(&self) {
        self.signals.interrupt();
    }

    /// Grant the thread an unpark permit
    pub fn unpark(&self) {
        self.signals.unpark();
    }

    /// Check the thread's interrupt flag
    pub fn is_interrupted(&self) -> bool {
        self.signals.is_interrupted()
    }

    /// Current activity of the thread
    pub fn activity(&self) -> Activity {
        self.signals.activity()
    }
}

/// A managed thread of execution
pub struct Thread {
    id: ThreadId,
    pc: usize,
    stack: CallStack,
    frame_cache: FrameCache,
    /// Managed `java/lang/Thread` counterpart (not owned)
    java_thread: Option<ObjectId>,
    signals: Arc<ThreadSignals>,
    runtime: Arc<Runtime>,
}

impl Thread {
    /// Create a thread with the runtime's thread options
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let options = &runtime.options().thread;
        Self {
            id: ThreadId::new(),
            pc: 0,
            stack: CallStack::with_max_depth(options.max_stack_depth),
            frame_cache: FrameCache::new(options.frame_cache_capacity),
            java_thread: None,
            signals: Arc::new(ThreadSignals::new()),
            runtime,
        }
    }

    /// Get the thread ID
    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Get the owning runtime
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Program counter of the current instruction
    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Set the program counter
    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// The managed thread object this thread runs for
    pub fn java_thread(&self) -> Option<ObjectId> {
        self.java_thread
    }

    /// Bind the managed thread object
    pub fn set_java_thread(&mut self, java_thread: Option<&ObjectRef>) {
        self.java_thread = java_thread.map(|obj| obj.id());
    }

    /// Get a handle other threads can use to signal this one
    pub fn handle(&self) -> ThreadHandle {
        ThreadHandle {
            id: self.id,
            signals: Arc::clone(&self.signals),
        }
    }

    /// Suspension signals of this thread
    pub fn signals(&self) -> &ThreadSignals {
        &self.signals
    }

    /// Sleep for `duration`
    ///
    /// # Errors
    ///
    /// Returns `VmError::Interrupted` if interrupted; the flag is cleared.
    pub fn sleep(&self, duration: Duration) -> VmResult<()> {
        self.signals.sleep(duration)
    }

    /// Park until unparked, interrupted, or timed out
    pub fn park(&self, timeout: Option<Duration>) -> ParkResult {
        self.signals.park(timeout)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// The call stack
    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    /// Check if the call stack is empty
    pub fn is_stack_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Frame cache statistics
    pub fn frame_cache_stats(&self) -> FrameCacheStats {
        self.frame_cache.stats()
    }

    /// Create a frame for `method`
    ///
    /// Native methods get a fresh native frame; managed methods get a frame
    /// from the cache.
    pub fn new_frame(&mut self, method: &Arc<Method>) -> Frame {
        if method.is_native() {
            Frame::new(Arc::clone(method), FrameKind::Native)
        } else {
            self.frame_cache.borrow(method)
        }
    }

    /// Push a frame onto the call stack
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackOverflow` if the stack is full. The stack is
    /// unchanged; any exit hooks on `frame` run and the frame is recycled.
    pub fn push_frame(&mut self, mut frame: Frame) -> VmResult<()> {
        if self.stack.is_full() {
            let max_depth = self.stack.max_depth();
            log::warn!(
                "thread {:?}: stack overflow at depth {} calling {:?}",
                self.id,
                max_depth,
                frame.method()
            );
            // Errors are logged by the hook runner; the overflow takes precedence
            let _ = frame.run_exit_hooks();
            self.frame_cache.release(frame);
            return Err(VmError::StackOverflow { max_depth });
        }
        self.stack.push(frame)
    }

    /// Get the current (top) frame
    ///
    /// # Errors
    ///
    /// Returns `VmError::NoCurrentFrame` if the stack is empty.
    pub fn current_frame(&self) -> VmResult<&Frame> {
        self.stack.top().ok_or(VmError::NoCurrentFrame)
    }

    /// Get the current (top) frame mutably
    ///
    /// # Errors
    ///
    /// Returns `VmError::NoCurrentFrame` if the stack is empty.
    pub fn current_frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.stack.top_mut().ok_or(VmError::NoCurrentFrame)
    }

    /// Get the frame N below the top (0 = current)
    ///
    /// # Errors
    ///
    /// Returns `VmError::NoCurrentFrame` if the stack is not that deep.
    pub fn top_frame_n(&self, n: usize) -> VmResult<&Frame> {
        self.stack.top_n(n).ok_or(VmError::NoCurrentFrame)
    }

    /// Visit every object referenced from this thread's frames
    pub fn visit_roots<F>(&self, visitor: F)
    where
        F: FnMut(&ObjectRef),
    {
        self.stack.visit_roots(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{flags, ClassBuilder};
    use crate::runtime::RuntimeOptions;

    #[test]
    fn test_thread_ids_unique() {
        let a = ThreadId::new();
        let b = ThreadId::new();
        assert_ne!(a, b);
        assert_eq!(ThreadId::from_u64(a.as_u64()), a);
    }

    #[test]
    fn test_thread_pc_and_java_thread() {
        let runtime = Runtime::new(RuntimeOptions::default());
        let class = runtime
            .classes()
            .define(ClassBuilder::new("java/lang/Thread").build().unwrap());
        let jthread = runtime.heap().alloc_object(&class).unwrap();
        let mut thread = runtime.new_thread();

        thread.set_pc(42);
        assert_eq!(thread.pc(), 42);

        assert_eq!(thread.java_thread(), None);
        thread.set_java_thread(Some(&jthread));
        assert_eq!(thread.java_thread(), Some(jthread.id()));
        // Back-reference only
        assert_eq!(Arc::strong_count(&jthread), 2);
    }

    #[test]
    fn test_new_frame_kinds() {
        let runtime = Runtime::with_defaults();
        let class = ClassBuilder::new("K")
            .method("m", "()V", flags::ACC_STATIC, 1, 1)
            .native_method("n", "(J)V", flags::ACC_STATIC)
            .build()
            .unwrap();
        let mut thread = runtime.new_thread();

        let managed = thread.new_frame(&class.get_method("m", "()V").unwrap());
        assert_eq!(managed.kind(), FrameKind::Managed);

        let native = thread.new_frame(&class.get_method("n", "(J)V").unwrap());
        assert!(native.is_native());
        assert_eq!(native.locals().len(), 2);
        assert_eq!(native.operand_stack().capacity(), 4);
    }

    #[test]
    fn test_current_frame_on_empty_stack() {
        let runtime = Runtime::with_defaults();
        let mut thread = runtime.new_thread();
        assert!(matches!(thread.current_frame(), Err(VmError::NoCurrentFrame)));
        assert!(thread.current_frame_mut().is_err());
        assert!(thread.top_frame_n(0).is_err());
    }

    #[test]
    fn test_handle_signals_thread() {
        let runtime = Runtime::with_defaults();
        let thread = runtime.new_thread();
        let handle = thread.handle();

        assert_eq!(handle.id(), thread.id());
        handle.interrupt();
        assert!(thread.signals().is_interrupted());
        assert!(matches!(
            thread.sleep(Duration::from_secs(5)),
            Err(VmError::Interrupted)
        ));

        handle.unpark();
        assert_eq!(thread.park(None), ParkResult::Unparked);
        assert_eq!(handle.activity(), Activity::Running);
    }
}
