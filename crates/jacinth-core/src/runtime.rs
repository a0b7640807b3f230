//! Runtime configuration and shared state
//!
//! A [`Runtime`] is shared by every [`Thread`] it creates. It owns the heap,
//! the class registry and the native method table.

use crate::class::ClassRegistry;
use crate::heap::Heap;
use crate::natives::NativeRegistry;
use crate::stack::DEFAULT_MAX_DEPTH;
use crate::thread::Thread;
use std::sync::Arc;

/// Default number of frames pooled per thread
pub const DEFAULT_FRAME_CACHE_CAPACITY: usize = 16;

/// Per-thread limits
#[derive(Debug, Clone)]
pub struct ThreadOptions {
    /// Maximum call depth before a stack overflow
    pub max_stack_depth: usize,

    /// Maximum number of retired frames kept for reuse
    pub frame_cache_capacity: usize,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_DEPTH,
            frame_cache_capacity: DEFAULT_FRAME_CACHE_CAPACITY,
        }
    }
}

impl ThreadOptions {
    /// Options with a specific call depth limit
    pub fn with_max_stack_depth(max_stack_depth: usize) -> Self {
        Self {
            max_stack_depth,
            ..Default::default()
        }
    }

    /// Options with a specific frame cache capacity
    pub fn with_frame_cache_capacity(frame_cache_capacity: usize) -> Self {
        Self {
            frame_cache_capacity,
            ..Default::default()
        }
    }
}

/// Heap limits
#[derive(Debug, Clone, Default)]
pub struct HeapOptions {
    /// Maximum number of live objects (None = unlimited)
    pub max_objects: Option<usize>,
}

impl HeapOptions {
    /// Unlimited heap
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Heap limited to `max_objects` live objects
    pub fn with_max_objects(max_objects: usize) -> Self {
        Self {
            max_objects: Some(max_objects),
        }
    }
}

/// Options for creating a Runtime
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Thread limits
    pub thread: ThreadOptions,

    /// Heap limits
    pub heap: HeapOptions,
}

/// Shared runtime state
pub struct Runtime {
    options: RuntimeOptions,
    heap: Heap,
    classes: ClassRegistry,
    natives: NativeRegistry,
}

impl Runtime {
    /// Create a runtime with the built-in natives registered
    pub fn new(options: RuntimeOptions) -> Arc<Self> {
        Arc::new(Self {
            heap: Heap::new(&options.heap),
            classes: ClassRegistry::new(),
            natives: NativeRegistry::with_builtins(),
            options,
        })
    }

    /// Create a runtime with default options
    pub fn with_defaults() -> Arc<Self> {
        Self::new(RuntimeOptions::default())
    }

    /// Create a thread bound to this runtime
    pub fn new_thread(self: &Arc<Self>) -> Thread {
        Thread::new(Arc::clone(self))
    }

    /// Runtime options
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Object heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Class registry
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Native method table
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }
}
