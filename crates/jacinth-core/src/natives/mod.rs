//! Native method table
//!
//! Native methods are plain functions keyed by `(class, name, descriptor)`.
//! [`Thread::call_native`](crate::thread::Thread::call_native) looks up the
//! entry for the current native frame and runs it with a [`NativeCall`],
//! which gives access to that frame's locals (the arguments) and operand
//! stack (the return value).

mod unsafe_cas;

use crate::frame::Frame;
use crate::runtime::Runtime;
use crate::thread::ThreadId;
use crate::VmResult;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Signature of a native method implementation
pub type NativeFn = fn(&mut NativeCall<'_>) -> VmResult<()>;

type NativeKey = (String, String, String);

/// Execution context handed to a native method
pub struct NativeCall<'a> {
    frame: &'a mut Frame,
    thread: ThreadId,
    runtime: &'a Runtime,
}

impl<'a> NativeCall<'a> {
    pub(crate) fn new(frame: &'a mut Frame, thread: ThreadId, runtime: &'a Runtime) -> Self {
        Self {
            frame,
            thread,
            runtime,
        }
    }

    /// The native frame (arguments in its locals)
    pub fn frame(&mut self) -> &mut Frame {
        self.frame
    }

    /// Calling thread
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Owning runtime
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }
}

/// Registry of native method implementations
pub struct NativeRegistry {
    methods: RwLock<FxHashMap<NativeKey, NativeFn>>,
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(FxHashMap::default()),
        }
    }

    /// Create a registry holding the built-in natives
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        unsafe_cas::register(&registry);
        registry
    }

    /// Register (or replace) the implementation of a native method
    pub fn register(&self, class: &str, name: &str, descriptor: &str, native: NativeFn) {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        if self.methods.write().insert(key, native).is_some() {
            log::debug!("native {}.{}{} replaced", class, name, descriptor);
        }
    }

    /// Look up a native method
    pub fn resolve(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        self.methods.read().get(&key).copied()
    }

    /// Number of registered natives
    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    /// Check if no natives are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
