//! Jacinth VM Execution Core
//!
//! This crate provides the per-thread execution machinery of the Jacinth JVM:
//! - Slot storage for objects, arrays and frames
//! - Reentrant object/class monitors
//! - Compare-and-swap primitives over object and array storage
//! - Frames, the per-thread frame cache and the bounded call stack
//! - Threads and the method invocation protocol
//!
//! Bytecode dispatch, class file parsing and garbage collection live outside
//! this crate. The [`class`] and [`heap`] modules carry just enough of those
//! collaborators to drive the core.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod atomic;
pub mod class;
pub mod descriptor;
pub mod frame;
pub mod frame_cache;
pub mod heap;
pub mod natives;
pub mod object;
pub mod runtime;
pub mod stack;
pub mod sync;
pub mod thread;
pub mod value;

pub use atomic::{AtomicError, CasKind};
pub use class::{Class, ClassBuilder, ClassRegistry, FieldInfo, FieldKind, Method};
pub use descriptor::{FieldType, MethodDescriptor};
pub use frame::{ExitHook, Frame, FrameKind, LocalVars, OperandStack};
pub use frame_cache::{FrameCache, FrameCacheStats, FrameShape};
pub use heap::Heap;
pub use natives::{NativeCall, NativeFn, NativeRegistry};
pub use object::{ArrayStorage, AtomicRef, FieldSlot, Object, ObjectId, ObjectRef, Storage};
pub use runtime::{HeapOptions, Runtime, RuntimeOptions, ThreadOptions};
pub use stack::{CallStack, StackStats};
pub use sync::{Monitor, MonitorError, MonitorGuard};
pub use thread::{Activity, ParkResult, PoppedFrame, Thread, ThreadHandle, ThreadId};
pub use value::{Slot, SlotKind};

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Call stack exceeded its configured depth
    #[error("Stack overflow (max depth {max_depth})")]
    StackOverflow {
        /// Configured maximum number of frames
        max_depth: usize,
    },

    /// An operation needed a frame but the call stack is empty
    #[error("No current frame")]
    NoCurrentFrame,

    /// Operand stack push beyond the method's max stack
    #[error("Operand stack overflow (capacity {capacity})")]
    OperandStackOverflow {
        /// Operand stack capacity of the frame
        capacity: usize,
    },

    /// Operand stack pop on an empty stack
    #[error("Operand stack underflow")]
    OperandStackUnderflow,

    /// Local variable index past the method's max locals
    #[error("Local variable index {index} out of bounds (max {len})")]
    LocalIndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Number of local slots
        len: usize,
    },

    /// Null pointer exception
    #[error("Null pointer exception")]
    NullPointer,

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Field offset or array index out of bounds
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Length of the storage
        len: usize,
    },

    /// Negative or otherwise unusable raw storage offset
    #[error("Invalid storage offset {0}")]
    InvalidOffset(i64),

    /// Malformed field or method descriptor
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Class is not defined in the registry
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Field lookup failed
    #[error("Field not found: {class}.{name}")]
    FieldNotFound {
        /// Class searched
        class: String,
        /// Field name
        name: String,
    },

    /// Method lookup failed
    #[error("Method not found: {class}.{name}{descriptor}")]
    MethodNotFound {
        /// Class searched
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// The class that declared a method has been dropped
    #[error("Class unloaded: {0}")]
    ClassUnloaded(String),

    /// Allocation refused by the heap limit
    #[error("Heap exhausted (limit {limit} objects)")]
    HeapExhausted {
        /// Configured object limit
        limit: usize,
    },

    /// No native implementation is registered for a native method
    #[error("Native method not bound: {class}.{name}{descriptor}")]
    NativeNotFound {
        /// Declaring class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// A sleeping thread was interrupted
    #[error("Thread interrupted")]
    Interrupted,

    /// Monitor misuse
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// Unsupported or out-of-bounds atomic operation
    #[error(transparent)]
    Atomic(#[from] AtomicError),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
