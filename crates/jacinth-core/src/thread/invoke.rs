//! Method invocation protocol
//!
//! `invoke_method` performs one call:
//!
//! 1. Obtain the callee frame (native frame, or one from the frame cache).
//! 2. Move `arg_slot_count` slots off the caller's operand stack into the
//!    callee's first locals, leaving the caller's cells empty.
//! 3. For synchronized methods, enter the class monitor (static) or the
//!    receiver's monitor (local 0) and register an exit hook releasing it.
//! 4. Push the callee.
//!
//! `pop_frame` runs the exit hooks of the top frame exactly once and
//! recycles it, so a synchronized method's monitor is released on every
//! path that removes its frame.

use super::Thread;
use crate::class::Method;
use crate::frame::{self, Frame, FrameKind};
use crate::natives::NativeCall;
use crate::object::ObjectRef;
use crate::sync::Monitor;
use crate::value::Slot;
use crate::{VmError, VmResult};
use std::sync::Arc;

const SYSTEM_CLASS: &str = "java/lang/System";
const PRINT_STREAM: &str = "Ljava/io/PrintStream;";
const PRINT_STACK_TRACE: (&str, &str) = ("printStackTrace", "(Ljava/io/PrintStream;)V");

/// Record of a frame removed by [`Thread::pop_frame`]
///
/// The frame itself has already been cleared and returned to the cache.
#[derive(Debug, Clone)]
pub struct PoppedFrame {
    /// Method the frame was executing
    pub method: Arc<Method>,
    /// Kind of the frame
    pub kind: FrameKind,
    /// Resume program counter stored in the frame
    pub next_pc: usize,
}

impl Thread {
    /// Invoke `method`, taking its arguments from the current frame
    ///
    /// # Errors
    ///
    /// - `VmError::StackOverflow` if the call stack is full (nothing is
    ///   consumed from the caller)
    /// - `VmError::NullPointer` for a synchronized instance method called on
    ///   null
    /// - `VmError::NoCurrentFrame` / `VmError::OperandStackUnderflow` if the
    ///   caller cannot supply the arguments
    pub fn invoke_method(&mut self, method: &Arc<Method>) -> VmResult<()> {
        if self.stack.is_full() {
            let max_depth = self.stack.max_depth();
            log::warn!(
                "thread {:?}: stack overflow at depth {} calling {:?}",
                self.id,
                max_depth,
                method
            );
            return Err(VmError::StackOverflow { max_depth });
        }

        self.log_invoke(method);
        let mut callee = self.new_frame(method);
        if let Err(err) = self.prepare_callee(method, &mut callee) {
            self.frame_cache.release(callee);
            return Err(err);
        }
        self.push_frame(callee)
    }

    fn prepare_callee(&mut self, method: &Method, callee: &mut Frame) -> VmResult<()> {
        let arg_slots = method.arg_slot_count();
        if arg_slots > 0 {
            let caller = self.stack.top_mut().ok_or(VmError::NoCurrentFrame)?;
            frame::transfer_args(caller, callee, arg_slots)?;
        }

        if method.is_synchronized() {
            let monitor = Self::monitor_for(method, callee)?;
            monitor.enter(self.id);
            let thread = self.id;
            callee.on_exit(move || monitor.exit(thread).map_err(VmError::from));
        }
        Ok(())
    }

    fn monitor_for(method: &Method, callee: &Frame) -> VmResult<Arc<Monitor>> {
        if method.is_static() {
            return Ok(Arc::clone(method.class()?.monitor()));
        }
        match callee.locals().get_this()? {
            Some(this) => Ok(Arc::clone(this.monitor())),
            None => Err(VmError::NullPointer),
        }
    }

    fn log_invoke(&self, method: &Method) {
        if log::log_enabled!(log::Level::Trace) {
            let separator = if method.is_static() { "." } else { "#" };
            log::trace!(
                "{:indent$}{}{}{}()",
                "",
                method.class_name(),
                separator,
                method.name(),
                indent = self.stack.depth()
            );
        }
    }

    /// Pop the current frame, run its exit hooks and recycle it
    ///
    /// # Errors
    ///
    /// Returns `VmError::NoCurrentFrame` on an empty stack, or the first
    /// error raised by an exit hook. The frame is removed either way.
    pub fn pop_frame(&mut self) -> VmResult<PoppedFrame> {
        let mut frame = self.stack.pop().ok_or(VmError::NoCurrentFrame)?;
        let hooks = frame.run_exit_hooks();
        let popped = PoppedFrame {
            method: Arc::clone(frame.method()),
            kind: frame.kind(),
            next_pc: frame.next_pc(),
        };
        self.frame_cache.release(frame);
        hooks.map(|()| popped)
    }

    /// Call `method` from native code with explicit argument slots
    ///
    /// A shim frame holding `args` is pushed first and `method` takes its
    /// arguments from it. The shim stays below the callee and is popped by
    /// the dispatcher when the callee returns.
    ///
    /// # Errors
    ///
    /// Propagates push and invocation errors. If the invocation fails, the
    /// shim frame is removed again.
    pub fn invoke_method_with_shim(&mut self, method: &Arc<Method>, args: Vec<Slot>) -> VmResult<()> {
        let mut shim = Frame::new(Method::shim(args.len()), FrameKind::Shim);
        for arg in args {
            shim.operand_stack_mut().push(arg)?;
        }
        self.push_frame(shim)?;

        if let Err(err) = self.invoke_method(method) {
            self.pop_frame()?;
            return Err(err);
        }
        Ok(())
    }

    /// Run the native implementation bound to the current native frame
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the current frame is not native,
    /// `VmError::NativeNotFound` if nothing is registered for the method, or
    /// whatever the native itself returns.
    pub fn call_native(&mut self) -> VmResult<()> {
        let runtime = Arc::clone(&self.runtime);
        let thread = self.id;
        let frame = self.stack.top_mut().ok_or(VmError::NoCurrentFrame)?;
        if !frame.is_native() {
            return Err(VmError::TypeError(format!(
                "{:?} is not a native frame",
                frame.method()
            )));
        }

        let method = Arc::clone(frame.method());
        let native = runtime
            .natives()
            .resolve(method.class_name(), method.name(), method.descriptor())
            .ok_or_else(|| VmError::NativeNotFound {
                class: method.class_name().to_string(),
                name: method.name().to_string(),
                descriptor: method.descriptor().to_string(),
            })?;

        let mut call = NativeCall::new(frame, thread, &runtime);
        native(&mut call)
    }

    /// Last-resort handling of an exception nothing caught
    ///
    /// Unwinds every frame (running exit hooks, so held monitors are
    /// released), then pushes a single frame calling
    /// `exception.printStackTrace(System.err)`. The caller runs that frame
    /// and terminates the thread; execution does not resume.
    ///
    /// # Errors
    ///
    /// Returns `VmError::ClassNotFound` / `VmError::FieldNotFound` /
    /// `VmError::MethodNotFound` if the printing machinery is missing, and
    /// `VmError::NullPointer` if `System.err` is unset.
    pub fn handle_uncaught_exception(&mut self, exception: ObjectRef) -> VmResult<()> {
        log::warn!(
            "thread {:?}: uncaught exception {}\n{}",
            self.id,
            exception.class().name(),
            self.stack.trace()
        );

        while !self.stack.is_empty() {
            if let Err(err) = self.pop_frame() {
                log::error!("thread {:?}: error while unwinding: {}", self.id, err);
            }
        }

        let system = self.runtime.classes().load(SYSTEM_CLASS)?;
        let stderr = system.get_static_ref("err", PRINT_STREAM)?;
        let stderr = self
            .runtime
            .heap()
            .resolve_opt(stderr)
            .ok_or(VmError::NullPointer)?;

        let (name, descriptor) = PRINT_STACK_TRACE;
        let print = exception.class().get_method(name, descriptor)?;

        let mut frame = self.new_frame(&print);
        let locals = frame.locals_mut();
        let bound = locals
            .set_ref(0, Some(exception))
            .and_then(|()| locals.set_ref(1, Some(stderr)));
        if let Err(err) = bound {
            self.frame_cache.release(frame);
            return Err(err);
        }
        self.push_frame(frame)
    }
}
