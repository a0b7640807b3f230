//! Method activation frames
//!
//! A [`Frame`] is one activation of a [`Method`]: a fixed array of local
//! variable slots, a bounded operand stack and a list of exit hooks. Both
//! arrays are sized once from the method's `max_locals` / `max_stack`.
//!
//! # Memory Layout
//!
//! ```text
//! locals:         [ this | arg₀ | arg₁ (long) | <empty> | tmp … ]
//! operand stack:  [ v₀ | v₁ | … | v(size-1) | <empty> … ]   ← size
//! ```
//!
//! Category-2 values (long, double) take two consecutive slots; the second
//! one stays [`Slot::Empty`].

use crate::class::Method;
use crate::frame_cache::FrameShape;
use crate::object::ObjectRef;
use crate::value::Slot;
use crate::{VmError, VmResult};
use std::fmt;
use std::sync::Arc;

/// Action run exactly once when a frame leaves its call stack
pub type ExitHook = Box<dyn FnOnce() -> VmResult<()> + Send>;

/// How a frame was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Bytecode method, recycled through the frame cache
    Managed,
    /// Native method, sized from its arguments
    Native,
    /// Synthetic frame that feeds arguments to a call from native code
    Shim,
}

// ============================================================================
// Local Variables
// ============================================================================

/// Local variable slots of a frame
#[derive(Debug, Default)]
pub struct LocalVars {
    slots: Box<[Slot]>,
}

impl LocalVars {
    /// Create `len` empty slots
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| Slot::Empty).collect(),
        }
    }

    /// Number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if there are no slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn out_of_bounds(&self, index: usize) -> VmError {
        VmError::LocalIndexOutOfBounds {
            index,
            len: self.slots.len(),
        }
    }

    /// Get a slot
    ///
    /// # Errors
    ///
    /// Returns `VmError::LocalIndexOutOfBounds` past `max_locals`.
    #[inline]
    pub fn get(&self, index: usize) -> VmResult<&Slot> {
        self.slots.get(index).ok_or_else(|| self.out_of_bounds(index))
    }

    /// Set a slot
    ///
    /// # Errors
    ///
    /// Returns `VmError::LocalIndexOutOfBounds` past `max_locals`.
    #[inline]
    pub fn set(&mut self, index: usize, slot: Slot) -> VmResult<()> {
        let len = self.slots.len();
        let cell = self
            .slots
            .get_mut(index)
            .ok_or(VmError::LocalIndexOutOfBounds { index, len })?;
        *cell = slot;
        Ok(())
    }

    fn scalar(&self, index: usize, wanted: &str) -> VmResult<i64> {
        let slot = self.get(index)?;
        slot.as_scalar().ok_or_else(|| {
            VmError::TypeError(format!(
                "local {} holds {}, expected {}",
                index,
                slot.type_name(),
                wanted
            ))
        })
    }

    /// Get an int local
    pub fn get_int(&self, index: usize) -> VmResult<i32> {
        self.scalar(index, "int").map(|v| v as i32)
    }

    /// Set an int local
    pub fn set_int(&mut self, index: usize, value: i32) -> VmResult<()> {
        self.set(index, Slot::int(value))
    }

    /// Get a long local (occupies `index` and `index + 1`)
    pub fn get_long(&self, index: usize) -> VmResult<i64> {
        self.scalar(index, "long")
    }

    /// Set a long local (occupies `index` and `index + 1`)
    pub fn set_long(&mut self, index: usize, value: i64) -> VmResult<()> {
        self.set(index + 1, Slot::Empty)?;
        self.set(index, Slot::long(value))
    }

    /// Get a reference local
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the slot does not hold a reference.
    pub fn get_ref(&self, index: usize) -> VmResult<Option<ObjectRef>> {
        let slot = self.get(index)?;
        slot.as_object().map(|obj| obj.cloned()).ok_or_else(|| {
            VmError::TypeError(format!(
                "local {} holds {}, expected reference",
                index,
                slot.type_name()
            ))
        })
    }

    /// Set a reference local
    pub fn set_ref(&mut self, index: usize, value: Option<ObjectRef>) -> VmResult<()> {
        self.set(index, Slot::reference(value))
    }

    /// Get the receiver of an instance method (local 0)
    pub fn get_this(&self) -> VmResult<Option<ObjectRef>> {
        self.get_ref(0)
    }

    /// All slots
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Reset every slot to empty
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Empty);
    }
}

// ============================================================================
// Operand Stack
// ============================================================================

/// Bounded operand stack of a frame
#[derive(Debug, Default)]
pub struct OperandStack {
    /// Backing slots (capacity = max stack)
    slots: Box<[Slot]>,
    /// Number of live slots
    size: usize,
}

impl OperandStack {
    /// Create an empty stack holding at most `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::Empty).collect(),
            size: 0,
        }
    }

    /// Number of live slots
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Push a slot
    ///
    /// # Errors
    ///
    /// Returns `VmError::OperandStackOverflow` if the stack is full.
    #[inline]
    pub fn push(&mut self, slot: Slot) -> VmResult<()> {
        let capacity = self.slots.len();
        let cell = self
            .slots
            .get_mut(self.size)
            .ok_or(VmError::OperandStackOverflow { capacity })?;
        *cell = slot;
        self.size += 1;
        Ok(())
    }

    /// Pop a slot, leaving the vacated cell empty
    ///
    /// # Errors
    ///
    /// Returns `VmError::OperandStackUnderflow` if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> VmResult<Slot> {
        if self.size == 0 {
            return Err(VmError::OperandStackUnderflow);
        }
        self.size -= 1;
        Ok(std::mem::take(&mut self.slots[self.size]))
    }

    /// Peek at value N slots from top (0 = top)
    ///
    /// # Errors
    ///
    /// Returns `VmError::OperandStackUnderflow` if not enough values on stack.
    #[inline]
    pub fn peek_n(&self, n: usize) -> VmResult<&Slot> {
        if self.size <= n {
            return Err(VmError::OperandStackUnderflow);
        }
        Ok(&self.slots[self.size - 1 - n])
    }

    /// Peek at the top value
    #[inline]
    pub fn peek(&self) -> VmResult<&Slot> {
        self.peek_n(0)
    }

    /// Pop the top `n` slots as one window, bottom first
    ///
    /// The slots stay in the backing array; the caller is expected to move
    /// them out (leaving [`Slot::Empty`] behind).
    ///
    /// # Errors
    ///
    /// Returns `VmError::OperandStackUnderflow` if fewer than `n` slots are live.
    pub fn pop_tops(&mut self, n: usize) -> VmResult<&mut [Slot]> {
        if n > self.size {
            return Err(VmError::OperandStackUnderflow);
        }
        let start = self.size - n;
        self.size = start;
        Ok(&mut self.slots[start..start + n])
    }

    /// Push an int
    pub fn push_int(&mut self, value: i32) -> VmResult<()> {
        self.push(Slot::int(value))
    }

    /// Pop an int
    pub fn pop_int(&mut self) -> VmResult<i32> {
        let slot = self.pop()?;
        slot.as_int()
            .ok_or_else(|| VmError::TypeError(format!("expected int, found {}", slot.type_name())))
    }

    /// Push a long (two slots)
    pub fn push_long(&mut self, value: i64) -> VmResult<()> {
        self.push(Slot::long(value))?;
        self.push(Slot::Empty)
    }

    /// Pop a long (two slots)
    ///
    /// # Errors
    ///
    /// Returns `VmError::OperandStackUnderflow` (leaving the stack untouched)
    /// if fewer than two slots are live.
    pub fn pop_long(&mut self) -> VmResult<i64> {
        if self.size < 2 {
            return Err(VmError::OperandStackUnderflow);
        }
        self.pop()?;
        let slot = self.pop()?;
        slot.as_long()
            .ok_or_else(|| VmError::TypeError(format!("expected long, found {}", slot.type_name())))
    }

    /// Push a boolean as int 0/1
    pub fn push_boolean(&mut self, value: bool) -> VmResult<()> {
        self.push(Slot::boolean(value))
    }

    /// Push a reference
    pub fn push_ref(&mut self, value: Option<ObjectRef>) -> VmResult<()> {
        self.push(Slot::reference(value))
    }

    /// Pop a reference
    pub fn pop_ref(&mut self) -> VmResult<Option<ObjectRef>> {
        match self.pop()? {
            Slot::Ref(obj) => Ok(Some(obj)),
            Slot::Null => Ok(None),
            other => Err(VmError::TypeError(format!(
                "expected reference, found {}",
                other.type_name()
            ))),
        }
    }

    /// The full backing array, including slots above the top
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Drop every value
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Empty);
        self.size = 0;
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One method activation
pub struct Frame {
    method: Arc<Method>,
    kind: FrameKind,
    locals: LocalVars,
    operand_stack: OperandStack,
    next_pc: usize,
    exit_hooks: Vec<ExitHook>,
}

impl Frame {
    /// Create a frame sized for `method`
    pub fn new(method: Arc<Method>, kind: FrameKind) -> Self {
        Self {
            locals: LocalVars::with_len(method.max_locals()),
            operand_stack: OperandStack::with_capacity(method.max_stack()),
            method,
            kind,
            next_pc: 0,
            exit_hooks: Vec::new(),
        }
    }

    /// Method being executed
    #[inline]
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// Frame kind
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Check if this is a native frame
    #[inline]
    pub fn is_native(&self) -> bool {
        self.kind == FrameKind::Native
    }

    /// Local variables
    #[inline]
    pub fn locals(&self) -> &LocalVars {
        &self.locals
    }

    /// Mutable local variables
    #[inline]
    pub fn locals_mut(&mut self) -> &mut LocalVars {
        &mut self.locals
    }

    /// Operand stack
    #[inline]
    pub fn operand_stack(&self) -> &OperandStack {
        &self.operand_stack
    }

    /// Mutable operand stack
    #[inline]
    pub fn operand_stack_mut(&mut self) -> &mut OperandStack {
        &mut self.operand_stack
    }

    /// Program counter to resume at when this frame is current again
    #[inline]
    pub fn next_pc(&self) -> usize {
        self.next_pc
    }

    /// Set the resume program counter
    #[inline]
    pub fn set_next_pc(&mut self, pc: usize) {
        self.next_pc = pc;
    }

    /// Shape used by the frame cache
    pub fn shape(&self) -> FrameShape {
        FrameShape {
            max_locals: self.locals.len(),
            max_stack: self.operand_stack.capacity(),
        }
    }

    /// Register an action to run when this frame is popped
    ///
    /// Hooks run in reverse registration order.
    pub fn on_exit<F>(&mut self, hook: F)
    where
        F: FnOnce() -> VmResult<()> + Send + 'static,
    {
        self.exit_hooks.push(Box::new(hook));
    }

    /// Number of pending exit hooks
    pub fn exit_hook_count(&self) -> usize {
        self.exit_hooks.len()
    }

    /// Run and consume every exit hook, newest first
    ///
    /// All hooks run even if one fails; the first error is returned.
    pub(crate) fn run_exit_hooks(&mut self) -> VmResult<()> {
        let mut first_err = None;
        while let Some(hook) = self.exit_hooks.pop() {
            if let Err(err) = hook() {
                log::error!("exit hook of {:?} failed: {}", self.method, err);
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Rebind a cleared frame to `method` (which must have the same shape)
    pub(crate) fn rebind(&mut self, method: Arc<Method>) {
        debug_assert_eq!(
            (method.max_locals(), method.max_stack()),
            (self.locals.len(), self.operand_stack.capacity())
        );
        self.method = method;
        self.next_pc = 0;
    }

    /// Drop every slot value and any pending hooks
    pub(crate) fn clear(&mut self) {
        self.locals.clear();
        self.operand_stack.clear();
        self.exit_hooks.clear();
        self.next_pc = 0;
    }

    /// Visit every object referenced from this frame
    pub fn visit_roots<F>(&self, visitor: &mut F)
    where
        F: FnMut(&ObjectRef),
    {
        let live_operands = &self.operand_stack.slots[..self.operand_stack.size];
        for slot in self.locals.slots.iter().chain(live_operands) {
            if let Slot::Ref(obj) = slot {
                visitor(obj);
            }
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("method", &self.method)
            .field("kind", &self.kind)
            .field("locals", &self.locals)
            .field("operand_stack", &self.operand_stack)
            .field("next_pc", &self.next_pc)
            .field("exit_hooks", &self.exit_hooks.len())
            .finish()
    }
}

/// Move the top `count` operand slots of `caller` into the first locals of
/// `callee`, leaving the caller's cells empty
pub(crate) fn transfer_args(caller: &mut Frame, callee: &mut Frame, count: usize) -> VmResult<()> {
    let args = caller.operand_stack.pop_tops(count)?;
    for (index, slot) in args.iter_mut().enumerate() {
        callee.locals.set(index, std::mem::take(slot))?;
    }
    Ok(())
}
