//! `sun/misc/Unsafe` compare-and-swap natives
//!
//! Local layout for every entry point: `0` the Unsafe receiver, `1` the
//! target object, `2..4` the long offset, then the expected and new values.
//! The boolean outcome is pushed on the native frame's operand stack.

use super::{NativeCall, NativeRegistry};
use crate::atomic;
use crate::frame::LocalVars;
use crate::object::ObjectRef;
use crate::{VmError, VmResult};

const UNSAFE_CLASS: &str = "sun/misc/Unsafe";

pub(super) fn register(registry: &NativeRegistry) {
    registry.register(
        UNSAFE_CLASS,
        "compareAndSwapInt",
        "(Ljava/lang/Object;JII)Z",
        compare_and_swap_int,
    );
    registry.register(
        UNSAFE_CLASS,
        "compareAndSwapLong",
        "(Ljava/lang/Object;JJJ)Z",
        compare_and_swap_long,
    );
    registry.register(
        UNSAFE_CLASS,
        "compareAndSwapObject",
        "(Ljava/lang/Object;JLjava/lang/Object;Ljava/lang/Object;)Z",
        compare_and_swap_object,
    );
}

fn target_and_offset(locals: &LocalVars) -> VmResult<(ObjectRef, usize)> {
    let target = locals.get_ref(1)?.ok_or(VmError::NullPointer)?;
    let offset = locals.get_long(2)?;
    let offset = usize::try_from(offset).map_err(|_| VmError::InvalidOffset(offset))?;
    Ok((target, offset))
}

// boolean compareAndSwapInt(Object o, long offset, int expected, int x)
fn compare_and_swap_int(call: &mut NativeCall<'_>) -> VmResult<()> {
    let frame = call.frame();
    let locals = frame.locals();
    let (target, offset) = target_and_offset(locals)?;
    let expected = locals.get_int(4)?;
    let new = locals.get_int(5)?;

    let swapped = atomic::compare_and_swap_int(&target, offset, expected, new)?;
    frame.operand_stack_mut().push_boolean(swapped)
}

// boolean compareAndSwapLong(Object o, long offset, long expected, long x)
fn compare_and_swap_long(call: &mut NativeCall<'_>) -> VmResult<()> {
    let frame = call.frame();
    let locals = frame.locals();
    let (target, offset) = target_and_offset(locals)?;
    let expected = locals.get_long(4)?;
    let new = locals.get_long(6)?;

    let swapped = atomic::compare_and_swap_long(&target, offset, expected, new)?;
    frame.operand_stack_mut().push_boolean(swapped)
}

// boolean compareAndSwapObject(Object o, long offset, Object expected, Object x)
fn compare_and_swap_object(call: &mut NativeCall<'_>) -> VmResult<()> {
    let thread = call.thread();
    let frame = call.frame();
    let locals = frame.locals();
    let (target, offset) = target_and_offset(locals)?;
    let expected = locals.get_ref(4)?;
    let new = locals.get_ref(5)?;

    let swapped = atomic::compare_and_swap_ref(
        &target,
        offset,
        expected.as_ref(),
        new.as_ref(),
        thread,
    )?;
    frame.operand_stack_mut().push_boolean(swapped)
}
