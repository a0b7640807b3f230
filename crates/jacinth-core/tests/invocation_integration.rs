//! Integration tests for the method invocation protocol
//!
//! Tests cover:
//! - Argument transfer (including two-slot longs and receivers)
//! - Synchronized static and instance methods
//! - Exit hook ordering on return
//! - Shim frames and native calls
//! - Uncaught exception unwinding

use jacinth_core::class::flags;
use jacinth_core::{
    Class, ClassBuilder, FrameKind, Method, ObjectRef, Runtime, Slot, Thread, VmError,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn invoke_with_ints(thread: &mut Thread, method: &Arc<Method>, args: &[i32]) {
    let frame = thread.current_frame_mut().unwrap();
    for &arg in args {
        frame.operand_stack_mut().push_int(arg).unwrap();
    }
    thread.invoke_method(method).unwrap();
}

fn entry_point(name: &str) -> (Arc<Class>, Arc<Method>) {
    let class = ClassBuilder::new(name)
        .method("main", "()V", flags::ACC_STATIC, 2, 8)
        .build()
        .unwrap();
    let main = class.get_method("main", "()V").unwrap();
    (class, main)
}

#[test]
fn test_int_arguments_move_to_callee() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let class = ClassBuilder::new("Math")
        .method("add", "(II)I", flags::ACC_STATIC, 2, 2)
        .build()
        .unwrap();
    let add = class.get_method("add", "(II)I").unwrap();
    let mut thread = runtime.new_thread();

    thread.invoke_method(&main).unwrap();
    invoke_with_ints(&mut thread, &add, &[5, 7]);

    let callee = thread.current_frame().unwrap();
    assert_eq!(callee.locals().get(0).unwrap(), &Slot::int(5));
    assert_eq!(callee.locals().get(1).unwrap(), &Slot::int(7));

    let caller = thread.top_frame_n(1).unwrap();
    assert!(caller.operand_stack().is_empty());
    assert_eq!(caller.operand_stack().slots()[0], Slot::Empty);
    assert_eq!(caller.operand_stack().slots()[1], Slot::Empty);
}

#[test]
fn test_long_and_receiver_arguments() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let class = runtime.classes().define(
        ClassBuilder::new("Acc")
            .method("put", "(JI)V", 0, 4, 0)
            .build()
            .unwrap(),
    );
    let put = class.get_method("put", "(JI)V").unwrap();
    assert_eq!(put.arg_slot_count(), 4);

    let receiver = runtime.heap().alloc_object(&class).unwrap();
    let mut thread = runtime.new_thread();
    thread.invoke_method(&main).unwrap();

    let stack = thread.current_frame_mut().unwrap().operand_stack_mut();
    stack.push_ref(Some(receiver.clone())).unwrap();
    stack.push_long(1 << 33).unwrap();
    stack.push_int(-4).unwrap();
    thread.invoke_method(&put).unwrap();

    let locals = thread.current_frame().unwrap().locals();
    assert!(Arc::ptr_eq(&locals.get_this().unwrap().unwrap(), &receiver));
    assert_eq!(locals.get_long(1).unwrap(), 1 << 33);
    assert_eq!(locals.get(2).unwrap(), &Slot::Empty);
    assert_eq!(locals.get_int(3).unwrap(), -4);
}

#[test]
fn test_synchronized_instance_method_holds_receiver_monitor() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let class = runtime.classes().define(
        ClassBuilder::new("Counter")
            .method("incr", "()V", flags::ACC_SYNCHRONIZED, 1, 1)
            .build()
            .unwrap(),
    );
    let incr = class.get_method("incr", "()V").unwrap();
    let counter = runtime.heap().alloc_object(&class).unwrap();
    let mut thread = runtime.new_thread();

    thread.invoke_method(&main).unwrap();
    thread
        .current_frame_mut()
        .unwrap()
        .operand_stack_mut()
        .push_ref(Some(counter.clone()))
        .unwrap();
    thread.invoke_method(&incr).unwrap();

    assert!(counter.monitor().is_held_by(thread.id()));
    assert_eq!(counter.monitor().entry_count(), 1);
    assert_eq!(thread.current_frame().unwrap().exit_hook_count(), 1);
    assert!(!class.monitor().is_locked());

    thread.pop_frame().unwrap();
    assert!(!counter.monitor().is_locked());
    assert_eq!(counter.monitor().entry_count(), 0);
}

#[test]
fn test_synchronized_static_method_holds_class_monitor() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let class = ClassBuilder::new("Registry")
        .method(
            "register",
            "(I)V",
            flags::ACC_STATIC | flags::ACC_SYNCHRONIZED,
            1,
            1,
        )
        .build()
        .unwrap();
    let register = class.get_method("register", "(I)V").unwrap();
    let mut thread = runtime.new_thread();

    thread.invoke_method(&main).unwrap();
    invoke_with_ints(&mut thread, &register, &[1]);
    assert!(class.monitor().is_held_by(thread.id()));

    // Recursive synchronized call re-enters the same monitor
    thread
        .current_frame_mut()
        .unwrap()
        .operand_stack_mut()
        .push_int(2)
        .unwrap();
    thread.invoke_method(&register).unwrap();
    assert_eq!(class.monitor().entry_count(), 2);

    thread.pop_frame().unwrap();
    assert_eq!(class.monitor().entry_count(), 1);
    thread.pop_frame().unwrap();
    assert!(!class.monitor().is_locked());
}

#[test]
fn test_synchronized_call_on_null_receiver() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let class = ClassBuilder::new("Counter")
        .method("incr", "()V", flags::ACC_SYNCHRONIZED, 1, 1)
        .build()
        .unwrap();
    let incr = class.get_method("incr", "()V").unwrap();
    let mut thread = runtime.new_thread();

    thread.invoke_method(&main).unwrap();
    thread
        .current_frame_mut()
        .unwrap()
        .operand_stack_mut()
        .push_ref(None)
        .unwrap();

    let result = thread.invoke_method(&incr);
    assert!(matches!(result, Err(VmError::NullPointer)));
    assert_eq!(thread.stack().depth(), 1);
}

#[test]
fn test_exit_hooks_run_once_in_reverse_order() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let mut thread = runtime.new_thread();
    thread.invoke_method(&main).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let frame = thread.current_frame_mut().unwrap();
    for label in ["first", "second", "third"] {
        let log = Arc::clone(&log);
        frame.on_exit(move || {
            log.lock().push(label);
            Ok(())
        });
    }

    thread.pop_frame().unwrap();
    assert_eq!(*log.lock(), ["third", "second", "first"]);
}

#[test]
fn test_failing_exit_hook_still_pops() {
    let runtime = Runtime::with_defaults();
    let (_entry, main) = entry_point("Main");
    let mut thread = runtime.new_thread();
    thread.invoke_method(&main).unwrap();

    let ran = Arc::new(Mutex::new(false));
    let frame = thread.current_frame_mut().unwrap();
    {
        let ran = Arc::clone(&ran);
        frame.on_exit(move || {
            *ran.lock() = true;
            Ok(())
        });
    }
    frame.on_exit(|| Err(VmError::NullPointer));

    assert!(matches!(thread.pop_frame(), Err(VmError::NullPointer)));
    assert!(*ran.lock());
    assert!(thread.is_stack_empty());
}

#[test]
fn test_invoke_with_shim() {
    let runtime = Runtime::with_defaults();
    let class = ClassBuilder::new("Callback")
        .method("run", "(IJ)V", flags::ACC_STATIC, 3, 0)
        .build()
        .unwrap();
    let run = class.get_method("run", "(IJ)V").unwrap();
    let mut thread = runtime.new_thread();

    thread
        .invoke_method_with_shim(&run, vec![Slot::int(3), Slot::long(99), Slot::Empty])
        .unwrap();

    assert_eq!(thread.stack().depth(), 2);
    let shim = thread.top_frame_n(1).unwrap();
    assert_eq!(shim.kind(), FrameKind::Shim);
    assert!(shim.operand_stack().is_empty());

    let callee = thread.current_frame().unwrap();
    assert_eq!(callee.locals().get_int(0).unwrap(), 3);
    assert_eq!(callee.locals().get_long(1).unwrap(), 99);

    assert_eq!(thread.pop_frame().unwrap().kind, FrameKind::Managed);
    assert_eq!(thread.pop_frame().unwrap().kind, FrameKind::Shim);
}

#[test]
fn test_native_method_dispatch() {
    fn twice(call: &mut jacinth_core::NativeCall<'_>) -> jacinth_core::VmResult<()> {
        let frame = call.frame();
        let value = frame.locals().get_int(0)?;
        frame.operand_stack_mut().push_int(value * 2)
    }

    let runtime = Runtime::with_defaults();
    runtime
        .natives()
        .register("demo/Native", "twice", "(I)I", twice);
    let (_entry, main) = entry_point("Main");
    let class = ClassBuilder::new("demo/Native")
        .native_method("twice", "(I)I", flags::ACC_STATIC)
        .native_method("missing", "()V", flags::ACC_STATIC)
        .build()
        .unwrap();
    let mut thread = runtime.new_thread();

    thread.invoke_method(&main).unwrap();
    invoke_with_ints(&mut thread, &class.get_method("twice", "(I)I").unwrap(), &[21]);
    assert!(thread.current_frame().unwrap().is_native());

    thread.call_native().unwrap();
    let result = thread
        .current_frame_mut()
        .unwrap()
        .operand_stack_mut()
        .pop_int()
        .unwrap();
    assert_eq!(result, 42);
    assert_eq!(thread.pop_frame().unwrap().kind, FrameKind::Native);

    // Managed frame
    assert!(matches!(thread.call_native(), Err(VmError::TypeError(_))));

    thread
        .invoke_method(&class.get_method("missing", "()V").unwrap())
        .unwrap();
    assert!(matches!(
        thread.call_native(),
        Err(VmError::NativeNotFound { .. })
    ));
}

struct Exceptions {
    throwable: Arc<Class>,
    stderr: ObjectRef,
}

fn define_exception_support(runtime: &Arc<Runtime>) -> Exceptions {
    let classes = runtime.classes();
    let stream_class = classes.define(ClassBuilder::new("java/io/PrintStream").build().unwrap());
    let system = classes.define(
        ClassBuilder::new("java/lang/System")
            .field("err", "Ljava/io/PrintStream;", flags::ACC_STATIC)
            .build()
            .unwrap(),
    );
    let throwable = classes.define(
        ClassBuilder::new("java/lang/Throwable")
            .method("printStackTrace", "(Ljava/io/PrintStream;)V", 0, 2, 2)
            .build()
            .unwrap(),
    );

    let stderr = runtime.heap().alloc_object(&stream_class).unwrap();
    system
        .set_static_ref("err", "Ljava/io/PrintStream;", Some(&stderr))
        .unwrap();
    Exceptions { throwable, stderr }
}

#[test]
fn test_uncaught_exception_unwinds_and_prints() {
    let runtime = Runtime::with_defaults();
    let support = define_exception_support(&runtime);
    let oops = runtime.classes().define(
        ClassBuilder::new("demo/Oops")
            .superclass(Arc::clone(&support.throwable))
            .build()
            .unwrap(),
    );
    let locked = runtime.classes().define(
        ClassBuilder::new("demo/Locked")
            .method("run", "()V", flags::ACC_SYNCHRONIZED, 1, 1)
            .build()
            .unwrap(),
    );

    let (_entry, main) = entry_point("Main");
    let target = runtime.heap().alloc_object(&locked).unwrap();
    let mut thread = runtime.new_thread();
    thread.invoke_method(&main).unwrap();
    thread
        .current_frame_mut()
        .unwrap()
        .operand_stack_mut()
        .push_ref(Some(target.clone()))
        .unwrap();
    thread
        .invoke_method(&locked.get_method("run", "()V").unwrap())
        .unwrap();
    assert!(target.monitor().is_held_by(thread.id()));

    let exception = runtime.heap().alloc_object(&oops).unwrap();
    thread.handle_uncaught_exception(exception.clone()).unwrap();

    // Every frame was unwound and its monitor released
    assert!(!target.monitor().is_locked());
    assert_eq!(thread.stack().depth(), 1);

    let frame = thread.current_frame().unwrap();
    assert_eq!(frame.method().name(), "printStackTrace");
    assert_eq!(frame.method().class_name(), "java/lang/Throwable");
    let this = frame.locals().get_ref(0).unwrap().unwrap();
    let stream = frame.locals().get_ref(1).unwrap().unwrap();
    assert!(Arc::ptr_eq(&this, &exception));
    assert!(Arc::ptr_eq(&stream, &support.stderr));
}

#[test]
fn test_uncaught_exception_without_system() {
    let runtime = Runtime::with_defaults();
    let exception_class = runtime
        .classes()
        .define(ClassBuilder::new("demo/Bare").build().unwrap());
    let exception = runtime.heap().alloc_object(&exception_class).unwrap();
    let mut thread = runtime.new_thread();

    let result = thread.handle_uncaught_exception(exception);
    assert!(matches!(result, Err(VmError::ClassNotFound(name)) if name == "java/lang/System"));
    assert!(thread.is_stack_empty());
}
