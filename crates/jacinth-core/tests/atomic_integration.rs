//! Integration tests for compare-and-swap and monitors across OS threads

use jacinth_core::atomic::{compare_and_swap_int, compare_and_swap_long, compare_and_swap_ref};
use jacinth_core::{AtomicError, CasKind, ClassBuilder, MonitorError, Runtime, ThreadId};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

#[test]
fn test_int_cas_success_and_failure() {
    let runtime = Runtime::with_defaults();
    let class = ClassBuilder::new("Box").field("v", "I", 0).build().unwrap();
    let obj = runtime.heap().alloc_object(&class).unwrap();

    obj.set_int_field(0, 5).unwrap();
    assert!(compare_and_swap_int(&obj, 0, 5, 9).unwrap());
    assert_eq!(obj.get_int_field(0).unwrap(), 9);

    obj.set_int_field(0, 7).unwrap();
    assert!(!compare_and_swap_int(&obj, 0, 5, 9).unwrap());
    assert_eq!(obj.get_int_field(0).unwrap(), 7);
}

#[test]
fn test_cas_width_mismatch_is_unsupported() {
    let runtime = Runtime::with_defaults();
    let class = ClassBuilder::new("Wide")
        .field("big", "J", 0)
        .field("d", "D", 0)
        .build()
        .unwrap();
    let obj = runtime.heap().alloc_object(&class).unwrap();

    assert_eq!(
        compare_and_swap_int(&obj, 0, 0, 1),
        Err(AtomicError::Unsupported {
            op: CasKind::Int,
            storage: "long field",
        })
    );
    assert!(matches!(
        compare_and_swap_long(&obj, 1, 0, 1),
        Err(AtomicError::Unsupported { op: CasKind::Long, .. })
    ));
    assert_eq!(
        compare_and_swap_long(&obj, 2, 0, 1),
        Err(AtomicError::OffsetOutOfBounds { offset: 2, len: 2 })
    );

    let bytes = runtime.classes().load("[B").unwrap();
    let array = runtime.heap().alloc_array(&bytes, 4).unwrap();
    assert!(matches!(
        compare_and_swap_int(&array, 0, 0, 1),
        Err(AtomicError::Unsupported { op: CasKind::Int, .. })
    ));
}

#[test]
fn test_concurrent_int_cas_counts_exactly() {
    const THREADS: usize = 8;
    const INCREMENTS: i32 = 500;

    let runtime = Runtime::with_defaults();
    let ints = runtime.classes().load("[I").unwrap();
    let counter = runtime.heap().alloc_array(&ints, 1).unwrap();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..INCREMENTS {
                    loop {
                        let current = counter.get_int_element(0).unwrap();
                        if compare_and_swap_int(&counter, 0, current, current + 1).unwrap() {
                            break;
                        }
                    }
                }
            });
        }
    });

    assert_eq!(
        counter.get_int_element(0).unwrap(),
        THREADS as i32 * INCREMENTS
    );
}

#[test]
fn test_racing_ref_array_cas_has_one_winner() {
    const THREADS: usize = 8;

    let runtime = Runtime::with_defaults();
    let refs = runtime.classes().load("[Ljava/lang/Object;").unwrap();
    let item = runtime
        .classes()
        .define(ClassBuilder::new("Item").build().unwrap());
    let slots = runtime.heap().alloc_array(&refs, 1).unwrap();
    let candidates: Vec<_> = (0..THREADS)
        .map(|_| runtime.heap().alloc_object(&item).unwrap())
        .collect();

    let barrier = Barrier::new(THREADS);
    let outcomes: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = candidates
            .iter()
            .map(|candidate| {
                let (slots, barrier) = (&slots, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    let won = compare_and_swap_ref(slots, 0, None, Some(candidate), ThreadId::new())
                        .unwrap();
                    // Losers must see whatever the winner stored
                    let observed = slots.get_ref_element(0).unwrap();
                    (won, candidate.id(), observed)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    let winners: Vec<_> = outcomes.iter().filter(|(won, _, _)| *won).collect();
    assert_eq!(winners.len(), 1);
    let winner_id = winners[0].1;

    for (won, _, observed) in &outcomes {
        assert_eq!(*observed, Some(winner_id), "won: {}", won);
    }
    assert_eq!(slots.get_ref_element(0).unwrap(), Some(winner_id));
}

#[test]
fn test_ref_field_cas_waits_for_monitor() {
    let runtime = Runtime::with_defaults();
    let class = ClassBuilder::new("Node")
        .field("next", "LNode;", 0)
        .build()
        .unwrap();
    let node = runtime.heap().alloc_object(&class).unwrap();
    let next = runtime.heap().alloc_object(&class).unwrap();

    let holder = ThreadId::new();
    node.monitor().enter(holder);

    let swapped = thread::scope(|s| {
        let cas = s.spawn(|| compare_and_swap_ref(&node, 0, None, Some(&next), ThreadId::new()));

        // Still blocked on the monitor
        while node.monitor().waiting_count() == 0 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!cas.is_finished());
        assert_eq!(node.get_ref_field(0).unwrap(), None);

        node.monitor().exit(holder).unwrap();
        cas.join().unwrap()
    });

    assert!(swapped.unwrap());
    assert_eq!(node.get_ref_field(0).unwrap(), Some(next.id()));
    assert!(!node.monitor().is_locked());
}

#[test]
fn test_reentrant_monitor_exit_count() {
    let runtime = Runtime::with_defaults();
    let class = runtime
        .classes()
        .define(ClassBuilder::new("Lock").build().unwrap());
    let obj = runtime.heap().alloc_object(&class).unwrap();
    let monitor = obj.monitor();
    let me = ThreadId::new();

    monitor.enter(me);
    monitor.enter(me);
    monitor.exit(me).unwrap();
    assert!(monitor.is_held_by(me));
    monitor.exit(me).unwrap();
    assert!(!monitor.is_locked());

    assert_eq!(
        monitor.exit(me),
        Err(MonitorError::NotOwner {
            thread: me,
            owner: None,
        })
    );
}

#[test]
fn test_monitor_excludes_other_threads() {
    let runtime = Runtime::with_defaults();
    let class = runtime
        .classes()
        .define(ClassBuilder::new("Shared").field("n", "I", 0).build().unwrap());
    let shared = runtime.heap().alloc_object(&class).unwrap();

    thread::scope(|s| {
        for _ in 0..4 {
            let shared = &shared;
            s.spawn(move || {
                let me = ThreadId::new();
                for _ in 0..200 {
                    let _guard = shared.monitor().enter_guard(me);
                    let n = shared.get_int_field(0).unwrap();
                    shared.set_int_field(0, n + 1).unwrap();
                }
            });
        }
    });

    assert_eq!(shared.get_int_field(0).unwrap(), 800);
}
