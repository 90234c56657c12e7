//! Multi-thread coordination: exclusive phases against allocating
//! workers, and the termination join.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread as os_thread;
use std::time::{Duration, Instant};

use javelin_heap::CollectionKind;
use javelin_vm::objects::make_int;
use javelin_vm::testkit::boot_with_config;
use javelin_vm::thread::{Thread, ThreadState};
use javelin_vm::MachineConfig;

fn small_config() -> MachineConfig {
    MachineConfig {
        nursery_size: 16 * 1024,
        stack_size: 1024,
    }
}

#[test]
fn test_exclusive_waits_for_allocating_worker() {
    let (vm, mut root) = boot_with_config(small_config());
    let stop = Arc::new(AtomicBool::new(false));

    let mut worker = Thread::new_child(&mut root);
    let worker_stop = stop.clone();
    let handle = os_thread::spawn(move || {
        worker.enter(ThreadState::Active);
        // A tight arithmetic-and-box loop: every iteration allocates, so
        // every iteration is a safepoint opportunity.
        let mut i = 0i32;
        while !worker_stop.load(Ordering::Relaxed) {
            let boxed = make_int(&mut worker, i);
            assert_eq!(boxed.int_value(), i);
            i = i.wrapping_add(1);
        }
        worker.enter(ThreadState::Zombie);
        worker
    });

    // Give the worker time to enter its loop, then take the exclusive
    // phase repeatedly. Each request must complete promptly: the worker
    // reaches a safepoint within one allocation.
    os_thread::sleep(Duration::from_millis(20));
    let deadline = Instant::now() + Duration::from_secs(30);
    for _ in 0..10 {
        vm.machine.request_collect(&mut root, CollectionKind::Minor);
        assert!(
            Instant::now() < deadline,
            "exclusive request did not complete in bounded time"
        );
    }

    stop.store(true, Ordering::Relaxed);
    // Park while joining: a blocked-but-Active root would stall any
    // exclusive phase the worker still needs.
    root.enter(ThreadState::Idle);
    let worker = handle.join().unwrap();
    root.enter(ThreadState::Active);
    assert_eq!(worker.state(), ThreadState::Zombie);

    // Counters settle to the root thread alone.
    let snap = vm.machine.coord_snapshot();
    assert_eq!(snap.active, 1);
    assert_eq!(snap.live, 1);
    assert!(snap.exclusive.is_null());

    root.enter(ThreadState::Zombie);
}

#[test]
fn test_exclusive_is_mutually_exclusive() {
    let (vm, mut root) = boot_with_config(small_config());

    let mut worker = Thread::new_child(&mut root);
    let machine = vm.machine.clone();
    let handle = os_thread::spawn(move || {
        worker.enter(ThreadState::Active);
        for _ in 0..200 {
            worker.enter(ThreadState::Exclusive);
            {
                // While exclusive, this thread must be the only active
                // one and the registered owner.
                let snap = machine.coord_snapshot();
                assert_eq!(snap.active, 1);
                assert_eq!(snap.exclusive, &mut *worker as *mut Thread);
            }
            worker.enter(ThreadState::Active);
        }
        worker.enter(ThreadState::Zombie);
        worker
    });

    for _ in 0..200 {
        root.enter(ThreadState::Exclusive);
        {
            let snap = vm.machine.coord_snapshot();
            assert_eq!(snap.active, 1);
        }
        root.enter(ThreadState::Active);
    }

    root.enter(ThreadState::Idle);
    let _worker = handle.join().unwrap();
    root.enter(ThreadState::Active);
    root.enter(ThreadState::Zombie);
}

#[test]
fn test_exit_joins_last_live_thread() {
    let (_vm, mut root) = boot_with_config(small_config());

    let mut worker = Thread::new_child(&mut root);
    let handle = os_thread::spawn(move || {
        worker.enter(ThreadState::Active);
        for i in 0..1_000 {
            let _ = make_int(&mut worker, i);
        }
        worker.enter(ThreadState::Zombie);
        worker
    });

    // Exit blocks until the worker dies, then the root is the sole
    // survivor.
    root.enter(ThreadState::Exit);
    assert_eq!(root.state(), ThreadState::Exit);

    let worker = handle.join().unwrap();
    assert_eq!(worker.state(), ThreadState::Zombie);
}

#[test]
fn test_idle_thread_does_not_block_exclusive() {
    let (vm, mut root) = boot_with_config(small_config());

    let mut idler = Thread::new_child(&mut root);
    idler.enter(ThreadState::Active);
    idler.enter(ThreadState::Idle);

    // An idle sibling is already at a safepoint: the exclusive phase
    // must be immediate.
    vm.machine.request_collect(&mut root, CollectionKind::Minor);

    idler.enter(ThreadState::Active);
    idler.enter(ThreadState::Zombie);
    root.enter(ThreadState::Zombie);
}

#[test]
fn test_worker_survivors_visible_after_collection() {
    let (vm, mut root) = boot_with_config(small_config());

    let mut worker = Thread::new_child(&mut root);
    let handle = os_thread::spawn(move || {
        worker.enter(ThreadState::Active);
        // Retain a value on the worker's stack across collections forced
        // by its own churn.
        let keep = make_int(&mut worker, 31337);
        worker.push(keep);
        for i in 0..20_000 {
            let _ = make_int(&mut worker, i);
        }
        let kept = worker.pop();
        let value = kept.int_value();
        worker.enter(ThreadState::Zombie);
        (worker, value)
    });

    // Concurrent exclusive pressure from the root, then park for the
    // join so the worker's own collections can proceed.
    for _ in 0..5 {
        vm.machine.request_collect(&mut root, CollectionKind::Minor);
    }
    root.enter(ThreadState::Idle);

    let (_worker, value) = handle.join().unwrap();
    assert_eq!(value, 31337, "worker stack root lost across collections");
    root.enter(ThreadState::Active);
    root.enter(ThreadState::Zombie);
}
