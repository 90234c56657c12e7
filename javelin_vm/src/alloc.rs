//! Nursery allocation and the safepoint path.
//!
//! `allocate` is the only suspension point in the VM: every other opcode
//! runs without touching the state monitor. The fast path is a bump and a
//! lock-free poll of the exclusive flag; the slow path parks the thread
//! for a pending exclusive phase and, if the nursery is still too full,
//! takes the exclusive phase itself and runs a minor collection.

use std::sync::atomic::Ordering;

use javelin_heap::CollectionKind;
use javelin_platform::fatal;
use javelin_runtime::align_size;

use crate::thread::{Thread, ThreadState};

/// Allocate `size` bytes of nursery memory.
///
/// The returned memory is uninitialized; callers stamp a header before
/// the next allocation point. Requests larger than the nursery abort
/// (large-object allocation is a non-goal).
#[inline]
pub fn allocate(t: &mut Thread, size: usize) -> *mut u8 {
    let size = align_size(size);
    if t.heap_index + size > t.nursery_size()
        || t.machine.exclusive_requested.load(Ordering::Acquire)
    {
        yield_and_collect(t, size);
    }

    let p = unsafe { (t.nursery.as_mut_ptr() as *mut u8).add(t.heap_index) };
    t.heap_index += size;
    p
}

/// The safepoint path: give way to a pending exclusive phase, then
/// collect if the request still does not fit.
#[cold]
fn yield_and_collect(t: &mut Thread, size: usize) {
    if size > t.nursery_size() {
        fatal!(
            "allocation of {} bytes exceeds the {} byte nursery",
            size,
            t.nursery_size()
        );
    }

    let machine = t.machine.clone();
    let mut guard = machine.state.acquire();

    while !guard.exclusive.is_null() {
        // Another thread wants (or holds) the exclusive phase — park
        // until it finishes, then resume.
        t.enter_locked(&mut guard, ThreadState::Idle);
        t.enter_locked(&mut guard, ThreadState::Active);
    }

    if t.heap_index + size > t.nursery_size() {
        t.enter_locked(&mut guard, ThreadState::Exclusive);
        machine.collect(CollectionKind::Minor);
        t.enter_locked(&mut guard, ThreadState::Active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects;
    use crate::testkit;

    #[test]
    fn test_bump_advances() {
        let (_machine, mut t) = testkit::boot();
        let before = t.heap_index();
        let p1 = allocate(&mut t, 24);
        let p2 = allocate(&mut t, 24);
        assert_eq!(p2 as usize - p1 as usize, 24);
        assert_eq!(t.heap_index(), before + 48);
    }

    #[test]
    fn test_sizes_are_aligned() {
        let (_machine, mut t) = testkit::boot();
        let p1 = allocate(&mut t, 9);
        let p2 = allocate(&mut t, 8);
        assert_eq!(p2 as usize - p1 as usize, 16);
        assert_eq!(p1 as usize % 8, 0);
        assert_eq!(p2 as usize % 8, 0);
    }

    #[test]
    fn test_exhaustion_triggers_minor_collection() {
        let (machine, mut t) = testkit::boot_with_config(crate::MachineConfig::small());
        let nursery = t.nursery_size();

        // Churn through several nurseries' worth of garbage; the nursery
        // must be recycled rather than overflow.
        let mut rounds = 0usize;
        while rounds < 4 * (nursery / 16) {
            let _ = objects::make_int(&mut t, rounds as i32);
            rounds += 1;
        }
        assert!(t.heap_index() <= nursery);
        assert!(machine.heap.minor_collections() >= 1, "no minor collection ran");
    }
}
