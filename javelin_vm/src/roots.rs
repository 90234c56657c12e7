//! GC-root enumeration over a thread tree.
//!
//! For one thread the scan visits, in order: the heap-side thread object,
//! the current frame, the current code, the in-flight exception, the live
//! operand-stack prefix `stack[0..sp)`, and every protected local slot.
//! It then recurses into the thread's children.
//!
//! Scanning a thread also resets its nursery bump cursor: a minor
//! collection *is* a nursery reset, performed after the backend has
//! evacuated every survivor reachable from the visited slots.

use javelin_heap::Visitor;

use crate::thread::Thread;

/// Visit every root of `t` and its descendants.
///
/// # Safety
///
/// Caller must hold the machine exclusive (or otherwise guarantee `t` and
/// its children are parked); the visitor may rewrite each slot.
pub(crate) unsafe fn iterate_thread(t: &mut Thread, v: &mut dyn Visitor) {
    t.heap_index = 0;

    v.visit(&mut t.thread_obj);
    v.visit(&mut t.frame);
    v.visit(&mut t.code);
    v.visit(&mut t.exception);

    for i in 0..t.sp {
        v.visit(&mut t.stack[i]);
    }

    for &slot in &t.protectors {
        v.visit(slot);
    }

    let mut child = t.child;
    while !child.is_null() {
        // Safety: child links are mutated only under the state monitor;
        // the exclusive phase serializes us against that.
        unsafe {
            iterate_thread(&mut *child, v);
            child = (*child).next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects;
    use crate::testkit;
    use javelin_runtime::ObjRef;

    fn collect_roots(t: &mut Thread) -> Vec<*mut ObjRef> {
        let mut seen = Vec::new();
        let mut v = |slot: *mut ObjRef| seen.push(slot);
        unsafe { iterate_thread(t, &mut v) };
        seen
    }

    #[test]
    fn test_scan_covers_stack_prefix_and_protectors() {
        let (_machine, mut t) = testkit::boot();

        let a = objects::make_int(&mut t, 1);
        t.push(a);
        let b = objects::make_int(&mut t, 2);
        t.push(b);

        let mut local = objects::make_int(&mut t, 3);
        let roots = {
            crate::protect!(&mut t, local);
            collect_roots(&mut t)
        };

        // thread_obj, frame, code, exception + 2 stack slots + 1 protector.
        assert_eq!(roots.len(), 4 + 2 + 1);
        assert!(roots.contains(&(&mut local as *mut ObjRef)));
    }

    #[test]
    fn test_scan_resets_nursery_cursor() {
        let (_machine, mut t) = testkit::boot();
        let v = objects::make_int(&mut t, 42);
        t.push(v);
        assert!(t.heap_index() > 0);

        let _ = collect_roots(&mut t);
        assert_eq!(t.heap_index(), 0);
    }

    #[test]
    fn test_scan_indexes_each_stack_slot() {
        // Each visited slot must be distinct (the scan indexes by `i`,
        // not by the cursor).
        let (_machine, mut t) = testkit::boot();
        for i in 0..4 {
            let v = objects::make_int(&mut t, i);
            t.push(v);
        }
        let roots = collect_roots(&mut t);
        let stack_roots = &roots[4..8];
        for pair in stack_roots.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_scan_recurses_into_children() {
        let (_machine, mut parent) = testkit::boot();
        let mut child = Thread::new_child(&mut parent);
        child.enter(crate::thread::ThreadState::Active);
        let v = objects::make_int(&mut child, 5);
        child.push(v);

        let roots = collect_roots(&mut parent);
        // Parent's 4 fixed slots + child's 4 fixed slots + child's stack slot.
        assert_eq!(roots.len(), 9);
        child.enter(crate::thread::ThreadState::Zombie);
    }
}
