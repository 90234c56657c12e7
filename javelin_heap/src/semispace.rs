//! Copying heap backend.
//!
//! Two equally sized semispaces back the tenured generation. Minor
//! collections evacuate survivors out of mutator nurseries into the
//! active space with a Cheney scan; major collections flip spaces and
//! copy the entire live graph.
//!
//! Relocated records are destroyed in place with a forwarding header, so
//! multiple roots reaching one record converge on a single copy.

use std::cell::UnsafeCell;

use javelin_platform::{fatal, Monitor};
use javelin_runtime::{object_size, visit_edges, ObjRef};
use smallvec::SmallVec;

use crate::{CollectionKind, Heap, RootsIterator, Visitor};

/// A semispace: an 8-aligned block of raw words and a bump offset.
struct Space {
    words: Box<[u64]>,
    top: usize,
}

impl Space {
    fn new(size: usize) -> Space {
        Space {
            words: vec![0u64; size / 8].into_boxed_slice(),
            top: 0,
        }
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    #[inline]
    fn contains(&self, p: *const u8) -> bool {
        let addr = p as usize;
        let base = self.base() as usize;
        addr >= base && addr < base + self.capacity()
    }

    /// Bump-allocate `size` bytes; `size` is already 8-aligned.
    fn alloc(&mut self, size: usize) -> *mut u8 {
        if self.top + size > self.capacity() {
            fatal!("tenured space exhausted ({} bytes)", self.capacity());
        }
        let p = unsafe { self.base().add(self.top) };
        self.top += size;
        p
    }
}

struct Inner {
    spaces: [Space; 2],
    /// Index of the space survivors currently live in.
    active: usize,
    /// Slots inside the active space that may hold nursery pointers,
    /// recorded by the write barrier since the last collection.
    remembered: SmallVec<[*mut ObjRef; 32]>,
    /// Completed collections, by kind.
    minor_count: usize,
    major_count: usize,
}

/// Copying heap backend with a barrier-fed remembered set.
pub struct SemispaceHeap {
    inner: UnsafeCell<Inner>,
}

// Safety: `check` mutates `remembered` only under the heap monitor passed
// by the caller; `collect` mutates everything else only under the
// machine's exclusivity guarantee, when no barrier can run concurrently.
unsafe impl Send for SemispaceHeap {}
unsafe impl Sync for SemispaceHeap {}

impl SemispaceHeap {
    /// Create a backend whose semispaces each hold `space_size` bytes.
    pub fn new(space_size: usize) -> SemispaceHeap {
        let size = javelin_runtime::align_size(space_size);
        SemispaceHeap {
            inner: UnsafeCell::new(Inner {
                spaces: [Space::new(size), Space::new(size)],
                active: 0,
                remembered: SmallVec::new(),
                minor_count: 0,
                major_count: 0,
            }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn inner(&self) -> &mut Inner {
        unsafe { &mut *self.inner.get() }
    }

    /// True if `o` lives in the tenured generation.
    pub fn contains(&self, o: ObjRef) -> bool {
        if o.is_null() {
            return false;
        }
        let inner = unsafe { self.inner() };
        inner.spaces[inner.active].contains(o.as_raw())
    }

    /// Bytes currently in use by survivors.
    pub fn used(&self) -> usize {
        let inner = unsafe { self.inner() };
        inner.spaces[inner.active].top
    }

    /// Completed minor collections.
    pub fn minor_collections(&self) -> usize {
        unsafe { self.inner() }.minor_count
    }

    /// Completed major collections.
    pub fn major_collections(&self) -> usize {
        unsafe { self.inner() }.major_count
    }
}

/// One evacuation pass: copies records into `target` unless they already
/// live in a space named by `keep`.
struct Scavenger<'a> {
    target: &'a mut Space,
    /// Region objects are never copied out of during this pass.
    keep_base: *const u8,
    keep_len: usize,
    /// Offset of the first byte copied this pass, for the Cheney scan.
    scan: usize,
}

impl Scavenger<'_> {
    #[inline]
    fn in_kept_region(&self, p: *const u8) -> bool {
        let addr = p as usize;
        let base = self.keep_base as usize;
        addr >= base && addr < base + self.keep_len
    }

    /// Evacuate the record behind `slot` if it has not been already, and
    /// rewrite the slot with its current address.
    fn scavenge(&mut self, slot: *mut ObjRef) {
        let obj = unsafe { *slot };
        if obj.is_null() {
            return;
        }
        if self.in_kept_region(obj.as_raw()) {
            return;
        }
        if obj.is_forwarded() {
            unsafe { *slot = obj.forwarded_to() };
            return;
        }

        let size = object_size(obj);
        let to = self.target.alloc(size);
        unsafe {
            std::ptr::copy_nonoverlapping(obj.as_raw(), to, size);
        }
        let copy = unsafe { ObjRef::from_raw(to) };
        obj.forward(copy);
        unsafe { *slot = copy };
    }

    /// Cheney scan: trace edges of everything copied so far, evacuating
    /// transitively until the copied region stops growing.
    fn drain(&mut self) {
        while self.scan < self.target.top {
            let obj = unsafe { ObjRef::from_raw(self.target.base().add(self.scan)) };
            let size = object_size(obj);
            let mut work: SmallVec<[*mut ObjRef; 16]> = SmallVec::new();
            visit_edges(obj, &mut |slot| work.push(slot));
            for slot in work {
                self.scavenge(slot);
            }
            self.scan += size;
        }
    }
}

impl Visitor for Scavenger<'_> {
    fn visit(&mut self, slot: *mut ObjRef) {
        self.scavenge(slot);
    }
}

impl Heap for SemispaceHeap {
    fn collect(&self, kind: CollectionKind, roots: &mut dyn RootsIterator) {
        // Safety: the caller holds the machine exclusive; no mutator or
        // barrier touches the backend for the duration.
        let inner = unsafe { self.inner() };

        match kind {
            CollectionKind::Minor => {
                // Survivors accumulate at the top of the active space;
                // records already tenured stay put.
                let remembered = std::mem::take(&mut inner.remembered);
                let (keep_base, keep_len) = {
                    let active = &inner.spaces[inner.active];
                    (active.base() as *const u8, active.capacity())
                };
                let active = &mut inner.spaces[inner.active];
                let scan = active.top;
                let mut scav = Scavenger {
                    target: active,
                    keep_base,
                    keep_len,
                    scan,
                };
                roots.iterate(&mut scav);
                for slot in remembered {
                    scav.scavenge(slot);
                }
                scav.drain();
                inner.minor_count += 1;
            }
            CollectionKind::Major => {
                // Flip: copy the whole live graph into the idle space.
                inner.remembered.clear();
                let from = inner.active;
                let to = 1 - from;
                let (keep_base, keep_len) = {
                    let target = &inner.spaces[to];
                    (target.base() as *const u8, target.capacity())
                };
                inner.spaces[to].top = 0;
                let target = &mut inner.spaces[to];
                let mut scav = Scavenger {
                    target,
                    keep_base,
                    keep_len,
                    scan: 0,
                };
                roots.iterate(&mut scav);
                scav.drain();
                inner.active = to;
                inner.spaces[from].top = 0;
                inner.major_count += 1;
            }
        }
    }

    fn check(&self, slot: *mut ObjRef, heap_lock: &Monitor<()>) {
        // Fast path: a store into a nursery record needs no record — the
        // nursery is scanned wholesale via roots at the next collection.
        let inner = unsafe { &*self.inner.get() };
        let active = &inner.spaces[inner.active];
        if !active.contains(slot as *const u8) {
            return;
        }
        let value = unsafe { *slot };
        if value.is_null() || active.contains(value.as_raw()) {
            return;
        }

        // Tenured slot now holds a nursery pointer: remember it.
        let _guard = heap_lock.acquire();
        let inner = unsafe { self.inner() };
        if inner.remembered.last() != Some(&slot) {
            inner.remembered.push(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use javelin_runtime::{Header, Kind};

    /// Fake nursery: hand-built records in a plain buffer.
    struct Arena {
        words: Vec<u64>,
        top: usize,
    }

    impl Arena {
        fn new() -> Arena {
            Arena {
                words: vec![0; 1024],
                top: 0,
            }
        }

        fn make_pair(&mut self, first: ObjRef, second: ObjRef) -> ObjRef {
            let size = javelin_runtime::records::PAIR_SIZE;
            let p = unsafe { (self.words.as_mut_ptr() as *mut u8).add(self.top) };
            self.top += size;
            unsafe {
                *(p as *mut Header) = Header::new(Kind::Pair);
                let r = ObjRef::from_raw(p);
                r.init_pair(first, second);
                r
            }
        }

        fn make_int(&mut self, v: i32) -> ObjRef {
            let size = javelin_runtime::records::INT_SIZE;
            let p = unsafe { (self.words.as_mut_ptr() as *mut u8).add(self.top) };
            self.top += size;
            unsafe {
                *(p as *mut Header) = Header::new(Kind::Int);
                let r = ObjRef::from_raw(p);
                r.init_int(v);
                r
            }
        }
    }

    struct SliceRoots<'a>(&'a mut [ObjRef]);

    impl RootsIterator for SliceRoots<'_> {
        fn iterate(&mut self, v: &mut dyn Visitor) {
            for slot in self.0.iter_mut() {
                v.visit(slot as *mut ObjRef);
            }
        }
    }

    #[test]
    fn test_minor_copies_survivors() {
        let heap = SemispaceHeap::new(16 * 1024);
        let mut arena = Arena::new();

        let a = arena.make_int(7);
        let b = arena.make_int(9);
        let pair = arena.make_pair(a, b);

        let mut roots = [pair];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut roots));

        let moved = roots[0];
        assert_ne!(moved, pair);
        assert!(heap.contains(moved));
        assert!(heap.contains(moved.pair_first()));
        assert_eq!(moved.pair_first().int_value(), 7);
        assert_eq!(moved.pair_second().int_value(), 9);
        assert_eq!(heap.minor_collections(), 1);
    }

    #[test]
    fn test_shared_record_copied_once() {
        let heap = SemispaceHeap::new(16 * 1024);
        let mut arena = Arena::new();

        let shared = arena.make_int(5);
        let p1 = arena.make_pair(shared, shared);
        let p2 = arena.make_pair(shared, ObjRef::null());

        let mut roots = [p1, p2];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut roots));

        let c1 = roots[0];
        let c2 = roots[1];
        assert_eq!(c1.pair_first(), c1.pair_second());
        assert_eq!(c1.pair_first(), c2.pair_first());
        assert_eq!(c1.pair_first().int_value(), 5);
    }

    #[test]
    fn test_unreachable_not_copied() {
        let heap = SemispaceHeap::new(16 * 1024);
        let mut arena = Arena::new();

        let _dead = arena.make_int(1);
        let live = arena.make_int(2);

        let before = heap.used();
        let mut roots = [live];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut roots));

        assert_eq!(
            heap.used() - before,
            javelin_runtime::records::INT_SIZE,
            "only the live record should be evacuated"
        );
    }

    #[test]
    fn test_major_flips_and_compacts() {
        let heap = SemispaceHeap::new(16 * 1024);
        let mut arena = Arena::new();

        let a = arena.make_int(1);
        let mut roots = [a];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut roots));
        let tenured = roots[0];
        assert!(heap.contains(tenured));

        // Drop the root to nothing else, retain `tenured` only.
        let mut roots = [tenured];
        heap.collect(CollectionKind::Major, &mut SliceRoots(&mut roots));
        assert_ne!(roots[0], tenured, "major collection moves tenured records");
        assert!(heap.contains(roots[0]));
        assert_eq!(roots[0].int_value(), 1);
        assert_eq!(heap.used(), javelin_runtime::records::INT_SIZE);
        assert_eq!(heap.major_collections(), 1);
    }

    #[test]
    fn test_barrier_remembers_tenured_slots() {
        let heap = SemispaceHeap::new(16 * 1024);
        let lock = Monitor::new(());
        let mut arena = Arena::new();

        // Tenure a pair.
        let pair = arena.make_pair(ObjRef::null(), ObjRef::null());
        let mut roots = [pair];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut roots));
        let tenured = roots[0];

        // Store a "nursery" value into it and run the barrier.
        let young = arena.make_int(11);
        unsafe {
            let slot = tenured.as_raw().add(8) as *mut ObjRef;
            *slot = young;
            heap.check(slot, &lock);
        }

        // A minor collection with no roots must still keep `young` alive
        // through the remembered slot.
        let mut no_roots: [ObjRef; 0] = [];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut no_roots));
        assert!(heap.contains(tenured.pair_first()));
        assert_eq!(tenured.pair_first().int_value(), 11);
    }

    #[test]
    fn test_barrier_ignores_nursery_slots() {
        let heap = SemispaceHeap::new(16 * 1024);
        let lock = Monitor::new(());
        let mut arena = Arena::new();

        let pair = arena.make_pair(ObjRef::null(), ObjRef::null());
        let young = arena.make_int(3);
        unsafe {
            let slot = pair.as_raw().add(8) as *mut ObjRef;
            *slot = young;
            heap.check(slot, &lock);
        }
        // Nothing remembered; nothing to assert beyond "no effect":
        let mut no_roots: [ObjRef; 0] = [];
        heap.collect(CollectionKind::Minor, &mut SliceRoots(&mut no_roots));
        assert_eq!(heap.used(), 0);
    }
}
