//! Heap backend interface for the Javelin VM.
//!
//! The machine core is collector-agnostic: it hands a backend an iterator
//! over its GC roots and a write-barrier hook, and the backend owns
//! everything else — placement, relocation, and generational bookkeeping.
//!
//! Two guarantees flow in each direction:
//!
//! - The **caller** of [`Heap::collect`] guarantees exclusive access: no
//!   mutator is running, and every root the machine holds is reachable
//!   through the supplied [`RootsIterator`].
//! - The **backend** guarantees that when `collect` returns, every slot
//!   presented to its visitor holds the current address of a live record,
//!   and that relocated records in mutator nurseries carry forwarding
//!   headers for the duration of the collection.
//!
//! [`SemispaceHeap`] is the bundled backend: a bump-allocated tenured
//! space with copying collection and a remembered set fed by the write
//! barrier.

#![warn(missing_docs)]

mod semispace;

pub use semispace::SemispaceHeap;

use javelin_platform::Monitor;
use javelin_runtime::ObjRef;

/// Which generation a collection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Evacuate mutator nurseries into the tenured space.
    Minor,
    /// Trace and copy the entire live graph.
    Major,
}

/// Receives reference slots during root enumeration and tracing.
///
/// A slot address is stable for the duration of the `visit` call; the
/// visitor may overwrite `*slot` with a relocated address.
pub trait Visitor {
    /// Present one reference slot.
    fn visit(&mut self, slot: *mut ObjRef);
}

impl<F: FnMut(*mut ObjRef)> Visitor for F {
    fn visit(&mut self, slot: *mut ObjRef) {
        self(slot)
    }
}

/// Supplies the root set of a machine to a collecting backend.
pub trait RootsIterator {
    /// Present every root slot to `v`, exactly once each.
    fn iterate(&mut self, v: &mut dyn Visitor);
}

/// A pluggable heap backend.
///
/// Implementations are shared across mutator threads; interior state must
/// be guarded by the heap monitor (for the barrier) and by the caller's
/// exclusivity guarantee (for collection).
pub trait Heap: Send + Sync {
    /// Run a collection. The caller guarantees exclusive access and that
    /// `roots` covers every live reference held outside the heap.
    fn collect(&self, kind: CollectionKind, roots: &mut dyn RootsIterator);

    /// Write barrier: called after every store of a reference into a heap
    /// slot. `heap_lock` is the machine's heap monitor; the backend
    /// acquires it if it needs to mutate shared barrier state.
    fn check(&self, slot: *mut ObjRef, heap_lock: &Monitor<()>);
}
