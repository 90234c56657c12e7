//! The process-wide machine: locks, heap, class map, and bootstrap
//! classes.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use javelin_heap::{CollectionKind, Heap, RootsIterator, Visitor};
use javelin_platform::{vm_assert, Monitor};
use javelin_runtime::{ClassFlags, ObjRef};

use crate::config::MachineConfig;
use crate::objects;
use crate::resolve;
use crate::roots;
use crate::thread::{Thread, ThreadState};

// =============================================================================
// External collaborators
// =============================================================================

/// Supplies raw class bytes by fully qualified name.
///
/// Called under the class monitor; the returned bytes only need to stay
/// valid until the parser finishes with them.
pub trait ClassFinder: Send + Sync {
    /// Return the class bytes for `name`, or `None` when unknown.
    fn find(&self, name: &[u8]) -> Option<Vec<u8>>;
}

/// Turns class bytes into a [`ObjRef`] class record.
///
/// On failure the parser sets `t.exception` and returns null. Parsing may
/// allocate; the caller keeps its own references rooted.
pub trait ClassParser: Send + Sync {
    /// Parse `bytes` into a class record allocated on `t`.
    fn parse(&self, t: &mut Thread, bytes: &[u8]) -> ObjRef;
}

/// A finder that knows no classes.
pub struct EmptyFinder;

impl ClassFinder for EmptyFinder {
    fn find(&self, _name: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

/// A parser that rejects everything; machines that only run
/// pre-interned classes never reach it.
pub struct NoParser;

impl ClassParser for NoParser {
    fn parse(&self, _t: &mut Thread, _bytes: &[u8]) -> ObjRef {
        ObjRef::null()
    }
}

// =============================================================================
// Coordination state
// =============================================================================

/// Counters guarded by the state monitor.
pub struct CoordState {
    /// The thread holding the exclusive phase, null when none.
    pub exclusive: *mut Thread,
    /// Threads currently in `Active` or `Exclusive` state.
    pub active: u32,
    /// Threads that have started and not yet died.
    pub live: u32,
}

// Safety: the raw thread pointer is only dereferenced by the coordinator
// under the state monitor.
unsafe impl Send for CoordState {}

/// A point-in-time copy of the coordinator counters.
#[derive(Debug, Clone, Copy)]
pub struct CoordSnapshot {
    /// Threads in `Active` or `Exclusive` state.
    pub active: u32,
    /// Threads started and not yet dead.
    pub live: u32,
    /// The exclusive owner, null when no exclusive phase is pending.
    pub exclusive: *mut Thread,
}

// =============================================================================
// Bootstrap classes
// =============================================================================

/// Classes interned at machine boot, indexable without a map lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BootClass {
    /// `java/lang/Object`, the root class.
    Object,
    /// `java/lang/Thread`; field 0 is the uncaught-exception handler.
    Thread,
    /// `java/lang/Throwable`; field 0 message, field 1 backtrace.
    Throwable,
    /// `java/lang/Error`.
    Error,
    /// `java/lang/Exception`.
    Exception,
    /// `java/lang/RuntimeException`.
    RuntimeException,
    /// `java/lang/NullPointerException`.
    NullPointerException,
    /// `java/lang/ArithmeticException`.
    ArithmeticException,
    /// `java/lang/ArrayIndexOutOfBoundsException`.
    ArrayIndexOutOfBoundsException,
    /// `java/lang/ClassCastException`.
    ClassCastException,
    /// `java/lang/NegativeArrayStoreException`.
    NegativeArrayStoreException,
    /// `java/lang/ClassNotFoundException`.
    ClassNotFoundException,
    /// `java/lang/NoSuchFieldError`.
    NoSuchFieldError,
    /// `java/lang/NoSuchMethodError`.
    NoSuchMethodError,
    /// `java/lang/StackOverflowError`.
    StackOverflowError,
}

/// Number of bootstrap classes.
pub const BOOT_CLASS_COUNT: usize = BootClass::StackOverflowError as usize + 1;

/// Field slot of `Throwable.message`.
pub const THROWABLE_MESSAGE: usize = 0;
/// Field slot of `Throwable.trace`.
pub const THROWABLE_TRACE: usize = 1;
/// Field slot of `Thread.uncaughtExceptionHandler`.
pub const THREAD_HANDLER: usize = 0;

impl BootClass {
    /// JVM binary name the class is interned under.
    pub fn binary_name(self) -> &'static str {
        match self {
            BootClass::Object => "java/lang/Object",
            BootClass::Thread => "java/lang/Thread",
            BootClass::Throwable => "java/lang/Throwable",
            BootClass::Error => "java/lang/Error",
            BootClass::Exception => "java/lang/Exception",
            BootClass::RuntimeException => "java/lang/RuntimeException",
            BootClass::NullPointerException => "java/lang/NullPointerException",
            BootClass::ArithmeticException => "java/lang/ArithmeticException",
            BootClass::ArrayIndexOutOfBoundsException => {
                "java/lang/ArrayIndexOutOfBoundsException"
            }
            BootClass::ClassCastException => "java/lang/ClassCastException",
            BootClass::NegativeArrayStoreException => "java/lang/NegativeArrayStoreException",
            BootClass::ClassNotFoundException => "java/lang/ClassNotFoundException",
            BootClass::NoSuchFieldError => "java/lang/NoSuchFieldError",
            BootClass::NoSuchMethodError => "java/lang/NoSuchMethodError",
            BootClass::StackOverflowError => "java/lang/StackOverflowError",
        }
    }

    fn superclass(self) -> Option<BootClass> {
        match self {
            BootClass::Object => None,
            BootClass::Thread | BootClass::Throwable => Some(BootClass::Object),
            BootClass::Error | BootClass::Exception => Some(BootClass::Throwable),
            BootClass::RuntimeException | BootClass::ClassNotFoundException => {
                Some(BootClass::Exception)
            }
            BootClass::NullPointerException
            | BootClass::ArithmeticException
            | BootClass::ArrayIndexOutOfBoundsException
            | BootClass::ClassCastException
            | BootClass::NegativeArrayStoreException => Some(BootClass::RuntimeException),
            BootClass::NoSuchFieldError
            | BootClass::NoSuchMethodError
            | BootClass::StackOverflowError => Some(BootClass::Error),
        }
    }

    fn fixed_count(self) -> u32 {
        match self {
            BootClass::Object => 0,
            BootClass::Thread => 1,
            // Throwable's message and trace slots, inherited by every
            // exception class.
            _ => 2,
        }
    }
}

// =============================================================================
// Machine
// =============================================================================

/// Initial bucket count of the class map; must stay a power of two for
/// the mask-based index.
const CLASS_MAP_BUCKETS: usize = 64;

/// Process-wide VM state shared by all mutator threads.
///
/// Three monitors partition the shared state: the state monitor guards
/// the coordinator counters, the heap monitor guards write-barrier state,
/// and the class monitor guards the class map.
pub struct Machine {
    config: MachineConfig,
    /// Heap backend.
    pub(crate) heap: Box<dyn Heap>,
    pub(crate) finder: Box<dyn ClassFinder>,
    pub(crate) parser: Box<dyn ClassParser>,
    /// Coordinator state monitor.
    pub(crate) state: Monitor<CoordState>,
    /// Lock-free mirror of `CoordState::exclusive != null`, polled by the
    /// allocation fast path.
    pub(crate) exclusive_requested: AtomicBool,
    /// Guards write-barrier state inside the backend.
    pub(crate) heap_lock: Monitor<()>,
    /// Guards the class map.
    pub(crate) class_lock: Monitor<()>,
    /// The class map: a heap-allocated chained hash map, mutated only
    /// under the class monitor, visited as a GC root.
    class_map: UnsafeCell<ObjRef>,
    /// Bootstrap class registry, visited as GC roots.
    boot_classes: UnsafeCell<[ObjRef; BOOT_CLASS_COUNT]>,
    /// Root of the thread tree.
    root_thread: UnsafeCell<*mut Thread>,
    next_type_id: AtomicU32,
    booted: AtomicBool,
}

// Safety: interior-mutable fields are guarded by the three monitors and
// the exclusive-phase discipline; see the field comments.
unsafe impl Send for Machine {}
unsafe impl Sync for Machine {}

impl Machine {
    /// Create a machine over the given collaborators. The machine is not
    /// usable for execution until [`Machine::boot`] runs on its root
    /// thread.
    pub fn new(
        config: MachineConfig,
        heap: Box<dyn Heap>,
        finder: Box<dyn ClassFinder>,
        parser: Box<dyn ClassParser>,
    ) -> Arc<Machine> {
        Arc::new(Machine {
            config,
            heap,
            finder,
            parser,
            state: Monitor::new(CoordState {
                exclusive: std::ptr::null_mut(),
                active: 0,
                live: 0,
            }),
            exclusive_requested: AtomicBool::new(false),
            heap_lock: Monitor::new(()),
            class_lock: Monitor::new(()),
            class_map: UnsafeCell::new(ObjRef::null()),
            boot_classes: UnsafeCell::new([ObjRef::null(); BOOT_CLASS_COUNT]),
            root_thread: UnsafeCell::new(std::ptr::null_mut()),
            next_type_id: AtomicU32::new(0),
            booted: AtomicBool::new(false),
        })
    }

    /// Machine configuration.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Allocate a fresh type id.
    pub(crate) fn allocate_type_id(&self) -> u32 {
        self.next_type_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Copy of the coordinator counters, taken under the state monitor.
    pub fn coord_snapshot(&self) -> CoordSnapshot {
        let guard = self.state.acquire();
        CoordSnapshot {
            active: guard.active,
            live: guard.live,
            exclusive: guard.exclusive,
        }
    }

    pub(crate) fn register_root(&self, t: &mut Thread) {
        let _guard = self.state.acquire();
        let slot = self.root_thread.get();
        // Safety: under the state monitor.
        unsafe {
            vm_assert!((*slot).is_null(), "machine already has a root thread");
            *slot = t as *mut Thread;
        }
    }

    /// The root thread pointer (null before registration).
    pub(crate) fn root_thread(&self) -> *mut Thread {
        unsafe { *self.root_thread.get() }
    }

    /// Current class map. Read under the class monitor, or during an
    /// exclusive phase.
    pub(crate) fn class_map(&self) -> ObjRef {
        unsafe { *self.class_map.get() }
    }

    /// Slot address of the class map, for root scanning.
    pub(crate) fn class_map_slot(&self) -> *mut ObjRef {
        self.class_map.get()
    }

    pub(crate) fn boot_class_slot(&self, which: BootClass) -> *mut ObjRef {
        unsafe { (*self.boot_classes.get()).as_mut_ptr().add(which as usize) }
    }

    /// A bootstrap class. The returned reference is only current until
    /// the next allocation point; re-read rather than cache.
    pub fn boot_class(&self, which: BootClass) -> ObjRef {
        unsafe { (*self.boot_classes.get())[which as usize] }
    }

    /// Intern the bootstrap hierarchy into the class map.
    ///
    /// Runs once, on the machine's root thread, which must be `Active`
    /// (boot allocates from its nursery). Exception minting, `instanceof`
    /// on bootstrap names, and uncaught-handler installation all depend
    /// on this having run.
    pub fn boot(&self, t: &mut Thread) {
        vm_assert!(t.state() == ThreadState::Active, "boot on inactive thread");
        if self.booted.swap(true, Ordering::AcqRel) {
            return;
        }

        // The class map is the first heap object the machine creates.
        let map = objects::make_raw_object_array(t, CLASS_MAP_BUCKETS);
        unsafe { *self.class_map.get() = map };

        const ORDER: [BootClass; BOOT_CLASS_COUNT] = [
            BootClass::Object,
            BootClass::Thread,
            BootClass::Throwable,
            BootClass::Error,
            BootClass::Exception,
            BootClass::RuntimeException,
            BootClass::NullPointerException,
            BootClass::ArithmeticException,
            BootClass::ArrayIndexOutOfBoundsException,
            BootClass::ClassCastException,
            BootClass::NegativeArrayStoreException,
            BootClass::ClassNotFoundException,
            BootClass::NoSuchFieldError,
            BootClass::NoSuchMethodError,
            BootClass::StackOverflowError,
        ];

        for which in ORDER {
            let super_class = match which.superclass() {
                // Superclasses precede subclasses in ORDER; the registry
                // slot is a root, so this read is always current.
                Some(s) => self.boot_class(s),
                None => ObjRef::null(),
            };
            let class = objects::make_class(
                t,
                which.binary_name().as_bytes(),
                super_class,
                ClassFlags::PUBLIC | ClassFlags::SUPER,
                which.fixed_count(),
            );
            unsafe { *self.boot_class_slot(which) = class };

            let mut name = class.class_name();
            crate::protect!(t, name);
            let hash = resolve::hash(unsafe { name.byte_array_bytes() });
            resolve::hash_map_insert(t, self.class_map(), hash, name, self.boot_class(which));
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Run a collection. The calling thread must hold the exclusive
    /// phase; every mutator is parked and the full root set is reachable
    /// from this machine.
    pub(crate) fn collect(&self, kind: CollectionKind) {
        let mut iter = MachineRoots { machine: self };
        self.heap.collect(kind, &mut iter);
    }

    /// Request the exclusive phase on `t`, run a collection of `kind`,
    /// and resume. Embedder-facing entry for forced collections.
    pub fn request_collect(&self, t: &mut Thread, kind: CollectionKind) {
        vm_assert!(t.state() == ThreadState::Active);
        t.enter(ThreadState::Exclusive);
        self.collect(kind);
        t.enter(ThreadState::Active);
    }
}

/// Machine-level root iterator: the class map, the bootstrap registry,
/// then every thread in the tree.
struct MachineRoots<'a> {
    machine: &'a Machine,
}

impl RootsIterator for MachineRoots<'_> {
    fn iterate(&mut self, v: &mut dyn Visitor) {
        v.visit(self.machine.class_map_slot());
        for i in 0..BOOT_CLASS_COUNT {
            unsafe {
                v.visit((*self.machine.boot_classes.get()).as_mut_ptr().add(i));
            }
        }

        let mut t = self.machine.root_thread();
        while !t.is_null() {
            // Safety: exclusive phase; no mutator is running.
            unsafe {
                roots::iterate_thread(&mut *t, v);
                t = (*t).next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn test_boot_interns_hierarchy() {
        let (machine, mut t) = testkit::boot();

        let npe = machine.boot_class(BootClass::NullPointerException);
        assert!(npe.is_some());
        assert_eq!(
            npe.class_super(),
            machine.boot_class(BootClass::RuntimeException)
        );
        assert_eq!(
            machine.boot_class(BootClass::RuntimeException).class_super(),
            machine.boot_class(BootClass::Exception)
        );
        assert!(machine.boot_class(BootClass::Object).class_super().is_null());

        // Interned under the binary name, resolvable like any class.
        let resolved = testkit::resolve(&mut t, "java/lang/NullPointerException");
        assert_eq!(resolved, machine.boot_class(BootClass::NullPointerException));
    }

    #[test]
    fn test_boot_runs_once() {
        let (machine, mut t) = testkit::boot();
        let map = machine.class_map();
        machine.boot(&mut t);
        assert_eq!(machine.class_map(), map);
    }

    #[test]
    fn test_type_ids_unique() {
        let (machine, _t) = testkit::boot();
        let a = machine.boot_class(BootClass::Object).class_id();
        let b = machine.boot_class(BootClass::Throwable).class_id();
        let c = machine.boot_class(BootClass::Error).class_id();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
