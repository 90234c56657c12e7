//! Mutator threads and the coordination state machine.
//!
//! Every mutator owns a [`Thread`]: its nursery, operand stack, frame
//! chain, and in-flight exception. Threads multiplex against occasional
//! exclusive (stop-the-world) operations through a six-state FSM whose
//! transitions are serialized by the machine's state monitor.
//!
//! ```text
//!          NoState
//!             ▼
//!   ┌───▶ Active ◀──▶ Idle ──▶ Zombie   (terminal)
//!   │        │ ▲                 ▲
//!   │        ▼ │                 │
//!   └── Exclusive ───────────────┘
//!            │
//!            └──▶ Exit                  (terminal join point)
//! ```
//!
//! `Exit` is also reachable from `Active`; it blocks until this thread
//! is the last one live.
//!
//! Every `wait` sits in a loop over its guard condition; spurious wakeups
//! are benign. Any transition outside the table is a fatal error.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use javelin_platform::{vm_assert, MonitorGuard};
use javelin_runtime::ObjRef;

use crate::machine::{CoordState, Machine};

/// Coordination state of a mutator thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet running; counted in neither `active` nor
    /// `live`.
    NoState,
    /// Executing bytecode.
    Active,
    /// Parked at a safepoint while another thread is (or wants to be)
    /// exclusive.
    Idle,
    /// Sole runnable thread; all other mutators are parked.
    Exclusive,
    /// Terminated. Terminal state.
    Zombie,
    /// Waiting for every other live thread to terminate. Terminal state
    /// for root threads.
    Exit,
}

/// A mutator thread.
///
/// The structure itself lives outside the heap; its reference-valued
/// fields (`thread_obj`, `frame`, `code`, `exception`, the live prefix of
/// `stack`, and every protected slot) are GC roots enumerated by the root
/// scanner. Sibling and child links weave threads into the tree the
/// scanner walks during an exclusive phase.
pub struct Thread {
    /// Owning machine.
    pub(crate) machine: Arc<Machine>,
    /// Next sibling in the parent's child list.
    pub(crate) next: *mut Thread,
    /// First child.
    pub(crate) child: *mut Thread,
    /// Coordination state; written only by this thread, under the state
    /// monitor.
    pub(crate) state: ThreadState,
    /// Heap-side thread object (carries the uncaught-exception handler in
    /// field 0); null until the embedder installs one.
    pub(crate) thread_obj: ObjRef,
    /// Innermost live frame.
    pub(crate) frame: ObjRef,
    /// Code attribute currently executing.
    pub(crate) code: ObjRef,
    /// In-flight exception, null when none.
    pub(crate) exception: ObjRef,
    /// Live instruction pointer (undefined in `frame.ip` while running).
    pub(crate) ip: usize,
    /// Offset of the opcode currently being executed; the unwinder and
    /// trace capture anchor to the instruction, not the operand cursor.
    pub(crate) insn_ip: usize,
    /// Operand-stack cursor: number of live slots.
    pub(crate) sp: usize,
    /// Nursery bump cursor in bytes.
    pub(crate) heap_index: usize,
    /// Set while the synthetic uncaught-handler frame is on the chain.
    pub(crate) in_uncaught: bool,
    /// Bump-allocated nursery (u64-backed for alignment).
    pub(crate) nursery: Box<[u64]>,
    /// Operand stack shared by all frames of this thread.
    pub(crate) stack: Box<[ObjRef]>,
    /// Stack of protected local slots; grows and shrinks with [`Protect`]
    /// guards.
    pub(crate) protectors: Vec<*mut ObjRef>,
}

// Safety: a Thread is handed between OS threads only before it starts
// running or by the exclusive-phase scanner; the coordinator serializes
// every cross-thread access to its interior.
unsafe impl Send for Thread {}

impl Thread {
    /// Create a machine's root thread in `NoState`.
    pub fn new(machine: &Arc<Machine>) -> Box<Thread> {
        let mut t = Self::fresh(machine);
        machine.register_root(&mut t);
        t
    }

    /// Create a child of `parent`, linked for root scanning.
    pub fn new_child(parent: &mut Thread) -> Box<Thread> {
        let machine = parent.machine.clone();
        let mut t = Self::fresh(&machine);
        // Link under the state monitor so an exclusive scanner never sees
        // a half-linked sibling chain.
        let _guard = machine.state.acquire();
        t.next = parent.child;
        parent.child = t.as_mut() as *mut Thread;
        t
    }

    fn fresh(machine: &Arc<Machine>) -> Box<Thread> {
        let config = machine.config();
        Box::new(Thread {
            machine: machine.clone(),
            next: std::ptr::null_mut(),
            child: std::ptr::null_mut(),
            state: ThreadState::NoState,
            thread_obj: ObjRef::null(),
            frame: ObjRef::null(),
            code: ObjRef::null(),
            exception: ObjRef::null(),
            ip: 0,
            insn_ip: 0,
            sp: 0,
            heap_index: 0,
            in_uncaught: false,
            nursery: vec![0u64; config.nursery_size / 8].into_boxed_slice(),
            stack: vec![ObjRef::null(); config.stack_size].into_boxed_slice(),
            protectors: Vec::with_capacity(64),
        })
    }

    /// The owning machine.
    #[inline]
    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    /// Current coordination state.
    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// In-flight exception, null when none.
    #[inline]
    pub fn exception(&self) -> ObjRef {
        self.exception
    }

    /// True if an exception is in flight.
    #[inline]
    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Clear the in-flight exception and return it.
    pub fn take_exception(&mut self) -> ObjRef {
        std::mem::replace(&mut self.exception, ObjRef::null())
    }

    /// Nursery capacity in bytes.
    #[inline]
    pub fn nursery_size(&self) -> usize {
        self.nursery.len() * 8
    }

    /// Nursery bump cursor in bytes.
    #[inline]
    pub fn heap_index(&self) -> usize {
        self.heap_index
    }

    /// Heap-side thread object.
    #[inline]
    pub fn thread_obj(&self) -> ObjRef {
        self.thread_obj
    }

    /// Install the heap-side thread object (and with it the uncaught
    /// exception handler in its field 0).
    pub fn set_thread_obj(&mut self, obj: ObjRef) {
        self.thread_obj = obj;
    }

    // =========================================================================
    // Operand stack
    // =========================================================================

    /// Push a value.
    #[inline]
    pub fn push(&mut self, value: ObjRef) {
        debug_assert!(self.sp < self.stack.len());
        self.stack[self.sp] = value;
        self.sp += 1;
    }

    /// Pop the top value.
    #[inline]
    pub fn pop(&mut self) -> ObjRef {
        debug_assert!(self.sp > 0);
        self.sp -= 1;
        self.stack[self.sp]
    }

    /// Read the top value without popping.
    #[inline]
    pub fn top(&self) -> ObjRef {
        debug_assert!(self.sp > 0);
        self.stack[self.sp - 1]
    }

    /// Read the value `depth` slots below the top (0 is the top).
    #[inline]
    pub fn peek(&self, depth: usize) -> ObjRef {
        debug_assert!(self.sp > depth);
        self.stack[self.sp - 1 - depth]
    }

    /// Operand-stack cursor.
    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Truncate the operand stack. Testkit and frame teardown use.
    #[inline]
    pub fn set_sp(&mut self, sp: usize) {
        debug_assert!(sp <= self.stack.len());
        self.sp = sp;
    }

    /// Read stack slot `index` (a root for `index < sp`).
    #[inline]
    pub fn stack_at(&self, index: usize) -> ObjRef {
        self.stack[index]
    }

    // =========================================================================
    // Barrier-checked stores
    // =========================================================================

    /// Store `value` into a heap slot and run the write barrier.
    ///
    /// Every store of a reference into a published heap object goes
    /// through here; the backend records old→young pointers.
    #[inline]
    pub fn set(&self, slot: *mut ObjRef, value: ObjRef) {
        unsafe { *slot = value };
        self.machine.heap.check(slot, &self.machine.heap_lock);
    }

    // =========================================================================
    // Coordination
    // =========================================================================

    /// Transition to `new_state`, observing the coordinator's transition
    /// table. Transitions outside the table abort the process.
    pub fn enter(&mut self, new_state: ThreadState) {
        if new_state == self.state {
            return;
        }
        let machine = self.machine.clone();
        let mut guard = machine.state.acquire();
        self.enter_locked(&mut guard, new_state);
    }

    /// Transition while already holding the state monitor.
    ///
    /// The exclusive path cycles through Idle/Active inline rather than
    /// reacquiring; the monitor is not reentrant.
    pub(crate) fn enter_locked(
        &mut self,
        guard: &mut MonitorGuard<'_, CoordState>,
        new_state: ThreadState,
    ) {
        use ThreadState::*;

        if new_state == self.state {
            return;
        }

        match new_state {
            Exclusive => {
                vm_assert!(
                    self.state == Active,
                    "exclusive requested from {:?}",
                    self.state
                );

                while !guard.exclusive.is_null() {
                    // Another thread got here first; yield to it.
                    self.enter_locked(guard, Idle);
                    self.enter_locked(guard, Active);
                }

                self.state = Exclusive;
                guard.exclusive = self as *mut Thread;
                self.machine
                    .exclusive_requested
                    .store(true, Ordering::Release);

                while guard.active > 1 {
                    guard.wait();
                }
            }

            Idle | Zombie => {
                match self.state {
                    Exclusive => {
                        self.release_exclusive(guard);
                        guard.active -= 1;
                    }
                    Active => {
                        guard.active -= 1;
                    }
                    // An idle thread can die without ever resuming.
                    Idle if new_state == Zombie => {}
                    _ => javelin_platform::fatal!(
                        "illegal transition {:?} -> {:?}",
                        self.state,
                        new_state
                    ),
                }

                if new_state == Zombie {
                    guard.live -= 1;
                }
                self.state = new_state;
                guard.notify_all();
            }

            Active => {
                match self.state {
                    Exclusive => {
                        self.release_exclusive(guard);
                        self.state = Active;
                        guard.notify_all();
                    }
                    NoState | Idle => {
                        while !guard.exclusive.is_null() {
                            guard.wait();
                        }
                        guard.active += 1;
                        if self.state == NoState {
                            guard.live += 1;
                        }
                        self.state = Active;
                    }
                    _ => javelin_platform::fatal!(
                        "illegal transition {:?} -> Active",
                        self.state
                    ),
                }
            }

            Exit => {
                match self.state {
                    Exclusive => {
                        self.release_exclusive(guard);
                        guard.active -= 1;
                    }
                    Active => {
                        guard.active -= 1;
                    }
                    _ => javelin_platform::fatal!(
                        "illegal transition {:?} -> Exit",
                        self.state
                    ),
                }
                self.state = Exit;
                guard.notify_all();

                while guard.live > 1 {
                    guard.wait();
                }
            }

            NoState => {
                javelin_platform::fatal!("illegal transition {:?} -> NoState", self.state)
            }
        }
    }

    fn release_exclusive(&mut self, guard: &mut MonitorGuard<'_, CoordState>) {
        vm_assert!(guard.exclusive == self as *mut Thread);
        guard.exclusive = std::ptr::null_mut();
        self.machine
            .exclusive_requested
            .store(false, Ordering::Release);
    }
}

// =============================================================================
// Protectors
// =============================================================================

/// Scoped registration of a local `ObjRef` slot as a GC root.
///
/// Any local holding a reference across a call that may allocate must be
/// protected, or a collection can leave it dangling. Guards nest strictly
/// (drop order matches Rust scope order); the registered slot is updated
/// in place when the collector relocates its referent.
pub struct Protect {
    thread: *mut Thread,
    slot: *mut ObjRef,
}

impl Protect {
    /// Register `slot` for the lifetime of the returned guard.
    pub fn new(thread: &mut Thread, slot: &mut ObjRef) -> Protect {
        let slot = slot as *mut ObjRef;
        thread.protectors.push(slot);
        Protect {
            thread: thread as *mut Thread,
            slot,
        }
    }
}

impl Drop for Protect {
    fn drop(&mut self) {
        // Safety: the guard cannot outlive its thread; creation order
        // guarantees LIFO removal.
        unsafe {
            let popped = (*self.thread).protectors.pop();
            debug_assert_eq!(popped, Some(self.slot), "protector discipline violated");
        }
    }
}

/// Protect one or more local `ObjRef` variables for the rest of the
/// enclosing scope.
#[macro_export]
macro_rules! protect {
    ($t:expr, $($slot:ident),+ $(,)?) => {
        $(
            let _guard = $crate::thread::Protect::new($t, &mut $slot);
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn test_protector_stack_discipline() {
        let (_machine, mut t) = testkit::boot();
        assert_eq!(t.protectors.len(), 0);

        let mut a = ObjRef::null();
        let mut b = ObjRef::null();
        {
            let _pa = Protect::new(&mut t, &mut a);
            {
                let _pb = Protect::new(&mut t, &mut b);
                assert_eq!(t.protectors.len(), 2);
            }
            assert_eq!(t.protectors.len(), 1);
        }
        assert_eq!(t.protectors.len(), 0);
    }

    #[test]
    fn test_stack_push_pop() {
        let (_machine, mut t) = testkit::boot();
        let v = crate::objects::make_int(&mut t, 9);
        t.push(v);
        t.push(ObjRef::null());
        assert_eq!(t.sp(), 2);
        assert!(t.pop().is_null());
        assert_eq!(t.pop().int_value(), 9);
        assert_eq!(t.sp(), 0);
    }

    #[test]
    fn test_state_counts_single_thread() {
        let (machine, mut t) = testkit::boot();
        // boot() leaves the root thread Active.
        assert_eq!(t.state(), ThreadState::Active);
        {
            let g = machine.state.acquire();
            assert_eq!(g.active, 1);
            assert_eq!(g.live, 1);
            assert!(g.exclusive.is_null());
        }

        t.enter(ThreadState::Idle);
        {
            let g = machine.state.acquire();
            assert_eq!(g.active, 0);
            assert_eq!(g.live, 1);
        }

        t.enter(ThreadState::Active);
        t.enter(ThreadState::Zombie);
        {
            let g = machine.state.acquire();
            assert_eq!(g.active, 0);
            assert_eq!(g.live, 0);
        }
    }

    #[test]
    fn test_exclusive_single_thread() {
        let (machine, mut t) = testkit::boot();
        t.enter(ThreadState::Exclusive);
        {
            let g = machine.state.acquire();
            assert_eq!(g.exclusive, t.as_mut() as *mut Thread);
            assert_eq!(g.active, 1);
        }
        t.enter(ThreadState::Active);
        let g = machine.state.acquire();
        assert!(g.exclusive.is_null());
    }
}
