//! The Javelin VM core: interpreter, allocator, and thread coordinator.
//!
//! A [`Machine`] multiplexes any number of mutator [`Thread`]s over a
//! pluggable heap backend. Each thread owns a bump-allocated nursery and
//! an operand stack; classes load on demand through the machine's
//! class-byte finder and parser and intern into a shared, heap-allocated
//! class map.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Machine                           │
//! │  state monitor ── coordinator FSM (Active/Idle/Exclusive) │
//! │  heap monitor ─── write-barrier bookkeeping               │
//! │  class monitor ── class map (heap-allocated, chained)     │
//! ├───────────────────────────────────────────────────────────┤
//! │  Thread 0            Thread 1           Thread N          │
//! │  nursery + stack     nursery + stack    nursery + stack   │
//! │  frame chain         frame chain        frame chain       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Suspension happens only inside [`alloc::allocate`]: the allocation
//! path polls for a pending exclusive phase and parks the thread, and
//! nursery exhaustion takes the exclusive phase itself to run a minor
//! collection over the roots enumerated from every thread.
//!
//! # Example
//!
//! ```ignore
//! use javelin_vm::{interp, Machine, MachineConfig, Thread, ThreadState};
//!
//! let machine = Machine::new(config, heap, finder, parser);
//! let mut t = Thread::new(&machine);
//! t.enter(ThreadState::Active);
//! machine.boot(&mut t);
//!
//! let result = interp::invoke(&mut t, method, &[]);
//! assert!(!t.has_exception());
//! ```

pub mod alloc;
pub mod config;
pub mod dispatch;
pub mod exceptions;
pub mod interp;
pub mod machine;
pub mod objects;
pub mod opcode;
pub mod resolve;
pub mod testkit;
pub mod thread;

mod ops;
mod roots;

pub use config::MachineConfig;
pub use machine::{BootClass, ClassFinder, ClassParser, Machine};
pub use thread::{Protect, Thread, ThreadState};
