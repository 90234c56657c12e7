//! Platform primitives for the Javelin VM.
//!
//! The rest of the system depends on exactly two services from the host:
//!
//! - **Monitors**: a mutex paired with a single condition variable, used by
//!   the thread coordinator, the write barrier, and the class resolver.
//! - **Fatal abort**: invariant violations terminate the process. There is
//!   no recovery path; the VM's internal errors are never surfaced as
//!   catchable conditions.
//!
//! Monitors are built on `parking_lot`, whose guards carry no poisoning
//! state — an unwinding lock holder is already a fatal bug here, so poison
//! bookkeeping would only obscure the abort.

#![warn(missing_docs)]

use parking_lot::{Condvar, Mutex, MutexGuard};

// =============================================================================
// Fatal errors
// =============================================================================

/// Terminate the process immediately.
///
/// Called on any violation of a VM invariant: an illegal coordinator
/// transition, an allocation larger than a nursery, an unknown opcode.
/// No unwinding, no destructors.
pub fn abort() -> ! {
    std::process::abort()
}

/// Abort with a message on stderr.
///
/// The message is best-effort; `abort()` follows unconditionally.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        eprintln!("javelin: fatal: {}", format_args!($($arg)*));
        $crate::abort()
    }};
}

/// Assert a VM invariant, aborting the process on failure.
///
/// Unlike `assert!`, this never unwinds; it is safe to use on paths where
/// an unwind would leave shared VM state inconsistent.
#[macro_export]
macro_rules! vm_assert {
    ($cond:expr) => {
        if !$cond {
            $crate::fatal!("assertion failed: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::fatal!($($arg)*);
        }
    };
}

// =============================================================================
// Monitor
// =============================================================================

/// A mutex plus a single condition variable guarding a value of type `T`.
///
/// `acquire` returns a scoped guard; the monitor is released on every exit
/// path out of the guard's scope. `wait` atomically releases the monitor
/// and blocks until a `notify_all`, reacquiring before it returns. Spurious
/// wakeups are permitted, so every wait sits in a loop over its guard
/// condition.
///
/// Acquisition is not reentrant: a thread that acquires a monitor it
/// already holds deadlocks.
pub struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    /// Create a monitor guarding `value`.
    pub fn new(value: T) -> Self {
        Monitor {
            state: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    /// Acquire the monitor, blocking until it is free.
    pub fn acquire(&self) -> MonitorGuard<'_, T> {
        MonitorGuard {
            guard: self.state.lock(),
            cond: &self.cond,
        }
    }

    /// Wake all threads waiting on this monitor without acquiring it.
    ///
    /// Only meaningful when the caller has already published the state
    /// change the waiters are polling for.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

/// Scoped acquisition of a [`Monitor`].
///
/// Dereferences to the guarded state. Dropping the guard releases the
/// monitor, including when the stack unwinds.
pub struct MonitorGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    cond: &'a Condvar,
}

impl<T> MonitorGuard<'_, T> {
    /// Release the monitor and block until another thread calls
    /// [`Monitor::notify_all`] (or a spurious wakeup occurs), then
    /// reacquire it.
    pub fn wait(&mut self) {
        self.cond.wait(&mut self.guard);
    }

    /// Wake all threads waiting on this monitor. The monitor stays held.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

impl<T> std::ops::Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let m = Monitor::new(0u32);
        {
            let mut g = m.acquire();
            *g += 1;
        }
        let g = m.acquire();
        assert_eq!(*g, 1);
    }

    #[test]
    fn test_wait_notify() {
        let m = Arc::new(Monitor::new(false));
        let m2 = Arc::clone(&m);

        let waiter = thread::spawn(move || {
            let mut g = m2.acquire();
            while !*g {
                g.wait();
            }
        });

        // Let the waiter block, then publish and notify under the monitor.
        thread::sleep(Duration::from_millis(20));
        {
            let mut g = m.acquire();
            *g = true;
            g.notify_all();
        }
        waiter.join().unwrap();
    }

    #[test]
    fn test_notify_without_guard() {
        let m = Arc::new(Monitor::new(0u32));
        let m2 = Arc::clone(&m);

        let waiter = thread::spawn(move || {
            let mut g = m2.acquire();
            while *g == 0 {
                g.wait();
            }
            *g
        });

        thread::sleep(Duration::from_millis(20));
        {
            let mut g = m.acquire();
            *g = 7;
        }
        m.notify_all();
        assert_eq!(waiter.join().unwrap(), 7);
    }

    #[test]
    fn test_wait_loop_tolerates_spurious_wakes() {
        // A waiter looping over its guard condition must not observe the
        // guarded state before it is published, however often it wakes.
        let m = Arc::new(Monitor::new(0u32));
        let m2 = Arc::clone(&m);

        let waiter = thread::spawn(move || {
            let mut g = m2.acquire();
            while *g < 3 {
                g.wait();
            }
            *g
        });

        for i in 1..=3 {
            thread::sleep(Duration::from_millis(5));
            let mut g = m.acquire();
            *g = i;
            g.notify_all();
        }
        assert_eq!(waiter.join().unwrap(), 3);
    }
}
