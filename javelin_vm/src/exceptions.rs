//! Exception minting and backtrace capture.
//!
//! The factory builds ordinary instances of the bootstrap `Throwable`
//! hierarchy: field 0 carries the message (a `String` or null), field 1
//! the backtrace. The backtrace is captured at the throw point as a
//! `Triple` list of `(method, boxed ip, next)` entries, innermost frame
//! first.

use javelin_runtime::ObjRef;

use crate::machine::{BootClass, THROWABLE_MESSAGE, THROWABLE_TRACE};
use crate::objects::{make_instance, make_int, make_string, make_triple};
use crate::protect;
use crate::thread::Thread;

/// Snapshot the current frame chain.
///
/// Writes the live instruction pointer back into the current frame (the
/// anchor is the opcode being executed, not the operand cursor), then
/// walks outward without disturbing the chain.
pub fn make_trace(t: &mut Thread) -> ObjRef {
    if t.frame.is_some() {
        t.frame.frame_set_ip(t.insn_ip as u32);
    }

    let mut trace = ObjRef::null();
    let mut frame = t.frame;
    protect!(t, trace, frame);

    // Innermost-first: walk outward, consing onto the front, then the
    // list reads caller-last like the frames did.
    let mut entries: Vec<(u32, usize)> = Vec::new();
    let mut cursor = frame;
    let mut depth = 0usize;
    while cursor.is_some() {
        entries.push((cursor.frame_ip(), depth));
        cursor = cursor.frame_next();
        depth += 1;
    }

    // Build outermost-first so the final list is innermost-first.
    for &(ip, depth) in entries.iter().rev() {
        let ip_box = make_int(t, ip as i32);
        // `frame` is protected: re-walk to the entry's frame for a
        // current method reference.
        let mut f = frame;
        for _ in 0..depth {
            f = f.frame_next();
        }
        trace = make_triple(t, f.frame_method(), ip_box, trace);
    }
    trace
}

/// Number of entries in a backtrace list.
pub fn trace_length(mut trace: ObjRef) -> usize {
    let mut n = 0;
    while trace.is_some() {
        n += 1;
        trace = trace.triple_third();
    }
    n
}

/// Decode one backtrace entry as `(method, ip)`.
pub fn trace_entry(trace: ObjRef) -> (ObjRef, u32) {
    (trace.triple_first(), trace.triple_second().int_value() as u32)
}

/// Mint an instance of `which` carrying `message` and a backtrace
/// captured now.
pub fn make_throwable(t: &mut Thread, which: BootClass, mut message: ObjRef) -> ObjRef {
    protect!(t, message);
    let mut trace = make_trace(t);
    protect!(t, trace);

    // Bootstrap classes are machine roots; read after the allocations
    // above so the reference is current.
    let class = t.machine.boot_class(which);
    let o = make_instance(t, class);
    t.set(o.instance_field_slot(THROWABLE_MESSAGE), message);
    t.set(o.instance_field_slot(THROWABLE_TRACE), trace);
    o
}

/// `NullPointerException` with no message.
pub fn make_null_pointer_exception(t: &mut Thread) -> ObjRef {
    make_throwable(t, BootClass::NullPointerException, ObjRef::null())
}

/// `StackOverflowError` with no message.
pub fn make_stack_overflow_error(t: &mut Thread) -> ObjRef {
    make_throwable(t, BootClass::StackOverflowError, ObjRef::null())
}

/// `ArithmeticException` for division or remainder by zero.
pub fn make_arithmetic_exception(t: &mut Thread) -> ObjRef {
    let mut message = make_string(t, "/ by zero");
    protect!(t, message);
    make_throwable(t, BootClass::ArithmeticException, message)
}

/// `ArrayIndexOutOfBoundsException` with the canonical range message.
pub fn make_array_index_exception(t: &mut Thread, index: i32, length: usize) -> ObjRef {
    let mut message = make_string(t, &format!("{} not in [0,{}]", index, length));
    protect!(t, message);
    make_throwable(t, BootClass::ArrayIndexOutOfBoundsException, message)
}

/// `NegativeArrayStoreException` carrying the requested count.
pub fn make_negative_array_store_exception(t: &mut Thread, count: i32) -> ObjRef {
    let mut message = make_string(t, &format!("{}", count));
    protect!(t, message);
    make_throwable(t, BootClass::NegativeArrayStoreException, message)
}

/// `ClassCastException` with an "actual as target" message.
pub fn make_class_cast_exception(t: &mut Thread, actual: &str, target: &str) -> ObjRef {
    let mut message = make_string(t, &format!("{} as {}", actual, target));
    protect!(t, message);
    make_throwable(t, BootClass::ClassCastException, message)
}

/// `ClassNotFoundException` naming the missing class.
pub fn make_class_not_found_exception(t: &mut Thread, name: &str) -> ObjRef {
    let mut message = make_string(t, name);
    protect!(t, message);
    make_throwable(t, BootClass::ClassNotFoundException, message)
}

/// `NoSuchFieldError` or `NoSuchMethodError` with the canonical
/// "name (descriptor) not found in class" message.
pub fn make_missing_member_error(
    t: &mut Thread,
    which: BootClass,
    name: &str,
    spec: &str,
    class_name: &str,
) -> ObjRef {
    debug_assert!(matches!(
        which,
        BootClass::NoSuchFieldError | BootClass::NoSuchMethodError
    ));
    let mut message = make_string(t, &format!("{} ({}) not found in {}", name, spec, class_name));
    protect!(t, message);
    make_throwable(t, which, message)
}

/// Message text of a throwable, if it carries a `String` message.
pub fn throwable_message_text(exception: ObjRef) -> Option<Vec<u8>> {
    let message = exception.instance_field(THROWABLE_MESSAGE);
    if message.is_null() {
        return None;
    }
    let data = message.string_data();
    let offset = message.string_offset() as usize;
    let len = message.string_length() as usize;
    let bytes = unsafe { data.byte_array_bytes() };
    Some(bytes[offset..offset + len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::instance_of;
    use crate::testkit;

    #[test]
    fn test_mint_carries_class_and_message() {
        let (machine, mut t) = testkit::boot();
        let e = make_array_index_exception(&mut t, 5, 3);
        assert_eq!(
            e.instance_class(),
            machine.boot_class(BootClass::ArrayIndexOutOfBoundsException)
        );
        assert_eq!(throwable_message_text(e).unwrap(), b"5 not in [0,3]");
    }

    #[test]
    fn test_mint_is_instance_of_hierarchy() {
        let (machine, mut t) = testkit::boot();
        let e = make_null_pointer_exception(&mut t);
        assert!(instance_of(
            machine.boot_class(BootClass::RuntimeException),
            e
        ));
        assert!(instance_of(machine.boot_class(BootClass::Throwable), e));
        assert!(!instance_of(machine.boot_class(BootClass::Error), e));
    }

    #[test]
    fn test_trace_empty_without_frames() {
        let (_machine, mut t) = testkit::boot();
        let e = make_null_pointer_exception(&mut t);
        assert!(e.instance_field(THROWABLE_TRACE).is_null());
    }
}
