//! Call, return, and throw opcodes.
//!
//! The four invoke forms resolve their target through the dispatcher and
//! hand the frame transition back to the main loop as
//! [`Flow::Invoke`]. Every form interposes class initialization on the
//! resolved method's declaring class before dispatching; returns restore
//! the caller frame and leave the result in the caller's stack window.

use javelin_runtime::ObjRef;

use crate::dispatch::{
    find_interface_method, find_method, find_virtual_method, is_special_method,
    pending_initializer,
};
use crate::exceptions::make_null_pointer_exception;
use crate::interp::{read_u16, Flow};
use crate::thread::Thread;

/// Pop the callee frame, restoring the caller's code and ip.
///
/// `value` (if any) lands at the callee's stack base — the slot the
/// caller's arguments occupied. Returns the flow out of the loop when the
/// outermost frame pops.
fn do_return(t: &mut Thread, value: Option<ObjRef>) -> Flow {
    let frame = t.frame;
    t.set_sp(frame.frame_stack_base() as usize);

    let caller = frame.frame_next();
    t.frame = caller;
    if caller.is_null() {
        // Outermost frame: the embedder takes the result out of band.
        t.code = ObjRef::null();
        return Flow::Return(value.unwrap_or(ObjRef::null()));
    }

    if let Some(v) = value {
        t.push(v);
    }
    t.code = caller.frame_method().method_code();
    t.ip = caller.frame_ip() as usize;
    Flow::Continue
}

/// `ireturn`/`lreturn`/`areturn`.
pub(crate) fn return_value(t: &mut Thread) -> Flow {
    let value = t.pop();
    do_return(t, Some(value))
}

/// `return`.
pub(crate) fn return_void(t: &mut Thread) -> Flow {
    do_return(t, None)
}

/// `athrow`: begin unwinding with the popped throwable (null raises
/// `NullPointerException` instead).
pub(crate) fn athrow(t: &mut Thread) -> Flow {
    let mut exception = t.pop();
    if exception.is_null() {
        exception = make_null_pointer_exception(t);
    }
    t.exception = exception;
    Flow::Throw
}

pub(crate) fn invokevirtual(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let pool = t.code.code_pool();
    let method = crate::resolve::resolve_method(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, method.method_class()) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    let param_count = method.method_param_count() as usize;
    let receiver = t.stack_at(t.sp() - param_count);
    if receiver.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Flow::Throw;
    }

    Flow::Invoke {
        method: find_virtual_method(method, receiver),
        param_count,
    }
}

pub(crate) fn invokeinterface(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    // Historical count-and-zero operand bytes.
    let _ = read_u16(t);

    let pool = t.code.code_pool();
    let method = crate::resolve::resolve_method(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, method.method_class()) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    let param_count = method.method_param_count() as usize;
    let receiver = t.stack_at(t.sp() - param_count);
    if receiver.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Flow::Throw;
    }

    Flow::Invoke {
        method: find_interface_method(method, receiver),
        param_count,
    }
}

pub(crate) fn invokespecial(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let pool = t.code.code_pool();
    let method = crate::resolve::resolve_method(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, method.method_class()) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    let param_count = method.method_param_count() as usize;
    let receiver = t.stack_at(t.sp() - param_count);
    if receiver.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Flow::Throw;
    }

    let current_class = t.frame.frame_method().method_class();
    let target = if is_special_method(method, current_class) {
        find_method(method, current_class.class_super())
    } else {
        method
    };

    Flow::Invoke {
        method: target,
        param_count,
    }
}

pub(crate) fn invokestatic(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let pool = t.code.code_pool();
    let method = crate::resolve::resolve_method(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, method.method_class()) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    Flow::Invoke {
        method,
        param_count: method.method_param_count() as usize,
    }
}
