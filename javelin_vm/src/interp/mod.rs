//! The dispatch loop.
//!
//! `run` executes one thread's frame chain until the outermost frame
//! returns or the exception unwinder runs out of handlers. Per-opcode
//! semantics live in [`crate::ops`]; the two join points every handler
//! can reach — frame entry and exception unwind — are the `begin_invoke`
//! and `unwind` subroutines here.
//!
//! Control flow between the loop and the handlers is a small enum: a
//! handler either continues, requests a call, begins an unwind, or
//! returns a value out of the machine.

use javelin_platform::fatal;
use javelin_runtime::{Kind, ObjRef};

use crate::dispatch::instance_of;
use crate::exceptions::make_stack_overflow_error;
use crate::machine::THREAD_HANDLER;
use crate::objects::make_frame;
use crate::opcode::*;
use crate::ops;
use crate::protect;
use crate::resolve::resolve_class_in_pool;
use crate::thread::Thread;

// =============================================================================
// Control flow
// =============================================================================

/// Outcome of one opcode handler.
pub(crate) enum Flow {
    /// Fall through to the next opcode.
    Continue,
    /// `t.exception` is set; enter the unwinder.
    Throw,
    /// Push a frame for `method` consuming `param_count` stack slots.
    Invoke {
        /// Target method (already dispatch-resolved).
        method: ObjRef,
        /// Parameter slots to transfer, receiver included.
        param_count: usize,
    },
    /// The outermost frame returned.
    Return(ObjRef),
}

// =============================================================================
// Operand fetch helpers
// =============================================================================

/// Fetch the next code byte and advance.
#[inline]
pub(crate) fn fetch(t: &mut Thread) -> u8 {
    let b = t.code.code_body().byte_array_get(t.ip) as u8;
    t.ip += 1;
    b
}

/// Read an unsigned 8-bit operand.
#[inline]
pub(crate) fn read_u8(t: &mut Thread) -> u8 {
    fetch(t)
}

/// Read a big-endian unsigned 16-bit operand.
#[inline]
pub(crate) fn read_u16(t: &mut Thread) -> u16 {
    let hi = fetch(t) as u16;
    let lo = fetch(t) as u16;
    (hi << 8) | lo
}

/// Read a big-endian signed 16-bit operand.
#[inline]
pub(crate) fn read_i16(t: &mut Thread) -> i16 {
    read_u16(t) as i16
}

/// Read a big-endian signed 32-bit operand.
#[inline]
pub(crate) fn read_i32(t: &mut Thread) -> i32 {
    let hi = read_u16(t) as u32;
    let lo = read_u16(t) as u32;
    ((hi << 16) | lo) as i32
}

/// Branch to `offset` relative to the current opcode byte.
#[inline]
pub(crate) fn branch_to(t: &mut Thread, offset: i32) {
    t.ip = (t.insn_ip as isize + offset as isize) as usize;
}

// =============================================================================
// Entry
// =============================================================================

/// Invoke `method` with `args` on an idle thread and run to completion.
///
/// Returns the method's boxed return value (null for `void` or when an
/// exception escaped — in the latter case `t.exception` is set and
/// carries the backtrace).
pub fn invoke(t: &mut Thread, method: ObjRef, args: &[ObjRef]) -> ObjRef {
    for &a in args {
        t.push(a);
    }
    invoke_pushed(t, method, args.len())
}

/// Like [`invoke`], but with the arguments already pushed on the operand
/// stack (and therefore GC-rooted by the caller).
pub fn invoke_pushed(t: &mut Thread, method: ObjRef, arg_count: usize) -> ObjRef {
    debug_assert!(t.frame.is_null(), "nested entry invoke");
    t.in_uncaught = false;

    let entry_sp = t.sp - arg_count;
    match begin_invoke(t, method, arg_count) {
        Flow::Throw => {
            t.set_sp(entry_sp);
            ObjRef::null()
        }
        _ => run(t),
    }
}

/// The dispatch loop.
pub fn run(t: &mut Thread) -> ObjRef {
    loop {
        t.insn_ip = t.ip;
        let op = fetch(t);
        let flow = step(t, op);
        match flow {
            Flow::Continue => {}
            Flow::Invoke {
                method,
                param_count,
            } => {
                if let Flow::Throw = begin_invoke(t, method, param_count) {
                    if !unwind(t) {
                        return ObjRef::null();
                    }
                }
            }
            Flow::Throw => {
                if !unwind(t) {
                    return ObjRef::null();
                }
            }
            Flow::Return(value) => return value,
        }
    }
}

// =============================================================================
// Frame entry (the `invoke` join point)
// =============================================================================

/// Push a frame for `method`, moving `param_count` operand slots into its
/// locals.
pub(crate) fn begin_invoke(t: &mut Thread, method: ObjRef, param_count: usize) -> Flow {
    let code = method.method_code();
    if code.code_max_stack() as usize + t.sp - param_count > t.stack.len() {
        t.exception = make_stack_overflow_error(t);
        return Flow::Throw;
    }

    if t.frame.is_some() {
        t.frame.frame_set_ip(t.ip as u32);
    }

    // The parameter slots stay below `sp` (and thus GC-scanned) until
    // after the frame and locals exist.
    let base = t.sp - param_count;
    let frame = make_frame(
        t,
        method,
        t.frame,
        0,
        base as u32,
        code.code_max_locals(),
    );
    let locals = frame.frame_locals();
    for i in 0..param_count {
        // Fresh locals array: plain stores, the barrier has nothing to
        // record for a nursery-resident holder.
        locals.object_array_set(i, t.stack_at(base + i));
    }
    t.set_sp(base);
    t.frame = frame;
    t.code = frame.frame_method().method_code();
    t.ip = 0;
    Flow::Continue
}

// =============================================================================
// Unwind (the `throw_` join point)
// =============================================================================

/// Walk the frame chain looking for a handler of the in-flight
/// exception.
///
/// On a match: operand stack cut to the frame's base, the exception
/// pushed, execution resumed at the handler — returns true. With the
/// chain exhausted, the thread's uncaught-exception handler (if
/// installed) becomes a synthetic top frame; without one, returns false
/// and leaves `t.exception` for the embedder.
pub(crate) fn unwind(t: &mut Thread) -> bool {
    debug_assert!(t.has_exception());

    if t.frame.is_some() {
        t.frame.frame_set_ip(t.insn_ip as u32);
    }

    let mut innermost = true;
    while t.frame.is_some() {
        t.code = t.frame.frame_method().method_code();

        // Outer frames hold return addresses, which point just past the
        // invoke; step back inside the instruction for range checks.
        let throw_pc = if innermost {
            t.frame.frame_ip()
        } else {
            t.frame.frame_ip().saturating_sub(1)
        };

        if let Some(handler_pc) = select_handler(t, throw_pc) {
            t.set_sp(t.frame.frame_stack_base() as usize);
            t.ip = handler_pc;
            t.code = t.frame.frame_method().method_code();
            let e = t.take_exception();
            t.push(e);
            return true;
        }

        t.frame = t.frame.frame_next();
        innermost = false;
    }

    // No handler anywhere. Hand the exception to the thread's uncaught
    // handler, if one was installed at thread init.
    if t.in_uncaught {
        // The uncaught handler is assumed not to throw.
        fatal!("exception escaped the uncaught-exception handler");
    }

    let handler = if t.thread_obj.is_some() {
        t.thread_obj.instance_field(THREAD_HANDLER)
    } else {
        ObjRef::null()
    };
    if handler.is_null() {
        t.code = ObjRef::null();
        return false;
    }

    t.in_uncaught = true;
    t.set_sp(0);
    let max_locals = handler.method_code().code_max_locals();
    let frame = make_frame(t, handler, ObjRef::null(), 0, 0, max_locals);
    t.frame = frame;
    t.code = frame.frame_method().method_code();
    t.ip = 0;
    let e = t.take_exception();
    t.push(e);
    true
}

/// Scan the current code's handler table for the lexically first entry
/// covering `throw_pc` that matches the in-flight exception.
fn select_handler(t: &mut Thread, throw_pc: u32) -> Option<usize> {
    for i in 0..t.code.code_handler_count() {
        let h = t.code.code_handler(i);
        if throw_pc < h.start_pc || throw_pc >= h.end_pc {
            continue;
        }
        if h.catch_type == 0 {
            return Some(h.handler_pc as usize);
        }
        let catch_class = resolve_catch_type(t, h.catch_type as usize);
        if catch_class.is_some() && instance_of(catch_class, t.exception) {
            return Some(h.handler_pc as usize);
        }
    }
    None
}

/// Resolve a handler's catch type with the in-flight exception stashed
/// aside. A failed resolution counts as a non-match; the original
/// exception keeps unwinding.
fn resolve_catch_type(t: &mut Thread, index: usize) -> ObjRef {
    let entry = t.code.code_pool().object_array_get(index);
    if entry.kind() == Kind::Class {
        return entry;
    }

    let mut pending = t.take_exception();
    protect!(t, pending);
    let pool = t.code.code_pool();
    let class = resolve_class_in_pool(t, pool, index);
    if t.has_exception() {
        t.take_exception();
        t.exception = pending;
        return ObjRef::null();
    }
    t.exception = pending;
    class
}

// =============================================================================
// Opcode dispatch
// =============================================================================

/// Execute one opcode.
fn step(t: &mut Thread, op: u8) -> Flow {
    match op {
        NOP => Flow::Continue,

        // Constants
        ACONST_NULL => ops::loads::aconst_null(t),
        ICONST_0 | ICONST_1 | ICONST_2 | ICONST_3 | ICONST_4 | ICONST_5 => {
            ops::loads::iconst(t, (op - ICONST_0) as i32)
        }
        LCONST_0 | LCONST_1 => ops::loads::lconst(t, (op - LCONST_0) as i64),
        BIPUSH => ops::loads::bipush(t),
        SIPUSH => ops::loads::sipush(t),
        LDC => ops::loads::ldc(t),
        LDC_W | LDC2_W => ops::loads::ldc_w(t),

        // Loads and stores
        ILOAD | LLOAD | ALOAD => ops::loads::load(t),
        ILOAD_0 | LLOAD_0 | ALOAD_0 => ops::loads::load_n(t, 0),
        ILOAD_1 | LLOAD_1 | ALOAD_1 => ops::loads::load_n(t, 1),
        ILOAD_2 | LLOAD_2 | ALOAD_2 => ops::loads::load_n(t, 2),
        ILOAD_3 | LLOAD_3 | ALOAD_3 => ops::loads::load_n(t, 3),
        ISTORE | LSTORE | ASTORE => ops::loads::store(t),
        ISTORE_0 | LSTORE_0 | ASTORE_0 => ops::loads::store_n(t, 0),
        ISTORE_1 | LSTORE_1 | ASTORE_1 => ops::loads::store_n(t, 1),
        ISTORE_2 | LSTORE_2 | ASTORE_2 => ops::loads::store_n(t, 2),
        ISTORE_3 | LSTORE_3 | ASTORE_3 => ops::loads::store_n(t, 3),
        IINC => ops::loads::iinc(t),
        WIDE => ops::loads::wide(t),

        // Operand-stack shuffling
        POP => ops::stack::pop(t),
        POP2 => ops::stack::pop2(t),
        DUP => ops::stack::dup(t),
        DUP_X1 => ops::stack::dup_x1(t),
        DUP_X2 => ops::stack::dup_x2(t),
        DUP2 => ops::stack::dup2(t),
        DUP2_X1 => ops::stack::dup2_x1(t),
        DUP2_X2 => ops::stack::dup2_x2(t),
        SWAP => ops::stack::swap(t),

        // Arithmetic
        IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR | IXOR | ISHL | ISHR | IUSHR => {
            ops::arith::int_binary(t, op)
        }
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR | LSHL | LSHR | LUSHR => {
            ops::arith::long_binary(t, op)
        }
        INEG => ops::arith::ineg(t),
        LNEG => ops::arith::lneg(t),
        I2B => ops::arith::i2b(t),
        I2C => ops::arith::i2c(t),
        I2S => ops::arith::i2s(t),
        I2L => ops::arith::i2l(t),
        L2I => ops::arith::l2i(t),
        LCMP => ops::arith::lcmp(t),

        // Branches
        IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE => ops::branch::if_zero(t, op),
        IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE => {
            ops::branch::if_icmp(t, op)
        }
        IF_ACMPEQ | IF_ACMPNE => ops::branch::if_acmp(t, op),
        IFNULL | IFNONNULL => ops::branch::if_null(t, op),
        GOTO => ops::branch::goto(t),
        GOTO_W => ops::branch::goto_w(t),
        JSR => ops::branch::jsr(t),
        JSR_W => ops::branch::jsr_w(t),
        RET => ops::branch::ret(t),

        // Arrays
        NEWARRAY => ops::array::newarray(t),
        ANEWARRAY => ops::array::anewarray(t),
        ARRAYLENGTH => ops::array::arraylength(t),
        IALOAD | LALOAD | AALOAD | BALOAD | CALOAD | SALOAD => ops::array::load(t, op),
        IASTORE | LASTORE | AASTORE | BASTORE | CASTORE | SASTORE => ops::array::store(t, op),

        // Objects
        NEW => ops::object::new(t),
        GETFIELD => ops::object::getfield(t),
        PUTFIELD => ops::object::putfield(t),
        GETSTATIC => ops::object::getstatic(t),
        PUTSTATIC => ops::object::putstatic(t),
        CHECKCAST => ops::object::checkcast(t),
        INSTANCEOF => ops::object::instanceof(t),

        // Calls and returns
        INVOKEVIRTUAL => ops::invoke::invokevirtual(t),
        INVOKESPECIAL => ops::invoke::invokespecial(t),
        INVOKESTATIC => ops::invoke::invokestatic(t),
        INVOKEINTERFACE => ops::invoke::invokeinterface(t),
        IRETURN | LRETURN | ARETURN => ops::invoke::return_value(t),
        RETURN => ops::invoke::return_void(t),
        ATHROW => ops::invoke::athrow(t),

        _ => fatal!("unknown opcode {:#04x} at {}", op, t.insn_ip),
    }
}
