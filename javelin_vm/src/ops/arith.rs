//! Integer and long arithmetic, shifts, conversions, and `lcmp`.
//!
//! Semantics are two's-complement wrapping. Shift counts are masked to
//! the value width (0x1F for ints, 0x3F for longs); `iushr`/`lushr`
//! shift the unsigned representation. Division or remainder by zero
//! raises `ArithmeticException`; `MIN / -1` wraps.

use javelin_runtime::{Kind, ObjRef};

use crate::exceptions::make_arithmetic_exception;
use crate::interp::Flow;
use crate::objects::{make_int, make_long};
use crate::opcode::*;
use crate::thread::Thread;

/// Shift-count read tolerating either an int or a long box on top.
#[inline]
fn shift_count(o: ObjRef) -> i64 {
    if o.kind() == Kind::Long {
        o.long_value()
    } else {
        o.int_value() as i64
    }
}

pub(crate) fn int_binary(t: &mut Thread, op: u8) -> Flow {
    let b_ref = t.pop();
    let a_ref = t.pop();
    let a = a_ref.int_value();
    let b = b_ref.int_value();

    let result = match op {
        IADD => a.wrapping_add(b),
        ISUB => a.wrapping_sub(b),
        IMUL => a.wrapping_mul(b),
        IDIV | IREM => {
            if b == 0 {
                t.exception = make_arithmetic_exception(t);
                return Flow::Throw;
            }
            if op == IDIV {
                a.wrapping_div(b)
            } else {
                a.wrapping_rem(b)
            }
        }
        IAND => a & b,
        IOR => a | b,
        IXOR => a ^ b,
        ISHL => a.wrapping_shl(b as u32 & 0x1f),
        ISHR => a.wrapping_shr(b as u32 & 0x1f),
        IUSHR => ((a as u32) >> (b as u32 & 0x1f)) as i32,
        _ => unreachable!("not an int binary opcode"),
    };

    let boxed = make_int(t, result);
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn long_binary(t: &mut Thread, op: u8) -> Flow {
    let b_ref = t.pop();
    let a_ref = t.pop();
    let a = a_ref.long_value();

    let result = match op {
        LSHL => a.wrapping_shl(shift_count(b_ref) as u32 & 0x3f),
        LSHR => a.wrapping_shr(shift_count(b_ref) as u32 & 0x3f),
        LUSHR => ((a as u64) >> (shift_count(b_ref) as u32 & 0x3f)) as i64,
        _ => {
            let b = b_ref.long_value();
            match op {
                LADD => a.wrapping_add(b),
                LSUB => a.wrapping_sub(b),
                LMUL => a.wrapping_mul(b),
                LDIV | LREM => {
                    if b == 0 {
                        t.exception = make_arithmetic_exception(t);
                        return Flow::Throw;
                    }
                    if op == LDIV {
                        a.wrapping_div(b)
                    } else {
                        a.wrapping_rem(b)
                    }
                }
                LAND => a & b,
                LOR => a | b,
                LXOR => a ^ b,
                _ => unreachable!("not a long binary opcode"),
            }
        }
    };

    let boxed = make_long(t, result);
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn ineg(t: &mut Thread) -> Flow {
    let v = t.pop().int_value();
    let boxed = make_int(t, v.wrapping_neg());
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn lneg(t: &mut Thread) -> Flow {
    let v = t.pop().long_value();
    let boxed = make_long(t, v.wrapping_neg());
    t.push(boxed);
    Flow::Continue
}

// =============================================================================
// Widening and narrowing
// =============================================================================

pub(crate) fn i2b(t: &mut Thread) -> Flow {
    let v = t.pop().int_value();
    let boxed = make_int(t, v as i8 as i32);
    t.push(boxed);
    Flow::Continue
}

/// `i2c`: zero-extend through the 16-bit char range.
pub(crate) fn i2c(t: &mut Thread) -> Flow {
    let v = t.pop().int_value();
    let boxed = make_int(t, v as u16 as i32);
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn i2s(t: &mut Thread) -> Flow {
    let v = t.pop().int_value();
    let boxed = make_int(t, v as i16 as i32);
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn i2l(t: &mut Thread) -> Flow {
    let v = t.pop().int_value();
    let boxed = make_long(t, v as i64);
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn l2i(t: &mut Thread) -> Flow {
    let v = t.pop().long_value();
    let boxed = make_int(t, v as i32);
    t.push(boxed);
    Flow::Continue
}

/// Three-way long comparison: −1, 0, or 1.
pub(crate) fn lcmp(t: &mut Thread) -> Flow {
    let b = t.pop().long_value();
    let a = t.pop().long_value();
    let result = match a.cmp(&b) {
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Less => -1,
    };
    let boxed = make_int(t, result);
    t.push(boxed);
    Flow::Continue
}
