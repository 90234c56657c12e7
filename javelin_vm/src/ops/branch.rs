//! Comparisons, branches, and subroutine linkage.
//!
//! Branch offsets are signed, big-endian, and relative to the opcode
//! byte. `jsr`/`jsr_w` push the return address (the offset of the next
//! instruction) as a boxed int; `ret` reads it back out of a local.

use crate::interp::{branch_to, read_i16, read_i32, read_u8, Flow};
use crate::objects::make_int;
use crate::opcode::*;
use crate::thread::Thread;

/// `ifeq` .. `ifle`: compare the top int against zero.
pub(crate) fn if_zero(t: &mut Thread, op: u8) -> Flow {
    let offset = read_i16(t) as i32;
    let v = t.pop().int_value();
    let taken = match op {
        IFEQ => v == 0,
        IFNE => v != 0,
        IFLT => v < 0,
        IFGE => v >= 0,
        IFGT => v > 0,
        IFLE => v <= 0,
        _ => unreachable!("not a zero-compare opcode"),
    };
    if taken {
        branch_to(t, offset);
    }
    Flow::Continue
}

/// `if_icmpeq` .. `if_icmple`: compare two ints.
pub(crate) fn if_icmp(t: &mut Thread, op: u8) -> Flow {
    let offset = read_i16(t) as i32;
    let b = t.pop().int_value();
    let a = t.pop().int_value();
    let taken = match op {
        IF_ICMPEQ => a == b,
        IF_ICMPNE => a != b,
        IF_ICMPLT => a < b,
        IF_ICMPGE => a >= b,
        IF_ICMPGT => a > b,
        IF_ICMPLE => a <= b,
        _ => unreachable!("not an int-compare opcode"),
    };
    if taken {
        branch_to(t, offset);
    }
    Flow::Continue
}

/// `if_acmpeq`/`if_acmpne`: reference identity.
pub(crate) fn if_acmp(t: &mut Thread, op: u8) -> Flow {
    let offset = read_i16(t) as i32;
    let b = t.pop();
    let a = t.pop();
    let taken = if op == IF_ACMPEQ { a == b } else { a != b };
    if taken {
        branch_to(t, offset);
    }
    Flow::Continue
}

/// `ifnull`/`ifnonnull`.
pub(crate) fn if_null(t: &mut Thread, op: u8) -> Flow {
    let offset = read_i16(t) as i32;
    let v = t.pop();
    let taken = if op == IFNULL {
        v.is_null()
    } else {
        v.is_some()
    };
    if taken {
        branch_to(t, offset);
    }
    Flow::Continue
}

pub(crate) fn goto(t: &mut Thread) -> Flow {
    let offset = read_i16(t) as i32;
    branch_to(t, offset);
    Flow::Continue
}

pub(crate) fn goto_w(t: &mut Thread) -> Flow {
    let offset = read_i32(t);
    branch_to(t, offset);
    Flow::Continue
}

pub(crate) fn jsr(t: &mut Thread) -> Flow {
    let offset = read_i16(t) as i32;
    let ret_addr = make_int(t, t.ip as i32);
    t.push(ret_addr);
    branch_to(t, offset);
    Flow::Continue
}

pub(crate) fn jsr_w(t: &mut Thread) -> Flow {
    let offset = read_i32(t);
    let ret_addr = make_int(t, t.ip as i32);
    t.push(ret_addr);
    branch_to(t, offset);
    Flow::Continue
}

/// `ret`: resume at the address saved by `jsr`.
pub(crate) fn ret(t: &mut Thread) -> Flow {
    let index = read_u8(t) as usize;
    t.ip = t.frame.frame_locals().object_array_get(index).int_value() as usize;
    Flow::Continue
}
