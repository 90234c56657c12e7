//! Constants, local loads and stores, `iinc`, and the `wide` prefix.

use javelin_platform::fatal;
use javelin_runtime::ObjRef;

use crate::interp::{fetch, read_i16, read_u16, read_u8, Flow};
use crate::objects::{make_int, make_long};
use crate::opcode::*;
use crate::thread::Thread;

// =============================================================================
// Constants
// =============================================================================

pub(crate) fn aconst_null(t: &mut Thread) -> Flow {
    t.push(ObjRef::null());
    Flow::Continue
}

pub(crate) fn iconst(t: &mut Thread, value: i32) -> Flow {
    let boxed = make_int(t, value);
    t.push(boxed);
    Flow::Continue
}

pub(crate) fn lconst(t: &mut Thread, value: i64) -> Flow {
    let boxed = make_long(t, value);
    t.push(boxed);
    Flow::Continue
}

/// Push a sign-extended byte.
pub(crate) fn bipush(t: &mut Thread) -> Flow {
    let value = read_u8(t) as i8 as i32;
    let boxed = make_int(t, value);
    t.push(boxed);
    Flow::Continue
}

/// Push a sign-extended big-endian 16-bit immediate.
pub(crate) fn sipush(t: &mut Thread) -> Flow {
    let value = read_i16(t) as i32;
    let boxed = make_int(t, value);
    t.push(boxed);
    Flow::Continue
}

/// Copy a constant-pool entry onto the stack.
pub(crate) fn ldc(t: &mut Thread) -> Flow {
    let index = read_u8(t) as usize;
    let value = t.code.code_pool().object_array_get(index);
    t.push(value);
    Flow::Continue
}

/// `ldc_w` / `ldc2_w`: wide-index constant push.
pub(crate) fn ldc_w(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let value = t.code.code_pool().object_array_get(index);
    t.push(value);
    Flow::Continue
}

// =============================================================================
// Locals
// =============================================================================

#[inline]
fn load_local(t: &mut Thread, index: usize) -> Flow {
    let value = t.frame.frame_locals().object_array_get(index);
    t.push(value);
    Flow::Continue
}

#[inline]
fn store_local(t: &mut Thread, index: usize) -> Flow {
    let value = t.pop();
    let locals = t.frame.frame_locals();
    t.set(locals.object_array_slot(index), value);
    Flow::Continue
}

/// `aload`/`iload`/`lload` with an 8-bit index.
pub(crate) fn load(t: &mut Thread) -> Flow {
    let index = read_u8(t) as usize;
    load_local(t, index)
}

/// `*load_0` .. `*load_3`.
pub(crate) fn load_n(t: &mut Thread, index: usize) -> Flow {
    load_local(t, index)
}

/// `astore`/`istore`/`lstore` with an 8-bit index.
pub(crate) fn store(t: &mut Thread) -> Flow {
    let index = read_u8(t) as usize;
    store_local(t, index)
}

/// `*store_0` .. `*store_3`.
pub(crate) fn store_n(t: &mut Thread, index: usize) -> Flow {
    store_local(t, index)
}

/// Increment a local in place by a signed immediate.
pub(crate) fn iinc(t: &mut Thread) -> Flow {
    let index = read_u8(t) as usize;
    let delta = read_u8(t) as i8 as i32;
    iinc_common(t, index, delta)
}

fn iinc_common(t: &mut Thread, index: usize, delta: i32) -> Flow {
    let value = t
        .frame
        .frame_locals()
        .object_array_get(index)
        .int_value()
        .wrapping_add(delta);
    let boxed = make_int(t, value);
    // Re-read the locals array: the box allocation may have collected.
    let locals = t.frame.frame_locals();
    t.set(locals.object_array_slot(index), boxed);
    Flow::Continue
}

// =============================================================================
// Wide prefix
// =============================================================================

/// `wide`: 16-bit index forms of the local ops, `iinc`, and `ret`.
pub(crate) fn wide(t: &mut Thread) -> Flow {
    let sub = fetch(t);
    match sub {
        ILOAD | LLOAD | ALOAD => {
            let index = read_u16(t) as usize;
            load_local(t, index)
        }
        ISTORE | LSTORE | ASTORE => {
            let index = read_u16(t) as usize;
            store_local(t, index)
        }
        IINC => {
            let index = read_u16(t) as usize;
            let delta = read_i16(t) as i32;
            iinc_common(t, index, delta)
        }
        RET => {
            let index = read_u16(t) as usize;
            t.ip = t.frame.frame_locals().object_array_get(index).int_value() as usize;
            Flow::Continue
        }
        _ => fatal!("unknown wide opcode {:#04x}", sub),
    }
}
