//! Array allocation, element access, and `arraylength`.
//!
//! A null array reference raises `NullPointerException`; an index outside
//! `[0, length)` raises `ArrayIndexOutOfBoundsException` with the
//! canonical range message; a negative requested length raises
//! `NegativeArrayStoreException`.

use javelin_platform::fatal;
use javelin_runtime::{Kind, ObjRef};

use crate::exceptions::{
    make_array_index_exception, make_negative_array_store_exception, make_null_pointer_exception,
};
use crate::interp::{read_u16, read_u8, Flow};
use crate::objects::{
    make_byte, make_int, make_long, make_object_array, make_prim_array, make_short,
};
use crate::opcode::*;
use crate::resolve::resolve_class_in_pool;
use crate::thread::Thread;

/// Null- and bounds-check an element access, minting the in-band
/// exception on failure.
#[inline]
fn checked_index(t: &mut Thread, array: ObjRef, index_ref: ObjRef) -> Result<usize, Flow> {
    if array.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Err(Flow::Throw);
    }
    let i = index_ref.int_value();
    let len = array.array_length();
    if i < 0 || i as usize >= len {
        t.exception = make_array_index_exception(t, i, len);
        return Err(Flow::Throw);
    }
    Ok(i as usize)
}

/// Element loads for every array kind.
pub(crate) fn load(t: &mut Thread, op: u8) -> Flow {
    let index_ref = t.pop();
    let array = t.pop();
    let i = match checked_index(t, array, index_ref) {
        Ok(i) => i,
        Err(flow) => return flow,
    };

    // Read the element before boxing: the box allocation may relocate
    // the array.
    let boxed = match op {
        AALOAD => {
            t.push(array.object_array_get(i));
            return Flow::Continue;
        }
        IALOAD => {
            let v = array.int_array_get(i);
            make_int(t, v)
        }
        LALOAD => {
            let v = array.long_array_get(i);
            make_long(t, v)
        }
        BALOAD => {
            let v = if array.kind() == Kind::BooleanArray {
                array.boolean_array_get(i) as i8
            } else {
                array.byte_array_get(i)
            };
            make_byte(t, v)
        }
        CALOAD => {
            let v = array.char_array_get(i);
            make_int(t, v as i32)
        }
        SALOAD => {
            let v = array.short_array_get(i);
            make_short(t, v)
        }
        _ => unreachable!("not an array load opcode"),
    };
    t.push(boxed);
    Flow::Continue
}

/// Element stores for every array kind.
pub(crate) fn store(t: &mut Thread, op: u8) -> Flow {
    let value = t.pop();
    let index_ref = t.pop();
    let array = t.pop();
    let i = match checked_index(t, array, index_ref) {
        Ok(i) => i,
        Err(flow) => return flow,
    };

    match op {
        AASTORE => t.set(array.object_array_slot(i), value),
        IASTORE => array.int_array_set(i, value.int_value()),
        LASTORE => array.long_array_set(i, value.long_value()),
        BASTORE => {
            if array.kind() == Kind::BooleanArray {
                array.boolean_array_set(i, (value.int_value() & 1) as u8)
            } else {
                array.byte_array_set(i, value.int_value() as i8)
            }
        }
        CASTORE => array.char_array_set(i, value.int_value() as u16),
        SASTORE => array.short_array_set(i, value.int_value() as i16),
        _ => unreachable!("not an array store opcode"),
    }
    Flow::Continue
}

/// Allocate a primitive array.
pub(crate) fn newarray(t: &mut Thread) -> Flow {
    let type_code = read_u8(t);
    let count = t.pop().int_value();
    if count < 0 {
        t.exception = make_negative_array_store_exception(t, count);
        return Flow::Throw;
    }

    let kind = match type_code {
        T_BOOLEAN => Kind::BooleanArray,
        T_CHAR => Kind::CharArray,
        T_FLOAT => Kind::FloatArray,
        T_DOUBLE => Kind::DoubleArray,
        T_BYTE => Kind::ByteArray,
        T_SHORT => Kind::ShortArray,
        T_INT => Kind::IntArray,
        T_LONG => Kind::LongArray,
        _ => fatal!("unknown newarray type code {}", type_code),
    };

    let array = make_prim_array(t, kind, count as usize);
    t.push(array);
    Flow::Continue
}

/// Allocate a reference array with a resolved element class.
pub(crate) fn anewarray(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let count = t.pop().int_value();
    if count < 0 {
        t.exception = make_negative_array_store_exception(t, count);
        return Flow::Throw;
    }

    let pool = t.code.code_pool();
    let class = resolve_class_in_pool(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    let array = make_object_array(t, class, count as usize);
    t.push(array);
    Flow::Continue
}

/// Push the length of any array kind.
pub(crate) fn arraylength(t: &mut Thread) -> Flow {
    let array = t.pop();
    if array.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Flow::Throw;
    }
    let len = array.array_length();
    let boxed = make_int(t, len as i32);
    t.push(boxed);
    Flow::Continue
}
