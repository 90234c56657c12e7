//! Instance creation, field access, and type tests.
//!
//! `new`, `getstatic`, and `putstatic` interpose class initialization:
//! while the target class has pending `<clinit>` entries, one is popped
//! and invoked and the triggering opcode rewound to re-execute.

use javelin_runtime::ObjRef;

use crate::dispatch::{instance_of, pending_initializer};
use crate::exceptions::{make_class_cast_exception, make_null_pointer_exception};
use crate::interp::{read_u16, Flow};
use crate::objects::{make_instance, make_int};
use crate::protect;
use crate::resolve::{resolve_class_in_pool, resolve_field};
use crate::thread::Thread;

/// Display name of an object's class for cast diagnostics.
fn class_name_text(o: ObjRef) -> String {
    let class = o.object_class();
    if class.is_null() {
        return "<object>".to_owned();
    }
    String::from_utf8_lossy(unsafe { class.class_name().byte_array_bytes() }).into_owned()
}

pub(crate) fn new(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let pool = t.code.code_pool();
    let class = resolve_class_in_pool(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, class) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    let instance = make_instance(t, class);
    t.push(instance);
    Flow::Continue
}

pub(crate) fn getfield(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let mut instance = t.pop();
    if instance.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Flow::Throw;
    }

    protect!(t, instance);
    let pool = t.code.code_pool();
    let field = resolve_field(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    t.push(instance.instance_field(field.field_offset() as usize));
    Flow::Continue
}

pub(crate) fn putfield(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let mut value = t.pop();
    let mut instance = t.pop();
    if instance.is_null() {
        t.exception = make_null_pointer_exception(t);
        return Flow::Throw;
    }

    protect!(t, value, instance);
    let pool = t.code.code_pool();
    let field = resolve_field(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    t.set(
        instance.instance_field_slot(field.field_offset() as usize),
        value,
    );
    Flow::Continue
}

pub(crate) fn getstatic(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let pool = t.code.code_pool();
    let field = resolve_field(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, field.field_class()) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    let value = field
        .field_class()
        .class_static_table()
        .object_array_get(field.field_offset() as usize);
    t.push(value);
    Flow::Continue
}

pub(crate) fn putstatic(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let pool = t.code.code_pool();
    let field = resolve_field(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    if let Some(clinit) = pending_initializer(t, field.field_class()) {
        t.ip = t.insn_ip;
        return Flow::Invoke {
            method: clinit,
            param_count: 0,
        };
    }

    let value = t.pop();
    let statics = field.field_class().class_static_table();
    t.set(
        statics.object_array_slot(field.field_offset() as usize),
        value,
    );
    Flow::Continue
}

/// `checkcast`: leave the reference in place, throw on a failed test.
pub(crate) fn checkcast(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    if t.top().is_null() {
        return Flow::Continue;
    }

    let pool = t.code.code_pool();
    let class = resolve_class_in_pool(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    // Re-read the operand: resolution may have collected.
    let value = t.top();
    if !instance_of(class, value) {
        let actual = class_name_text(value);
        let target =
            String::from_utf8_lossy(unsafe { class.class_name().byte_array_bytes() }).into_owned();
        t.exception = make_class_cast_exception(t, &actual, &target);
        return Flow::Throw;
    }
    Flow::Continue
}

/// `instanceof`: pop the reference, push 0 or 1.
pub(crate) fn instanceof(t: &mut Thread) -> Flow {
    let index = read_u16(t) as usize;
    let mut value = t.pop();
    if value.is_null() {
        let boxed = make_int(t, 0);
        t.push(boxed);
        return Flow::Continue;
    }

    protect!(t, value);
    let pool = t.code.code_pool();
    let class = resolve_class_in_pool(t, pool, index);
    if t.has_exception() {
        return Flow::Throw;
    }

    let result = instance_of(class, value) as i32;
    let boxed = make_int(t, result);
    t.push(boxed);
    Flow::Continue
}
