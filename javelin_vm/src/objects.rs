//! Object makers.
//!
//! Every maker allocates from the calling thread's nursery, zeroes the
//! record, stamps the header, and initializes the payload. Makers protect
//! their reference arguments across the allocation, so callers only need
//! protectors for references of their own that they read *after* the
//! call.

use javelin_runtime::arrays::array_size;
use javelin_runtime::class::CLASS_SIZE;
use javelin_runtime::code::{CODE_SIZE, FIELD_SIZE, METHOD_SIZE, REFERENCE_SIZE};
use javelin_runtime::records::{
    BYTE_SIZE, FRAME_SIZE, INT_SIZE, LONG_SIZE, PAIR_SIZE, SHORT_SIZE, STRING_SIZE, TRIPLE_SIZE,
};
use javelin_runtime::{ClassFlags, Header, Kind, MemberFlags, ObjRef};

use crate::alloc::allocate;
use crate::protect;
use crate::thread::Thread;

/// Allocate a zeroed record and stamp its header.
fn raw_alloc(t: &mut Thread, size: usize, kind: Kind, len: u32) -> ObjRef {
    let p = allocate(t, size);
    unsafe {
        std::ptr::write_bytes(p, 0, javelin_runtime::align_size(size));
        *(p as *mut Header) = Header::with_len(kind, len);
        ObjRef::from_raw(p)
    }
}

// =============================================================================
// Boxes
// =============================================================================

/// Box an `i32`.
pub fn make_int(t: &mut Thread, value: i32) -> ObjRef {
    let o = raw_alloc(t, INT_SIZE, Kind::Int, 0);
    o.init_int(value);
    o
}

/// Box an `i64`.
pub fn make_long(t: &mut Thread, value: i64) -> ObjRef {
    let o = raw_alloc(t, LONG_SIZE, Kind::Long, 0);
    o.init_long(value);
    o
}

/// Box an `i8`.
pub fn make_byte(t: &mut Thread, value: i8) -> ObjRef {
    let o = raw_alloc(t, BYTE_SIZE, Kind::Byte, 0);
    o.init_byte(value);
    o
}

/// Box an `i16`.
pub fn make_short(t: &mut Thread, value: i16) -> ObjRef {
    let o = raw_alloc(t, SHORT_SIZE, Kind::Short, 0);
    o.init_short(value);
    o
}

// =============================================================================
// Arrays
// =============================================================================

/// Allocate a primitive array of `kind` with `len` zeroed elements.
pub fn make_prim_array(t: &mut Thread, kind: Kind, len: usize) -> ObjRef {
    debug_assert!(kind.is_array() && kind != Kind::ObjectArray);
    raw_alloc(t, array_size(kind, len), kind, len as u32)
}

/// Allocate a `ByteArray` holding a copy of `bytes`.
pub fn make_byte_array(t: &mut Thread, bytes: &[u8]) -> ObjRef {
    let o = make_prim_array(t, Kind::ByteArray, bytes.len());
    o.byte_array_copy_from(bytes);
    o
}

/// Allocate a reference array of `len` nulls with element class `class`
/// (null for internal tables).
pub fn make_object_array(t: &mut Thread, mut class: ObjRef, len: usize) -> ObjRef {
    protect!(t, class);
    let o = raw_alloc(t, array_size(Kind::ObjectArray, len), Kind::ObjectArray, len as u32);
    o.object_array_set_class(class);
    o
}

/// Allocate an internal table: a reference array with no element class.
pub fn make_raw_object_array(t: &mut Thread, len: usize) -> ObjRef {
    make_object_array(t, ObjRef::null(), len)
}

// =============================================================================
// Instances
// =============================================================================

/// Allocate a plain instance of `class` with all fields null.
pub fn make_instance(t: &mut Thread, mut class: ObjRef) -> ObjRef {
    protect!(t, class);
    let fields = class.class_fixed_count();
    let o = raw_alloc(
        t,
        ObjRef::instance_size(fields as usize),
        Kind::Instance,
        fields,
    );
    o.instance_set_class(class);
    o
}

// =============================================================================
// Cells
// =============================================================================

/// Allocate a `Triple`.
pub fn make_triple(
    t: &mut Thread,
    mut first: ObjRef,
    mut second: ObjRef,
    mut third: ObjRef,
) -> ObjRef {
    protect!(t, first, second, third);
    let o = raw_alloc(t, TRIPLE_SIZE, Kind::Triple, 0);
    o.init_triple(first, second, third);
    o
}

/// Allocate a `Pair`.
pub fn make_pair(t: &mut Thread, mut first: ObjRef, mut second: ObjRef) -> ObjRef {
    protect!(t, first, second);
    let o = raw_alloc(t, PAIR_SIZE, Kind::Pair, 0);
    o.init_pair(first, second);
    o
}

// =============================================================================
// Strings
// =============================================================================

/// Allocate a `String` over a fresh `ByteArray` copy of `text`.
pub fn make_string(t: &mut Thread, text: &str) -> ObjRef {
    let mut data = make_byte_array(t, text.as_bytes());
    protect!(t, data);
    let o = raw_alloc(t, STRING_SIZE, Kind::String, text.len() as u32);
    o.init_string(data, 0, 0);
    o
}

// =============================================================================
// Classes and members
// =============================================================================

/// Allocate a class record with a fresh type id, empty tables, and no
/// pending initializers. The name is copied into a new `ByteArray`.
pub fn make_class(
    t: &mut Thread,
    name: &[u8],
    mut super_class: ObjRef,
    flags: ClassFlags,
    fixed_count: u32,
) -> ObjRef {
    protect!(t, super_class);
    let mut name_bytes = make_byte_array(t, name);
    protect!(t, name_bytes);
    let mut empty = make_raw_object_array(t, 0);
    protect!(t, empty);

    let id = t.machine.allocate_type_id();
    let c = raw_alloc(t, CLASS_SIZE, Kind::Class, 0);
    c.init_class(id, flags, fixed_count);
    c.class_set_name(name_bytes);
    c.class_set_super(super_class);
    c.class_set_method_table(empty);
    c.class_set_interface_table(empty);
    c.class_set_field_table(empty);
    c.class_set_static_table(empty);
    c
}

/// Allocate a method record.
pub fn make_method(
    t: &mut Thread,
    mut class: ObjRef,
    mut name: ObjRef,
    mut spec: ObjRef,
    mut code: ObjRef,
    param_count: u32,
    offset: u32,
    flags: MemberFlags,
) -> ObjRef {
    protect!(t, class, name, spec, code);
    let m = raw_alloc(t, METHOD_SIZE, Kind::Method, 0);
    m.init_method(param_count, offset, flags);
    m.method_set_class(class);
    m.method_set_name(name);
    m.method_set_spec(spec);
    m.method_set_code(code);
    m
}

/// Allocate a field record.
pub fn make_field(
    t: &mut Thread,
    mut class: ObjRef,
    mut name: ObjRef,
    mut spec: ObjRef,
    offset: u32,
    flags: MemberFlags,
) -> ObjRef {
    protect!(t, class, name, spec);
    let f = raw_alloc(t, FIELD_SIZE, Kind::Field, 0);
    f.init_field(offset, flags);
    f.field_set_class(class);
    f.field_set_name(name);
    f.field_set_spec(spec);
    f
}

/// Allocate a code attribute.
pub fn make_code(
    t: &mut Thread,
    mut body: ObjRef,
    mut pool: ObjRef,
    mut handlers: ObjRef,
    max_stack: u32,
    max_locals: u32,
) -> ObjRef {
    protect!(t, body, pool, handlers);
    let c = raw_alloc(t, CODE_SIZE, Kind::Code, 0);
    c.init_code(max_stack, max_locals);
    c.code_set_body(body);
    c.code_set_pool(pool);
    c.code_set_handlers(handlers);
    c
}

/// Allocate an unresolved member reference.
pub fn make_reference(
    t: &mut Thread,
    mut class_name: ObjRef,
    mut member_name: ObjRef,
    mut spec: ObjRef,
) -> ObjRef {
    protect!(t, class_name, member_name, spec);
    let r = raw_alloc(t, REFERENCE_SIZE, Kind::Reference, 0);
    r.init_reference(class_name, member_name, spec);
    r
}

// =============================================================================
// Frames
// =============================================================================

/// Allocate a frame and its locals array.
pub fn make_frame(
    t: &mut Thread,
    mut method: ObjRef,
    mut next: ObjRef,
    ip: u32,
    stack_base: u32,
    max_locals: u32,
) -> ObjRef {
    protect!(t, method, next);
    let mut locals = make_raw_object_array(t, max_locals as usize);
    protect!(t, locals);
    let f = raw_alloc(t, FRAME_SIZE, Kind::Frame, 0);
    f.init_frame(ip, stack_base);
    f.frame_set_method(method);
    f.frame_set_next(next);
    f.frame_set_locals(locals);
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn test_boxes_roundtrip() {
        let (_machine, mut t) = testkit::boot();
        assert_eq!(make_int(&mut t, -3).int_value(), -3);
        assert_eq!(make_long(&mut t, 1 << 40).long_value(), 1 << 40);
        assert_eq!(make_byte(&mut t, -7).int_value(), -7);
        assert_eq!(make_short(&mut t, 300).int_value(), 300);
    }

    #[test]
    fn test_fresh_records_are_zeroed() {
        let (_machine, mut t) = testkit::boot();
        // Dirty the nursery, reset the cursor, and re-allocate over the
        // same bytes.
        let garbage = make_byte_array(&mut t, &[0xff; 64]);
        assert_eq!(garbage.byte_array_get(63), -1);
        t.heap_index = 0;

        let arr = make_raw_object_array(&mut t, 8);
        for i in 0..8 {
            assert!(arr.object_array_get(i).is_null());
        }
    }

    #[test]
    fn test_make_string_copies_bytes() {
        let (_machine, mut t) = testkit::boot();
        let s = make_string(&mut t, "5 not in [0,3]");
        assert_eq!(s.string_length(), 14);
        assert_eq!(
            unsafe { s.string_data().byte_array_bytes() },
            b"5 not in [0,3]"
        );
    }

    #[test]
    fn test_make_instance_sizes_from_class() {
        let (machine, mut t) = testkit::boot();
        let class = machine.boot_class(crate::machine::BootClass::Throwable);
        let o = make_instance(&mut t, class);
        assert_eq!(o.instance_field_count(), 2);
        assert!(o.instance_field(0).is_null());
        assert_eq!(o.instance_class(), class);
    }

    #[test]
    fn test_make_frame_sizes_locals() {
        let (_machine, mut t) = testkit::boot();
        let f = make_frame(&mut t, ObjRef::null(), ObjRef::null(), 3, 9, 4);
        assert_eq!(f.frame_ip(), 3);
        assert_eq!(f.frame_stack_base(), 9);
        assert_eq!(f.frame_locals().array_length(), 4);
        assert!(f.frame_next().is_null());
    }
}
