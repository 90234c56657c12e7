//! Method dispatch and type tests.
//!
//! Virtual dispatch indexes the receiver class's method table by the
//! resolved method's vtable offset; interface dispatch scans the
//! receiver's interface table for the interface's type id and indexes the
//! paired method vector; special dispatch applies the `ACC_SUPER` rule;
//! static dispatch is the named method itself.
//!
//! All four call paths interpose class initialization: a class with a
//! pending `<clinit>` chain gets one link popped and executed before the
//! triggering opcode re-runs.

use javelin_platform::fatal;
use javelin_runtime::{ClassFlags, ObjRef};

use crate::thread::Thread;

/// `instanceof` test: null is an instance of nothing.
///
/// For interfaces, walk the object's superclass chain scanning each
/// interface table for the interface's type id; for classes, walk the
/// chain comparing type ids.
pub fn instance_of(class: ObjRef, o: ObjRef) -> bool {
    if o.is_null() {
        return false;
    }

    let id = class.class_id();
    if class.class_is_interface() {
        let mut oc = o.object_class();
        while oc.is_some() {
            let itable = oc.class_interface_table();
            let mut i = 0;
            while i < itable.array_length() {
                if itable.object_array_get(i).class_id() == id {
                    return true;
                }
                i += 2;
            }
            oc = oc.class_super();
        }
    } else {
        let mut oc = o.object_class();
        while oc.is_some() {
            if oc.class_id() == id {
                return true;
            }
            oc = oc.class_super();
        }
    }
    false
}

/// True if `class` is a strict superclass of `base`.
pub fn is_superclass(class: ObjRef, base: ObjRef) -> bool {
    let id = class.class_id();
    let mut oc = base.class_super();
    while oc.is_some() {
        if oc.class_id() == id {
            return true;
        }
        oc = oc.class_super();
    }
    false
}

/// Look up `method` by vtable offset in `class`'s method table.
#[inline]
pub fn find_method(method: ObjRef, class: ObjRef) -> ObjRef {
    class
        .class_method_table()
        .object_array_get(method.method_offset() as usize)
}

/// Virtual dispatch on the receiver's class.
#[inline]
pub fn find_virtual_method(method: ObjRef, receiver: ObjRef) -> ObjRef {
    find_method(method, receiver.object_class())
}

/// Interface dispatch: find the declaring interface in the receiver's
/// interface table and index the paired method vector.
///
/// The receiver is known to implement the interface (the program is
/// well-formed); a missing entry is a fatal inconsistency.
pub fn find_interface_method(method: ObjRef, receiver: ObjRef) -> ObjRef {
    let id = method.method_class().class_id();
    let itable = receiver.object_class().class_interface_table();
    let mut i = 0;
    while i < itable.array_length() {
        if itable.object_array_get(i).class_id() == id {
            return itable
                .object_array_get(i + 1)
                .object_array_get(method.method_offset() as usize);
        }
        i += 2;
    }
    fatal!("receiver class lacks a resolved interface");
}

/// The `invokespecial` super-dispatch rule: with `ACC_SUPER` set on the
/// current class, a non-constructor method declared in a strict
/// superclass dispatches to the superclass's table entry.
pub fn is_special_method(method: ObjRef, current_class: ObjRef) -> bool {
    current_class.class_flags().contains(ClassFlags::SUPER)
        && unsafe { method.method_name().byte_array_bytes() } != b"<init>"
        && is_superclass(method.method_class(), current_class)
}

/// Pop one pending initializer off `class`, if any.
///
/// The caller rewinds the triggering opcode and invokes the returned
/// `<clinit>` method with zero parameters; the opcode re-executes once
/// the chain drains.
pub fn pending_initializer(t: &mut Thread, class: ObjRef) -> Option<ObjRef> {
    let head = class.class_initializers();
    if head.is_null() {
        return None;
    }
    t.set(class.class_initializers_slot(), head.pair_second());
    Some(head.pair_first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::BootClass;
    use crate::objects::make_instance;
    use crate::testkit;

    #[test]
    fn test_instance_of_walks_superclasses() {
        let (machine, mut t) = testkit::boot();
        let npe = machine.boot_class(BootClass::NullPointerException);
        let o = make_instance(&mut t, npe);

        assert!(instance_of(npe, o));
        assert!(instance_of(machine.boot_class(BootClass::Exception), o));
        assert!(instance_of(machine.boot_class(BootClass::Object), o));
        assert!(!instance_of(machine.boot_class(BootClass::Error), o));
        assert!(!instance_of(
            machine.boot_class(BootClass::ClassCastException),
            o
        ));
    }

    #[test]
    fn test_instance_of_null_is_false() {
        let (machine, _t) = testkit::boot();
        assert!(!instance_of(
            machine.boot_class(BootClass::Object),
            ObjRef::null()
        ));
    }

    #[test]
    fn test_is_superclass_is_strict() {
        let (machine, _t) = testkit::boot();
        let throwable = machine.boot_class(BootClass::Throwable);
        let error = machine.boot_class(BootClass::Error);

        assert!(is_superclass(throwable, error));
        assert!(!is_superclass(error, throwable));
        assert!(!is_superclass(error, error), "strict, not reflexive");
    }

    #[test]
    fn test_pending_initializer_pops_head() {
        let (_machine, mut t) = testkit::boot();
        let class = testkit::class_with_initializers(&mut t, 2);

        assert!(class.class_initializers().is_some());
        let first = pending_initializer(&mut t, class).unwrap();
        assert!(first.is_some());
        let second = pending_initializer(&mut t, class).unwrap();
        assert_ne!(first, second);
        assert!(class.class_initializers().is_null());
        assert!(pending_initializer(&mut t, class).is_none());
    }
}
