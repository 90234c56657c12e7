//! Class resolution and the heap-allocated class map.
//!
//! The class map is a chained hash map living on the heap: an
//! `ObjectArray` of buckets, each a `Triple` list of `(key, value, next)`
//! where keys are class-name `ByteArray`s. It is mutated and read only
//! under the class monitor and visited wholesale by the root scanner.
//!
//! Constant-pool slots resolve in place: a slot holding a name
//! (`ByteArray`) or member `Reference` is replaced with the resolved
//! `Class`/`Field`/`Method` on first use, through the write barrier.
//! Readers tolerate both shapes; resolution is idempotent.

use javelin_runtime::{Kind, ObjRef};

use crate::exceptions::{make_class_not_found_exception, make_missing_member_error};
use crate::machine::BootClass;
use crate::objects::make_triple;
use crate::protect;
use crate::thread::Thread;

/// The class-name hash: `h = Σ 31^(n-1-i) · b_i`.
pub fn hash(bytes: &[u8]) -> u32 {
    let mut h = 0u32;
    for &b in bytes {
        h = h.wrapping_mul(31).wrapping_add(b as u32);
    }
    h
}

/// Look up `key` (a `ByteArray`) in the machine's class map.
///
/// Caller holds the class monitor.
pub fn hash_map_find(map: ObjRef, hash: u32, key: ObjRef) -> ObjRef {
    let index = (hash as usize) & (map.array_length() - 1);
    let mut node = map.object_array_get(index);
    while node.is_some() {
        if node.triple_first().byte_array_eq(key) {
            return node.triple_second();
        }
        node = node.triple_third();
    }
    ObjRef::null()
}

/// Insert `key → value` into `map` by chaining a new triple onto the
/// bucket.
///
/// Caller holds the class monitor and guarantees the key is not present.
pub fn hash_map_insert(t: &mut Thread, mut map: ObjRef, hash: u32, key: ObjRef, value: ObjRef) {
    let index = (hash as usize) & (map.array_length() - 1);
    protect!(t, map);

    let node = make_triple(t, key, value, map.object_array_get(index));
    t.set(map.object_array_slot(index), node);
}

/// Resolve a class by name, demand-loading on a miss.
///
/// On a miss the class-byte finder runs; absent bytes set
/// `ClassNotFoundException` on `t` and return null. Parsed classes are
/// interned under the supplied name before returning.
pub fn resolve_class(t: &mut Thread, mut spec: ObjRef) -> ObjRef {
    protect!(t, spec);
    let machine = t.machine.clone();
    let _guard = machine.class_lock.acquire();

    let name_hash = hash(unsafe { spec.byte_array_bytes() });
    let found = hash_map_find(machine.class_map(), name_hash, spec);
    if found.is_some() {
        return found;
    }

    // Copy the name out of the heap before anything can allocate.
    let name: Vec<u8> = unsafe { spec.byte_array_bytes() }.to_vec();
    match machine.finder.find(&name) {
        Some(bytes) => {
            let mut class = machine.parser.parse(t, &bytes);
            if t.has_exception() {
                return ObjRef::null();
            }
            protect!(t, class);
            hash_map_insert(t, machine.class_map(), name_hash, spec, class);
            class
        }
        None => {
            let text = String::from_utf8_lossy(&name).into_owned();
            t.exception = make_class_not_found_exception(t, &text);
            ObjRef::null()
        }
    }
}

/// Resolve the class named by constant-pool slot `index`, replacing the
/// slot in place. The slot may already hold a resolved class.
pub fn resolve_class_in_pool(t: &mut Thread, mut pool: ObjRef, index: usize) -> ObjRef {
    let entry = pool.object_array_get(index);
    if entry.kind() == Kind::ByteArray {
        protect!(t, pool);

        let class = resolve_class(t, entry);
        if t.has_exception() {
            return ObjRef::null();
        }
        t.set(pool.object_array_slot(index), class);
        return class;
    }
    entry
}

/// Resolve the class-name component of a member `Reference` in place.
fn resolve_reference_class(t: &mut Thread, mut reference: ObjRef) -> ObjRef {
    let name = reference.reference_class_name();
    if name.kind() == Kind::ByteArray {
        protect!(t, reference);

        let class = resolve_class(t, name);
        if t.has_exception() {
            return ObjRef::null();
        }
        t.set(reference.reference_class_name_slot(), class);
        return class;
    }
    name
}

/// Scan `table` for a member whose name and descriptor match `reference`.
///
/// `name_of`/`spec_of` project the respective `ByteArray`s out of a table
/// entry. A miss mints `which` (a `NoSuch*Error`) on `t`.
fn find_in_class(
    t: &mut Thread,
    class: ObjRef,
    table: ObjRef,
    reference: ObjRef,
    name_of: fn(ObjRef) -> ObjRef,
    spec_of: fn(ObjRef) -> ObjRef,
    which: BootClass,
) -> ObjRef {
    let want_name = reference.reference_member_name();
    let want_spec = reference.reference_spec();
    for i in 0..table.array_length() {
        let member = table.object_array_get(i);
        if name_of(member).byte_array_eq(want_name) && spec_of(member).byte_array_eq(want_spec) {
            return member;
        }
    }

    // Copy the names out before the factory allocates.
    let name = String::from_utf8_lossy(unsafe { want_name.byte_array_bytes() }).into_owned();
    let spec = String::from_utf8_lossy(unsafe { want_spec.byte_array_bytes() }).into_owned();
    let class_name =
        String::from_utf8_lossy(unsafe { class.class_name().byte_array_bytes() }).into_owned();
    t.exception = make_missing_member_error(t, which, &name, &spec, &class_name);
    ObjRef::null()
}

fn resolve_member(
    t: &mut Thread,
    mut pool: ObjRef,
    index: usize,
    table_of: fn(ObjRef) -> ObjRef,
    name_of: fn(ObjRef) -> ObjRef,
    spec_of: fn(ObjRef) -> ObjRef,
    which: BootClass,
) -> ObjRef {
    let entry = pool.object_array_get(index);
    if entry.kind() != Kind::Reference {
        return entry;
    }
    protect!(t, pool);

    let class = resolve_reference_class(t, entry);
    if t.has_exception() {
        return ObjRef::null();
    }

    // Re-read the slot: resolution may have collected.
    let reference = pool.object_array_get(index);
    let member = find_in_class(
        t,
        class,
        table_of(class),
        reference,
        name_of,
        spec_of,
        which,
    );
    if t.has_exception() {
        return ObjRef::null();
    }

    t.set(pool.object_array_slot(index), member);
    member
}

/// Resolve constant-pool slot `index` to a field, replacing the slot.
pub fn resolve_field(t: &mut Thread, pool: ObjRef, index: usize) -> ObjRef {
    resolve_member(
        t,
        pool,
        index,
        |c| c.class_field_table(),
        |f| f.field_name(),
        |f| f.field_spec(),
        BootClass::NoSuchFieldError,
    )
}

/// Resolve constant-pool slot `index` to a method, replacing the slot.
pub fn resolve_method(t: &mut Thread, pool: ObjRef, index: usize) -> ObjRef {
    resolve_member(
        t,
        pool,
        index,
        |c| c.class_method_table(),
        |m| m.method_name(),
        |m| m.method_spec(),
        BootClass::NoSuchMethodError,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::BootClass;
    use crate::objects::make_byte_array;
    use crate::testkit;

    #[test]
    fn test_hash_is_multiplicative() {
        assert_eq!(hash(b""), 0);
        assert_eq!(hash(b"a"), 97);
        assert_eq!(hash(b"ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_resolve_hits_interned_classes() {
        let (machine, mut t) = testkit::boot();
        let name = make_byte_array(&mut t, b"java/lang/Object");
        let class = resolve_class(&mut t, name);
        assert_eq!(class, machine.boot_class(BootClass::Object));
        assert!(!t.has_exception());
    }

    #[test]
    fn test_resolve_idempotent() {
        let (_machine, mut t) = testkit::boot();
        let n1 = make_byte_array(&mut t, b"java/lang/Error");
        let c1 = resolve_class(&mut t, n1);
        let n2 = make_byte_array(&mut t, b"java/lang/Error");
        let c2 = resolve_class(&mut t, n2);
        assert_eq!(c1, c2, "same identity on repeat resolution");
    }

    #[test]
    fn test_resolve_missing_sets_class_not_found() {
        let (machine, mut t) = testkit::boot();
        let name = make_byte_array(&mut t, b"does/not/Exist");
        let class = resolve_class(&mut t, name);
        assert!(class.is_null());
        assert!(t.has_exception());
        let e = t.take_exception();
        assert_eq!(
            e.instance_class(),
            machine.boot_class(BootClass::ClassNotFoundException)
        );
        assert_eq!(
            crate::exceptions::throwable_message_text(e).unwrap(),
            b"does/not/Exist"
        );
    }

    #[test]
    fn test_pool_class_slot_replaced_in_place() {
        let (machine, mut t) = testkit::boot();
        let pool = testkit::pool_with_class_name(&mut t, "java/lang/Throwable");

        assert_eq!(pool.object_array_get(1).kind(), Kind::ByteArray);
        let c = resolve_class_in_pool(&mut t, pool, 1);
        assert_eq!(c, machine.boot_class(BootClass::Throwable));
        assert_eq!(pool.object_array_get(1).kind(), Kind::Class);

        // Second resolution returns the slot unchanged.
        let again = resolve_class_in_pool(&mut t, pool, 1);
        assert_eq!(again, c);
    }
}
