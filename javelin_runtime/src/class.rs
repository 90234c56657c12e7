//! Class records.
//!
//! A class carries everything dispatch needs at run time: a process-unique
//! type id for O(1) identity checks, the superclass link, the method and
//! interface tables, field and static-slot tables, and the pending
//! `<clinit>` chain consumed by initializer interposition.
//!
//! The interface table is a flat `ObjectArray` of `[interface class,
//! method vector]` pairs covering all directly and transitively
//! implemented interfaces; the method vector is indexed by the interface
//! method's vtable offset.

use crate::flags::ClassFlags;
use crate::object::{Header, Kind, ObjRef};

/// Class record layout.
#[repr(C)]
pub struct ClassRec {
    pub(crate) hd: Header,
    pub(crate) id: u32,
    pub(crate) flags: u32,
    pub(crate) fixed_count: u32,
    pub(crate) _pad: u32,
    // Reference slots, contiguous for edge visiting.
    pub(crate) name: ObjRef,
    pub(crate) super_class: ObjRef,
    pub(crate) method_table: ObjRef,
    pub(crate) interface_table: ObjRef,
    pub(crate) field_table: ObjRef,
    pub(crate) static_table: ObjRef,
    pub(crate) initializers: ObjRef,
}

/// Number of reference slots in a class record.
pub(crate) const CLASS_REF_COUNT: usize = 7;

/// Allocation size of a class record.
pub const CLASS_SIZE: usize = std::mem::size_of::<ClassRec>();

/// Byte offset of the first class reference slot (`name`).
pub(crate) const CLASS_REFS_OFFSET: usize = std::mem::offset_of!(ClassRec, name);

impl ObjRef {
    #[inline]
    fn class_rec(self) -> *mut ClassRec {
        self.record_ptr::<ClassRec>(Kind::Class)
    }

    /// Stamp a freshly allocated record as a class.
    ///
    /// Reference slots start null; the caller fills them (through the
    /// write barrier once the record is published).
    pub fn init_class(self, id: u32, flags: ClassFlags, fixed_count: u32) {
        unsafe {
            let c = self.record_ptr::<ClassRec>(Kind::Class);
            debug_assert_eq!((*c).hd.kind, Kind::Class as u32);
            (*c).id = id;
            (*c).flags = flags.bits();
            (*c).fixed_count = fixed_count;
        }
    }

    /// Process-unique type id, assigned at class creation.
    #[inline]
    pub fn class_id(self) -> u32 {
        unsafe { (*self.class_rec()).id }
    }

    /// Access flags.
    #[inline]
    pub fn class_flags(self) -> ClassFlags {
        ClassFlags::from_bits_truncate(unsafe { (*self.class_rec()).flags })
    }

    /// True if this class is an interface.
    #[inline]
    pub fn class_is_interface(self) -> bool {
        self.class_flags().contains(ClassFlags::INTERFACE)
    }

    /// Number of reference fields in a plain instance of this class.
    #[inline]
    pub fn class_fixed_count(self) -> u32 {
        unsafe { (*self.class_rec()).fixed_count }
    }

    /// Class name as a `ByteArray` of UTF-8.
    #[inline]
    pub fn class_name(self) -> ObjRef {
        unsafe { (*self.class_rec()).name }
    }

    /// Superclass, null only for the root class.
    #[inline]
    pub fn class_super(self) -> ObjRef {
        unsafe { (*self.class_rec()).super_class }
    }

    /// Method table: an `ObjectArray` of methods ordered by vtable offset.
    #[inline]
    pub fn class_method_table(self) -> ObjRef {
        unsafe { (*self.class_rec()).method_table }
    }

    /// Interface table: flat `[interface, method vector]` pairs.
    #[inline]
    pub fn class_interface_table(self) -> ObjRef {
        unsafe { (*self.class_rec()).interface_table }
    }

    /// Field table: an `ObjectArray` of field records.
    #[inline]
    pub fn class_field_table(self) -> ObjRef {
        unsafe { (*self.class_rec()).field_table }
    }

    /// Static slot vector: an `ObjectArray` indexed by field offset.
    #[inline]
    pub fn class_static_table(self) -> ObjRef {
        unsafe { (*self.class_rec()).static_table }
    }

    /// Pending initializer chain: a `Pair` list of `<clinit>` methods, or
    /// null once the class is initialized.
    #[inline]
    pub fn class_initializers(self) -> ObjRef {
        unsafe { (*self.class_rec()).initializers }
    }

    /// Slot address of the pending-initializer chain, for barrier-checked
    /// stores when interposition pops the head.
    #[inline]
    pub fn class_initializers_slot(self) -> *mut ObjRef {
        unsafe { std::ptr::addr_of_mut!((*self.class_rec()).initializers) }
    }

    /// Slot address of the method table, for barrier-checked stores.
    #[inline]
    pub fn class_method_table_slot(self) -> *mut ObjRef {
        unsafe { std::ptr::addr_of_mut!((*self.class_rec()).method_table) }
    }

    /// Slot address of the interface table, for barrier-checked stores.
    #[inline]
    pub fn class_interface_table_slot(self) -> *mut ObjRef {
        unsafe { std::ptr::addr_of_mut!((*self.class_rec()).interface_table) }
    }

    /// Slot address of the field table, for barrier-checked stores.
    #[inline]
    pub fn class_field_table_slot(self) -> *mut ObjRef {
        unsafe { std::ptr::addr_of_mut!((*self.class_rec()).field_table) }
    }

    /// Slot address of the static slot vector, for barrier-checked stores.
    #[inline]
    pub fn class_static_table_slot(self) -> *mut ObjRef {
        unsafe { std::ptr::addr_of_mut!((*self.class_rec()).static_table) }
    }

    /// Raw write of a class reference slot by position (bootstrap and
    /// parser use; position matches declaration order starting at `name`).
    #[inline]
    pub fn class_set_ref(self, index: usize, value: ObjRef) {
        debug_assert!(index < CLASS_REF_COUNT);
        unsafe {
            *self
                .ref_slot(CLASS_REFS_OFFSET + index * crate::REF_SIZE) = value;
        }
    }

    /// Set the class name.
    #[inline]
    pub fn class_set_name(self, name: ObjRef) {
        unsafe { (*self.class_rec()).name = name }
    }

    /// Set the superclass link.
    #[inline]
    pub fn class_set_super(self, super_class: ObjRef) {
        unsafe { (*self.class_rec()).super_class = super_class }
    }

    /// Set the method table.
    #[inline]
    pub fn class_set_method_table(self, table: ObjRef) {
        unsafe { (*self.class_rec()).method_table = table }
    }

    /// Set the interface table.
    #[inline]
    pub fn class_set_interface_table(self, table: ObjRef) {
        unsafe { (*self.class_rec()).interface_table = table }
    }

    /// Set the field table.
    #[inline]
    pub fn class_set_field_table(self, table: ObjRef) {
        unsafe { (*self.class_rec()).field_table = table }
    }

    /// Set the static slot vector.
    #[inline]
    pub fn class_set_static_table(self, table: ObjRef) {
        unsafe { (*self.class_rec()).static_table = table }
    }

    /// Set the pending initializer chain.
    #[inline]
    pub fn class_set_initializers(self, list: ObjRef) {
        unsafe { (*self.class_rec()).initializers = list }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        // Header + 4 scalars + 7 refs.
        assert_eq!(CLASS_SIZE, 8 + 16 + 7 * crate::REF_SIZE);
        assert_eq!(CLASS_REFS_OFFSET, 24);
        assert_eq!(CLASS_SIZE % 8, 0);
    }

    #[test]
    fn test_scalar_fields() {
        let mut buf = [0u64; CLASS_SIZE / 8];
        let c = unsafe { ObjRef::from_raw(buf.as_mut_ptr() as *mut u8) };
        unsafe {
            *(buf.as_mut_ptr() as *mut Header) = Header::new(Kind::Class);
        }
        c.init_class(7, ClassFlags::SUPER | ClassFlags::PUBLIC, 3);

        assert_eq!(c.class_id(), 7);
        assert_eq!(c.class_fixed_count(), 3);
        assert!(c.class_flags().contains(ClassFlags::SUPER));
        assert!(!c.class_is_interface());
        assert!(c.class_super().is_null());
    }
}
