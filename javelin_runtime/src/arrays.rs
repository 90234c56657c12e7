//! Array records.
//!
//! Nine array kinds share one shape: the element count lives in the
//! header, the body follows the fixed prefix. `ObjectArray` additionally
//! carries its element class ahead of the body; the internal tables
//! (method tables, constant pools, class-map buckets, frame locals) are
//! `ObjectArray`s with a null element class.
//!
//! Element accessors bounds-check in debug builds only; the interpreter
//! performs its own range checks where the bytecode semantics require an
//! in-band exception.

use crate::object::{Header, Kind, ObjRef};

/// Fixed prefix of an `ObjectArray` record.
#[repr(C)]
pub struct ObjectArrayRec {
    pub(crate) hd: Header,
    pub(crate) class: ObjRef,
    // body: [ObjRef; len]
}

/// Fixed prefix of every primitive array record.
#[repr(C)]
pub struct PrimArrayRec {
    pub(crate) hd: Header,
    // body: [elem; len], 8-aligned
}

/// Byte offset of an `ObjectArray` body.
pub(crate) const OBJECT_ARRAY_BODY: usize = std::mem::size_of::<ObjectArrayRec>();

/// Byte offset of a primitive array body.
pub(crate) const PRIM_ARRAY_BODY: usize = std::mem::size_of::<PrimArrayRec>();

/// Element width in bytes of an array kind.
#[inline]
pub fn element_size(kind: Kind) -> usize {
    match kind {
        Kind::ObjectArray => crate::REF_SIZE,
        Kind::ByteArray | Kind::BooleanArray => 1,
        Kind::CharArray | Kind::ShortArray => 2,
        Kind::IntArray | Kind::FloatArray => 4,
        Kind::LongArray | Kind::DoubleArray => 8,
        _ => unreachable!("not an array kind"),
    }
}

/// Allocation size of an array of `kind` with `len` elements.
///
/// Never smaller than two words: a relocated record must have room for a
/// forwarding address after its header.
#[inline]
pub fn array_size(kind: Kind, len: usize) -> usize {
    let prefix = if kind == Kind::ObjectArray {
        OBJECT_ARRAY_BODY
    } else {
        PRIM_ARRAY_BODY
    };
    crate::align_size(prefix + len * element_size(kind)).max(16)
}

macro_rules! prim_array_accessors {
    ($get:ident, $set:ident, $kind:expr, $elem:ty) => {
        /// Read one element.
        #[inline]
        pub fn $get(self, index: usize) -> $elem {
            debug_assert_eq!(self.kind(), $kind);
            debug_assert!(index < self.array_length());
            unsafe {
                *(self.body_ptr(PRIM_ARRAY_BODY) as *const $elem).add(index)
            }
        }

        /// Write one element.
        #[inline]
        pub fn $set(self, index: usize, value: $elem) {
            debug_assert_eq!(self.kind(), $kind);
            debug_assert!(index < self.array_length());
            unsafe {
                *(self.body_ptr(PRIM_ARRAY_BODY) as *mut $elem).add(index) = value;
            }
        }
    };
}

impl ObjRef {
    /// Element count of any array kind (and of strings).
    #[inline]
    pub fn array_length(self) -> usize {
        debug_assert!(self.kind().is_array() || self.kind() == Kind::String);
        self.header_len() as usize
    }

    // =========================================================================
    // Object arrays
    // =========================================================================

    /// Element class of a reference array; null for internal tables.
    #[inline]
    pub fn object_array_class(self) -> ObjRef {
        unsafe { (*self.record_ptr::<ObjectArrayRec>(Kind::ObjectArray)).class }
    }

    /// Set the element class.
    #[inline]
    pub fn object_array_set_class(self, class: ObjRef) {
        unsafe { (*self.record_ptr::<ObjectArrayRec>(Kind::ObjectArray)).class = class }
    }

    /// Address of reference slot `index`, for barrier-checked stores and
    /// collection visitors.
    #[inline]
    pub fn object_array_slot(self, index: usize) -> *mut ObjRef {
        debug_assert_eq!(self.kind(), Kind::ObjectArray);
        debug_assert!(index < self.array_length());
        unsafe { (self.body_ptr(OBJECT_ARRAY_BODY) as *mut ObjRef).add(index) }
    }

    /// Read reference slot `index`.
    #[inline]
    pub fn object_array_get(self, index: usize) -> ObjRef {
        unsafe { *self.object_array_slot(index) }
    }

    /// Write reference slot `index` without a barrier check. Callers that
    /// store into a published object go through the machine's `set`.
    #[inline]
    pub fn object_array_set(self, index: usize, value: ObjRef) {
        unsafe { *self.object_array_slot(index) = value }
    }

    // =========================================================================
    // Instances
    //
    // An instance shares the reference-array shape: class word, then
    // `len` reference fields (the field count is stamped into the header
    // at allocation so collectors can size and trace instances without
    // chasing the class word).
    // =========================================================================

    /// Class of a plain instance.
    #[inline]
    pub fn instance_class(self) -> ObjRef {
        unsafe { (*self.record_ptr::<ObjectArrayRec>(Kind::Instance)).class }
    }

    /// Stamp the class word of a freshly allocated instance.
    #[inline]
    pub fn instance_set_class(self, class: ObjRef) {
        unsafe { (*self.record_ptr::<ObjectArrayRec>(Kind::Instance)).class = class }
    }

    /// Number of reference fields.
    #[inline]
    pub fn instance_field_count(self) -> usize {
        debug_assert_eq!(self.kind(), Kind::Instance);
        self.header_len() as usize
    }

    /// Address of field slot `index`, for barrier-checked stores.
    #[inline]
    pub fn instance_field_slot(self, index: usize) -> *mut ObjRef {
        debug_assert_eq!(self.kind(), Kind::Instance);
        debug_assert!(index < self.instance_field_count());
        unsafe { (self.body_ptr(OBJECT_ARRAY_BODY) as *mut ObjRef).add(index) }
    }

    /// Read field slot `index`.
    #[inline]
    pub fn instance_field(self, index: usize) -> ObjRef {
        unsafe { *self.instance_field_slot(index) }
    }

    /// Allocation size of an instance with `field_count` fields.
    #[inline]
    pub fn instance_size(field_count: usize) -> usize {
        crate::align_size(OBJECT_ARRAY_BODY + field_count * crate::REF_SIZE).max(16)
    }

    /// Class of any object the `instanceof` machinery can see: the class
    /// word of instances, the element class of reference arrays, null for
    /// every other kind (internal records are never tested).
    #[inline]
    pub fn object_class(self) -> ObjRef {
        match self.kind() {
            Kind::Instance => self.instance_class(),
            Kind::ObjectArray => self.object_array_class(),
            _ => ObjRef::null(),
        }
    }

    // =========================================================================
    // Primitive arrays
    // =========================================================================

    prim_array_accessors!(byte_array_get, byte_array_set, Kind::ByteArray, i8);
    prim_array_accessors!(char_array_get, char_array_set, Kind::CharArray, u16);
    prim_array_accessors!(short_array_get, short_array_set, Kind::ShortArray, i16);
    prim_array_accessors!(int_array_get, int_array_set, Kind::IntArray, i32);
    prim_array_accessors!(long_array_get, long_array_set, Kind::LongArray, i64);
    prim_array_accessors!(boolean_array_get, boolean_array_set, Kind::BooleanArray, u8);

    /// Bytes of a `ByteArray`.
    ///
    /// # Safety
    ///
    /// The returned slice aliases the heap and is invalidated by the next
    /// collection; it must not be held across an allocation point.
    #[inline]
    pub unsafe fn byte_array_bytes<'a>(self) -> &'a [u8] {
        debug_assert_eq!(self.kind(), Kind::ByteArray);
        unsafe {
            std::slice::from_raw_parts(self.body_ptr(PRIM_ARRAY_BODY), self.array_length())
        }
    }

    /// Fill a `ByteArray` from a Rust slice. Lengths must match.
    pub fn byte_array_copy_from(self, bytes: &[u8]) {
        debug_assert_eq!(self.kind(), Kind::ByteArray);
        debug_assert_eq!(self.array_length(), bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.body_ptr(PRIM_ARRAY_BODY), bytes.len());
        }
    }

    /// Compare two `ByteArray`s for content equality.
    pub fn byte_array_eq(self, other: ObjRef) -> bool {
        if self == other {
            return true;
        }
        if self.array_length() != other.array_length() {
            return false;
        }
        // Safety: neither slice outlives this call and nothing allocates.
        unsafe { self.byte_array_bytes() == other.byte_array_bytes() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_array(kind: Kind, len: usize, storage: &mut Vec<u64>) -> ObjRef {
        let size = array_size(kind, len);
        storage.clear();
        storage.resize(size / 8, 0);
        let r = unsafe { ObjRef::from_raw(storage.as_mut_ptr() as *mut u8) };
        unsafe {
            *(storage.as_mut_ptr() as *mut Header) = Header::with_len(kind, len as u32);
        }
        r
    }

    #[test]
    fn test_sizes_are_aligned() {
        assert_eq!(array_size(Kind::ByteArray, 3), 16);
        assert_eq!(array_size(Kind::ByteArray, 8), 16);
        assert_eq!(array_size(Kind::ByteArray, 9), 24);
        assert_eq!(array_size(Kind::IntArray, 2), 16);
        assert_eq!(array_size(Kind::LongArray, 2), 24);
        assert_eq!(array_size(Kind::ObjectArray, 2), 16 + 2 * crate::REF_SIZE);
    }

    #[test]
    fn test_int_array_roundtrip() {
        let mut storage = Vec::new();
        let a = fake_array(Kind::IntArray, 4, &mut storage);
        assert_eq!(a.array_length(), 4);
        a.int_array_set(0, -7);
        a.int_array_set(3, 41);
        assert_eq!(a.int_array_get(0), -7);
        assert_eq!(a.int_array_get(3), 41);
        assert_eq!(a.int_array_get(1), 0);
    }

    #[test]
    fn test_byte_array_eq() {
        let mut s1 = Vec::new();
        let mut s2 = Vec::new();
        let mut s3 = Vec::new();
        let a = fake_array(Kind::ByteArray, 3, &mut s1);
        let b = fake_array(Kind::ByteArray, 3, &mut s2);
        let c = fake_array(Kind::ByteArray, 2, &mut s3);
        a.byte_array_copy_from(b"abc");
        b.byte_array_copy_from(b"abc");
        c.byte_array_copy_from(b"ab");

        assert!(a.byte_array_eq(b));
        assert!(b.byte_array_eq(a));
        assert!(!a.byte_array_eq(c));
    }

    #[test]
    fn test_object_array_slots() {
        let mut s1 = Vec::new();
        let mut s2 = Vec::new();
        let a = fake_array(Kind::ObjectArray, 2, &mut s1);
        let elem = fake_array(Kind::IntArray, 1, &mut s2);

        assert!(a.object_array_get(0).is_null());
        a.object_array_set(1, elem);
        assert_eq!(a.object_array_get(1), elem);
        assert_eq!(unsafe { *a.object_array_slot(1) }, elem);
    }
}
