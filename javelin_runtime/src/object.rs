//! Object references, headers, and kind tags.

use std::fmt;
use std::ptr;

// =============================================================================
// Kind
// =============================================================================

/// Tag identifying the layout of a heap record.
///
/// `Collected` marks a record that has been relocated; its first body word
/// holds the forwarding address. Mutators never observe it — only a
/// collector in the middle of a copy does.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Relocated record; body word 0 is the forwarding address.
    Collected = 0,
    /// Plain instance: class word plus `len` reference fields.
    Instance = 1,
    /// Reference array: element-class word plus `len` reference slots.
    /// Internal tables use a null element class.
    ObjectArray = 2,
    /// `i8` array.
    ByteArray = 3,
    /// `u16` array.
    CharArray = 4,
    /// `i16` array.
    ShortArray = 5,
    /// `i32` array.
    IntArray = 6,
    /// `i64` array.
    LongArray = 7,
    /// `u8` array restricted to 0/1.
    BooleanArray = 8,
    /// `f32` array. Allocatable via `newarray`; no arithmetic support.
    FloatArray = 9,
    /// `f64` array. Allocatable via `newarray`; no arithmetic support.
    DoubleArray = 10,
    /// Class record.
    Class = 11,
    /// Method record.
    Method = 12,
    /// Field record.
    Field = 13,
    /// Code attribute record.
    Code = 14,
    /// Unresolved member reference (class name, member name, descriptor).
    Reference = 15,
    /// Call frame.
    Frame = 16,
    /// Generic three-slot cell (class-map chains, backtrace entries).
    Triple = 17,
    /// Generic two-slot cell (pending-initializer lists).
    Pair = 18,
    /// String: byte array, offset, length, cached hash.
    String = 19,
    /// Boxed `i32`.
    Int = 20,
    /// Boxed `i64`.
    Long = 21,
    /// Boxed `i8`.
    Byte = 22,
    /// Boxed `i16`.
    Short = 23,
}

impl Kind {
    /// Decode a header tag. Aborts on a corrupt tag — a wrong kind word
    /// means the heap is already lost.
    #[inline]
    pub fn from_raw(raw: u32) -> Kind {
        if raw > Kind::Short as u32 {
            std::process::abort();
        }
        // Safety: repr(u32) with contiguous discriminants 0..=Short,
        // range-checked above.
        unsafe { std::mem::transmute::<u32, Kind>(raw) }
    }

    /// True for the eight primitive array kinds and `ObjectArray`.
    #[inline]
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Kind::ObjectArray
                | Kind::ByteArray
                | Kind::CharArray
                | Kind::ShortArray
                | Kind::IntArray
                | Kind::LongArray
                | Kind::BooleanArray
                | Kind::FloatArray
                | Kind::DoubleArray
        )
    }

    /// True for the boxed numeric kinds the stack-manipulation opcodes
    /// treat as occupying two words (`pop2`/`dup2` width rules).
    #[inline]
    pub fn is_wide(self) -> bool {
        matches!(self, Kind::Long)
    }
}

// =============================================================================
// Header
// =============================================================================

/// Common first word of every heap record.
///
/// `len` is the element count for arrays and strings and the field count
/// for instances; fixed-layout records leave it zero.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Header {
    /// Kind tag, a [`Kind`] discriminant.
    pub kind: u32,
    /// Variable-length payload count; meaning depends on the kind.
    pub len: u32,
}

impl Header {
    /// Build a header for a fixed-size record.
    #[inline]
    pub fn new(kind: Kind) -> Header {
        Header {
            kind: kind as u32,
            len: 0,
        }
    }

    /// Build a header carrying a payload count.
    #[inline]
    pub fn with_len(kind: Kind, len: u32) -> Header {
        Header {
            kind: kind as u32,
            len,
        }
    }
}

// =============================================================================
// ObjRef
// =============================================================================

/// A nullable reference to a heap record.
///
/// `ObjRef` is a bare pointer: copying it does not pin the referent, and a
/// collection can leave a copy dangling unless it was registered as a
/// root. The null reference is distinguished from every real object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(*mut Header);

// Safety: ObjRef is a word. Cross-thread access to the objects it points
// at is serialized by the machine's coordination protocol (mutators only
// touch foreign nurseries during an exclusive phase), not by the type.
unsafe impl Send for ObjRef {}
unsafe impl Sync for ObjRef {}

impl ObjRef {
    /// The null reference.
    pub const NULL: ObjRef = ObjRef(ptr::null_mut());

    /// Construct the null reference.
    #[inline]
    pub const fn null() -> ObjRef {
        ObjRef::NULL
    }

    /// True if this is the null reference.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// True if this is a real object.
    #[inline]
    pub fn is_some(self) -> bool {
        !self.0.is_null()
    }

    /// Reconstruct a reference from a raw record address.
    ///
    /// # Safety
    ///
    /// `p` must be null or point at a live, properly initialized record.
    #[inline]
    pub unsafe fn from_raw(p: *mut u8) -> ObjRef {
        ObjRef(p as *mut Header)
    }

    /// The raw record address.
    #[inline]
    pub fn as_raw(self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// Kind tag of the referent. The reference must not be null.
    #[inline]
    pub fn kind(self) -> Kind {
        debug_assert!(!self.is_null());
        unsafe { Kind::from_raw((*self.0).kind) }
    }

    /// Header payload count (array length, instance field count).
    #[inline]
    pub fn header_len(self) -> u32 {
        debug_assert!(!self.is_null());
        unsafe { (*self.0).len }
    }

    // =========================================================================
    // Raw body access (crate-internal plumbing for the kind modules)
    // =========================================================================

    /// Address of the byte at `offset` from the record base.
    #[inline]
    pub(crate) fn body_ptr(self, offset: usize) -> *mut u8 {
        debug_assert!(!self.is_null());
        unsafe { (self.0 as *mut u8).add(offset) }
    }

    /// Address of the reference slot at byte `offset`.
    #[inline]
    pub(crate) fn ref_slot(self, offset: usize) -> *mut ObjRef {
        self.body_ptr(offset) as *mut ObjRef
    }

    /// View the record as `*mut R`, debug-checking the kind tag.
    #[inline]
    pub(crate) fn record_ptr<R>(self, kind: Kind) -> *mut R {
        debug_assert!(!self.is_null());
        debug_assert_eq!(self.kind(), kind, "kind confusion");
        self.0 as *mut R
    }

    // =========================================================================
    // Forwarding (collector use)
    // =========================================================================

    /// True if this record has been relocated by an in-progress collection.
    #[inline]
    pub fn is_forwarded(self) -> bool {
        !self.is_null() && unsafe { (*self.0).kind } == Kind::Collected as u32
    }

    /// Read the forwarding address of a relocated record.
    #[inline]
    pub fn forwarded_to(self) -> ObjRef {
        debug_assert!(self.is_forwarded());
        unsafe { *(self.body_ptr(std::mem::size_of::<Header>()) as *const ObjRef) }
    }

    /// Destroy this record, marking it relocated to `target`.
    ///
    /// Only a collector that has already copied the record's bytes may
    /// call this; the original body is overwritten.
    #[inline]
    pub fn forward(self, target: ObjRef) {
        debug_assert!(!self.is_null());
        unsafe {
            (*self.0).kind = Kind::Collected as u32;
            *(self.body_ptr(std::mem::size_of::<Header>()) as *mut ObjRef) = target;
        }
    }

    /// Chase at most one forwarding hop, yielding the current address of
    /// the record.
    #[inline]
    pub fn unforwarded(self) -> ObjRef {
        if self.is_forwarded() {
            self.forwarded_to()
        } else {
            self
        }
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ObjRef(null)")
        } else {
            write!(f, "ObjRef({:p}, {:?})", self.0, self.kind())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_distinguished() {
        let null = ObjRef::null();
        assert!(null.is_null());
        assert!(!null.is_some());

        let mut hd = Header::new(Kind::Pair);
        let obj = unsafe { ObjRef::from_raw(&mut hd as *mut Header as *mut u8) };
        assert!(obj.is_some());
        assert_ne!(obj, null);
    }

    #[test]
    fn test_kind_roundtrip() {
        for raw in Kind::Collected as u32..=Kind::Short as u32 {
            assert_eq!(Kind::from_raw(raw) as u32, raw);
        }
    }

    #[test]
    fn test_forwarding() {
        // Two fake two-word records; forward one to the other.
        let mut a = [Header::new(Kind::Pair); 4];
        let mut b = [Header::new(Kind::Pair); 4];
        let a_ref = unsafe { ObjRef::from_raw(a.as_mut_ptr() as *mut u8) };
        let b_ref = unsafe { ObjRef::from_raw(b.as_mut_ptr() as *mut u8) };

        assert!(!a_ref.is_forwarded());
        a_ref.forward(b_ref);
        assert!(a_ref.is_forwarded());
        assert_eq!(a_ref.forwarded_to(), b_ref);
        assert_eq!(a_ref.unforwarded(), b_ref);
        assert_eq!(b_ref.unforwarded(), b_ref);
    }
}
