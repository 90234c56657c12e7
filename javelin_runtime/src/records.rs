//! Frames, cells, strings, and boxed scalars.

use crate::object::{Kind, ObjRef};
use crate::Header;

// =============================================================================
// Frame
// =============================================================================

/// Call-frame layout.
///
/// `ip` is only meaningful while the frame is suspended (a callee is
/// running or an exception is being built); the live instruction pointer
/// of the executing frame is thread state.
#[repr(C)]
pub struct FrameRec {
    pub(crate) hd: Header,
    pub(crate) ip: u32,
    pub(crate) stack_base: u32,
    pub(crate) method: ObjRef,
    pub(crate) next: ObjRef,
    pub(crate) locals: ObjRef,
}

/// Number of reference slots in a frame record.
pub(crate) const FRAME_REF_COUNT: usize = 3;

/// Allocation size of a frame record.
pub const FRAME_SIZE: usize = std::mem::size_of::<FrameRec>();

/// Byte offset of the first frame reference slot (`method`).
pub(crate) const FRAME_REFS_OFFSET: usize = std::mem::offset_of!(FrameRec, method);

impl ObjRef {
    #[inline]
    fn frame_rec(self) -> *mut FrameRec {
        self.record_ptr::<FrameRec>(Kind::Frame)
    }

    /// Stamp scalar frame fields.
    pub fn init_frame(self, ip: u32, stack_base: u32) {
        unsafe {
            let f = self.frame_rec();
            (*f).ip = ip;
            (*f).stack_base = stack_base;
        }
    }

    /// Saved instruction pointer.
    #[inline]
    pub fn frame_ip(self) -> u32 {
        unsafe { (*self.frame_rec()).ip }
    }

    /// Write back the instruction pointer on suspend or trace capture.
    #[inline]
    pub fn frame_set_ip(self, ip: u32) {
        unsafe { (*self.frame_rec()).ip = ip }
    }

    /// Operand-stack index where this activation's window begins.
    #[inline]
    pub fn frame_stack_base(self) -> u32 {
        unsafe { (*self.frame_rec()).stack_base }
    }

    /// Executing method.
    #[inline]
    pub fn frame_method(self) -> ObjRef {
        unsafe { (*self.frame_rec()).method }
    }

    /// Set the executing method.
    #[inline]
    pub fn frame_set_method(self, method: ObjRef) {
        unsafe { (*self.frame_rec()).method = method }
    }

    /// Caller frame, null for the outermost activation.
    #[inline]
    pub fn frame_next(self) -> ObjRef {
        unsafe { (*self.frame_rec()).next }
    }

    /// Link the caller frame.
    #[inline]
    pub fn frame_set_next(self, next: ObjRef) {
        unsafe { (*self.frame_rec()).next = next }
    }

    /// Local-variable array (`ObjectArray` sized by the method's
    /// `max_locals`).
    #[inline]
    pub fn frame_locals(self) -> ObjRef {
        unsafe { (*self.frame_rec()).locals }
    }

    /// Set the local-variable array.
    #[inline]
    pub fn frame_set_locals(self, locals: ObjRef) {
        unsafe { (*self.frame_rec()).locals = locals }
    }
}

// =============================================================================
// Triple and Pair
// =============================================================================

/// Three-slot cell layout.
#[repr(C)]
pub struct TripleRec {
    pub(crate) hd: Header,
    pub(crate) first: ObjRef,
    pub(crate) second: ObjRef,
    pub(crate) third: ObjRef,
}

/// Allocation size of a triple.
pub const TRIPLE_SIZE: usize = std::mem::size_of::<TripleRec>();

/// Byte offset of a triple's first slot.
pub(crate) const TRIPLE_REFS_OFFSET: usize = std::mem::offset_of!(TripleRec, first);

/// Two-slot cell layout.
#[repr(C)]
pub struct PairRec {
    pub(crate) hd: Header,
    pub(crate) first: ObjRef,
    pub(crate) second: ObjRef,
}

/// Allocation size of a pair.
pub const PAIR_SIZE: usize = std::mem::size_of::<PairRec>();

/// Byte offset of a pair's first slot.
pub(crate) const PAIR_REFS_OFFSET: usize = std::mem::offset_of!(PairRec, first);

impl ObjRef {
    #[inline]
    fn triple_rec(self) -> *mut TripleRec {
        self.record_ptr::<TripleRec>(Kind::Triple)
    }

    /// First slot of a triple.
    #[inline]
    pub fn triple_first(self) -> ObjRef {
        unsafe { (*self.triple_rec()).first }
    }

    /// Second slot of a triple.
    #[inline]
    pub fn triple_second(self) -> ObjRef {
        unsafe { (*self.triple_rec()).second }
    }

    /// Third slot of a triple.
    #[inline]
    pub fn triple_third(self) -> ObjRef {
        unsafe { (*self.triple_rec()).third }
    }

    /// Fill a freshly allocated triple.
    pub fn init_triple(self, first: ObjRef, second: ObjRef, third: ObjRef) {
        unsafe {
            let t = self.triple_rec();
            (*t).first = first;
            (*t).second = second;
            (*t).third = third;
        }
    }

    #[inline]
    fn pair_rec(self) -> *mut PairRec {
        self.record_ptr::<PairRec>(Kind::Pair)
    }

    /// First slot of a pair.
    #[inline]
    pub fn pair_first(self) -> ObjRef {
        unsafe { (*self.pair_rec()).first }
    }

    /// Second slot of a pair.
    #[inline]
    pub fn pair_second(self) -> ObjRef {
        unsafe { (*self.pair_rec()).second }
    }

    /// Fill a freshly allocated pair.
    pub fn init_pair(self, first: ObjRef, second: ObjRef) {
        unsafe {
            let p = self.pair_rec();
            (*p).first = first;
            (*p).second = second;
        }
    }
}

// =============================================================================
// String
// =============================================================================

/// String layout: a view over a `ByteArray` plus a cached hash. The
/// element count lives in the header.
#[repr(C)]
pub struct StringRec {
    pub(crate) hd: Header,
    pub(crate) offset: u32,
    pub(crate) hash: u32,
    pub(crate) data: ObjRef,
}

/// Allocation size of a string record.
pub const STRING_SIZE: usize = std::mem::size_of::<StringRec>();

/// Byte offset of a string's data slot.
pub(crate) const STRING_REFS_OFFSET: usize = std::mem::offset_of!(StringRec, data);

impl ObjRef {
    #[inline]
    fn string_rec(self) -> *mut StringRec {
        self.record_ptr::<StringRec>(Kind::String)
    }

    /// Backing `ByteArray`.
    #[inline]
    pub fn string_data(self) -> ObjRef {
        unsafe { (*self.string_rec()).data }
    }

    /// Offset of the first byte within the backing array.
    #[inline]
    pub fn string_offset(self) -> u32 {
        unsafe { (*self.string_rec()).offset }
    }

    /// Byte length of the string.
    #[inline]
    pub fn string_length(self) -> u32 {
        debug_assert_eq!(self.kind(), Kind::String);
        self.header_len()
    }

    /// Cached hash; zero until computed by the embedder.
    #[inline]
    pub fn string_hash(self) -> u32 {
        unsafe { (*self.string_rec()).hash }
    }

    /// Fill a freshly allocated string record.
    pub fn init_string(self, data: ObjRef, offset: u32, hash: u32) {
        unsafe {
            let s = self.string_rec();
            (*s).offset = offset;
            (*s).hash = hash;
            (*s).data = data;
        }
    }
}

// =============================================================================
// Boxed scalars
// =============================================================================

/// Boxed `i32` layout.
#[repr(C)]
pub struct IntRec {
    pub(crate) hd: Header,
    pub(crate) value: i32,
}

/// Boxed `i64` layout.
#[repr(C)]
pub struct LongRec {
    pub(crate) hd: Header,
    pub(crate) value: i64,
}

/// Boxed `i8` layout.
#[repr(C)]
pub struct ByteRec {
    pub(crate) hd: Header,
    pub(crate) value: i8,
}

/// Boxed `i16` layout.
#[repr(C)]
pub struct ShortRec {
    pub(crate) hd: Header,
    pub(crate) value: i16,
}

/// Allocation size of a boxed `i32`.
pub const INT_SIZE: usize = 16;
/// Allocation size of a boxed `i64`.
pub const LONG_SIZE: usize = 16;
/// Allocation size of a boxed `i8`.
pub const BYTE_SIZE: usize = 16;
/// Allocation size of a boxed `i16`.
pub const SHORT_SIZE: usize = 16;

impl ObjRef {
    /// Payload of a boxed `i32`.
    #[inline]
    pub fn int_value_raw(self) -> i32 {
        unsafe { (*self.record_ptr::<IntRec>(Kind::Int)).value }
    }

    /// Stamp a boxed `i32`.
    #[inline]
    pub fn init_int(self, value: i32) {
        unsafe { (*self.record_ptr::<IntRec>(Kind::Int)).value = value }
    }

    /// Payload of a boxed `i64`.
    #[inline]
    pub fn long_value_raw(self) -> i64 {
        unsafe { (*self.record_ptr::<LongRec>(Kind::Long)).value }
    }

    /// Stamp a boxed `i64`.
    #[inline]
    pub fn init_long(self, value: i64) {
        unsafe { (*self.record_ptr::<LongRec>(Kind::Long)).value = value }
    }

    /// Payload of a boxed `i8`.
    #[inline]
    pub fn byte_value_raw(self) -> i8 {
        unsafe { (*self.record_ptr::<ByteRec>(Kind::Byte)).value }
    }

    /// Stamp a boxed `i8`.
    #[inline]
    pub fn init_byte(self, value: i8) {
        unsafe { (*self.record_ptr::<ByteRec>(Kind::Byte)).value = value }
    }

    /// Payload of a boxed `i16`.
    #[inline]
    pub fn short_value_raw(self) -> i16 {
        unsafe { (*self.record_ptr::<ShortRec>(Kind::Short)).value }
    }

    /// Stamp a boxed `i16`.
    #[inline]
    pub fn init_short(self, value: i16) {
        unsafe { (*self.record_ptr::<ShortRec>(Kind::Short)).value = value }
    }

    /// Widening read of any boxed integral kind as an `i32` stack value.
    ///
    /// `baload`/`saload` push `Byte`/`Short` boxes which the arithmetic
    /// opcodes then consume as ints.
    #[inline]
    pub fn int_value(self) -> i32 {
        match self.kind() {
            Kind::Int => self.int_value_raw(),
            Kind::Byte => self.byte_value_raw() as i32,
            Kind::Short => self.short_value_raw() as i32,
            other => {
                debug_assert!(false, "int_value on {:?}", other);
                0
            }
        }
    }

    /// Read of a boxed `i64`.
    #[inline]
    pub fn long_value(self) -> i64 {
        self.long_value_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(kind: Kind, size: usize, storage: &mut Vec<u64>) -> ObjRef {
        storage.clear();
        storage.resize(size / 8, 0);
        unsafe {
            *(storage.as_mut_ptr() as *mut Header) = Header::new(kind);
            ObjRef::from_raw(storage.as_mut_ptr() as *mut u8)
        }
    }

    #[test]
    fn test_sizes() {
        assert!(std::mem::size_of::<IntRec>() <= INT_SIZE);
        assert!(std::mem::size_of::<LongRec>() <= LONG_SIZE);
        assert_eq!(FRAME_SIZE, 8 + 8 + 3 * crate::REF_SIZE);
        assert_eq!(TRIPLE_SIZE, 8 + 3 * crate::REF_SIZE);
        assert_eq!(PAIR_SIZE, 8 + 2 * crate::REF_SIZE);
        assert_eq!(STRING_SIZE, 8 + 8 + crate::REF_SIZE);
    }

    #[test]
    fn test_boxes() {
        let mut s = Vec::new();
        let i = fake(Kind::Int, INT_SIZE, &mut s);
        i.init_int(-42);
        assert_eq!(i.int_value(), -42);

        let mut s2 = Vec::new();
        let b = fake(Kind::Byte, BYTE_SIZE, &mut s2);
        b.init_byte(-5);
        assert_eq!(b.int_value(), -5);

        let mut s3 = Vec::new();
        let l = fake(Kind::Long, LONG_SIZE, &mut s3);
        l.init_long(1 << 40);
        assert_eq!(l.long_value(), 1 << 40);
    }

    #[test]
    fn test_frame_scalars() {
        let mut s = Vec::new();
        let f = fake(Kind::Frame, FRAME_SIZE, &mut s);
        f.init_frame(12, 3);
        assert_eq!(f.frame_ip(), 12);
        assert_eq!(f.frame_stack_base(), 3);
        f.frame_set_ip(99);
        assert_eq!(f.frame_ip(), 99);
        assert!(f.frame_next().is_null());
    }

    #[test]
    fn test_cells() {
        let mut s1 = Vec::new();
        let mut s2 = Vec::new();
        let t = fake(Kind::Triple, TRIPLE_SIZE, &mut s1);
        let p = fake(Kind::Pair, PAIR_SIZE, &mut s2);

        t.init_triple(p, ObjRef::null(), t);
        assert_eq!(t.triple_first(), p);
        assert!(t.triple_second().is_null());
        assert_eq!(t.triple_third(), t);

        p.init_pair(t, ObjRef::null());
        assert_eq!(p.pair_first(), t);
        assert!(p.pair_second().is_null());
    }
}
