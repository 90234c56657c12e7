//! Size and reference-edge enumeration over arbitrary records.
//!
//! Collectors use these two functions for copying and tracing: the size of
//! a record is derivable from its header alone (no class dereference, so a
//! half-forwarded graph is still walkable), and `visit_edges` presents
//! every reference slot as a raw address the collector may overwrite with
//! a forwarded address.

use crate::arrays;
use crate::class;
use crate::code;
use crate::object::{Kind, ObjRef};
use crate::records;

/// Allocation size in bytes of the record `o` points at.
pub fn object_size(o: ObjRef) -> usize {
    let kind = o.kind();
    match kind {
        Kind::Instance => crate::align_size(
            arrays::OBJECT_ARRAY_BODY + o.header_len() as usize * crate::REF_SIZE,
        )
        .max(16),
        Kind::ObjectArray
        | Kind::ByteArray
        | Kind::CharArray
        | Kind::ShortArray
        | Kind::IntArray
        | Kind::LongArray
        | Kind::BooleanArray
        | Kind::FloatArray
        | Kind::DoubleArray => arrays::array_size(kind, o.header_len() as usize),
        Kind::Class => class::CLASS_SIZE,
        Kind::Method => code::METHOD_SIZE,
        Kind::Field => code::FIELD_SIZE,
        Kind::Code => code::CODE_SIZE,
        Kind::Reference => code::REFERENCE_SIZE,
        Kind::Frame => records::FRAME_SIZE,
        Kind::Triple => records::TRIPLE_SIZE,
        Kind::Pair => records::PAIR_SIZE,
        Kind::String => records::STRING_SIZE,
        Kind::Int => records::INT_SIZE,
        Kind::Long => records::LONG_SIZE,
        Kind::Byte => records::BYTE_SIZE,
        Kind::Short => records::SHORT_SIZE,
        Kind::Collected => unreachable!("sizing a forwarded record"),
    }
}

#[inline]
fn visit_run(o: ObjRef, offset: usize, count: usize, f: &mut dyn FnMut(*mut ObjRef)) {
    for i in 0..count {
        f(o.ref_slot(offset + i * crate::REF_SIZE));
    }
}

/// Present every reference slot of `o` to `f`.
///
/// The slot addresses are stable for the duration of the call; `f` may
/// overwrite `*slot` with a relocated address. Null slots are presented
/// too — visitors are expected to ignore them.
pub fn visit_edges(o: ObjRef, f: &mut dyn FnMut(*mut ObjRef)) {
    let kind = o.kind();
    match kind {
        // Instance: class word plus `len` fields, contiguous.
        Kind::Instance => visit_run(
            o,
            std::mem::offset_of!(arrays::ObjectArrayRec, class),
            1 + o.header_len() as usize,
            f,
        ),
        // ObjectArray: element class plus `len` slots, contiguous.
        Kind::ObjectArray => visit_run(
            o,
            std::mem::offset_of!(arrays::ObjectArrayRec, class),
            1 + o.header_len() as usize,
            f,
        ),
        Kind::Class => visit_run(o, class::CLASS_REFS_OFFSET, class::CLASS_REF_COUNT, f),
        Kind::Method => visit_run(o, code::METHOD_REFS_OFFSET, code::METHOD_REF_COUNT, f),
        Kind::Field => visit_run(o, code::FIELD_REFS_OFFSET, code::FIELD_REF_COUNT, f),
        Kind::Code => visit_run(o, code::CODE_REFS_OFFSET, code::CODE_REF_COUNT, f),
        Kind::Reference => visit_run(
            o,
            code::REFERENCE_REFS_OFFSET,
            code::REFERENCE_REF_COUNT,
            f,
        ),
        Kind::Frame => visit_run(o, records::FRAME_REFS_OFFSET, records::FRAME_REF_COUNT, f),
        Kind::Triple => visit_run(o, records::TRIPLE_REFS_OFFSET, 3, f),
        Kind::Pair => visit_run(o, records::PAIR_REFS_OFFSET, 2, f),
        Kind::String => visit_run(o, records::STRING_REFS_OFFSET, 1, f),
        // Scalar payloads only.
        Kind::ByteArray
        | Kind::CharArray
        | Kind::ShortArray
        | Kind::IntArray
        | Kind::LongArray
        | Kind::BooleanArray
        | Kind::FloatArray
        | Kind::DoubleArray
        | Kind::Int
        | Kind::Long
        | Kind::Byte
        | Kind::Short => {}
        Kind::Collected => unreachable!("tracing a forwarded record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Header;

    fn fake(kind: Kind, len: u32, size: usize, storage: &mut Vec<u64>) -> ObjRef {
        storage.clear();
        storage.resize(size / 8, 0);
        unsafe {
            *(storage.as_mut_ptr() as *mut Header) = Header::with_len(kind, len);
            ObjRef::from_raw(storage.as_mut_ptr() as *mut u8)
        }
    }

    fn count_edges(o: ObjRef) -> usize {
        let mut n = 0;
        visit_edges(o, &mut |_| n += 1);
        n
    }

    #[test]
    fn test_edge_counts() {
        let mut s = Vec::new();
        assert_eq!(count_edges(fake(Kind::Triple, 0, records::TRIPLE_SIZE, &mut s)), 3);
        assert_eq!(count_edges(fake(Kind::Pair, 0, records::PAIR_SIZE, &mut s)), 2);
        assert_eq!(count_edges(fake(Kind::Class, 0, class::CLASS_SIZE, &mut s)), 7);
        assert_eq!(count_edges(fake(Kind::Method, 0, code::METHOD_SIZE, &mut s)), 4);
        assert_eq!(count_edges(fake(Kind::IntArray, 4, arrays::array_size(Kind::IntArray, 4), &mut s)), 0);

        // 2-element reference array: element class + 2 slots.
        let size = arrays::array_size(Kind::ObjectArray, 2);
        assert_eq!(count_edges(fake(Kind::ObjectArray, 2, size, &mut s)), 3);

        // 3-field instance: class word + 3 fields.
        let size = crate::align_size(arrays::OBJECT_ARRAY_BODY + 3 * crate::REF_SIZE);
        assert_eq!(count_edges(fake(Kind::Instance, 3, size, &mut s)), 4);
    }

    #[test]
    fn test_visitor_can_rewrite_slots() {
        let mut s1 = Vec::new();
        let mut s2 = Vec::new();
        let t = fake(Kind::Triple, 0, records::TRIPLE_SIZE, &mut s1);
        let replacement = fake(Kind::Pair, 0, records::PAIR_SIZE, &mut s2);

        visit_edges(t, &mut |slot| unsafe { *slot = replacement });
        assert_eq!(t.triple_first(), replacement);
        assert_eq!(t.triple_second(), replacement);
        assert_eq!(t.triple_third(), replacement);
    }

    #[test]
    fn test_sizes_match_layout() {
        let mut s = Vec::new();
        let o = fake(Kind::String, 5, records::STRING_SIZE, &mut s);
        assert_eq!(object_size(o), records::STRING_SIZE);

        let o = fake(Kind::ByteArray, 20, arrays::array_size(Kind::ByteArray, 20), &mut s);
        assert_eq!(object_size(o), 32);
    }
}
