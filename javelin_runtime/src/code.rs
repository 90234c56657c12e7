//! Method, field, code-attribute, and unresolved-reference records.

use crate::flags::MemberFlags;
use crate::object::{Kind, ObjRef};
use crate::Header;

// =============================================================================
// Method
// =============================================================================

/// Method record layout.
#[repr(C)]
pub struct MethodRec {
    pub(crate) hd: Header,
    pub(crate) param_count: u32,
    pub(crate) offset: u32,
    pub(crate) flags: u32,
    pub(crate) _pad: u32,
    pub(crate) class: ObjRef,
    pub(crate) name: ObjRef,
    pub(crate) spec: ObjRef,
    pub(crate) code: ObjRef,
}

/// Number of reference slots in a method record.
pub(crate) const METHOD_REF_COUNT: usize = 4;

/// Allocation size of a method record.
pub const METHOD_SIZE: usize = std::mem::size_of::<MethodRec>();

/// Byte offset of the first method reference slot (`class`).
pub(crate) const METHOD_REFS_OFFSET: usize = std::mem::offset_of!(MethodRec, class);

impl ObjRef {
    #[inline]
    fn method_rec(self) -> *mut MethodRec {
        self.record_ptr::<MethodRec>(Kind::Method)
    }

    /// Stamp scalar method fields on a freshly allocated record.
    pub fn init_method(self, param_count: u32, offset: u32, flags: MemberFlags) {
        unsafe {
            let m = self.method_rec();
            (*m).param_count = param_count;
            (*m).offset = offset;
            (*m).flags = flags.bits();
        }
    }

    /// Parameter slot count, including the receiver for instance methods.
    #[inline]
    pub fn method_param_count(self) -> u32 {
        unsafe { (*self.method_rec()).param_count }
    }

    /// Vtable offset: the method's index in every method table that
    /// contains it.
    #[inline]
    pub fn method_offset(self) -> u32 {
        unsafe { (*self.method_rec()).offset }
    }

    /// Access flags.
    #[inline]
    pub fn method_flags(self) -> MemberFlags {
        MemberFlags::from_bits_truncate(unsafe { (*self.method_rec()).flags })
    }

    /// Declaring class.
    #[inline]
    pub fn method_class(self) -> ObjRef {
        unsafe { (*self.method_rec()).class }
    }

    /// Method name as a `ByteArray`.
    #[inline]
    pub fn method_name(self) -> ObjRef {
        unsafe { (*self.method_rec()).name }
    }

    /// Type descriptor as a `ByteArray`.
    #[inline]
    pub fn method_spec(self) -> ObjRef {
        unsafe { (*self.method_rec()).spec }
    }

    /// Code attribute.
    #[inline]
    pub fn method_code(self) -> ObjRef {
        unsafe { (*self.method_rec()).code }
    }

    /// Set the declaring class.
    #[inline]
    pub fn method_set_class(self, class: ObjRef) {
        unsafe { (*self.method_rec()).class = class }
    }

    /// Set the name.
    #[inline]
    pub fn method_set_name(self, name: ObjRef) {
        unsafe { (*self.method_rec()).name = name }
    }

    /// Set the descriptor.
    #[inline]
    pub fn method_set_spec(self, spec: ObjRef) {
        unsafe { (*self.method_rec()).spec = spec }
    }

    /// Set the code attribute.
    #[inline]
    pub fn method_set_code(self, code: ObjRef) {
        unsafe { (*self.method_rec()).code = code }
    }
}

// =============================================================================
// Field
// =============================================================================

/// Field record layout.
#[repr(C)]
pub struct FieldRec {
    pub(crate) hd: Header,
    pub(crate) offset: u32,
    pub(crate) flags: u32,
    pub(crate) class: ObjRef,
    pub(crate) name: ObjRef,
    pub(crate) spec: ObjRef,
}

/// Number of reference slots in a field record.
pub(crate) const FIELD_REF_COUNT: usize = 3;

/// Allocation size of a field record.
pub const FIELD_SIZE: usize = std::mem::size_of::<FieldRec>();

/// Byte offset of the first field reference slot (`class`).
pub(crate) const FIELD_REFS_OFFSET: usize = std::mem::offset_of!(FieldRec, class);

impl ObjRef {
    #[inline]
    fn field_rec(self) -> *mut FieldRec {
        self.record_ptr::<FieldRec>(Kind::Field)
    }

    /// Stamp scalar field-record fields.
    pub fn init_field(self, offset: u32, flags: MemberFlags) {
        unsafe {
            let f = self.field_rec();
            (*f).offset = offset;
            (*f).flags = flags.bits();
        }
    }

    /// Slot index: into the instance's fields for instance fields, into
    /// the declaring class's static table for static fields.
    #[inline]
    pub fn field_offset(self) -> u32 {
        unsafe { (*self.field_rec()).offset }
    }

    /// Access flags.
    #[inline]
    pub fn field_flags(self) -> MemberFlags {
        MemberFlags::from_bits_truncate(unsafe { (*self.field_rec()).flags })
    }

    /// Declaring class.
    #[inline]
    pub fn field_class(self) -> ObjRef {
        unsafe { (*self.field_rec()).class }
    }

    /// Field name as a `ByteArray`.
    #[inline]
    pub fn field_name(self) -> ObjRef {
        unsafe { (*self.field_rec()).name }
    }

    /// Type descriptor as a `ByteArray`.
    #[inline]
    pub fn field_spec(self) -> ObjRef {
        unsafe { (*self.field_rec()).spec }
    }

    /// Set the declaring class.
    #[inline]
    pub fn field_set_class(self, class: ObjRef) {
        unsafe { (*self.field_rec()).class = class }
    }

    /// Set the name.
    #[inline]
    pub fn field_set_name(self, name: ObjRef) {
        unsafe { (*self.field_rec()).name = name }
    }

    /// Set the descriptor.
    #[inline]
    pub fn field_set_spec(self, spec: ObjRef) {
        unsafe { (*self.field_rec()).spec = spec }
    }
}

// =============================================================================
// Code attribute
// =============================================================================

/// Code attribute layout.
///
/// `handlers` is an `IntArray` of packed 4-int exception-handler entries;
/// see [`ExceptionHandler`].
#[repr(C)]
pub struct CodeRec {
    pub(crate) hd: Header,
    pub(crate) max_stack: u32,
    pub(crate) max_locals: u32,
    pub(crate) body: ObjRef,
    pub(crate) pool: ObjRef,
    pub(crate) handlers: ObjRef,
}

/// Number of reference slots in a code record.
pub(crate) const CODE_REF_COUNT: usize = 3;

/// Allocation size of a code record.
pub const CODE_SIZE: usize = std::mem::size_of::<CodeRec>();

/// Byte offset of the first code reference slot (`body`).
pub(crate) const CODE_REFS_OFFSET: usize = std::mem::offset_of!(CodeRec, body);

/// One entry of a code attribute's exception-handler table.
///
/// A handler covers `start_pc..end_pc` and matches when `catch_type` is
/// zero (catch-all) or names a pool class the thrown exception is an
/// instance of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered instruction offset (inclusive).
    pub start_pc: u32,
    /// End of the covered range (exclusive).
    pub end_pc: u32,
    /// Handler entry point.
    pub handler_pc: u32,
    /// Constant-pool index of the catch type; 0 catches everything.
    pub catch_type: u32,
}

/// Ints per packed handler entry.
pub const HANDLER_STRIDE: usize = 4;

impl ObjRef {
    #[inline]
    fn code_rec(self) -> *mut CodeRec {
        self.record_ptr::<CodeRec>(Kind::Code)
    }

    /// Stamp scalar code fields.
    pub fn init_code(self, max_stack: u32, max_locals: u32) {
        unsafe {
            let c = self.code_rec();
            (*c).max_stack = max_stack;
            (*c).max_locals = max_locals;
        }
    }

    /// Operand-stack budget of one activation.
    #[inline]
    pub fn code_max_stack(self) -> u32 {
        unsafe { (*self.code_rec()).max_stack }
    }

    /// Local-variable slot count of one activation.
    #[inline]
    pub fn code_max_locals(self) -> u32 {
        unsafe { (*self.code_rec()).max_locals }
    }

    /// Bytecode body as a `ByteArray`.
    #[inline]
    pub fn code_body(self) -> ObjRef {
        unsafe { (*self.code_rec()).body }
    }

    /// Constant pool as an `ObjectArray`.
    #[inline]
    pub fn code_pool(self) -> ObjRef {
        unsafe { (*self.code_rec()).pool }
    }

    /// Exception-handler table as an `IntArray`, or null when the method
    /// declares no handlers.
    #[inline]
    pub fn code_handlers(self) -> ObjRef {
        unsafe { (*self.code_rec()).handlers }
    }

    /// Number of handler entries.
    #[inline]
    pub fn code_handler_count(self) -> usize {
        let table = self.code_handlers();
        if table.is_null() {
            0
        } else {
            table.header_len() as usize / HANDLER_STRIDE
        }
    }

    /// Decode handler entry `index`.
    #[inline]
    pub fn code_handler(self, index: usize) -> ExceptionHandler {
        let table = self.code_handlers();
        let base = index * HANDLER_STRIDE;
        ExceptionHandler {
            start_pc: table.int_array_get(base) as u32,
            end_pc: table.int_array_get(base + 1) as u32,
            handler_pc: table.int_array_get(base + 2) as u32,
            catch_type: table.int_array_get(base + 3) as u32,
        }
    }

    /// Set the bytecode body.
    #[inline]
    pub fn code_set_body(self, body: ObjRef) {
        unsafe { (*self.code_rec()).body = body }
    }

    /// Set the constant pool.
    #[inline]
    pub fn code_set_pool(self, pool: ObjRef) {
        unsafe { (*self.code_rec()).pool = pool }
    }

    /// Set the handler table.
    #[inline]
    pub fn code_set_handlers(self, handlers: ObjRef) {
        unsafe { (*self.code_rec()).handlers = handlers }
    }
}

// =============================================================================
// Unresolved references
// =============================================================================

/// Unresolved member-reference layout: the (class name, member name,
/// descriptor) triple a constant-pool slot holds until first use.
#[repr(C)]
pub struct ReferenceRec {
    pub(crate) hd: Header,
    pub(crate) class_name: ObjRef,
    pub(crate) member_name: ObjRef,
    pub(crate) spec: ObjRef,
}

/// Number of reference slots in a reference record.
pub(crate) const REFERENCE_REF_COUNT: usize = 3;

/// Allocation size of a reference record.
pub const REFERENCE_SIZE: usize = std::mem::size_of::<ReferenceRec>();

/// Byte offset of the first slot of a reference record.
pub(crate) const REFERENCE_REFS_OFFSET: usize = std::mem::offset_of!(ReferenceRec, class_name);

impl ObjRef {
    #[inline]
    fn reference_rec(self) -> *mut ReferenceRec {
        self.record_ptr::<ReferenceRec>(Kind::Reference)
    }

    /// Referenced class name as a `ByteArray`.
    #[inline]
    pub fn reference_class_name(self) -> ObjRef {
        unsafe { (*self.reference_rec()).class_name }
    }

    /// Slot address of the class-name component, so resolution can
    /// replace the name with the resolved class in place.
    #[inline]
    pub fn reference_class_name_slot(self) -> *mut ObjRef {
        unsafe { std::ptr::addr_of_mut!((*self.reference_rec()).class_name) }
    }

    /// Referenced member name as a `ByteArray`.
    #[inline]
    pub fn reference_member_name(self) -> ObjRef {
        unsafe { (*self.reference_rec()).member_name }
    }

    /// Referenced member descriptor as a `ByteArray`.
    #[inline]
    pub fn reference_spec(self) -> ObjRef {
        unsafe { (*self.reference_rec()).spec }
    }

    /// Fill all three components of a freshly allocated reference.
    pub fn init_reference(self, class_name: ObjRef, member_name: ObjRef, spec: ObjRef) {
        unsafe {
            let r = self.reference_rec();
            (*r).class_name = class_name;
            (*r).member_name = member_name;
            (*r).spec = spec;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(METHOD_SIZE, 8 + 16 + 4 * crate::REF_SIZE);
        assert_eq!(FIELD_SIZE, 8 + 8 + 3 * crate::REF_SIZE);
        assert_eq!(CODE_SIZE, 8 + 8 + 3 * crate::REF_SIZE);
        assert_eq!(REFERENCE_SIZE, 8 + 3 * crate::REF_SIZE);
        for size in [METHOD_SIZE, FIELD_SIZE, CODE_SIZE, REFERENCE_SIZE] {
            assert_eq!(size % 8, 0);
        }
    }

    #[test]
    fn test_method_scalars() {
        let mut buf = [0u64; METHOD_SIZE / 8];
        unsafe {
            *(buf.as_mut_ptr() as *mut Header) = Header::new(Kind::Method);
        }
        let m = unsafe { ObjRef::from_raw(buf.as_mut_ptr() as *mut u8) };
        m.init_method(2, 5, MemberFlags::PUBLIC | MemberFlags::STATIC);

        assert_eq!(m.method_param_count(), 2);
        assert_eq!(m.method_offset(), 5);
        assert!(m.method_flags().contains(MemberFlags::STATIC));
        assert!(m.method_code().is_null());
    }
}
