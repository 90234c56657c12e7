//! Access flags for classes and class members.
//!
//! Bit values match the class-file encoding so a parser can store the
//! flag halfword unmodified.

use bitflags::bitflags;

bitflags! {
    /// Class access flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassFlags: u32 {
        /// Publicly accessible.
        const PUBLIC = 0x0001;
        /// Declared final.
        const FINAL = 0x0010;
        /// `invokespecial` dispatches to the superclass override for
        /// non-constructor superclass methods.
        const SUPER = 0x0020;
        /// The class is an interface; `instanceof` walks interface tables.
        const INTERFACE = 0x0200;
        /// Declared abstract.
        const ABSTRACT = 0x0400;
    }
}

bitflags! {
    /// Method and field access flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemberFlags: u32 {
        /// Publicly accessible.
        const PUBLIC = 0x0001;
        /// Private to the declaring class.
        const PRIVATE = 0x0002;
        /// Accessible to subclasses.
        const PROTECTED = 0x0004;
        /// Static member; fields index the static table, methods dispatch
        /// without a receiver.
        const STATIC = 0x0008;
        /// Declared final.
        const FINAL = 0x0010;
        /// Method body is provided by the embedder, not bytecode.
        const NATIVE = 0x0100;
        /// Abstract method without a code attribute.
        const ABSTRACT = 0x0400;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_file_bit_values() {
        assert_eq!(ClassFlags::SUPER.bits(), 0x20);
        assert_eq!(ClassFlags::INTERFACE.bits(), 0x200);
        assert_eq!(MemberFlags::STATIC.bits(), 0x8);
    }

    #[test]
    fn test_raw_roundtrip() {
        let f = ClassFlags::from_bits_truncate(0x0021);
        assert!(f.contains(ClassFlags::PUBLIC | ClassFlags::SUPER));
        assert!(!f.contains(ClassFlags::INTERFACE));
    }
}
