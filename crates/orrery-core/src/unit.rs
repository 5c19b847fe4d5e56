//! Unit-of-measure descriptor
//!
//! A `Unit` is a 32-bit descriptor: bit 31 selects digital (1) or SI (0)
//! data. SI units carry a numeric-type selector (bits 29-30) and the
//! exponents of the SI base units; digital units carry an application type
//! and the payload length in the low 16 bits.

use std::fmt;

/// Unit-of-measure descriptor (4 bytes on the wire)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unit(pub u32);

impl Unit {
    pub const DIGITAL: u32 = 1 << 31;

    pub const I32: u32 = 0 << 29;
    pub const I64: u32 = 1 << 29;
    pub const F32: u32 = 2 << 29;
    pub const D64: u32 = 3 << 29;
    pub const NUM_MASK: u32 = 3 << 29;

    pub const LEN_MASK: u32 = (1 << 16) - 1;

    #[inline]
    pub fn new(raw: u32) -> Self {
        Unit(raw)
    }

    /// SI unit with the given numeric selector and base-unit exponent field
    pub fn si(num: u32, exponents: u32) -> Self {
        Unit((num & Self::NUM_MASK) | (exponents & !(Self::DIGITAL | Self::NUM_MASK)))
    }

    /// Digital unit with an application type and inline value length
    pub fn digital(app_type: u32, len: u16) -> Self {
        Unit(Self::DIGITAL | (app_type & 0x7fff) << 16 | len as u32)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_digital(self) -> bool {
        self.0 & Self::DIGITAL != 0
    }

    /// Size in bytes of the inline value this unit describes
    pub fn value_size(self) -> usize {
        if self.is_digital() {
            (self.0 & Self::LEN_MASK) as usize
        } else {
            match self.0 & Self::NUM_MASK {
                Self::I32 | Self::F32 => 4,
                _ => 8,
            }
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_digital() {
            write!(f, "Unit(D:len={})", self.0 & Self::LEN_MASK)
        } else {
            write!(f, "Unit(SI:{:08x})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn si_value_sizes() {
        assert_eq!(Unit::si(Unit::I32, 0).value_size(), 4);
        assert_eq!(Unit::si(Unit::F32, 0).value_size(), 4);
        assert_eq!(Unit::si(Unit::I64, 0).value_size(), 8);
        assert_eq!(Unit::si(Unit::D64, 0).value_size(), 8);
    }

    #[test]
    fn digital_value_size_is_len_field() {
        let u = Unit::digital(2, 33);
        assert!(u.is_digital());
        assert_eq!(u.value_size(), 33);
    }
}
