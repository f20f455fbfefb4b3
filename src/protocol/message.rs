//! Wire Format Constants
//!
//! Layout:
//! ┌──────────────────────────────────────────────────────────┐
//! │ FlagByte (1 byte)                                        │
//! ├──────────────────────────────────────────────────────────┤
//! │ Numbers   : U30(count) F64LE{count}            (0x80)    │
//! │ Integers  : U30(count) U30{count}              (0x40)    │
//! │ Strings   : U30(count) (U30(len) bytes){count} (0x20)    │
//! │ Tables    : U30(count)                         (0x08)    │
//! ├──────────────────────────────────────────────────────────┤
//! │ Table bodies: (U30(subLen) body){table count}            │
//! │   body = U30(N) ref{N} (keyRef valueRef)*                │
//! └──────────────────────────────────────────────────────────┘
//!
//! Message satu byte `0x00` / `0x01` / `0x02` = false / true / nil.

/// Fast path: root `false`
pub const MSG_FALSE: u8 = 0x00;
/// Fast path: root `true`
pub const MSG_TRUE: u8 = 0x01;
/// Fast path: root `nil`
pub const MSG_NIL: u8 = 0x02;

/// Reference index untuk nil
pub const REF_NIL: u32 = 0;
/// Reference index untuk false
pub const REF_FALSE: u32 = 1;
/// Reference index untuk true
pub const REF_TRUE: u32 = 2;

/// Bit-bit section pada flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionFlags(u8);

impl SectionFlags {
    pub const NUMBERS: u8 = 0x80;
    pub const INTEGERS: u8 = 0x40;
    pub const STRINGS: u8 = 0x20;
    /// Reserved: function pool tidak pernah dikirim
    pub const FUNCTIONS: u8 = 0x10;
    pub const TABLES: u8 = 0x08;

    const KNOWN: u8 = Self::NUMBERS | Self::INTEGERS | Self::STRINGS | Self::TABLES;

    pub fn empty() -> Self {
        Self(0)
    }

    /// Validasi flag byte dari wire. `None` kalau ada bit yang tidak dikenal
    /// atau tidak ada section sama sekali.
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        if v & !Self::KNOWN != 0 || v == 0 {
            None
        } else {
            Some(Self(v))
        }
    }

    #[inline(always)]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    #[inline(always)]
    pub fn set_if(&mut self, bit: u8, present: bool) {
        if present {
            self.0 |= bit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_validation() {
        assert!(SectionFlags::from_u8(0x80 | 0x08).is_some());
        assert!(SectionFlags::from_u8(SectionFlags::FUNCTIONS).is_none());
        assert!(SectionFlags::from_u8(MSG_TRUE).is_none());
        assert!(SectionFlags::from_u8(0x20 | 0x04).is_none());
    }

    #[test]
    fn test_fast_paths_do_not_collide_with_sections() {
        for byte in [MSG_FALSE, MSG_TRUE, MSG_NIL] {
            assert!(SectionFlags::from_u8(byte).is_none());
        }
    }
}
