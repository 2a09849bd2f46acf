//! 256-bit unsigned big-endian integer with wrapping arithmetic.
//!
//! All arithmetic here must stay bit-exact across platforms: no operation
//! may panic on overflow and no operation may depend on host word size.
//! Division and modulo by zero both yield zero rather than trapping.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Word(pub U256);

impl Word {
    pub const ZERO: Word = Word(U256::zero());
    pub const ONE: Word = Word(U256::one());

    pub fn from_u64(v: u64) -> Self {
        Word(U256::from(v))
    }

    pub fn from_big_endian(bytes: &[u8]) -> Self {
        Word(U256::from_big_endian(bytes))
    }

    pub fn to_big_endian(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.0.to_big_endian(&mut buf);
        buf
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_u64_saturating(&self) -> u64 {
        if self.0 > U256::from(u64::MAX) {
            u64::MAX
        } else {
            self.0.as_u64()
        }
    }

    pub fn wrapping_add(&self, rhs: &Word) -> Word {
        Word(self.0.overflowing_add(rhs.0).0)
    }

    pub fn wrapping_sub(&self, rhs: &Word) -> Word {
        Word(self.0.overflowing_sub(rhs.0).0)
    }

    pub fn wrapping_mul(&self, rhs: &Word) -> Word {
        Word(self.0.overflowing_mul(rhs.0).0)
    }

    /// Division by zero yields zero (no trap).
    pub fn checked_div_or_zero(&self, rhs: &Word) -> Word {
        if rhs.is_zero() {
            Word::ZERO
        } else {
            Word(self.0 / rhs.0)
        }
    }

    /// Modulo by zero yields zero (no trap).
    pub fn checked_mod_or_zero(&self, rhs: &Word) -> Word {
        if rhs.is_zero() {
            Word::ZERO
        } else {
            Word(self.0 % rhs.0)
        }
    }

    pub fn bitand(&self, rhs: &Word) -> Word {
        Word(self.0 & rhs.0)
    }

    pub fn bitor(&self, rhs: &Word) -> Word {
        Word(self.0 | rhs.0)
    }

    pub fn bitxor(&self, rhs: &Word) -> Word {
        Word(self.0 ^ rhs.0)
    }

    pub fn bitnot(&self) -> Word {
        Word(!self.0)
    }

    pub fn eq_bool(&self, rhs: &Word) -> bool {
        self.0 == rhs.0
    }

    pub fn lt_bool(&self, rhs: &Word) -> bool {
        self.0 < rhs.0
    }

    pub fn gt_bool(&self, rhs: &Word) -> bool {
        self.0 > rhs.0
    }

    pub fn le_bool(&self, rhs: &Word) -> bool {
        self.0 <= rhs.0
    }

    pub fn ge_bool(&self, rhs: &Word) -> bool {
        self.0 >= rhs.0
    }

    /// Boolean-as-word helper used by comparison opcodes, which push 0/1.
    pub fn from_bool(b: bool) -> Word {
        if b {
            Word::ONE
        } else {
            Word::ZERO
        }
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Word {
    fn from(v: u64) -> Self {
        Word::from_u64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_yields_zero() {
        let a = Word::from_u64(10);
        let z = Word::ZERO;
        assert_eq!(a.checked_div_or_zero(&z), Word::ZERO);
        assert_eq!(a.checked_mod_or_zero(&z), Word::ZERO);
    }

    #[test]
    fn wrapping_add_wraps_at_256_bits() {
        let max = Word(U256::MAX);
        let one = Word::ONE;
        assert_eq!(max.wrapping_add(&one), Word::ZERO);
    }

    #[test]
    fn big_endian_round_trip() {
        let w = Word::from_u64(0x1234_5678);
        let bytes = w.to_big_endian();
        assert_eq!(Word::from_big_endian(&bytes), w);
    }

    #[test]
    fn comparisons_push_zero_or_one() {
        let a = Word::from_u64(3);
        let b = Word::from_u64(5);
        assert_eq!(Word::from_bool(a.lt_bool(&b)), Word::ONE);
        assert_eq!(Word::from_bool(a.gt_bool(&b)), Word::ZERO);
    }
}
