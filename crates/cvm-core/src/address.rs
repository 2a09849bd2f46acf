//! 160-bit opaque address identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 160-bit address. Total ordering is lexicographic over the raw bytes,
/// which also defines the canonical sort used by the DAO reward
/// distribution and the trust-graph state hash: iteration over maps keyed
/// by address always uses this byte-wise order so the result is
/// reproducible across nodes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        Some(Address(buf))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Truncate a 32-byte hash down to an address by keeping the low 20
    /// bytes, matching EVM-style `CREATE`/`CREATE2` address derivation.
    pub fn truncate_from_hash(hash: &[u8; 32]) -> Self {
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(&hash[12..32]);
        Address(buf)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic_over_bytes() {
        let a = Address([0u8; 20]);
        let mut high = [0u8; 20];
        high[19] = 1;
        let b = Address(high);
        assert!(a < b);
    }

    #[test]
    fn truncate_from_hash_keeps_low_20_bytes() {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        let addr = Address::truncate_from_hash(&hash);
        assert_eq!(addr.0, hash[12..32]);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Address::from_slice(&[0u8; 19]).is_none());
        assert!(Address::from_slice(&[0u8; 20]).is_some());
    }
}
