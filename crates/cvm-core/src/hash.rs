//! SHA-256 helpers shared by every component that needs a consensus-grade
//! digest (trust-graph state hash, HAT parity hash, commitment hashes,
//! validator-selection seed, contract-address derivation).

use sha2::{Digest, Sha256};

pub type Hash32 = [u8; 32];

pub const EMPTY_HASH: Hash32 = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
];

pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Hashes the concatenation of several byte slices, for callers that would
/// otherwise build an intermediate `Vec` just to hash it once (commitment
/// hashes, the validator-selection seed, the trust-graph state hash).
pub fn sha256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_matches_known_constant() {
        assert_eq!(sha256(b""), EMPTY_HASH);
    }

    #[test]
    fn concat_matches_manual_concatenation() {
        let a = sha256_concat(&[b"foo", b"bar"]);
        let b = sha256(b"foobar");
        assert_eq!(a, b);
    }
}
