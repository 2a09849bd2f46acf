//! Canonical, length-prefixed serialisation for values placed in the KV
//! store. Counters use little-endian, hashes/words use big-endian (the
//! word/hash types carry their own big-endian byte order internally, so
//! this module only has to be consistent for the bincode envelope).

use crate::error::CoreError;
use serde::{de::DeserializeOwned, Serialize};

/// Serialise `value` with a 4-byte little-endian length prefix followed by
/// the bincode payload. The prefix lets a scan distinguish malformed or
/// partially-written values from valid ones without needing a schema.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let payload = bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Inverse of [`encode`]. Rejects a buffer whose declared length does not
/// match the remaining bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    if bytes.len() < 4 {
        return Err(CoreError::Serialization("buffer too short for length prefix".into()));
    }
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&bytes[..4]);
    let len = u32::from_le_bytes(len_buf) as usize;
    let payload = &bytes[4..];
    if payload.len() != len {
        return Err(CoreError::Serialization(format!(
            "length prefix {len} does not match payload of {} bytes",
            payload.len()
        )));
    }
    bincode::deserialize(payload).map_err(|e| CoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trip_serialisation() {
        let s = Sample { a: 7, b: "hi".into() };
        let encoded = encode(&s).unwrap();
        let decoded: Sample = decode(&encoded).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let s = Sample { a: 1, b: "x".into() };
        let mut encoded = encode(&s).unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(decode::<Sample>(&encoded).is_err());
    }
}
