//! C1 — the KV store facade: typed read/write over a generic byte-keyed
//! store with prefix scans and atomic batches.
//!
//! The concrete storage engine (RocksDB, sled, whatever the embedding node
//! already runs) lives outside this crate; [`KvStore`] is the seam. A
//! [`MemoryKvStore`] is provided so this crate (and everything built on it)
//! is runnable and testable on its own.

use crate::error::CoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Byte-keyed, byte-valued store. All keys/values are already
/// canonically serialised by the caller (see [`crate::codec`]).
pub trait KvStore: Send + Sync {
    fn read(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn write(&self, key: &[u8], value: &[u8]);
    fn erase(&self, key: &[u8]);
    fn exists(&self, key: &[u8]) -> bool {
        self.read(key).is_some()
    }
    /// All `(key, value)` pairs whose key starts with `prefix`, in key
    /// order. Returned eagerly rather than as a lazy iterator to keep the
    /// trait object-safe.
    fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    fn batch(&self) -> Box<dyn Batch>;
}

/// A set of writes/erases that commit atomically: all become visible, or
/// (on any failure) none do.
pub trait Batch: Send {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);
    fn delete(&mut self, key: Vec<u8>);
    fn commit(self: Box<Self>) -> Result<(), CoreError>;
}

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// In-process, `BTreeMap`-backed implementation of [`KvStore`]. Not meant
/// to survive process restarts; it exists so the consensus core can run
/// and be tested without an embedding node's real storage engine wired in.
#[derive(Default)]
pub struct MemoryKvStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    fn write(&self, key: &[u8], value: &[u8]) {
        self.inner.write().insert(key.to_vec(), value.to_vec());
    }

    fn erase(&self, key: &[u8]) {
        self.inner.write().remove(key);
    }

    fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.inner
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn batch(&self) -> Box<dyn Batch> {
        Box::new(MemoryBatch {
            store: self.inner.clone(),
            ops: Vec::new(),
        })
    }
}

struct MemoryBatch {
    store: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    ops: Vec<Op>,
}

impl Batch for MemoryBatch {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(Op::Put(key, value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(Op::Delete(key));
    }

    fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let mut guard = self.store.write();
        for op in self.ops {
            match op {
                Op::Put(k, v) => {
                    guard.insert(k, v);
                }
                Op::Delete(k) => {
                    guard.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// Builds a prefixed key, e.g. `key_for(b"TRUST", &[from_bytes, to_bytes])`.
pub fn join_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_commit_is_all_or_nothing_on_success() {
        let store = MemoryKvStore::new();
        let mut batch = store.batch();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.commit().unwrap();
        assert_eq!(store.read(b"a"), Some(b"1".to_vec()));
        assert_eq!(store.read(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn scan_returns_prefix_matches_in_key_order() {
        let store = MemoryKvStore::new();
        store.write(b"TRUST/a/1", b"x");
        store.write(b"TRUST/a/2", b"y");
        store.write(b"TRUST_IN/a/1", b"z");
        let results = store.scan(b"TRUST/a/");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, b"TRUST/a/1");
    }

    #[test]
    fn erase_removes_key() {
        let store = MemoryKvStore::new();
        store.write(b"k", b"v");
        assert!(store.exists(b"k"));
        store.erase(b"k");
        assert!(!store.exists(b"k"));
    }
}
