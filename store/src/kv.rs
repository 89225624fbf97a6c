//! The key-value storage trait and the in-memory reference backend.
//!
//! Keys are partitioned by namespace; a namespace plus key maps to an opaque
//! byte value. Batches apply atomically: a reader never observes a batch
//! half-applied.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

/// A single operation inside an atomic batch.
#[derive(Clone, Debug)]
pub enum WriteOp {
    Put {
        namespace: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        namespace: String,
        key: Vec<u8>,
    },
}

/// Abstract key-value storage.
///
/// Implementations must be safe for concurrent readers; the callers in this
/// workspace serialize writers per subsystem.
pub trait KVStore: Send + Sync {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, namespace: &str, key: &[u8]) -> Result<(), StoreError>;

    fn contains(&self, namespace: &str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(namespace, key)?.is_some())
    }

    /// All entries of a namespace, in key order.
    fn iter_namespace(&self, namespace: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply a batch of operations atomically.
    fn batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Delete every namespace whose name starts with `prefix`. Used to drop
    /// an epoch bucket in one operation.
    fn drop_namespace_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

/// In-memory backend used by tests and by forked candidate engines.
#[derive(Default)]
pub struct MemoryStore {
    /// `namespace \0 key` -> value; a flat ordered map keeps prefix scans cheap.
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of the store, used when forking a candidate engine.
    pub fn clone_contents(&self) -> Self {
        let entries = self.entries.read().expect("store lock poisoned").clone();
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn full_key(namespace: &str, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(namespace.len() + 1 + key.len());
        full.extend_from_slice(namespace.as_bytes());
        full.push(0);
        full.extend_from_slice(key);
        full
    }
}

impl KVStore for MemoryStore {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().expect("store lock poisoned");
        Ok(entries.get(&Self::full_key(namespace, key)).cloned())
    }

    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        entries.insert(Self::full_key(namespace, key), value.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        entries.remove(&Self::full_key(namespace, key));
        Ok(())
    }

    fn iter_namespace(&self, namespace: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let prefix = Self::full_key(namespace, &[]);
        let entries = self.entries.read().expect("store lock poisoned");
        let mut out = Vec::new();
        for (full_key, value) in
            entries.range::<Vec<u8>, _>((Bound::Included(&prefix), Bound::Unbounded))
        {
            if !full_key.starts_with(&prefix) {
                break;
            }
            out.push((full_key[prefix.len()..].to_vec(), value.clone()));
        }
        Ok(out)
    }

    fn batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        for op in ops {
            match op {
                WriteOp::Put {
                    namespace,
                    key,
                    value,
                } => {
                    entries.insert(Self::full_key(&namespace, &key), value);
                }
                WriteOp::Delete { namespace, key } => {
                    entries.remove(&Self::full_key(&namespace, &key));
                }
            }
        }
        Ok(())
    }

    fn drop_namespace_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        let before = entries.len();
        entries.retain(|full_key, _| !full_key.starts_with(prefix.as_bytes()));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = MemoryStore::new();
        store.put("a", b"k", b"v").unwrap();
        assert_eq!(store.get("a", b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.contains("a", b"k").unwrap());

        store.delete("a", b"k").unwrap();
        assert_eq!(store.get("a", b"k").unwrap(), None);
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.put("a", b"k", b"1").unwrap();
        store.put("b", b"k", b"2").unwrap();
        assert_eq!(store.get("a", b"k").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b", b"k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn iter_namespace_is_ordered_and_scoped() {
        let store = MemoryStore::new();
        store.put("ns", b"b", b"2").unwrap();
        store.put("ns", b"a", b"1").unwrap();
        store.put("other", b"c", b"3").unwrap();

        let entries = store.iter_namespace("ns").unwrap();
        assert_eq!(
            entries,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn batch_applies_all_operations() {
        let store = MemoryStore::new();
        store.put("ns", b"old", b"x").unwrap();
        store
            .batch(vec![
                WriteOp::Put {
                    namespace: "ns".into(),
                    key: b"new".to_vec(),
                    value: b"y".to_vec(),
                },
                WriteOp::Delete {
                    namespace: "ns".into(),
                    key: b"old".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(store.get("ns", b"new").unwrap(), Some(b"y".to_vec()));
        assert_eq!(store.get("ns", b"old").unwrap(), None);
    }

    #[test]
    fn drop_prefix_removes_matching_namespaces() {
        let store = MemoryStore::new();
        store.put("prunable/1/2/blocks", b"k", b"v").unwrap();
        store.put("prunable/1/3/blocks", b"k", b"v").unwrap();
        store.put("prunable/2/16/blocks", b"k", b"v").unwrap();

        let dropped = store.drop_namespace_prefix("prunable/1/").unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(store.get("prunable/2/16/blocks", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn clone_contents_is_independent() {
        let store = MemoryStore::new();
        store.put("ns", b"k", b"v").unwrap();

        let copy = store.clone_contents();
        store.put("ns", b"k2", b"v2").unwrap();

        assert_eq!(copy.get("ns", b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(copy.get("ns", b"k2").unwrap(), None);
    }
}
