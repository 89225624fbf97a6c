//! Deterministic state tree.
//!
//! A sorted map from keys to 32-byte leaf hashes with a binary Merkle root.
//! Replicas that hold the same key/value pairs compute the same root, which
//! is all the commitment needs.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::collections::BTreeMap;

/// Root of an empty tree.
pub const EMPTY_ROOT: [u8; 32] = [0u8; 32];

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(left);
    hasher.update(right);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn hash_leaf(key: &[u8], value: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update((key.len() as u64).to_le_bytes());
    hasher.update(key);
    hasher.update(value);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Merkle root over an ordered list of 32-byte hashes. An odd node at the end
/// of a layer is promoted unchanged.
pub fn merkle_root(hashes: &[[u8; 32]]) -> [u8; 32] {
    if hashes.is_empty() {
        return EMPTY_ROOT;
    }
    let mut layer: Vec<[u8; 32]> = hashes.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(left, right)),
                [single] => next.push(*single),
                _ => unreachable!(),
            }
        }
        layer = next;
    }
    layer[0]
}

/// A keyed state tree with incremental updates and an on-demand root.
#[derive(Clone, Debug, Default)]
pub struct StateTree {
    leaves: BTreeMap<Vec<u8>, [u8; 32]>,
}

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Vec<u8>, value: [u8; 32]) {
        self.leaves.insert(key, value);
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.leaves.remove(key);
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.leaves.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The Merkle root over all leaves in key order.
    pub fn root(&self) -> [u8; 32] {
        let leaf_hashes: Vec<[u8; 32]> = self
            .leaves
            .iter()
            .map(|(key, value)| hash_leaf(key, value))
            .collect();
        merkle_root(&leaf_hashes)
    }
}
