//! Abstract storage for the Strata ledger core.
//!
//! Every storage backend (on-disk engines, in-memory for testing) implements
//! the [`KVStore`] trait. The rest of the workspace depends only on the trait
//! and on [`Storage`], which partitions the key space into a permanent
//! namespace and epoch-bucketed prunable namespaces.

pub mod error;
pub mod kv;
pub mod storage;

pub use error::StoreError;
pub use kv::{KVStore, MemoryStore, WriteOp};
pub use storage::{PruneOutcome, Storage};
