//! Conflict DAG — tracks causal relationships between conflicting
//! transactions and lets committee seats vote on their fate.
//!
//! The DAG is generic over its conflict and resource identifiers so it can be
//! exercised with small mock IDs in tests; the ledger instantiates it with
//! `TransactionId` and `OutputId`.

pub mod acceptance;
pub mod dag;
pub mod error;
pub mod events;
pub mod vote;

pub use acceptance::AcceptanceState;
pub use dag::{ConflictDag, ConflictIdType, ResourceIdType};
pub use error::ConflictError;
pub use events::ConflictEvent;
pub use vote::{EqualWeights, Vote, WeightProvider};
