use strata_types::EpochIndex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("epoch {0} has already been pruned")]
    EpochPruned(EpochIndex),

    #[error("database is corrupted: {0}")]
    Corruption(String),
}
