use thiserror::Error;

/// Failure taxonomy of the conflict DAG.
///
/// `EntityEvicted` is recoverable: the referenced conflict has already been
/// purged and the caller treats the operation as a no-op. `ConflictingVotes`
/// and `Fatal` indicate corruption or a bug and halt the engine.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("entity already evicted: {0}")]
    EntityEvicted(String),

    #[error("conflicting votes: {0} would be both supported and revoked")]
    ConflictingVotes(String),

    #[error("fatal conflict DAG error: {0}")]
    Fatal(String),
}
