//! Engine error taxonomy.
//!
//! Subsystem errors are wrapped and classified: transient and invalid
//! failures surface as events without unwinding state; fatal failures stop
//! the engine.

use strata_types::{BlockId, SlotIndex};
use thiserror::Error;

/// How an error must be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry locally with back-off.
    Transient,
    /// Recorded against the emitting peer; never crashes the engine.
    Invalid,
    /// The referenced entity is already pruned; a no-op for the caller.
    EntityEvicted,
    /// Invariant violation. Halts the engine.
    Fatal,
}

/// Engine health, surfaced through the public API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Stopped,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),

    #[error("{queue} queue is full")]
    QueueFull { queue: &'static str },

    #[error("duplicate commitment for {0}")]
    DuplicateCommitment(SlotIndex),

    #[error("engine is shut down")]
    Shutdown,

    #[error(transparent)]
    Types(#[from] strata_types::TypeError),

    #[error(transparent)]
    Store(#[from] strata_store::StoreError),

    #[error(transparent)]
    Ledger(#[from] strata_ledger::LedgerError),

    #[error(transparent)]
    Conflict(#[from] strata_conflict::ConflictError),

    #[error(transparent)]
    Consensus(#[from] strata_consensus::ConsensusError),

    #[error(transparent)]
    Mempool(#[from] strata_mempool::MempoolError),
}

impl EngineError {
    /// Map the error onto the handling taxonomy.
    pub fn kind(&self) -> ErrorKind {
        use strata_conflict::ConflictError;
        use strata_ledger::LedgerError;
        use strata_store::StoreError;

        match self {
            EngineError::UnknownBlock(_) => ErrorKind::Transient,
            EngineError::QueueFull { .. } => ErrorKind::Transient,
            EngineError::DuplicateCommitment(_) => ErrorKind::Fatal,
            EngineError::Shutdown => ErrorKind::Transient,
            EngineError::Types(_) => ErrorKind::Invalid,
            EngineError::Store(StoreError::EpochPruned(_)) => ErrorKind::EntityEvicted,
            EngineError::Store(_) => ErrorKind::Fatal,
            EngineError::Ledger(LedgerError::CommitGap { .. }) => ErrorKind::Fatal,
            EngineError::Ledger(LedgerError::HistoryUnavailable(_)) => ErrorKind::EntityEvicted,
            EngineError::Ledger(_) => ErrorKind::Invalid,
            EngineError::Conflict(ConflictError::EntityEvicted(_)) => ErrorKind::EntityEvicted,
            EngineError::Conflict(_) => ErrorKind::Fatal,
            EngineError::Consensus(strata_consensus::ConsensusError::CommitGap { .. }) => {
                ErrorKind::Fatal
            }
            EngineError::Consensus(_) => ErrorKind::Invalid,
            EngineError::Mempool(strata_mempool::MempoolError::Conflict(
                ConflictError::EntityEvicted(_),
            )) => ErrorKind::EntityEvicted,
            EngineError::Mempool(_) => ErrorKind::Invalid,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}
