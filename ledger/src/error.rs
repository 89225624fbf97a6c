use strata_types::{AccountId, OutputId, SlotIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("output not found: {0}")]
    OutputNotFound(OutputId),

    #[error("output already spent: {0}")]
    AlreadySpent(OutputId),

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("ledger gap: expected {expected}, got {got}")]
    CommitGap { expected: SlotIndex, got: SlotIndex },

    #[error("history for {0} is outside the retained diff window")]
    HistoryUnavailable(SlotIndex),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot format error: {0}")]
    SnapshotFormat(String),

    #[error("storage error: {0}")]
    Storage(#[from] strata_store::StoreError),
}
