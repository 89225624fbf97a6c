use strata_types::{AccountId, SlotIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("issuer {0} holds no committee seat")]
    NotCommitteeMember(AccountId),

    #[error("commit gap: expected {expected}, got {got}")]
    CommitGap { expected: SlotIndex, got: SlotIndex },

    #[error("attestation export target {target} is newer than last committed slot {committed}")]
    ExportTargetTooNew {
        target: SlotIndex,
        committed: SlotIndex,
    },

    #[error("snapshot format error: {0}")]
    SnapshotFormat(String),

    #[error("storage error: {0}")]
    Storage(#[from] strata_store::StoreError),
}
