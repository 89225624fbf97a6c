use strata_types::{BlockId, OutputId, TransactionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("state not found: {0}")]
    StateNotFound(OutputId),

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("no transaction attached via block {0}")]
    AttachmentNotFound(BlockId),

    #[error("transaction {transaction} is invalid: {reason}")]
    InvalidTransaction {
        transaction: TransactionId,
        reason: String,
    },

    #[error(transparent)]
    Conflict(#[from] strata_conflict::ConflictError),

    #[error(transparent)]
    Ledger(#[from] strata_ledger::LedgerError),
}
