//! Events emitted by the mempool. Listeners run outside the pool lock.

use strata_types::{BlockId, SlotIndex, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MempoolEvent {
    /// A transaction entered the pool via its first attachment.
    TransactionAttached { id: TransactionId },
    /// All inputs resolved; the transaction was registered in the conflict
    /// DAG.
    TransactionBooked { id: TransactionId },
    /// An input was unresolvable; the attaching blocks are invalid too.
    TransactionInvalid {
        id: TransactionId,
        attachments: Vec<BlockId>,
    },
    /// The transaction's conflict was accepted.
    TransactionAccepted { id: TransactionId },
    /// The transaction's conflict was rejected.
    TransactionRejected { id: TransactionId },
    /// The transaction lost its last chance of inclusion.
    TransactionOrphaned { id: TransactionId, slot: SlotIndex },
    /// The transaction was removed from the pool.
    TransactionEvicted { id: TransactionId },
}

pub type MempoolEventSink = Box<dyn Fn(&MempoolEvent) + Send + Sync>;
