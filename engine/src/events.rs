//! Engine events and the synchronous fan-out event bus.
//!
//! Listeners are invoked inline on the emitting thread; keep handlers fast
//! to avoid stalling block processing. Request events are consumed by the
//! transport collaborator.

use crate::error::ErrorKind;
use strata_types::{BlockId, Commitment, CommitmentId, SlotIndex, TransactionId};

/// Events emitted by the engine pipeline.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// A block arrived at the engine.
    BlockReceived { id: BlockId },
    /// A block was dropped before entering the pipeline (duplicate or
    /// malformed).
    BlockFiltered { id: BlockId, reason: String },
    /// All parents of the block are known.
    BlockSolid { id: BlockId },
    /// Conflict inheritance finished.
    BlockBooked { id: BlockId },
    /// The block or its payload is invalid.
    BlockInvalid { id: BlockId, reason: String },
    /// Witness weight crossed the acceptance threshold.
    BlockAccepted { id: BlockId },
    /// Witness weight crossed the confirmation threshold.
    BlockConfirmed { id: BlockId },
    /// A transaction lost its last chance of inclusion.
    TransactionOrphaned { id: TransactionId, slot: SlotIndex },
    /// A slot was sealed into a commitment.
    SlotCommitted { commitment: Commitment },
    /// Ask the transport for a missing block.
    RequestBlock { id: BlockId },
    /// Ask the transport for a missing commitment.
    RequestCommitment { id: CommitmentId },
    /// Ask the transport for attestations of a candidate chain.
    RequestAttestations { chain: CommitmentId },
    /// Ask the transport to warp-sync a slot range of a candidate chain.
    RequestWarpSync {
        chain: CommitmentId,
        from: SlotIndex,
        to: SlotIndex,
    },
    /// The main chain switched to a heavier candidate.
    ChainSwitched { chain: CommitmentId },
    /// A subsystem surfaced an error.
    Error { kind: ErrorKind, context: String },
}

/// Synchronous fan-out event bus for engine events.
pub struct EventBus {
    listeners: std::sync::RwLock<Vec<Box<dyn Fn(&EngineEvent) + Send + Sync>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: std::sync::RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Box<dyn Fn(&EngineEvent) + Send + Sync>) {
        self.listeners
            .write()
            .expect("event bus lock poisoned")
            .push(listener);
    }

    pub fn emit(&self, event: &EngineEvent) {
        let listeners = self.listeners.read().expect("event bus lock poisoned");
        for listener in listeners.iter() {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
