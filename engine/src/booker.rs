//! Booker: conflict inheritance in causal order.
//!
//! A block books only after all its parents booked. Strong parents pass
//! their entire conflict set on; weak parents only their payload conflicts;
//! shallow-like parents pass their payload conflicts while voting down the
//! competing conflicts' future cones. Already-accepted conflicts are merged
//! back to the master branch and disappear from the inherited set.

use crate::causal_order::CausalOrder;
use crate::error::EngineError;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use strata_conflict::ConflictDag;
use strata_consensus::AcceptanceGadget;
use strata_mempool::{Mempool, TxLifecycle};
use strata_types::{BlockId, OutputId, TransactionId};

/// Result of one booking attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookOutcome {
    /// The block booked; the contained blocks became ready as a result.
    Booked { released: Vec<BlockId> },
    /// Parents are missing or unbooked; parked in the causal-order queue.
    WaitingForParents { missing: Vec<BlockId> },
    /// The payload transaction's inputs have not all resolved yet.
    WaitingForPayload,
    /// The block (or its payload) is invalid.
    Invalid { reason: String },
}

pub struct Booker {
    gadget: Arc<AcceptanceGadget>,
    mempool: Arc<Mempool>,
    conflict_dag: Arc<ConflictDag<TransactionId, OutputId>>,
    causal_order: Mutex<CausalOrder>,
}

impl Booker {
    pub fn new(
        gadget: Arc<AcceptanceGadget>,
        mempool: Arc<Mempool>,
        conflict_dag: Arc<ConflictDag<TransactionId, OutputId>>,
        max_pending_blocks: usize,
    ) -> Self {
        Self {
            gadget,
            mempool,
            conflict_dag,
            causal_order: Mutex::new(CausalOrder::new(max_pending_blocks)),
        }
    }

    /// Attempt to book a block.
    pub fn book(&self, block_id: &BlockId) -> Result<BookOutcome, EngineError> {
        let meta = self
            .gadget
            .block(block_id)
            .ok_or(EngineError::UnknownBlock(*block_id))?;

        if meta.is_booked {
            return Ok(BookOutcome::Booked {
                released: Vec::new(),
            });
        }
        if meta.is_invalid {
            return Ok(BookOutcome::Invalid {
                reason: "block previously marked invalid".into(),
            });
        }

        // Causal order: every parent must be booked (or part of committed
        // history that left the cache).
        let mut missing = Vec::new();
        let mut parent_invalid = false;
        for parent_id in meta.block.all_parents() {
            match self.gadget.block(parent_id) {
                Some(parent) => {
                    if parent.is_invalid {
                        parent_invalid = true;
                    } else if !parent.is_booked {
                        missing.push(*parent_id);
                    }
                }
                None => {
                    // Solidification ran before booking, so an absent parent
                    // was evicted with its committed slot.
                }
            }
        }

        if parent_invalid {
            self.gadget.mark_invalid(block_id);
            self.causal_order.lock().expect("causal order poisoned").remove(block_id);
            return Ok(BookOutcome::Invalid {
                reason: "parent block is invalid".into(),
            });
        }
        if !missing.is_empty() {
            let registered = self
                .causal_order
                .lock()
                .expect("causal order poisoned")
                .wait_for(*block_id, missing.clone());
            if !registered {
                // The block is not linked into the queue and would never be
                // released; the caller retries with back-off.
                return Err(EngineError::QueueFull { queue: "booker" });
            }
            return Ok(BookOutcome::WaitingForParents { missing });
        }

        // Attach the payload; its conflicts seed the block's own set.
        let payload_conflicts = match meta.block.transaction() {
            Some(tx) => {
                let tx_meta =
                    self.mempool
                        .attach_transaction(tx, *block_id, meta.block.slot)?;
                match tx_meta.lifecycle {
                    TxLifecycle::Invalid => {
                        self.gadget.mark_invalid(block_id);
                        return Ok(BookOutcome::Invalid {
                            reason: "payload transaction is invalid".into(),
                        });
                    }
                    TxLifecycle::Unsolid | TxLifecycle::Solid => {
                        return Ok(BookOutcome::WaitingForPayload);
                    }
                    TxLifecycle::Booked => tx_meta.conflict_ids,
                }
            }
            None => Vec::new(),
        };

        let conflict_ids = self.inherit_conflicts(&meta.block, &payload_conflicts);

        self.gadget
            .mark_booked(block_id, payload_conflicts, conflict_ids);

        let released = self
            .causal_order
            .lock()
            .expect("causal order poisoned")
            .mark_done(*block_id);
        Ok(BookOutcome::Booked { released })
    }

    /// Compute the block's conflict set from its parents and payload.
    fn inherit_conflicts(
        &self,
        block: &strata_types::Block,
        payload_conflicts: &[TransactionId],
    ) -> Vec<TransactionId> {
        let mut inherited: BTreeSet<TransactionId> = payload_conflicts.iter().copied().collect();

        for parent_id in &block.strong_parents {
            if let Some(parent) = self.gadget.block(parent_id) {
                inherited.extend(parent.conflict_ids.iter().copied());
            }
        }
        for parent_id in &block.weak_parents {
            if let Some(parent) = self.gadget.block(parent_id) {
                inherited.extend(parent.payload_conflict_ids.iter().copied());
            }
        }
        for parent_id in &block.shallow_like_parents {
            let Some(parent) = self.gadget.block(parent_id) else {
                continue;
            };
            inherited.extend(parent.payload_conflict_ids.iter().copied());

            // A shallow-like reference endorses the parent's payload against
            // its competitors: everything downstream of the conflicting
            // conflicts is dropped from the inherited set.
            let mut competitors = Vec::new();
            for conflict in &parent.payload_conflict_ids {
                if let Some(conflicting) = self.conflict_dag.conflicting_conflicts(*conflict) {
                    competitors.extend(conflicting);
                }
            }
            for disliked in self.conflict_dag.future_cone(&competitors) {
                inherited.remove(&disliked);
            }
        }

        // Accepted conflicts merge back to master.
        let inherited: Vec<TransactionId> = inherited.into_iter().collect();
        self.conflict_dag.unaccepted_conflicts(&inherited)
    }

    pub fn pending_count(&self) -> usize {
        self.causal_order
            .lock()
            .expect("causal order poisoned")
            .len()
    }
}
