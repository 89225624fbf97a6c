//! A chain of commitments observed via gossip.
//!
//! Each chain is identified by its forking-point commitment. Three weight
//! views drive chain switching: `claimed` (what the latest commitment says),
//! `attested` (backed by verified attestations) and `verified` (replayed by
//! an engine of our own).

use std::collections::BTreeMap;
use strata_types::{Commitment, CommitmentId, SlotIndex};

#[derive(Clone, Debug)]
pub struct Chain {
    /// The commitment that spawned this chain; doubles as the chain ID.
    pub forking_point: Commitment,
    /// Commitments of this chain by slot (forking point included).
    pub commitments: BTreeMap<SlotIndex, Commitment>,
    /// Highest slot whose attestations have been verified.
    pub latest_attested: Option<SlotIndex>,
    /// Highest slot our own engine has verified.
    pub latest_verified: Option<SlotIndex>,
    pub evicted: bool,
}

impl Chain {
    pub fn new(forking_point: Commitment) -> Self {
        let mut commitments = BTreeMap::new();
        commitments.insert(forking_point.slot, forking_point);
        Self {
            forking_point,
            commitments,
            latest_attested: None,
            latest_verified: None,
            evicted: false,
        }
    }

    pub fn id(&self) -> CommitmentId {
        self.forking_point.id()
    }

    pub fn latest_commitment(&self) -> Commitment {
        *self
            .commitments
            .values()
            .next_back()
            .expect("a chain always contains its forking point")
    }

    pub fn latest_slot(&self) -> SlotIndex {
        self.latest_commitment().slot
    }

    pub fn commitment(&self, slot: SlotIndex) -> Option<Commitment> {
        self.commitments.get(&slot).copied()
    }

    /// Cumulative weight claimed by the latest commitment.
    pub fn claimed_weight(&self) -> u64 {
        self.latest_commitment().cumulative_weight
    }

    /// Cumulative weight up to the latest attested commitment.
    pub fn attested_weight(&self) -> u64 {
        self.weight_at(self.latest_attested)
    }

    /// Cumulative weight up to the latest verified commitment.
    pub fn verified_weight(&self) -> u64 {
        self.weight_at(self.latest_verified)
    }

    fn weight_at(&self, slot: Option<SlotIndex>) -> u64 {
        slot.and_then(|slot| self.commitments.get(&slot))
            .map_or(0, |commitment| commitment.cumulative_weight)
    }

    /// Upper bound on slots fed to a syncing engine.
    pub fn sync_threshold(&self, sync_window: u64) -> SlotIndex {
        match self.latest_verified {
            Some(slot) => slot + sync_window + 1,
            None => self.forking_point.slot + sync_window + 1,
        }
    }

    /// Lower bound from which warp sync requests blocks.
    pub fn warp_sync_threshold(&self, warp_offset: u64) -> SlotIndex {
        self.latest_slot().saturating_sub(warp_offset)
    }

    /// Append a commitment that chains onto this chain's tip.
    pub fn append(&mut self, commitment: Commitment) {
        self.commitments.insert(commitment.slot, commitment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::CommitmentId;

    fn commitment(slot: u64, weight: u64) -> Commitment {
        Commitment {
            slot: SlotIndex::new(slot),
            prev_id: CommitmentId::new([slot as u8; 32]),
            roots_id: [0u8; 32],
            cumulative_weight: weight,
        }
    }

    #[test]
    fn weights_follow_marker_slots() {
        let mut chain = Chain::new(commitment(5, 50));
        chain.append(commitment(6, 60));
        chain.append(commitment(7, 75));

        assert_eq!(chain.claimed_weight(), 75);
        assert_eq!(chain.attested_weight(), 0);
        assert_eq!(chain.verified_weight(), 0);

        chain.latest_attested = Some(SlotIndex::new(6));
        chain.latest_verified = Some(SlotIndex::new(5));
        assert_eq!(chain.attested_weight(), 60);
        assert_eq!(chain.verified_weight(), 50);
    }

    #[test]
    fn cumulative_weight_is_monotone_along_chain() {
        let mut chain = Chain::new(commitment(1, 10));
        chain.append(commitment(2, 15));
        chain.append(commitment(3, 15));

        let weights: Vec<u64> = chain
            .commitments
            .values()
            .map(|c| c.cumulative_weight)
            .collect();
        assert!(weights.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn thresholds() {
        let mut chain = Chain::new(commitment(5, 50));
        chain.append(commitment(10, 80));
        chain.latest_verified = Some(SlotIndex::new(5));

        assert_eq!(chain.sync_threshold(20), SlotIndex::new(26));
        assert_eq!(chain.warp_sync_threshold(1), SlotIndex::new(9));
        assert_eq!(chain.warp_sync_threshold(100), SlotIndex::GENESIS);
    }
}
