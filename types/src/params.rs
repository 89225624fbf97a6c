//! Protocol parameters — slot timing, committee thresholds, and the windows
//! that drive commitment, attestation and sync behavior.

use crate::slot::{EpochIndex, SlotIndex};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// All protocol parameters stored by every node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// Unix time (seconds) of the genesis slot boundary.
    pub genesis_unix_time: u64,

    /// Duration of a slot in seconds.
    pub slot_duration_secs: u64,

    /// Number of slots per epoch.
    pub slots_per_epoch: u64,

    /// Minimum age (in slots) before a slot may be committed:
    /// `slot + min_commit_age <= latest_accepted_slot`.
    pub min_commit_age: u64,

    /// Width of the in-memory attestation window, in slots.
    pub attestation_commitment_offset: u64,

    /// Number of slots past the latest verified commitment that may be fed to
    /// a syncing engine.
    pub sync_window: u64,

    /// Offset from a chain's latest commitment below which warp sync requests
    /// blocks (we don't request slots we are about to commit ourselves).
    pub warp_sync_offset: u64,

    /// Block acceptance threshold in basis points of total committee weight.
    pub accept_threshold_bps: u32,

    /// Block confirmation threshold in basis points of total committee weight.
    pub confirm_threshold_bps: u32,

    /// Number of slots a non-main chain is retained after falling behind.
    pub chain_retention_slots: u64,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            genesis_unix_time: 0,
            slot_duration_secs: 10,
            slots_per_epoch: 8,
            min_commit_age: 2,
            attestation_commitment_offset: 2,
            sync_window: 20,
            warp_sync_offset: 1,
            accept_threshold_bps: 6700,
            confirm_threshold_bps: 6700,
            chain_retention_slots: 100,
        }
    }
}

impl ProtocolParameters {
    /// The slot containing `time`. Times before genesis map to the genesis slot;
    /// the first full slot after genesis is slot 1.
    pub fn slot_index(&self, time: Timestamp) -> SlotIndex {
        let secs = time.as_secs();
        if secs < self.genesis_unix_time {
            return SlotIndex::GENESIS;
        }
        SlotIndex::new((secs - self.genesis_unix_time) / self.slot_duration_secs.max(1) + 1)
    }

    /// The epoch containing `slot`.
    pub fn epoch_index(&self, slot: SlotIndex) -> EpochIndex {
        slot.epoch(self.slots_per_epoch)
    }

    /// Committee weight required to accept, from `total` committee weight.
    /// Rounded up so the threshold is always strictly above the bps fraction
    /// boundary for non-divisible totals.
    pub fn accept_threshold(&self, total: u64) -> u64 {
        threshold(total, self.accept_threshold_bps)
    }

    /// Committee weight required to confirm, from `total` committee weight.
    pub fn confirm_threshold(&self, total: u64) -> u64 {
        threshold(total, self.confirm_threshold_bps)
    }
}

fn threshold(total: u64, bps: u32) -> u64 {
    ((total as u128 * bps as u128).div_ceil(10_000)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_from_time() {
        let params = ProtocolParameters {
            genesis_unix_time: 1000,
            slot_duration_secs: 10,
            ..Default::default()
        };
        assert_eq!(params.slot_index(Timestamp::new(999)), SlotIndex::GENESIS);
        assert_eq!(params.slot_index(Timestamp::new(1000)), SlotIndex::new(1));
        assert_eq!(params.slot_index(Timestamp::new(1009)), SlotIndex::new(1));
        assert_eq!(params.slot_index(Timestamp::new(1010)), SlotIndex::new(2));
    }

    #[test]
    fn thresholds_round_up() {
        let params = ProtocolParameters::default();
        // 67% of 3 = 2.01 -> 3
        assert_eq!(params.accept_threshold(3), 3);
        // 67% of 100 = 67
        assert_eq!(params.accept_threshold(100), 67);
        // 67% of 1000 = 670
        assert_eq!(params.accept_threshold(1000), 670);
    }

    #[test]
    fn epoch_from_slot() {
        let params = ProtocolParameters::default();
        assert_eq!(params.epoch_index(SlotIndex::new(7)), EpochIndex::new(0));
        assert_eq!(params.epoch_index(SlotIndex::new(8)), EpochIndex::new(1));
    }
}
