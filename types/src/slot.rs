//! Slot and epoch indices.
//!
//! Time is partitioned into fixed-duration slots; a contiguous run of
//! `slots_per_epoch` slots forms an epoch. Slot 0 is the genesis slot and is
//! never committed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A monotone slot index. Slot 0 is the genesis slot.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SlotIndex(pub u64);

impl SlotIndex {
    pub const GENESIS: Self = Self(0);

    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The next slot.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The previous slot, saturating at genesis.
    pub fn prev(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn saturating_sub(&self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }

    /// The epoch this slot belongs to.
    pub fn epoch(&self, slots_per_epoch: u64) -> EpochIndex {
        EpochIndex(self.0 / slots_per_epoch.max(1))
    }
}

impl Add<u64> for SlotIndex {
    type Output = SlotIndex;

    fn add(self, rhs: u64) -> SlotIndex {
        SlotIndex(self.0 + rhs)
    }
}

impl AddAssign<u64> for SlotIndex {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub<SlotIndex> for SlotIndex {
    type Output = u64;

    fn sub(self, rhs: SlotIndex) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// An epoch index: `slot / slots_per_epoch`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EpochIndex(pub u64);

impl EpochIndex {
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// First slot of this epoch.
    pub fn first_slot(&self, slots_per_epoch: u64) -> SlotIndex {
        SlotIndex(self.0 * slots_per_epoch)
    }

    /// Last slot of this epoch.
    pub fn last_slot(&self, slots_per_epoch: u64) -> SlotIndex {
        SlotIndex((self.0 + 1) * slots_per_epoch - 1)
    }
}

impl fmt::Display for EpochIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_arithmetic() {
        let s = SlotIndex::new(5);
        assert_eq!(s.next(), SlotIndex::new(6));
        assert_eq!(s.prev(), SlotIndex::new(4));
        assert_eq!(SlotIndex::GENESIS.prev(), SlotIndex::GENESIS);
        assert_eq!(s + 3, SlotIndex::new(8));
        assert_eq!(SlotIndex::new(8) - s, 3);
        assert_eq!(s - SlotIndex::new(8), 0);
    }

    #[test]
    fn epoch_of_slot() {
        assert_eq!(SlotIndex::new(0).epoch(8), EpochIndex::new(0));
        assert_eq!(SlotIndex::new(7).epoch(8), EpochIndex::new(0));
        assert_eq!(SlotIndex::new(8).epoch(8), EpochIndex::new(1));
    }

    #[test]
    fn epoch_slot_bounds() {
        let e = EpochIndex::new(2);
        assert_eq!(e.first_slot(8), SlotIndex::new(16));
        assert_eq!(e.last_slot(8), SlotIndex::new(23));
    }
}
