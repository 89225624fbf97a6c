//! Seat-indexed votes and committee weight lookup.

use strata_types::SeatIndex;

/// A committee seat's vote over a set of conflicts. `rank` orders votes from
/// the same seat (the issuing time of the voting block); only the
/// highest-ranked vote per seat counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vote {
    pub seat: SeatIndex,
    pub rank: u64,
    pub liked: bool,
}

impl Vote {
    pub fn new(seat: SeatIndex, rank: u64) -> Self {
        Self {
            seat,
            rank,
            liked: true,
        }
    }

    /// The same vote with the given polarity.
    pub fn with_liked(self, liked: bool) -> Self {
        Self { liked, ..self }
    }
}

/// Committee weight lookup used for acceptance decisions.
///
/// The conflict DAG only needs weights, totals and the acceptance threshold;
/// the committee itself lives in the consensus layer.
pub trait WeightProvider: Send + Sync {
    /// The voting weight of a single seat (0 for unknown seats).
    fn seat_weight(&self, seat: SeatIndex) -> u64;

    /// Total weight of all committee seats.
    fn total_weight(&self) -> u64;

    /// Weight at which a conflict is accepted.
    fn acceptance_threshold(&self) -> u64;
}

/// Equal-weight committee used by tests: `size` seats of weight 1 with a
/// two-thirds acceptance threshold.
#[derive(Clone, Copy, Debug)]
pub struct EqualWeights {
    pub size: u64,
}

impl EqualWeights {
    pub fn new(size: u64) -> Self {
        Self { size }
    }
}

impl WeightProvider for EqualWeights {
    fn seat_weight(&self, seat: SeatIndex) -> u64 {
        if (seat.0 as u64) < self.size {
            1
        } else {
            0
        }
    }

    fn total_weight(&self) -> u64 {
        self.size
    }

    fn acceptance_threshold(&self) -> u64 {
        (self.size * 2).div_ceil(3)
    }
}
