//! The committee: seat-indexed validators and their voting weight.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strata_conflict::WeightProvider;
use strata_types::{AccountId, SeatIndex};

/// One committee seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeSeat {
    pub account_id: AccountId,
    pub weight: u64,
}

/// The current committee. Seats are assigned in ascending account-ID order so
/// every replica derives the same seat indices from the same member set.
#[derive(Clone, Debug)]
pub struct Committee {
    seats: BTreeMap<SeatIndex, CommitteeSeat>,
    by_account: HashMap<AccountId, SeatIndex>,
    total_weight: u64,
    accept_threshold: u64,
    confirm_threshold: u64,
}

impl Committee {
    /// Build a committee from `(account, weight)` pairs. Thresholds are given
    /// in basis points of the total weight, rounded up.
    pub fn new(
        members: Vec<(AccountId, u64)>,
        accept_threshold_bps: u32,
        confirm_threshold_bps: u32,
    ) -> Self {
        let mut sorted = members;
        sorted.sort_by_key(|(account_id, _)| *account_id);

        let mut seats = BTreeMap::new();
        let mut by_account = HashMap::new();
        let mut total_weight = 0u64;
        for (index, (account_id, weight)) in sorted.into_iter().enumerate() {
            let seat = SeatIndex(index as u16);
            seats.insert(seat, CommitteeSeat { account_id, weight });
            by_account.insert(account_id, seat);
            total_weight += weight;
        }

        let threshold = |bps: u32| ((total_weight as u128 * bps as u128).div_ceil(10_000)) as u64;
        Self {
            seats,
            by_account,
            total_weight,
            accept_threshold: threshold(accept_threshold_bps),
            confirm_threshold: threshold(confirm_threshold_bps),
        }
    }

    /// Equal-weight committee with two-thirds thresholds, for tests.
    pub fn equal_weights(members: Vec<AccountId>) -> Self {
        Self::new(members.into_iter().map(|id| (id, 1)).collect(), 6700, 6700)
    }

    pub fn seat(&self, account_id: &AccountId) -> Option<SeatIndex> {
        self.by_account.get(account_id).copied()
    }

    pub fn account(&self, seat: SeatIndex) -> Option<AccountId> {
        self.seats.get(&seat).map(|member| member.account_id)
    }

    pub fn weight_of_account(&self, account_id: &AccountId) -> u64 {
        self.seat(account_id)
            .map_or(0, |seat| self.seat_weight(seat))
    }

    pub fn size(&self) -> usize {
        self.seats.len()
    }

    pub fn accept_threshold(&self) -> u64 {
        self.accept_threshold
    }

    pub fn confirm_threshold(&self) -> u64 {
        self.confirm_threshold
    }

    pub fn seats(&self) -> impl Iterator<Item = (&SeatIndex, &CommitteeSeat)> {
        self.seats.iter()
    }
}

impl WeightProvider for Committee {
    fn seat_weight(&self, seat: SeatIndex) -> u64 {
        self.seats.get(&seat).map_or(0, |member| member.weight)
    }

    fn total_weight(&self) -> u64 {
        self.total_weight
    }

    fn acceptance_threshold(&self) -> u64 {
        self.accept_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId::new([byte; 32])
    }

    #[test]
    fn seats_are_assigned_in_account_order() {
        let committee = Committee::equal_weights(vec![account(3), account(1), account(2)]);
        assert_eq!(committee.account(SeatIndex(0)), Some(account(1)));
        assert_eq!(committee.account(SeatIndex(1)), Some(account(2)));
        assert_eq!(committee.account(SeatIndex(2)), Some(account(3)));
        assert_eq!(committee.seat(&account(3)), Some(SeatIndex(2)));
    }

    #[test]
    fn thresholds_round_up() {
        let committee = Committee::new(
            vec![(account(1), 1), (account(2), 1), (account(3), 1)],
            6700,
            7500,
        );
        assert_eq!(committee.total_weight(), 3);
        assert_eq!(committee.accept_threshold(), 3);
        assert_eq!(committee.confirm_threshold(), 3);

        let larger = Committee::new(
            (0..10u8).map(|i| (account(i), 10)).collect(),
            6700,
            7500,
        );
        assert_eq!(larger.total_weight(), 100);
        assert_eq!(larger.accept_threshold(), 67);
        assert_eq!(larger.confirm_threshold(), 75);
    }

    #[test]
    fn unknown_accounts_have_no_seat_and_zero_weight() {
        let committee = Committee::equal_weights(vec![account(1)]);
        assert_eq!(committee.seat(&account(9)), None);
        assert_eq!(committee.weight_of_account(&account(9)), 0);
        assert_eq!(committee.seat_weight(SeatIndex(5)), 0);
    }
}
