//! Accounts ledger: block-issuance credits, issuer keys and stake.
//!
//! Account rows hold the latest committed state; per-slot diffs are kept in
//! prunable buckets so any state within the retained window can be
//! reconstructed by walking diffs backwards, and so destroyed accounts can be
//! restored on rollback.

use crate::error::LedgerError;
use crate::tree::StateTree;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use strata_store::Storage;
use strata_types::{AccountId, Block, EpochIndex, OutputId, PublicKey, SlotIndex};

const ACCOUNTS_NS: &str = "accounts/data";
const META_NS: &str = "accounts/meta";
const KEY_LATEST_SLOT: &[u8] = b"latest_committed_slot";
const DIFFS_BUCKET: &str = "account-diffs";
const DESTROYED_BUCKET: &str = "account-destroyed";

/// Block-issuance credits with the slot of their last change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credits {
    pub value: i64,
    pub update_time: SlotIndex,
}

/// Stake values of an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeData {
    pub validator_stake: u64,
    pub delegation_stake: u64,
    pub fixed_cost: u64,
    pub stake_end_epoch: EpochIndex,
}

/// The committed state of one account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub id: AccountId,
    pub credits: Credits,
    pub output_id: OutputId,
    pub pub_keys: BTreeSet<PublicKey>,
    pub stake: StakeData,
}

impl AccountData {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    fn state_hash(&self) -> [u8; 32] {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(
            bincode::serialize(self).expect("account serialization should not fail"),
        );
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

/// The changes applied to one account in one slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDiff {
    pub bic_change: i64,
    pub previous_updated_time: SlotIndex,
    pub new_output_id: OutputId,
    pub previous_output_id: OutputId,
    pub pub_keys_added: Vec<PublicKey>,
    pub pub_keys_removed: Vec<PublicKey>,
    pub validator_stake_change: i64,
    pub stake_end_epoch_change: i64,
    pub fixed_cost_change: i64,
    pub delegation_stake_change: i64,
}

impl AccountDiff {
    /// Apply the diff onto an account at `slot`.
    fn apply_to(&self, account: &mut AccountData, slot: SlotIndex) {
        account.credits.value += self.bic_change;
        account.credits.update_time = slot;
        if self.new_output_id != OutputId::default() {
            account.output_id = self.new_output_id;
        }
        for key in &self.pub_keys_added {
            account.pub_keys.insert(*key);
        }
        for key in &self.pub_keys_removed {
            account.pub_keys.remove(key);
        }
        account.stake.validator_stake =
            add_signed(account.stake.validator_stake, self.validator_stake_change);
        account.stake.delegation_stake =
            add_signed(account.stake.delegation_stake, self.delegation_stake_change);
        account.stake.fixed_cost = add_signed(account.stake.fixed_cost, self.fixed_cost_change);
        account.stake.stake_end_epoch = EpochIndex::new(add_signed(
            account.stake.stake_end_epoch.as_u64(),
            self.stake_end_epoch_change,
        ));
    }

    /// Undo the diff, restoring the account as of the previous slot.
    fn revert_from(&self, account: &mut AccountData) {
        account.credits.value -= self.bic_change;
        account.credits.update_time = self.previous_updated_time;
        if self.previous_output_id != OutputId::default() || self.new_output_id != OutputId::default()
        {
            account.output_id = self.previous_output_id;
        }
        for key in &self.pub_keys_added {
            account.pub_keys.remove(key);
        }
        for key in &self.pub_keys_removed {
            account.pub_keys.insert(*key);
        }
        account.stake.validator_stake =
            add_signed(account.stake.validator_stake, -self.validator_stake_change);
        account.stake.delegation_stake = add_signed(
            account.stake.delegation_stake,
            -self.delegation_stake_change,
        );
        account.stake.fixed_cost = add_signed(account.stake.fixed_cost, -self.fixed_cost_change);
        account.stake.stake_end_epoch = EpochIndex::new(add_signed(
            account.stake.stake_end_epoch.as_u64(),
            -self.stake_end_epoch_change,
        ));
    }
}

fn add_signed(value: u64, change: i64) -> u64 {
    if change >= 0 {
        value.saturating_add(change as u64)
    } else {
        value.saturating_sub(change.unsigned_abs())
    }
}

struct AccountsInner {
    accounts_tree: StateTree,
    latest_committed_slot: SlotIndex,
    /// issuer -> blocks issued, per live slot. Fed to the performance
    /// tracker; evicted on commit.
    issuance: BTreeMap<SlotIndex, HashMap<AccountId, u64>>,
}

/// The accounts ledger.
pub struct AccountsLedger {
    storage: Arc<Storage>,
    inner: RwLock<AccountsInner>,
}

impl AccountsLedger {
    pub fn new(storage: Arc<Storage>) -> Result<Self, LedgerError> {
        let mut accounts_tree = StateTree::new();
        for (key, value) in storage.kv().iter_namespace(ACCOUNTS_NS)? {
            let account: AccountData = bincode::deserialize(&value)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            accounts_tree.insert(key, account.state_hash());
        }

        let latest_committed_slot = match storage.kv().get(META_NS, KEY_LATEST_SLOT)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Serialization("latest slot width".into()))?;
                SlotIndex::new(u64::from_le_bytes(arr))
            }
            None => SlotIndex::GENESIS,
        };

        Ok(Self {
            storage,
            inner: RwLock::new(AccountsInner {
                accounts_tree,
                latest_committed_slot,
                issuance: BTreeMap::new(),
            }),
        })
    }

    pub fn latest_committed_slot(&self) -> SlotIndex {
        self.inner
            .read()
            .expect("accounts lock poisoned")
            .latest_committed_slot
    }

    /// Force the committed slot cursor. Only used when seeding from a
    /// snapshot.
    pub fn set_latest_committed_slot(&self, slot: SlotIndex) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("accounts lock poisoned");
        inner.latest_committed_slot = slot;
        self.storage
            .kv()
            .put(META_NS, KEY_LATEST_SLOT, &slot.as_u64().to_le_bytes())?;
        Ok(())
    }

    pub fn accounts_tree_root(&self) -> [u8; 32] {
        self.inner
            .read()
            .expect("accounts lock poisoned")
            .accounts_tree
            .root()
    }

    /// Seed an account outside the slot-commit path (genesis or snapshot
    /// import).
    pub fn add_account(&self, account: &AccountData) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("accounts lock poisoned");
        self.write_account(account)?;
        inner
            .accounts_tree
            .insert(account.id.as_bytes().to_vec(), account.state_hash());
        Ok(())
    }

    /// Apply one slot's account diffs. Destroyed accounts persist their final
    /// state for rollback before the row is deleted.
    pub fn apply_diff(
        &self,
        slot: SlotIndex,
        diffs: &HashMap<AccountId, AccountDiff>,
        destroyed: &BTreeSet<AccountId>,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("accounts lock poisoned");
        if slot != inner.latest_committed_slot.next() {
            return Err(LedgerError::CommitGap {
                expected: inner.latest_committed_slot.next(),
                got: slot,
            });
        }

        for account_id in destroyed {
            let Some(account) = self.read_account(*account_id)? else {
                return Err(LedgerError::AccountNotFound(*account_id));
            };
            self.storage.put_prunable(
                slot,
                DESTROYED_BUCKET,
                account_id.as_bytes(),
                &bincode::serialize(&account)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            )?;
            self.storage
                .kv()
                .delete(ACCOUNTS_NS, account_id.as_bytes())?;
            inner.accounts_tree.remove(account_id.as_bytes());
        }

        for (account_id, diff) in sorted(diffs) {
            if destroyed.contains(account_id) {
                // The final state was persisted above; the diff only exists
                // to record the destruction slot.
                self.storage.put_prunable(
                    slot,
                    DIFFS_BUCKET,
                    account_id.as_bytes(),
                    &bincode::serialize(diff)
                        .map_err(|e| LedgerError::Serialization(e.to_string()))?,
                )?;
                continue;
            }

            let mut account = self
                .read_account(*account_id)?
                .unwrap_or_else(|| AccountData::new(*account_id));
            diff.apply_to(&mut account, slot);
            self.write_account(&account)?;
            inner
                .accounts_tree
                .insert(account_id.as_bytes().to_vec(), account.state_hash());

            self.storage.put_prunable(
                slot,
                DIFFS_BUCKET,
                account_id.as_bytes(),
                &bincode::serialize(diff)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            )?;
        }

        inner.latest_committed_slot = slot;
        self.storage
            .kv()
            .put(META_NS, KEY_LATEST_SLOT, &slot.as_u64().to_le_bytes())?;
        inner.issuance.retain(|s, _| *s > slot);

        Ok(())
    }

    /// The account's state as of `target_slot`, reconstructed by walking
    /// diffs backwards from the latest committed slot.
    pub fn account(
        &self,
        account_id: AccountId,
        target_slot: SlotIndex,
    ) -> Result<Option<AccountData>, LedgerError> {
        let inner = self.inner.read().expect("accounts lock poisoned");
        let latest = inner.latest_committed_slot;
        if target_slot > latest {
            return Err(LedgerError::HistoryUnavailable(target_slot));
        }

        let mut account = self.read_account(account_id)?;
        let mut slot = latest;
        while slot > target_slot {
            if let Some(bytes) =
                self.storage
                    .get_prunable(slot, DESTROYED_BUCKET, account_id.as_bytes())?
            {
                // The account was destroyed in this slot; its pre-destruction
                // state replaces the (absent) row.
                account = Some(
                    bincode::deserialize(&bytes)
                        .map_err(|e| LedgerError::Serialization(e.to_string()))?,
                );
                slot = slot.prev();
                continue;
            }

            if let Some(bytes) =
                self.storage
                    .get_prunable(slot, DIFFS_BUCKET, account_id.as_bytes())?
            {
                let diff: AccountDiff = bincode::deserialize(&bytes)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?;
                match account.as_mut() {
                    Some(account) => {
                        diff.revert_from(account);
                        // An account created in this slot does not exist below it.
                        if diff.previous_output_id == OutputId::default()
                            && diff.new_output_id != OutputId::default()
                        {
                            return Ok(None);
                        }
                    }
                    None => {
                        return Err(LedgerError::AccountNotFound(account_id));
                    }
                }
            }
            slot = slot.prev();
        }

        Ok(account)
    }

    /// Undo all diffs above `target_slot`, restoring destroyed accounts.
    pub fn rollback(&self, target_slot: SlotIndex) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("accounts lock poisoned");
        while inner.latest_committed_slot > target_slot {
            let slot = inner.latest_committed_slot;

            for (key, value) in self.storage.iter_prunable(slot, DIFFS_BUCKET)? {
                let account_id = account_id_from_key(&key)?;
                if self
                    .storage
                    .get_prunable(slot, DESTROYED_BUCKET, &key)?
                    .is_some()
                {
                    continue;
                }
                let diff: AccountDiff = bincode::deserialize(&value)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?;

                let created_here = diff.previous_output_id == OutputId::default()
                    && diff.new_output_id != OutputId::default();
                if created_here {
                    self.storage.kv().delete(ACCOUNTS_NS, &key)?;
                    inner.accounts_tree.remove(&key);
                } else {
                    let mut account = self
                        .read_account(account_id)?
                        .ok_or(LedgerError::AccountNotFound(account_id))?;
                    diff.revert_from(&mut account);
                    self.write_account(&account)?;
                    inner
                        .accounts_tree
                        .insert(key.clone(), account.state_hash());
                }
                self.storage.delete_prunable(slot, DIFFS_BUCKET, &key)?;
            }

            for (key, value) in self.storage.iter_prunable(slot, DESTROYED_BUCKET)? {
                let account: AccountData = bincode::deserialize(&value)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?;
                self.write_account(&account)?;
                inner
                    .accounts_tree
                    .insert(key.clone(), account.state_hash());
                self.storage.delete_prunable(slot, DESTROYED_BUCKET, &key)?;
                self.storage.delete_prunable(slot, DIFFS_BUCKET, &key)?;
            }

            inner.latest_committed_slot = slot.prev();
        }
        self.storage.kv().put(
            META_NS,
            KEY_LATEST_SLOT,
            &inner.latest_committed_slot.as_u64().to_le_bytes(),
        )?;
        Ok(())
    }

    /// Count a block against its issuer's per-slot issuance.
    pub fn track_block(&self, block: &Block) {
        let mut inner = self.inner.write().expect("accounts lock poisoned");
        *inner
            .issuance
            .entry(block.slot)
            .or_default()
            .entry(block.issuer_id)
            .or_insert(0) += 1;
    }

    /// Blocks issued by `issuer` in `slot`, from the live issuance counters.
    pub fn issued_blocks(&self, issuer: AccountId, slot: SlotIndex) -> u64 {
        let inner = self.inner.read().expect("accounts lock poisoned");
        inner
            .issuance
            .get(&slot)
            .and_then(|per_issuer| per_issuer.get(&issuer))
            .copied()
            .unwrap_or(0)
    }

    /// All account rows in key order. Used by snapshot export.
    pub fn all_accounts(&self) -> Result<Vec<AccountData>, LedgerError> {
        let _guard = self.inner.read().expect("accounts lock poisoned");
        let mut accounts = Vec::new();
        for (_, value) in self.storage.kv().iter_namespace(ACCOUNTS_NS)? {
            accounts.push(
                bincode::deserialize(&value)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            );
        }
        Ok(accounts)
    }

    fn read_account(&self, account_id: AccountId) -> Result<Option<AccountData>, LedgerError> {
        match self.storage.kv().get(ACCOUNTS_NS, account_id.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn write_account(&self, account: &AccountData) -> Result<(), LedgerError> {
        self.storage.kv().put(
            ACCOUNTS_NS,
            account.id.as_bytes(),
            &bincode::serialize(account).map_err(|e| LedgerError::Serialization(e.to_string()))?,
        )?;
        Ok(())
    }
}

fn account_id_from_key(key: &[u8]) -> Result<AccountId, LedgerError> {
    let arr: [u8; 32] = key
        .try_into()
        .map_err(|_| LedgerError::Serialization("account key width".into()))?;
    Ok(AccountId::new(arr))
}

fn sorted<'a>(
    diffs: &'a HashMap<AccountId, AccountDiff>,
) -> impl Iterator<Item = (&'a AccountId, &'a AccountDiff)> {
    let mut entries: Vec<_> = diffs.iter().collect();
    entries.sort_by_key(|(id, _)| **id);
    entries.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::MemoryStore;
    use strata_types::TransactionId;

    fn ledger() -> AccountsLedger {
        let storage = Arc::new(Storage::new(Arc::new(MemoryStore::new()), 8));
        AccountsLedger::new(storage).unwrap()
    }

    fn account_id(byte: u8) -> AccountId {
        AccountId::new([byte; 32])
    }

    fn output_id(byte: u8) -> OutputId {
        OutputId::new(TransactionId::new([byte; 32]), 0)
    }

    fn creation_diff(new_output: OutputId, bic: i64) -> AccountDiff {
        AccountDiff {
            bic_change: bic,
            new_output_id: new_output,
            ..Default::default()
        }
    }

    // ── apply ────────────────────────────────────────────────────────────

    #[test]
    fn apply_diff_creates_account() {
        let ledger = ledger();
        let id = account_id(1);
        let mut diffs = HashMap::new();
        diffs.insert(id, creation_diff(output_id(1), 100));

        ledger
            .apply_diff(SlotIndex::new(1), &diffs, &BTreeSet::new())
            .unwrap();

        let account = ledger.account(id, SlotIndex::new(1)).unwrap().unwrap();
        assert_eq!(account.credits.value, 100);
        assert_eq!(account.credits.update_time, SlotIndex::new(1));
        assert_eq!(account.output_id, output_id(1));
        assert_eq!(ledger.latest_committed_slot(), SlotIndex::new(1));
    }

    #[test]
    fn apply_diff_rejects_slot_gap() {
        let ledger = ledger();
        assert!(matches!(
            ledger.apply_diff(SlotIndex::new(3), &HashMap::new(), &BTreeSet::new()),
            Err(LedgerError::CommitGap { .. })
        ));
    }

    #[test]
    fn bic_accumulates_across_slots() {
        let ledger = ledger();
        let id = account_id(1);

        let mut diffs = HashMap::new();
        diffs.insert(id, creation_diff(output_id(1), 100));
        ledger
            .apply_diff(SlotIndex::new(1), &diffs, &BTreeSet::new())
            .unwrap();

        let mut diffs = HashMap::new();
        diffs.insert(
            id,
            AccountDiff {
                bic_change: -30,
                previous_updated_time: SlotIndex::new(1),
                ..Default::default()
            },
        );
        ledger
            .apply_diff(SlotIndex::new(2), &diffs, &BTreeSet::new())
            .unwrap();

        let account = ledger.account(id, SlotIndex::new(2)).unwrap().unwrap();
        assert_eq!(account.credits.value, 70);
    }

    // ── historical lookup ────────────────────────────────────────────────

    #[test]
    fn account_at_earlier_slot_reverts_diffs() {
        let ledger = ledger();
        let id = account_id(1);

        let mut diffs = HashMap::new();
        diffs.insert(id, creation_diff(output_id(1), 100));
        ledger
            .apply_diff(SlotIndex::new(1), &diffs, &BTreeSet::new())
            .unwrap();

        let mut diffs = HashMap::new();
        diffs.insert(
            id,
            AccountDiff {
                bic_change: 50,
                previous_updated_time: SlotIndex::new(1),
                ..Default::default()
            },
        );
        ledger
            .apply_diff(SlotIndex::new(2), &diffs, &BTreeSet::new())
            .unwrap();

        let now = ledger.account(id, SlotIndex::new(2)).unwrap().unwrap();
        assert_eq!(now.credits.value, 150);

        let before = ledger.account(id, SlotIndex::new(1)).unwrap().unwrap();
        assert_eq!(before.credits.value, 100);
        assert_eq!(before.credits.update_time, SlotIndex::new(1));
    }

    #[test]
    fn account_in_future_slot_is_unavailable() {
        let ledger = ledger();
        assert!(matches!(
            ledger.account(account_id(1), SlotIndex::new(5)),
            Err(LedgerError::HistoryUnavailable(_))
        ));
    }

    // ── destruction and rollback ─────────────────────────────────────────

    #[test]
    fn destroyed_account_is_deleted_and_restorable() {
        let ledger = ledger();
        let id = account_id(1);

        let mut diffs = HashMap::new();
        diffs.insert(id, creation_diff(output_id(1), 100));
        ledger
            .apply_diff(SlotIndex::new(1), &diffs, &BTreeSet::new())
            .unwrap();

        let mut destroyed = BTreeSet::new();
        destroyed.insert(id);
        let mut diffs = HashMap::new();
        diffs.insert(id, AccountDiff::default());
        ledger
            .apply_diff(SlotIndex::new(2), &diffs, &destroyed)
            .unwrap();

        assert!(ledger.account(id, SlotIndex::new(2)).unwrap().is_none());
        // The pre-destruction state is still reachable below the slot.
        let historical = ledger.account(id, SlotIndex::new(1)).unwrap().unwrap();
        assert_eq!(historical.credits.value, 100);

        ledger.rollback(SlotIndex::new(1)).unwrap();
        let restored = ledger.account(id, SlotIndex::new(1)).unwrap().unwrap();
        assert_eq!(restored.credits.value, 100);
    }

    #[test]
    fn rollback_restores_tree_root() {
        let ledger = ledger();
        let id = account_id(1);

        let mut diffs = HashMap::new();
        diffs.insert(id, creation_diff(output_id(1), 100));
        ledger
            .apply_diff(SlotIndex::new(1), &diffs, &BTreeSet::new())
            .unwrap();
        let root_slot1 = ledger.accounts_tree_root();

        let mut diffs = HashMap::new();
        diffs.insert(
            id,
            AccountDiff {
                bic_change: 5,
                previous_updated_time: SlotIndex::new(1),
                ..Default::default()
            },
        );
        ledger
            .apply_diff(SlotIndex::new(2), &diffs, &BTreeSet::new())
            .unwrap();
        assert_ne!(ledger.accounts_tree_root(), root_slot1);

        ledger.rollback(SlotIndex::new(1)).unwrap();
        assert_eq!(ledger.accounts_tree_root(), root_slot1);
        assert_eq!(ledger.latest_committed_slot(), SlotIndex::new(1));
    }

    #[test]
    fn rollback_removes_created_accounts() {
        let ledger = ledger();
        let id = account_id(1);

        ledger
            .apply_diff(SlotIndex::new(1), &HashMap::new(), &BTreeSet::new())
            .unwrap();

        let mut diffs = HashMap::new();
        diffs.insert(id, creation_diff(output_id(1), 100));
        ledger
            .apply_diff(SlotIndex::new(2), &diffs, &BTreeSet::new())
            .unwrap();

        ledger.rollback(SlotIndex::new(1)).unwrap();
        assert!(ledger.account(id, SlotIndex::new(1)).unwrap().is_none());
    }

    // ── stake and keys ───────────────────────────────────────────────────

    #[test]
    fn stake_and_keys_follow_diffs() {
        let ledger = ledger();
        let id = account_id(1);
        let key_a = PublicKey([1u8; 32]);
        let key_b = PublicKey([2u8; 32]);

        let mut diffs = HashMap::new();
        diffs.insert(
            id,
            AccountDiff {
                new_output_id: output_id(1),
                pub_keys_added: vec![key_a, key_b],
                validator_stake_change: 1000,
                fixed_cost_change: 10,
                stake_end_epoch_change: 4,
                ..Default::default()
            },
        );
        ledger
            .apply_diff(SlotIndex::new(1), &diffs, &BTreeSet::new())
            .unwrap();

        let mut diffs = HashMap::new();
        diffs.insert(
            id,
            AccountDiff {
                previous_updated_time: SlotIndex::new(1),
                new_output_id: output_id(2),
                previous_output_id: output_id(1),
                pub_keys_removed: vec![key_b],
                validator_stake_change: -400,
                delegation_stake_change: 50,
                ..Default::default()
            },
        );
        ledger
            .apply_diff(SlotIndex::new(2), &diffs, &BTreeSet::new())
            .unwrap();

        let account = ledger.account(id, SlotIndex::new(2)).unwrap().unwrap();
        assert_eq!(account.stake.validator_stake, 600);
        assert_eq!(account.stake.delegation_stake, 50);
        assert_eq!(account.stake.fixed_cost, 10);
        assert_eq!(account.stake.stake_end_epoch, EpochIndex::new(4));
        assert!(account.pub_keys.contains(&key_a));
        assert!(!account.pub_keys.contains(&key_b));
        assert_eq!(account.output_id, output_id(2));

        let before = ledger.account(id, SlotIndex::new(1)).unwrap().unwrap();
        assert_eq!(before.stake.validator_stake, 1000);
        assert!(before.pub_keys.contains(&key_b));
        assert_eq!(before.output_id, output_id(1));
    }

    // ── issuance tracking ────────────────────────────────────────────────

    #[test]
    fn track_block_counts_per_slot_issuance() {
        use strata_types::{Block, BlockId, CommitmentId, Timestamp};

        let ledger = ledger();
        let issuer = account_id(7);
        let block = Block {
            id: BlockId::new([1u8; 32]),
            issuer_id: issuer,
            issuing_time: Timestamp::new(10),
            slot: SlotIndex::new(1),
            strong_parents: vec![],
            weak_parents: vec![],
            shallow_like_parents: vec![],
            payload: None,
            slot_commitment_ref: CommitmentId::ZERO,
            slot_commitment_slot: SlotIndex::GENESIS,
        };

        ledger.track_block(&block);
        ledger.track_block(&block);
        assert_eq!(ledger.issued_blocks(issuer, SlotIndex::new(1)), 2);
        assert_eq!(ledger.issued_blocks(issuer, SlotIndex::new(2)), 0);

        // Committing the slot evicts its counters.
        ledger
            .apply_diff(SlotIndex::new(1), &HashMap::new(), &BTreeSet::new())
            .unwrap();
        assert_eq!(ledger.issued_blocks(issuer, SlotIndex::new(1)), 0);
    }
}
