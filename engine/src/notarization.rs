//! Notarization: sealing slots into commitments.
//!
//! Triggered whenever accepted time advances. Every committable slot is
//! sealed in order: the mempool's state diff is applied to the UTXO and
//! accounts ledgers, attestations are flushed, the roots are assembled and
//! the commitment is persisted. Commit is strictly serial per engine.

use crate::error::EngineError;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use strata_consensus::{AcceptanceGadget, AttestationManager};
use strata_ledger::{AccountDiff, AccountsLedger, Spent, UtxoLedger};
use strata_mempool::{Mempool, StateDiff, StateMetadata};
use strata_store::Storage;
use strata_types::{
    AccountFeatures, AccountId, Commitment, Output, OutputId, ProtocolParameters, Roots,
    SlotIndex,
};

const ROOTS_BUCKET: &str = "roots";

pub struct NotarizationManager {
    params: ProtocolParameters,
    storage: Arc<Storage>,
    utxo: Arc<UtxoLedger>,
    accounts: Arc<AccountsLedger>,
    mempool: Arc<Mempool>,
    attestations: Arc<AttestationManager>,
    gadget: Arc<AcceptanceGadget>,
    commitment_mutex: Mutex<()>,
}

impl NotarizationManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: ProtocolParameters,
        storage: Arc<Storage>,
        utxo: Arc<UtxoLedger>,
        accounts: Arc<AccountsLedger>,
        mempool: Arc<Mempool>,
        attestations: Arc<AttestationManager>,
        gadget: Arc<AcceptanceGadget>,
    ) -> Self {
        Self {
            params,
            storage,
            utxo,
            accounts,
            mempool,
            attestations,
            gadget,
            commitment_mutex: Mutex::new(()),
        }
    }

    /// Whether the engine has committed everything old enough to commit.
    pub fn is_bootstrapped(&self, accepted_slot: SlotIndex) -> Result<bool, EngineError> {
        let latest = self.storage.latest_commitment()?;
        Ok(latest.slot + self.params.min_commit_age + 1 >= accepted_slot)
    }

    /// Seal every slot that is old enough relative to `accepted_slot`, in
    /// order. Returns the commitments produced.
    pub fn try_commit_until(
        &self,
        accepted_slot: SlotIndex,
    ) -> Result<Vec<Commitment>, EngineError> {
        let _guard = self.commitment_mutex.lock().expect("commit mutex poisoned");

        let mut produced = Vec::new();
        if accepted_slot.as_u64() <= self.params.min_commit_age {
            return Ok(produced);
        }
        let committable_until = accepted_slot.saturating_sub(self.params.min_commit_age);

        let mut next = self.storage.latest_commitment()?.slot.next();
        while next <= committable_until {
            produced.push(self.create_commitment(next)?);
            next = next.next();
        }
        Ok(produced)
    }

    fn create_commitment(&self, slot: SlotIndex) -> Result<Commitment, EngineError> {
        let latest = self.storage.latest_commitment()?;
        if slot != latest.slot.next() {
            return Err(EngineError::DuplicateCommitment(slot));
        }

        let diff = self.mempool.state_diff(slot);

        let (created, consumed) = self.collect_utxo_changes(slot, &diff);
        let (account_diffs, destroyed_accounts) =
            self.collect_account_changes(slot, &diff, &created, &consumed)?;

        self.utxo.apply_diff(slot, &created, &consumed)?;
        self.accounts
            .apply_diff(slot, &account_diffs, &destroyed_accounts)?;

        let (weight_delta, attestations_root) = self.attestations.commit(slot)?;

        let roots = Roots {
            accepted_blocks_root: self.gadget.accepted_blocks_root(slot),
            mutations_root: diff.mutations_root(),
            attestations_root,
            state_root: self.utxo.state_tree_root(),
            accounts_root: self.accounts.accounts_tree_root(),
        };
        let commitment = Commitment {
            slot,
            prev_id: latest.id(),
            roots_id: roots.id(),
            cumulative_weight: latest.cumulative_weight + weight_delta,
        };

        self.storage.store_commitment(&commitment)?;
        self.storage.set_latest_commitment(&commitment)?;
        self.storage.put_prunable(
            slot,
            ROOTS_BUCKET,
            b"roots",
            &bincode::serialize(&roots)
                .map_err(|e| strata_store::StoreError::Serialization(e.to_string()))?,
        )?;

        for tx_id in &diff.executed_transactions {
            self.mempool.mark_committed(*tx_id, slot);
        }
        self.gadget.ratify_until(slot);

        tracing::debug!(
            slot = slot.as_u64(),
            transactions = diff.executed_transactions.len(),
            weight_delta,
            "slot committed"
        );
        Ok(commitment)
    }

    /// Ledger-shaped created outputs and spent records for the slot.
    fn collect_utxo_changes(
        &self,
        slot: SlotIndex,
        diff: &StateDiff,
    ) -> (Vec<Output>, Vec<Spent>) {
        let created = diff
            .created_states
            .iter()
            .map(|state| Output {
                output_id: state.output_id,
                block_id_booked_in: state.block_id_booked_in,
                slot_booked: slot,
                slot_created: self.params.slot_index(state.creation_time),
                body: state.body.clone(),
            })
            .collect();

        let consumed = diff
            .destroyed_states
            .iter()
            .map(|state| Spent {
                output_id: state.output_id,
                transaction_id: state.spender,
                slot_spent: slot,
            })
            .collect();

        (created, consumed)
    }

    /// Derive the slot's account diffs from allotments and from account
    /// outputs created or destroyed in the slot.
    fn collect_account_changes(
        &self,
        slot: SlotIndex,
        diff: &StateDiff,
        created: &[Output],
        consumed: &[Spent],
    ) -> Result<(HashMap<AccountId, AccountDiff>, BTreeSet<AccountId>), EngineError> {
        let mut account_diffs: HashMap<AccountId, AccountDiff> = HashMap::new();
        let mut destroyed = BTreeSet::new();

        // Allotments. An allotment to an account the ledger does not track
        // (no block-issuer feature) is burned.
        for tx_id in &diff.executed_transactions {
            let Some(meta) = self.mempool.transaction_metadata(tx_id) else {
                continue;
            };
            for allotment in &meta.transaction.allotments {
                let Some(account) = self
                    .accounts
                    .account(allotment.account_id, slot.prev())?
                else {
                    tracing::debug!(account = %allotment.account_id, mana = allotment.mana, "allotment to untracked account burned");
                    continue;
                };
                let entry = account_diffs.entry(allotment.account_id).or_default();
                entry.bic_change += allotment.mana as i64;
                entry.previous_updated_time = account.credits.update_time;
                entry.new_output_id = account.output_id;
                entry.previous_output_id = account.output_id;
            }
        }

        // Account outputs on the created side.
        let mut created_accounts: HashMap<AccountId, (OutputId, &AccountFeatures)> =
            HashMap::new();
        for output in created {
            if let Some(features) = &output.body.account {
                // Accounts without block-issuer keys are not tracked, even if
                // they carry a staking feature.
                if features.issuer_keys.is_empty() {
                    continue;
                }
                created_accounts.insert(features.account_id, (output.output_id, features));
            }
        }

        // Account outputs on the consumed side (their bodies come from the
        // committed ledger or the pool).
        let mut consumed_accounts: HashMap<AccountId, (OutputId, AccountFeatures)> =
            HashMap::new();
        for spent in consumed {
            let body = match self.utxo.output(spent.output_id)? {
                Some(output) => Some(output.body),
                None => match self.mempool.state_metadata(spent.output_id) {
                    StateMetadata::Committed(output) => Some(output.body),
                    StateMetadata::InPool { body, .. } => Some(body),
                    StateMetadata::Unknown => None,
                },
            };
            if let Some(features) = body.and_then(|body| body.account) {
                if features.issuer_keys.is_empty() {
                    continue;
                }
                consumed_accounts.insert(features.account_id, (spent.output_id, features));
            }
        }

        for (account_id, (consumed_output, _)) in &consumed_accounts {
            let account = self
                .accounts
                .account(*account_id, slot.prev())?
                .ok_or(strata_ledger::LedgerError::AccountNotFound(*account_id))?;

            let entry = account_diffs.entry(*account_id).or_default();
            match created_accounts.get(account_id) {
                Some((created_output, features)) => {
                    // Transitioned within the slot.
                    entry.new_output_id = *created_output;
                    entry.previous_output_id = *consumed_output;
                    entry.previous_updated_time = account.credits.update_time;

                    let new_keys: BTreeSet<_> = features.issuer_keys.iter().copied().collect();
                    entry.pub_keys_added = new_keys
                        .iter()
                        .filter(|key| !account.pub_keys.contains(key))
                        .copied()
                        .collect();
                    entry.pub_keys_removed = account
                        .pub_keys
                        .iter()
                        .filter(|key| !new_keys.contains(key))
                        .copied()
                        .collect();

                    match &features.staking {
                        Some(staking) => {
                            entry.validator_stake_change = staking.staked_amount as i64
                                - account.stake.validator_stake as i64;
                            entry.stake_end_epoch_change = staking.end_epoch.as_u64() as i64
                                - account.stake.stake_end_epoch.as_u64() as i64;
                            entry.fixed_cost_change =
                                staking.fixed_cost as i64 - account.stake.fixed_cost as i64;
                        }
                        None => {
                            entry.validator_stake_change =
                                -(account.stake.validator_stake as i64);
                            entry.stake_end_epoch_change =
                                -(account.stake.stake_end_epoch.as_u64() as i64);
                            entry.fixed_cost_change = -(account.stake.fixed_cost as i64);
                        }
                    }
                }
                None => {
                    // Destroyed: the accounts ledger persists the final state
                    // for rollback.
                    entry.previous_output_id = *consumed_output;
                    entry.previous_updated_time = account.credits.update_time;
                    destroyed.insert(*account_id);
                }
            }
        }

        // Newly created accounts (not transitioned).
        for (account_id, (created_output, features)) in &created_accounts {
            if consumed_accounts.contains_key(account_id) {
                continue;
            }
            let entry = account_diffs.entry(*account_id).or_default();
            entry.new_output_id = *created_output;
            entry.pub_keys_added = features.issuer_keys.clone();
            if let Some(staking) = &features.staking {
                entry.validator_stake_change = staking.staked_amount as i64;
                entry.stake_end_epoch_change = staking.end_epoch.as_u64() as i64;
                entry.fixed_cost_change = staking.fixed_cost as i64;
            }
        }

        Ok((account_diffs, destroyed))
    }
}
