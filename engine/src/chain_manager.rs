//! Chain manager: the tree of observed commitment chains and the
//! chain-switching candidates.
//!
//! Commitments attach to chains by `prev_id`. A commitment extending a tip
//! grows that chain; a commitment branching below a tip spawns a new chain
//! forked at that point. Unknown parents leave a pending pointer and a
//! `RequestCommitment`. Candidate selection is fully deterministic: weight
//! descending, then forking-point slot ascending, then chain ID.

use crate::chain::Chain;
use std::collections::HashMap;
use std::sync::RwLock;
use strata_types::{Commitment, CommitmentId, ProtocolParameters, SlotIndex};

/// Actions the chain manager asks the engine/transport to take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainAction {
    /// The parent of a received commitment is unknown.
    RequestCommitment(CommitmentId),
    /// A candidate claims more weight than we verified: fetch attestations.
    RequestAttestations { chain: CommitmentId },
    /// A candidate's attested weight beats ours: start warp sync.
    BeginWarpSync {
        chain: CommitmentId,
        from: SlotIndex,
        to: SlotIndex,
    },
    /// A candidate's verified weight beats ours: switch the main chain.
    SwitchMainChain {
        chain: CommitmentId,
        forking_point: Commitment,
    },
}

struct ManagerInner {
    chains: HashMap<CommitmentId, Chain>,
    /// commitment ID -> owning chain ID, for every known commitment.
    chain_of: HashMap<CommitmentId, CommitmentId>,
    /// missing parent ID -> commitments waiting to attach.
    pending_children: HashMap<CommitmentId, Vec<Commitment>>,
    main_chain: CommitmentId,
    /// Last candidate per category, to avoid re-emitting the same action.
    attestation_candidate: Option<CommitmentId>,
    warp_sync_candidate: Option<CommitmentId>,
    switch_candidate: Option<CommitmentId>,
}

pub struct ChainManager {
    params: ProtocolParameters,
    inner: RwLock<ManagerInner>,
}

impl ChainManager {
    /// Start with a main chain rooted at our latest local commitment.
    pub fn new(params: ProtocolParameters, root: Commitment) -> Self {
        let mut chain = Chain::new(root);
        chain.latest_verified = Some(root.slot);
        let chain_id = chain.id();

        let mut chains = HashMap::new();
        chains.insert(chain_id, chain);
        let mut chain_of = HashMap::new();
        chain_of.insert(root.id(), chain_id);

        Self {
            params,
            inner: RwLock::new(ManagerInner {
                chains,
                chain_of,
                pending_children: HashMap::new(),
                main_chain: chain_id,
                attestation_candidate: None,
                warp_sync_candidate: None,
                switch_candidate: None,
            }),
        }
    }

    pub fn main_chain_id(&self) -> CommitmentId {
        self.inner
            .read()
            .expect("chain manager lock poisoned")
            .main_chain
    }

    pub fn chain(&self, chain_id: &CommitmentId) -> Option<Chain> {
        let inner = self.inner.read().expect("chain manager lock poisoned");
        inner.chains.get(chain_id).cloned()
    }

    pub fn main_chain(&self) -> Chain {
        let inner = self.inner.read().expect("chain manager lock poisoned");
        inner.chains[&inner.main_chain].clone()
    }

    pub fn chain_count(&self) -> usize {
        self.inner
            .read()
            .expect("chain manager lock poisoned")
            .chains
            .len()
    }

    /// A commitment our own engine produced: extends the main chain and is
    /// verified by construction.
    pub fn process_local_commitment(&self, commitment: Commitment) {
        let mut inner = self.inner.write().expect("chain manager lock poisoned");
        let main_id = inner.main_chain;
        if let Some(chain) = inner.chains.get_mut(&main_id) {
            chain.append(commitment);
            chain.latest_verified = Some(commitment.slot);
        }
        // A commitment we also saw via gossip keeps its original chain, so
        // replaying a candidate chain marks that chain verified.
        inner.chain_of.entry(commitment.id()).or_insert(main_id);
    }

    /// A commitment received from the network. Returns the actions to take.
    pub fn process_commitment(&self, commitment: Commitment) -> Vec<ChainAction> {
        let mut actions = Vec::new();
        {
            let mut inner = self.inner.write().expect("chain manager lock poisoned");
            self.attach(&mut inner, commitment, &mut actions);
        }
        actions.extend(self.evaluate_candidates());
        actions
    }

    fn attach(
        &self,
        inner: &mut ManagerInner,
        commitment: Commitment,
        actions: &mut Vec<ChainAction>,
    ) {
        let id = commitment.id();
        if inner.chain_of.contains_key(&id) {
            return;
        }

        let Some(&parent_chain_id) = inner.chain_of.get(&commitment.prev_id) else {
            inner
                .pending_children
                .entry(commitment.prev_id)
                .or_default()
                .push(commitment);
            actions.push(ChainAction::RequestCommitment(commitment.prev_id));
            return;
        };

        let extends_tip = inner
            .chains
            .get(&parent_chain_id)
            .is_some_and(|chain| {
                let tip = chain.latest_commitment();
                tip.id() == commitment.prev_id && commitment.slot == tip.slot.next()
            });

        let chain_id = if extends_tip {
            if let Some(chain) = inner.chains.get_mut(&parent_chain_id) {
                chain.append(commitment);
            }
            parent_chain_id
        } else {
            // Branches below the tip (or with a slot gap): new chain forked
            // at this commitment.
            let chain = Chain::new(commitment);
            let chain_id = chain.id();
            inner.chains.insert(chain_id, chain);
            chain_id
        };
        inner.chain_of.insert(id, chain_id);

        // Attach any commitments that were waiting for this one.
        if let Some(children) = inner.pending_children.remove(&id) {
            for child in children {
                self.attach(inner, child, actions);
            }
        }
    }

    /// Record verified attestations up to `slot` for the chain holding
    /// `commitment_id`.
    pub fn mark_attested(&self, commitment_id: &CommitmentId) -> Vec<ChainAction> {
        {
            let mut inner = self.inner.write().expect("chain manager lock poisoned");
            let Some(&chain_id) = inner.chain_of.get(commitment_id) else {
                return Vec::new();
            };
            if let Some(chain) = inner.chains.get_mut(&chain_id) {
                if let Some(slot) = chain
                    .commitments
                    .values()
                    .find(|c| c.id() == *commitment_id)
                    .map(|c| c.slot)
                {
                    chain.latest_attested = Some(chain.latest_attested.map_or(slot, |s| s.max(slot)));
                }
            }
        }
        self.evaluate_candidates()
    }

    /// Record that our forked engine verified the chain up to
    /// `commitment_id`.
    pub fn mark_verified(&self, commitment_id: &CommitmentId) -> Vec<ChainAction> {
        {
            let mut inner = self.inner.write().expect("chain manager lock poisoned");
            let Some(&chain_id) = inner.chain_of.get(commitment_id) else {
                return Vec::new();
            };
            if let Some(chain) = inner.chains.get_mut(&chain_id) {
                if let Some(slot) = chain
                    .commitments
                    .values()
                    .find(|c| c.id() == *commitment_id)
                    .map(|c| c.slot)
                {
                    chain.latest_verified = Some(chain.latest_verified.map_or(slot, |s| s.max(slot)));
                }
            }
        }
        self.evaluate_candidates()
    }

    /// Make `chain_id` the main chain (after the engine swapped).
    pub fn switch_main(&self, chain_id: &CommitmentId) -> bool {
        let mut inner = self.inner.write().expect("chain manager lock poisoned");
        if !inner.chains.contains_key(chain_id) {
            return false;
        }
        inner.main_chain = *chain_id;
        inner.switch_candidate = None;
        inner.warp_sync_candidate = None;
        inner.attestation_candidate = None;
        true
    }

    /// Evict chains that fell behind the main chain by more than the
    /// retention bound and are not candidates.
    pub fn evict(&self) -> Vec<CommitmentId> {
        let mut inner = self.inner.write().expect("chain manager lock poisoned");
        let main_latest = inner.chains[&inner.main_chain].latest_slot();
        let retention = self.params.chain_retention_slots;
        let main_id = inner.main_chain;

        let stale: Vec<CommitmentId> = inner
            .chains
            .iter()
            .filter(|(id, chain)| {
                **id != main_id
                    && chain.latest_slot() + retention < main_latest
                    && Some(**id) != inner.attestation_candidate
                    && Some(**id) != inner.warp_sync_candidate
                    && Some(**id) != inner.switch_candidate
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(mut chain) = inner.chains.remove(id) {
                chain.evicted = true;
                for commitment in chain.commitments.values() {
                    inner.chain_of.remove(&commitment.id());
                }
            }
        }
        stale
    }

    /// Re-derive the three switching candidates. Deterministic: weight
    /// descending, forking-point slot ascending, chain ID ascending.
    fn evaluate_candidates(&self) -> Vec<ChainAction> {
        let mut actions = Vec::new();
        let mut inner = self.inner.write().expect("chain manager lock poisoned");

        let our_verified = inner.chains[&inner.main_chain].verified_weight();
        let main_id = inner.main_chain;

        let best_by = |weight_of: &dyn Fn(&Chain) -> u64, inner: &ManagerInner| {
            let mut candidates: Vec<(&CommitmentId, &Chain)> = inner
                .chains
                .iter()
                .filter(|(id, chain)| **id != main_id && weight_of(chain) > our_verified)
                .collect();
            candidates.sort_by(|(a_id, a), (b_id, b)| {
                weight_of(b)
                    .cmp(&weight_of(a))
                    .then(a.forking_point.slot.cmp(&b.forking_point.slot))
                    .then(a_id.cmp(b_id))
            });
            candidates.first().map(|(id, _)| **id)
        };

        let claimed = best_by(&Chain::claimed_weight, &inner);
        if claimed.is_some() && claimed != inner.attestation_candidate {
            inner.attestation_candidate = claimed;
            actions.push(ChainAction::RequestAttestations {
                chain: claimed.expect("checked above"),
            });
        }

        let attested = best_by(&Chain::attested_weight, &inner);
        if attested.is_some() && attested != inner.warp_sync_candidate {
            inner.warp_sync_candidate = attested;
            let chain_id = attested.expect("checked above");
            let chain = &inner.chains[&chain_id];
            actions.push(ChainAction::BeginWarpSync {
                chain: chain_id,
                from: chain.forking_point.slot,
                to: chain.warp_sync_threshold(self.params.warp_sync_offset),
            });
        }

        let verified = best_by(&Chain::verified_weight, &inner);
        if verified.is_some() && verified != inner.switch_candidate {
            inner.switch_candidate = verified;
            let chain_id = verified.expect("checked above");
            actions.push(ChainAction::SwitchMainChain {
                chain: chain_id,
                forking_point: inner.chains[&chain_id].forking_point,
            });
        }

        actions
    }
}
