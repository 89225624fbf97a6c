//! The conflict DAG proper: conflict nodes, conflict sets, vote walks and
//! acceptance propagation.
//!
//! Ownership is flat: nodes reference each other by ID and the DAG owns the
//! backing maps, so eviction is a sweep over the ID store rather than pointer
//! chasing.

use crate::acceptance::AcceptanceState;
use crate::error::ConflictError;
use crate::events::{ConflictEvent, ConflictEventSink};
use crate::vote::{Vote, WeightProvider};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};
use strata_types::SeatIndex;

/// Bound for conflict identifiers. The `Ord` requirement makes tie-breaks and
/// iteration deterministic across replicas.
pub trait ConflictIdType:
    Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static
{
}
impl<T> ConflictIdType for T where
    T: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static
{
}

/// Bound for resource identifiers (the doubly-spent entities).
pub trait ResourceIdType:
    Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static
{
}
impl<T> ResourceIdType for T where
    T: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static
{
}

struct ConflictNode<C: ConflictIdType, R: ResourceIdType> {
    parents: BTreeSet<C>,
    children: BTreeSet<C>,
    conflict_sets: BTreeSet<R>,
    latest_votes: HashMap<SeatIndex, Vote>,
    supporters: BTreeSet<SeatIndex>,
    state: AcceptanceState,
}

impl<C: ConflictIdType, R: ResourceIdType> ConflictNode<C, R> {
    fn new() -> Self {
        Self {
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            conflict_sets: BTreeSet::new(),
            latest_votes: HashMap::new(),
            supporters: BTreeSet::new(),
            state: AcceptanceState::Pending,
        }
    }
}

struct DagInner<C: ConflictIdType, R: ResourceIdType> {
    conflicts: HashMap<C, ConflictNode<C, R>>,
    /// resource -> members spending it.
    conflict_sets: HashMap<R, BTreeSet<C>>,
}

impl<C: ConflictIdType, R: ResourceIdType> DagInner<C, R> {
    fn new() -> Self {
        Self {
            conflicts: HashMap::new(),
            conflict_sets: HashMap::new(),
        }
    }

    /// All conflicts spending a resource also spent by `id`, excluding `id`.
    fn conflicting_of(&self, id: C) -> BTreeSet<C> {
        let mut out = BTreeSet::new();
        if let Some(node) = self.conflicts.get(&id) {
            for resource in &node.conflict_sets {
                if let Some(members) = self.conflict_sets.get(resource) {
                    for member in members {
                        if *member != id {
                            out.insert(*member);
                        }
                    }
                }
            }
        }
        out
    }

    /// Committee weight currently supporting the conflict.
    fn weight(&self, id: C, weights: &dyn WeightProvider) -> u64 {
        self.conflicts.get(&id).map_or(0, |node| {
            node.supporters
                .iter()
                .map(|seat| weights.seat_weight(*seat))
                .sum()
        })
    }

    /// Mark the conflict and its entire future cone rejected.
    fn reject_cascade(&mut self, id: C, events: &mut Vec<ConflictEvent<C, R>>) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.conflicts.get_mut(&current) else {
                continue;
            };
            if !node.state.is_pending() {
                continue;
            }
            node.state = AcceptanceState::Rejected;
            events.push(ConflictEvent::ConflictRejected { id: current });
            stack.extend(node.children.iter().copied());
        }
    }

    /// Re-check the acceptance condition for a pending conflict: enough
    /// supporting weight, no contending sibling above the revocation bound,
    /// and all (still present) parents accepted. Accepting a conflict rejects
    /// its siblings and re-checks its children.
    fn reevaluate_acceptance(
        &mut self,
        id: C,
        weights: &dyn WeightProvider,
        events: &mut Vec<ConflictEvent<C, R>>,
    ) {
        let Some(node) = self.conflicts.get(&id) else {
            return;
        };
        if !node.state.is_pending() {
            return;
        }

        let total = weights.total_weight();
        let threshold = weights.acceptance_threshold();
        if threshold == 0 || self.weight(id, weights) < threshold {
            return;
        }

        // Parents accept before children; a parent missing from the store was
        // evicted after its own acceptance.
        let parents: Vec<C> = node.parents.iter().copied().collect();
        for parent in &parents {
            if let Some(parent_node) = self.conflicts.get(parent) {
                if !parent_node.state.is_accepted() {
                    return;
                }
            }
        }

        let siblings = self.conflicting_of(id);
        for sibling in &siblings {
            let Some(sibling_node) = self.conflicts.get(sibling) else {
                continue;
            };
            if sibling_node.state.is_rejected() {
                continue;
            }
            if self.weight(*sibling, weights) > total.saturating_sub(threshold) {
                return;
            }
        }

        if let Some(node) = self.conflicts.get_mut(&id) {
            node.state = AcceptanceState::Accepted;
        }
        events.push(ConflictEvent::ConflictAccepted { id });

        for sibling in siblings {
            self.reject_cascade(sibling, events);
        }

        // Merge to master: children of an accepted conflict no longer track
        // it as a parent, so evicting the committed conflict later cannot
        // drag live children with it.
        let children: Vec<C> = self
            .conflicts
            .get(&id)
            .map(|node| node.children.iter().copied().collect())
            .unwrap_or_default();
        for child in &children {
            if let Some(child_node) = self.conflicts.get_mut(child) {
                child_node.parents.remove(&id);
            }
        }
        if let Some(node) = self.conflicts.get_mut(&id) {
            node.children.clear();
        }
        for child in children {
            self.reevaluate_acceptance(child, weights, events);
        }
    }

    /// Record the seat's vote on one conflict, keeping only the
    /// highest-ranked vote per seat, and re-check acceptance of the conflict
    /// and of its siblings (a revocation may unblock a sibling).
    fn apply_vote(
        &mut self,
        id: C,
        vote: Vote,
        weights: &dyn WeightProvider,
        events: &mut Vec<ConflictEvent<C, R>>,
    ) {
        let Some(node) = self.conflicts.get_mut(&id) else {
            return;
        };

        if let Some(existing) = node.latest_votes.get(&vote.seat) {
            if existing.rank > vote.rank {
                return;
            }
        }
        node.latest_votes.insert(vote.seat, vote);
        if vote.liked {
            node.supporters.insert(vote.seat);
        } else {
            node.supporters.remove(&vote.seat);
        }

        self.reevaluate_acceptance(id, weights, events);
        for sibling in self.conflicting_of(id) {
            self.reevaluate_acceptance(sibling, weights, events);
        }
    }

    /// Purge a conflict, cascading to children left without any parent.
    fn evict_one(&mut self, id: C, events: &mut Vec<ConflictEvent<C, R>>) {
        let Some(node) = self.conflicts.remove(&id) else {
            return;
        };

        for resource in &node.conflict_sets {
            if let Some(members) = self.conflict_sets.get_mut(resource) {
                members.remove(&id);
                if members.is_empty() {
                    self.conflict_sets.remove(resource);
                }
            }
        }

        for parent in &node.parents {
            if let Some(parent_node) = self.conflicts.get_mut(parent) {
                parent_node.children.remove(&id);
            }
        }

        events.push(ConflictEvent::ConflictEvicted { id });

        for child in node.children {
            let orphaned = match self.conflicts.get_mut(&child) {
                Some(child_node) => {
                    child_node.parents.remove(&id) && child_node.parents.is_empty()
                }
                None => false,
            };
            if orphaned {
                self.evict_one(child, events);
            }
        }
    }
}

/// The conflict DAG. All operations take `&self`; per-seat mutexes serialize
/// votes of a single seat, the inner lock serializes mutation.
pub struct ConflictDag<C: ConflictIdType, R: ResourceIdType> {
    inner: RwLock<DagInner<C, R>>,
    weights: Arc<dyn WeightProvider>,
    seat_locks: Mutex<HashMap<SeatIndex, Arc<Mutex<()>>>>,
    listeners: RwLock<Vec<ConflictEventSink<C, R>>>,
}

impl<C: ConflictIdType, R: ResourceIdType> ConflictDag<C, R> {
    pub fn new(weights: Arc<dyn WeightProvider>) -> Self {
        Self {
            inner: RwLock::new(DagInner::new()),
            weights,
            seat_locks: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register an event listener. Listeners run outside the DAG lock.
    pub fn subscribe(&self, listener: ConflictEventSink<C, R>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    fn emit(&self, events: Vec<ConflictEvent<C, R>>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for event in &events {
            for listener in listeners.iter() {
                listener(event);
            }
        }
    }

    fn seat_lock(&self, seat: SeatIndex) -> Arc<Mutex<()>> {
        let mut locks = self.seat_locks.lock().expect("seat lock map poisoned");
        locks
            .entry(seat)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a conflict. Idempotent; returns whether it was newly created.
    pub fn create_conflict(&self, id: C) -> bool {
        let created = {
            let mut inner = self.inner.write().expect("conflict DAG lock poisoned");
            if inner.conflicts.contains_key(&id) {
                false
            } else {
                inner.conflicts.insert(id, ConflictNode::new());
                true
            }
        };
        if created {
            self.emit(vec![ConflictEvent::ConflictCreated { id }]);
        }
        created
    }

    /// Add the conflict to the conflict sets of the given resources,
    /// creating sets lazily. Joining the set of an already-accepted sibling
    /// rejects this conflict immediately.
    pub fn update_conflicting_resources(
        &self,
        id: C,
        resource_ids: &[R],
    ) -> Result<(), ConflictError> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write().expect("conflict DAG lock poisoned");
            if !inner.conflicts.contains_key(&id) {
                return Err(ConflictError::EntityEvicted(id.to_string()));
            }

            let mut joined = Vec::new();
            for resource in resource_ids {
                let members = inner.conflict_sets.entry(*resource).or_default();
                if members.insert(id) {
                    joined.push(*resource);
                }
            }
            if let Some(node) = inner.conflicts.get_mut(&id) {
                node.conflict_sets.extend(joined.iter().copied());
            }

            if !joined.is_empty() {
                let accepted_sibling_exists = inner.conflicting_of(id).iter().any(|sibling| {
                    inner
                        .conflicts
                        .get(sibling)
                        .is_some_and(|node| node.state.is_accepted())
                });
                if accepted_sibling_exists {
                    inner.reject_cascade(id, &mut events);
                } else {
                    let weights = self.weights.clone();
                    inner.reevaluate_acceptance(id, weights.as_ref(), &mut events);
                    for sibling in inner.conflicting_of(id) {
                        inner.reevaluate_acceptance(sibling, weights.as_ref(), &mut events);
                    }
                }
                events.push(ConflictEvent::ConflictingResourcesAdded {
                    id,
                    resources: joined,
                });
            }
        }
        self.emit(events);
        Ok(())
    }

    /// Update the parent set of a forked conflict. Adding a missing parent is
    /// fatal unless this conflict is already rejected (fork on top of a
    /// rejected branch right before eviction).
    pub fn update_conflict_parents(
        &self,
        id: C,
        added: &[C],
        removed: &[C],
    ) -> Result<(), ConflictError> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write().expect("conflict DAG lock poisoned");
            let current_state = match inner.conflicts.get(&id) {
                Some(node) => node.state,
                None => return Err(ConflictError::EntityEvicted(id.to_string())),
            };

            for parent in added {
                if !inner.conflicts.contains_key(parent) {
                    if current_state.is_rejected() {
                        return Err(ConflictError::EntityEvicted(parent.to_string()));
                    }
                    return Err(ConflictError::Fatal(format!(
                        "tried to add non-existent parent {parent} to conflict {id}"
                    )));
                }
            }

            let mut parent_rejected = false;
            for parent in added {
                if let Some(parent_node) = inner.conflicts.get_mut(parent) {
                    parent_node.children.insert(id);
                    parent_rejected |= parent_node.state.is_rejected();
                }
            }
            for parent in removed {
                if let Some(parent_node) = inner.conflicts.get_mut(parent) {
                    parent_node.children.remove(&id);
                }
            }
            let parents: Vec<C> = {
                let node = inner
                    .conflicts
                    .get_mut(&id)
                    .expect("checked above; lock held");
                node.parents.extend(added.iter().copied());
                for parent in removed {
                    node.parents.remove(parent);
                }
                node.parents.iter().copied().collect()
            };

            if parent_rejected {
                inner.reject_cascade(id, &mut events);
            } else {
                let weights = self.weights.clone();
                inner.reevaluate_acceptance(id, weights.as_ref(), &mut events);
            }
            events.push(ConflictEvent::ConflictParentsUpdated { id, parents });
        }
        self.emit(events);
        Ok(())
    }

    /// Apply a seat-indexed vote over a set of conflicts. The walk supports
    /// each conflict and its ancestors, and revokes the future cones of every
    /// conflicting conflict encountered. A conflict that would be both
    /// supported and revoked in the same cast is a fatal contradiction.
    pub fn cast_votes(&self, vote: Vote, conflict_ids: &[C]) -> Result<(), ConflictError> {
        let seat_lock = self.seat_lock(vote.seat);
        let _seat_guard = seat_lock.lock().expect("seat lock poisoned");

        let mut events = Vec::new();
        {
            let mut inner = self.inner.write().expect("conflict DAG lock poisoned");

            let mut supported = BTreeSet::new();
            let mut revoked = BTreeSet::new();
            let mut revoke_queue: Vec<C> = Vec::new();

            let mut support_stack: Vec<C> = conflict_ids
                .iter()
                .filter(|id| inner.conflicts.contains_key(id))
                .copied()
                .collect();

            while let Some(current) = support_stack.pop() {
                if !supported.insert(current) {
                    continue;
                }
                for conflicting in inner.conflicting_of(current) {
                    if revoked.insert(conflicting) {
                        if supported.contains(&conflicting) {
                            return Err(ConflictError::ConflictingVotes(conflicting.to_string()));
                        }
                        if let Some(node) = inner.conflicts.get(&conflicting) {
                            revoke_queue.extend(node.children.iter().copied());
                        }
                    }
                }
                if let Some(node) = inner.conflicts.get(&current) {
                    support_stack.extend(node.parents.iter().copied());
                }
            }

            while let Some(current) = revoke_queue.pop() {
                if revoked.insert(current) {
                    if let Some(node) = inner.conflicts.get(&current) {
                        revoke_queue.extend(node.children.iter().copied());
                    }
                }
            }

            let weights = self.weights.clone();
            for id in &supported {
                inner.apply_vote(*id, vote.with_liked(true), weights.as_ref(), &mut events);
            }
            for id in &revoked {
                inner.apply_vote(*id, vote.with_liked(false), weights.as_ref(), &mut events);
            }
        }
        self.emit(events);
        Ok(())
    }

    /// The lowest observed acceptance state across the set; `Rejected`
    /// short-circuits. A missing conflict is reported as evicted.
    pub fn acceptance_state(&self, conflict_ids: &[C]) -> Result<AcceptanceState, ConflictError> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        let mut lowest = AcceptanceState::Accepted;
        for id in conflict_ids {
            let node = inner
                .conflicts
                .get(id)
                .ok_or_else(|| ConflictError::EntityEvicted(id.to_string()))?;
            match node.state {
                AcceptanceState::Rejected => return Ok(AcceptanceState::Rejected),
                AcceptanceState::Pending => lowest = AcceptanceState::Pending,
                AcceptanceState::Accepted => {}
            }
        }
        Ok(lowest)
    }

    /// Drop the accepted conflicts from the set, leaving pending and rejected
    /// ones (accepted history is merged back to the master branch).
    pub fn unaccepted_conflicts(&self, conflict_ids: &[C]) -> Vec<C> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        conflict_ids
            .iter()
            .filter(|id| {
                inner
                    .conflicts
                    .get(id)
                    .is_some_and(|node| !node.state.is_accepted())
            })
            .copied()
            .collect()
    }

    /// For each input conflict that is not the preferred member of its
    /// conflict sets, the conflict it is liked against: strictly heavier, or
    /// equal weight with the lexicographically smaller ID.
    pub fn liked_instead(&self, conflict_ids: &[C]) -> HashMap<C, C> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        let mut out = HashMap::new();
        for id in conflict_ids {
            if !inner.conflicts.contains_key(id) {
                continue;
            }
            let mut preferred = *id;
            let mut preferred_weight = inner.weight(*id, self.weights.as_ref());
            let self_rejected = inner
                .conflicts
                .get(id)
                .is_some_and(|node| node.state.is_rejected());
            for sibling in inner.conflicting_of(*id) {
                let rejected = inner
                    .conflicts
                    .get(&sibling)
                    .is_some_and(|node| node.state.is_rejected());
                if rejected {
                    continue;
                }
                let sibling_weight = inner.weight(sibling, self.weights.as_ref());
                let wins = sibling_weight > preferred_weight
                    || (sibling_weight == preferred_weight && sibling < preferred)
                    || (self_rejected && preferred == *id);
                if wins {
                    preferred = sibling;
                    preferred_weight = sibling_weight;
                }
            }
            if preferred != *id {
                out.insert(*id, preferred);
            }
        }
        out
    }

    /// Transitive closure over children, including the inputs themselves.
    pub fn future_cone(&self, conflict_ids: &[C]) -> BTreeSet<C> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        let mut cone = BTreeSet::new();
        let mut stack: Vec<C> = conflict_ids
            .iter()
            .filter(|id| inner.conflicts.contains_key(id))
            .copied()
            .collect();
        while let Some(current) = stack.pop() {
            if cone.insert(current) {
                if let Some(node) = inner.conflicts.get(&current) {
                    stack.extend(node.children.iter().copied());
                }
            }
        }
        cone
    }

    /// Purge the conflict and, transitively, children left without parents.
    pub fn evict_conflict(&self, id: C) -> Vec<C> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write().expect("conflict DAG lock poisoned");
            inner.evict_one(id, &mut events);
        }
        let evicted = events
            .iter()
            .filter_map(|event| match event {
                ConflictEvent::ConflictEvicted { id } => Some(*id),
                _ => None,
            })
            .collect();
        self.emit(events);
        evicted
    }

    // ── read accessors ───────────────────────────────────────────────────

    pub fn contains(&self, id: C) -> bool {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner.conflicts.contains_key(&id)
    }

    pub fn conflict_sets(&self, id: C) -> Option<Vec<R>> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner
            .conflicts
            .get(&id)
            .map(|node| node.conflict_sets.iter().copied().collect())
    }

    pub fn conflict_parents(&self, id: C) -> Option<Vec<C>> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner
            .conflicts
            .get(&id)
            .map(|node| node.parents.iter().copied().collect())
    }

    pub fn conflict_children(&self, id: C) -> Option<Vec<C>> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner
            .conflicts
            .get(&id)
            .map(|node| node.children.iter().copied().collect())
    }

    pub fn conflict_set_members(&self, resource: R) -> Option<Vec<C>> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner
            .conflict_sets
            .get(&resource)
            .map(|members| members.iter().copied().collect())
    }

    /// The conflicts contending with `id` across all its conflict sets.
    pub fn conflicting_conflicts(&self, id: C) -> Option<Vec<C>> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        if !inner.conflicts.contains_key(&id) {
            return None;
        }
        Some(inner.conflicting_of(id).into_iter().collect())
    }

    pub fn conflict_voters(&self, id: C) -> Vec<SeatIndex> {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner
            .conflicts
            .get(&id)
            .map(|node| node.supporters.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn conflict_weight(&self, id: C) -> u64 {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner.weight(id, self.weights.as_ref())
    }

    /// Whether the seat's latest vote supports every one of the conflicts.
    pub fn all_conflicts_supported(&self, seat: SeatIndex, conflict_ids: &[C]) -> bool {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        conflict_ids.iter().all(|id| {
            inner.conflicts.get(id).is_some_and(|node| {
                node.latest_votes
                    .get(&seat)
                    .is_some_and(|vote| vote.liked)
            })
        })
    }

    pub fn conflict_count(&self) -> usize {
        let inner = self.inner.read().expect("conflict DAG lock poisoned");
        inner.conflicts.len()
    }

    /// Drop all conflicts and sets. Called on engine shutdown.
    pub fn shutdown(&self) {
        let mut inner = self.inner.write().expect("conflict DAG lock poisoned");
        inner.conflicts.clear();
        inner.conflict_sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::EqualWeights;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dag(committee_size: u64) -> ConflictDag<u32, u32> {
        ConflictDag::new(Arc::new(EqualWeights::new(committee_size)))
    }

    fn seat(index: u16) -> SeatIndex {
        SeatIndex(index)
    }

    // ── creation and conflict sets ──────────────────────────────────────

    #[test]
    fn create_conflict_is_idempotent() {
        let dag = dag(3);
        assert!(dag.create_conflict(1));
        assert!(!dag.create_conflict(1));
        assert_eq!(dag.conflict_count(), 1);
    }

    #[test]
    fn create_emits_event_once() {
        let dag = dag(3);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        dag.subscribe(Box::new(move |event| {
            if matches!(event, ConflictEvent::ConflictCreated { .. }) {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));
        dag.create_conflict(1);
        dag.create_conflict(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn joining_same_resource_makes_conflicts_contend() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        assert_eq!(dag.conflicting_conflicts(1), Some(vec![2]));
        assert_eq!(dag.conflict_set_members(100), Some(vec![1, 2]));
    }

    #[test]
    fn update_resources_on_evicted_conflict_fails() {
        let dag = dag(3);
        assert!(matches!(
            dag.update_conflicting_resources(9, &[100]),
            Err(ConflictError::EntityEvicted(_))
        ));
    }

    // ── voting and acceptance ───────────────────────────────────────────

    #[test]
    fn votes_accumulate_to_acceptance() {
        let dag = dag(3); // threshold 2
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        assert_eq!(dag.acceptance_state(&[1]).unwrap(), AcceptanceState::Pending);

        dag.cast_votes(Vote::new(seat(1), 1), &[1]).unwrap();
        assert_eq!(
            dag.acceptance_state(&[1]).unwrap(),
            AcceptanceState::Accepted
        );
        assert_eq!(
            dag.acceptance_state(&[2]).unwrap(),
            AcceptanceState::Rejected
        );
    }

    #[test]
    fn acceptance_is_monotone() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[1]).unwrap();
        assert!(dag.acceptance_state(&[1]).unwrap().is_accepted());

        // A later vote for the rejected side does not undo anything.
        dag.cast_votes(Vote::new(seat(2), 2), &[2]).unwrap();
        assert!(dag.acceptance_state(&[1]).unwrap().is_accepted());
        assert!(dag.acceptance_state(&[2]).unwrap().is_rejected());
    }

    #[test]
    fn vote_for_child_supports_parents() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflict_parents(2, &[1], &[]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[2]).unwrap();
        assert_eq!(dag.conflict_weight(1), 1);
        assert_eq!(dag.conflict_weight(2), 1);
        assert_eq!(dag.conflict_voters(1), vec![seat(0)]);
    }

    #[test]
    fn switching_vote_revokes_previous_side() {
        let dag = dag(5); // threshold 4
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[2]).unwrap();
        assert_eq!(dag.conflict_weight(2), 1);

        // Same seat later votes for the other side.
        dag.cast_votes(Vote::new(seat(0), 2), &[1]).unwrap();
        assert_eq!(dag.conflict_weight(1), 1);
        assert_eq!(dag.conflict_weight(2), 0);
    }

    #[test]
    fn stale_revoke_is_ignored() {
        let dag = dag(5);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 5), &[1]).unwrap();
        // An older vote cannot revoke the newer support for conflict 1.
        dag.cast_votes(Vote::new(seat(0), 3), &[2]).unwrap();

        assert_eq!(dag.conflict_weight(1), 1);
    }

    #[test]
    fn conflicting_votes_in_one_cast_are_fatal() {
        let dag = dag(3);
        // 1 and 2 contend; 3 is a child of 2. Voting for [1, 3] supports 2
        // (parent walk) while revoking it (sibling of 1).
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.create_conflict(3);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();
        dag.update_conflict_parents(3, &[2], &[]).unwrap();

        let result = dag.cast_votes(Vote::new(seat(0), 1), &[1, 3]);
        assert!(matches!(result, Err(ConflictError::ConflictingVotes(_))));
    }

    #[test]
    fn revoking_cascades_to_future_cone() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.create_conflict(3); // spends an output of 2
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();
        dag.update_conflict_parents(3, &[2], &[]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[3]).unwrap();
        assert_eq!(dag.conflict_weight(3), 1);

        // Accepting 1 rejects 2 and its future cone.
        dag.cast_votes(Vote::new(seat(1), 1), &[1]).unwrap();
        dag.cast_votes(Vote::new(seat(2), 1), &[1]).unwrap();
        assert!(dag.acceptance_state(&[1]).unwrap().is_accepted());
        assert!(dag.acceptance_state(&[2]).unwrap().is_rejected());
        assert!(dag.acceptance_state(&[3]).unwrap().is_rejected());
    }

    #[test]
    fn child_acceptance_waits_for_parent() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.create_conflict(3);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();
        // 3 contends on its own resource with nobody, child of 1.
        dag.update_conflict_parents(3, &[1], &[]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[3]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[3]).unwrap();

        // Both 1 and 3 cross the threshold; parent accepts first, then child.
        assert!(dag.acceptance_state(&[1]).unwrap().is_accepted());
        assert!(dag.acceptance_state(&[3]).unwrap().is_accepted());
    }

    // ── liked_instead and future cone ───────────────────────────────────

    #[test]
    fn liked_instead_prefers_heavier_conflict() {
        let dag = dag(5);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        dag.cast_votes(Vote::new(seat(0), 1), &[2]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[2]).unwrap();

        let liked = dag.liked_instead(&[1, 2]);
        assert_eq!(liked.get(&1), Some(&2));
        assert!(!liked.contains_key(&2));
    }

    #[test]
    fn liked_instead_ties_break_to_smaller_id() {
        let dag = dag(5);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        // Equal weight on both sides.
        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[2]).unwrap();

        let liked = dag.liked_instead(&[1, 2]);
        assert!(!liked.contains_key(&1));
        assert_eq!(liked.get(&2), Some(&1));
    }

    #[test]
    fn future_cone_includes_inputs_and_descendants() {
        let dag = dag(3);
        for id in 1..=4 {
            dag.create_conflict(id);
        }
        dag.update_conflict_parents(2, &[1], &[]).unwrap();
        dag.update_conflict_parents(3, &[2], &[]).unwrap();
        dag.update_conflict_parents(4, &[1], &[]).unwrap();

        let cone = dag.future_cone(&[1]);
        assert_eq!(cone, BTreeSet::from([1, 2, 3, 4]));
        assert_eq!(dag.future_cone(&[2]), BTreeSet::from([2, 3]));
    }

    #[test]
    fn unaccepted_conflicts_filters_accepted() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[1]).unwrap();

        assert!(dag.acceptance_state(&[1]).unwrap().is_accepted());
        assert_eq!(dag.unaccepted_conflicts(&[1, 2]), vec![2]);
    }

    // ── parents and forks ───────────────────────────────────────────────

    #[test]
    fn adding_missing_parent_is_fatal() {
        let dag = dag(3);
        dag.create_conflict(1);
        assert!(matches!(
            dag.update_conflict_parents(1, &[99], &[]),
            Err(ConflictError::Fatal(_))
        ));
    }

    #[test]
    fn child_of_rejected_parent_is_rejected() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();
        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[1]).unwrap();
        assert!(dag.acceptance_state(&[2]).unwrap().is_rejected());

        dag.create_conflict(3);
        dag.update_conflict_parents(3, &[2], &[]).unwrap();
        assert!(dag.acceptance_state(&[3]).unwrap().is_rejected());
    }

    #[test]
    fn joining_set_of_accepted_sibling_rejects_newcomer() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        dag.cast_votes(Vote::new(seat(1), 1), &[1]).unwrap();
        assert!(dag.acceptance_state(&[1]).unwrap().is_accepted());

        dag.create_conflict(2);
        dag.update_conflicting_resources(2, &[100]).unwrap();
        assert!(dag.acceptance_state(&[2]).unwrap().is_rejected());
    }

    // ── eviction ────────────────────────────────────────────────────────

    #[test]
    fn eviction_removes_conflict_and_set_membership() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.update_conflicting_resources(1, &[100]).unwrap();
        dag.update_conflicting_resources(2, &[100]).unwrap();

        let evicted = dag.evict_conflict(1);
        assert_eq!(evicted, vec![1]);
        assert!(!dag.contains(1));
        assert_eq!(dag.conflict_set_members(100), Some(vec![2]));
    }

    #[test]
    fn eviction_cascades_to_orphaned_children() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.create_conflict(3);
        dag.update_conflict_parents(2, &[1], &[]).unwrap();
        dag.update_conflict_parents(3, &[1, 2], &[]).unwrap();

        let evicted = dag.evict_conflict(1);
        // 2 loses its only parent and is evicted; 3 then loses both.
        assert_eq!(evicted.len(), 3);
        assert_eq!(dag.conflict_count(), 0);
    }

    #[test]
    fn evicting_unknown_conflict_is_noop() {
        let dag = dag(3);
        assert!(dag.evict_conflict(42).is_empty());
    }

    #[test]
    fn single_seat_below_threshold_stays_pending() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.cast_votes(Vote::new(seat(0), 1), &[1]).unwrap();
        assert!(dag.acceptance_state(&[1]).unwrap().is_pending());
    }

    #[test]
    fn all_conflicts_supported_tracks_latest_votes() {
        let dag = dag(3);
        dag.create_conflict(1);
        dag.create_conflict(2);
        dag.cast_votes(Vote::new(seat(0), 1), &[1, 2]).unwrap();
        assert!(dag.all_conflicts_supported(seat(0), &[1, 2]));
        assert!(!dag.all_conflicts_supported(seat(1), &[1]));
    }
}
