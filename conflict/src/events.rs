//! Events emitted by the conflict DAG.
//!
//! Listeners are invoked after the DAG lock is released, so handlers may call
//! back into the DAG.

/// Events describing changes to the conflict DAG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictEvent<C, R> {
    /// A new conflict entered the DAG.
    ConflictCreated { id: C },
    /// The conflict joined the conflict sets of the given resources.
    ConflictingResourcesAdded { id: C, resources: Vec<R> },
    /// The conflict's parent set changed (fork).
    ConflictParentsUpdated { id: C, parents: Vec<C> },
    /// The conflict reached the acceptance threshold.
    ConflictAccepted { id: C },
    /// The conflict was rejected (sibling accepted or parent rejected).
    ConflictRejected { id: C },
    /// The conflict was purged from the DAG.
    ConflictEvicted { id: C },
}

/// A subscriber to conflict DAG events.
pub type ConflictEventSink<C, R> = Box<dyn Fn(&ConflictEvent<C, R>) + Send + Sync>;
