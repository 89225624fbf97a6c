//! Acceptance state shared by conflicts, transactions and blocks.

use serde::{Deserialize, Serialize};

/// The fate of an entity under committee voting. Transitions out of
/// `Pending` are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum AcceptanceState {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl AcceptanceState {
    pub fn is_pending(&self) -> bool {
        matches!(self, AcceptanceState::Pending)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceState::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, AcceptanceState::Rejected)
    }
}
