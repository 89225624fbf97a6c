//! Consensus layer: committee seats, block acceptance and attestations.
//!
//! Voting weight is attached to committee seats, not raw keys. The
//! acceptance gadget propagates witness weight over the block DAG; the
//! attestation manager keeps the sliding per-slot window of committee
//! attestations that converts claimed weight into attested weight.

pub mod acceptance;
pub mod attestations;
pub mod committee;
pub mod error;

pub use acceptance::{AcceptanceGadget, BlockMetadata, GadgetEvent};
pub use attestations::AttestationManager;
pub use committee::Committee;
pub use error::ConsensusError;
