//! Fundamental types for the Strata ledger core.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: identifiers, slot/epoch arithmetic, blocks, transactions,
//! commitments, attestations, protocol parameters, and key material.

pub mod attestation;
pub mod block;
pub mod commitment;
pub mod error;
pub mod ids;
pub mod keys;
pub mod params;
pub mod slot;
pub mod time;
pub mod transaction;

pub use attestation::Attestation;
pub use block::{Block, Payload};
pub use commitment::{Commitment, Roots};
pub use error::TypeError;
pub use ids::{AccountId, BlockId, CommitmentId, OutputId, SeatIndex, TransactionId};
pub use keys::{PublicKey, Signature};
pub use params::ProtocolParameters;
pub use slot::{EpochIndex, SlotIndex};
pub use time::Timestamp;
pub use transaction::{
    AccountFeatures, Allotment, Output, OutputBody, StakingFeature, Transaction,
};
