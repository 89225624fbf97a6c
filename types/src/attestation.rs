//! Attestations — signed statements that a committee member observed a
//! specific slot commitment.
//!
//! The canonical serialization is fixed-width so attestation exports are
//! bit-exact across implementations.

use crate::block::Block;
use crate::error::TypeError;
use crate::ids::{AccountId, CommitmentId};
use crate::keys::Signature;
use crate::slot::SlotIndex;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// A committee member's statement of the slot commitment they observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub issuer_id: AccountId,
    pub commitment_id: CommitmentId,
    pub commitment_slot: SlotIndex,
    pub issuing_time: Timestamp,
    pub signature: Signature,
}

impl Attestation {
    /// Canonical width: issuer ‖ commitment ‖ slot ‖ time ‖ signature.
    pub const LENGTH: usize = 32 + 32 + 8 + 8 + 64;

    /// Extract the attestation a block implies: its issuer vouches for the
    /// commitment the block references.
    pub fn from_block(block: &Block) -> Self {
        Self {
            issuer_id: block.issuer_id,
            commitment_id: block.slot_commitment_ref,
            commitment_slot: block.slot_commitment_slot,
            issuing_time: block.issuing_time,
            signature: Signature::ZERO,
        }
    }

    /// Canonical byte form.
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[0..32].copy_from_slice(self.issuer_id.as_bytes());
        bytes[32..64].copy_from_slice(self.commitment_id.as_bytes());
        bytes[64..72].copy_from_slice(&self.commitment_slot.as_u64().to_le_bytes());
        bytes[72..80].copy_from_slice(&self.issuing_time.as_secs().to_le_bytes());
        bytes[80..144].copy_from_slice(self.signature.as_bytes());
        bytes
    }

    /// Parse the canonical byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() < Self::LENGTH {
            return Err(TypeError::Truncated {
                needed: Self::LENGTH,
                available: bytes.len(),
            });
        }

        let mut issuer = [0u8; 32];
        issuer.copy_from_slice(&bytes[0..32]);
        let mut commitment = [0u8; 32];
        commitment.copy_from_slice(&bytes[32..64]);
        let slot = u64::from_le_bytes(bytes[64..72].try_into().expect("length checked"));
        let time = u64::from_le_bytes(bytes[72..80].try_into().expect("length checked"));
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[80..144]);

        Ok(Self {
            issuer_id: AccountId::new(issuer),
            commitment_id: CommitmentId::new(commitment),
            commitment_slot: SlotIndex::new(slot),
            issuing_time: Timestamp::new(time),
            signature: Signature(signature),
        })
    }
}
