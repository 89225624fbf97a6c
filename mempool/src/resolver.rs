//! State resolution against the committed UTXO ledger.

use crate::promise::{ResolveError, StateRequest};
use strata_ledger::UtxoLedger;
use strata_types::OutputId;
use std::sync::Arc;

/// Resolves output references to ledger states. Implementations must never
/// block a ledger writer; the lookup takes read locks only.
pub trait StateResolver: Send + Sync {
    /// Look up an output. `StateNotFound` is final for a given reference:
    /// callers do not retry within the same slot.
    fn resolve(&self, output_id: OutputId) -> StateRequest;
}

/// Resolver backed by the committed UTXO ledger.
pub struct LedgerStateResolver {
    utxo: Arc<UtxoLedger>,
}

impl LedgerStateResolver {
    pub fn new(utxo: Arc<UtxoLedger>) -> Self {
        Self { utxo }
    }
}

impl StateResolver for LedgerStateResolver {
    fn resolve(&self, output_id: OutputId) -> StateRequest {
        match self.utxo.is_unspent(output_id) {
            Ok(true) => match self.utxo.output(output_id) {
                Ok(Some(output)) => StateRequest::resolved(output),
                Ok(None) => StateRequest::failed(ResolveError::StateNotFound),
                Err(_) => StateRequest::failed(ResolveError::StateNotFound),
            },
            Ok(false) => {
                // Distinguish a spent output from one never seen.
                match self.utxo.spent(output_id) {
                    Ok(Some(_)) => StateRequest::failed(ResolveError::AlreadySpent),
                    _ => StateRequest::failed(ResolveError::StateNotFound),
                }
            }
            Err(_) => StateRequest::failed(ResolveError::StateNotFound),
        }
    }
}
