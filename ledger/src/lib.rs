//! Ledger state for the Strata core.
//!
//! Two ledgers advance in lock-step at each slot commit: the UTXO ledger
//! (outputs, spends, unspent index, state tree) and the accounts ledger
//! (block-issuance credits, keys, stake). Both support per-slot diffs with
//! exact rollback, and framed snapshot export/import for bootstrapping.

pub mod accounts;
pub mod error;
pub mod snapshot;
pub mod tree;
pub mod utxo;

pub use accounts::{AccountData, AccountDiff, AccountsLedger, Credits, StakeData};
pub use error::LedgerError;
pub use tree::StateTree;
pub use utxo::{SlotDiff, Spent, UtxoLedger};
