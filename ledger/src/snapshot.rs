//! Snapshot framing for the ledger sections.
//!
//! Each section is `{count:u64}{record}*` with records framed by their
//! length-delimited binary encoding, so exports are bit-exact between
//! implementations and `import(export(E)) == E` under root equality.

use crate::accounts::{AccountData, AccountsLedger};
use crate::error::LedgerError;
use crate::utxo::UtxoLedger;
use std::io::{Read, Write};
use strata_types::Output;

pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), LedgerError> {
    writer
        .write_all(&value.to_le_bytes())
        .map_err(|e| LedgerError::SnapshotFormat(e.to_string()))
}

pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64, LedgerError> {
    let mut bytes = [0u8; 8];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| LedgerError::SnapshotFormat(e.to_string()))?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn write_record<W: Write>(writer: &mut W, record: &[u8]) -> Result<(), LedgerError> {
    write_u64(writer, record.len() as u64)?;
    writer
        .write_all(record)
        .map_err(|e| LedgerError::SnapshotFormat(e.to_string()))
}

pub fn read_record<R: Read>(reader: &mut R) -> Result<Vec<u8>, LedgerError> {
    let length = read_u64(reader)? as usize;
    let mut record = vec![0u8; length];
    reader
        .read_exact(&mut record)
        .map_err(|e| LedgerError::SnapshotFormat(e.to_string()))?;
    Ok(record)
}

impl UtxoLedger {
    /// Write the unspent-output section.
    pub fn export<W: Write>(&self, writer: &mut W) -> Result<(), LedgerError> {
        let outputs = self.unspent_outputs()?;
        write_u64(writer, outputs.len() as u64)?;
        for output in &outputs {
            let bytes = bincode::serialize(output)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            write_record(writer, &bytes)?;
        }
        Ok(())
    }

    /// Read an unspent-output section into an empty ledger.
    pub fn import<R: Read>(&self, reader: &mut R) -> Result<(), LedgerError> {
        let count = read_u64(reader)?;
        for _ in 0..count {
            let record = read_record(reader)?;
            let output: Output = bincode::deserialize(&record)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            self.add_unspent_output(&output)?;
        }
        Ok(())
    }
}

impl AccountsLedger {
    /// Write the accounts section.
    pub fn export<W: Write>(&self, writer: &mut W) -> Result<(), LedgerError> {
        let accounts = self.all_accounts()?;
        write_u64(writer, accounts.len() as u64)?;
        for account in &accounts {
            let bytes = bincode::serialize(account)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            write_record(writer, &bytes)?;
        }
        Ok(())
    }

    /// Read an accounts section into an empty ledger.
    pub fn import<R: Read>(&self, reader: &mut R) -> Result<(), LedgerError> {
        let count = read_u64(reader)?;
        for _ in 0..count {
            let record = read_record(reader)?;
            let account: AccountData = bincode::deserialize(&record)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            self.add_account(&account)?;
        }
        Ok(())
    }
}
