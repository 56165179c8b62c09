//! Transaction archive.
//!
//! An append-only log of transactions keyed by address, plus the marker of
//! the last block the engine iterated over. The archive is volatile: nothing
//! survives a restart.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::chain::Transaction;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for transaction archives
pub trait TransactionStore: Send + Sync {
    /// Record the last block number seen. Callers must not regress it.
    fn save_block(&self, block_number: u64) -> Result<()>;

    /// Last recorded block number
    fn last_block(&self) -> Result<u64>;

    /// Archive `tx` under its sender and, independently, under its recipient.
    ///
    /// A self-transfer therefore lands twice under the same address. Returns
    /// `false` without touching the log when a transaction with the same hash
    /// is already archived, which keeps block re-scans idempotent.
    fn save_transaction(&self, tx: &Transaction) -> Result<bool>;

    /// Transactions archived for `address` in insertion order
    fn transactions(&self, address: &str) -> Result<Vec<Transaction>>;

    /// Number of distinct transactions archived
    fn transaction_count(&self) -> Result<usize>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Archive {
    by_address: HashMap<String, Vec<Transaction>>,
    archived: HashSet<String>,
}

/// In-memory transaction archive
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    archive: RwLock<Archive>,
    last_block: RwLock<u64>,
}

impl InMemoryTransactionStore {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn save_block(&self, block_number: u64) -> Result<()> {
        let mut last = self.last_block.write().map_err(|_| Error::Lock)?;
        *last = block_number;
        Ok(())
    }

    fn last_block(&self) -> Result<u64> {
        let last = self.last_block.read().map_err(|_| Error::Lock)?;
        Ok(*last)
    }

    fn save_transaction(&self, tx: &Transaction) -> Result<bool> {
        let mut archive = self.archive.write().map_err(|_| Error::Lock)?;
        if !archive.archived.insert(tx.hash.clone()) {
            return Ok(false);
        }

        archive
            .by_address
            .entry(tx.from.clone())
            .or_default()
            .push(tx.clone());
        archive
            .by_address
            .entry(tx.to.clone())
            .or_default()
            .push(tx.clone());

        Ok(true)
    }

    fn transactions(&self, address: &str) -> Result<Vec<Transaction>> {
        let archive = self.archive.read().map_err(|_| Error::Lock)?;
        Ok(archive.by_address.get(address).cloned().unwrap_or_default())
    }

    fn transaction_count(&self) -> Result<usize> {
        let archive = self.archive.read().map_err(|_| Error::Lock)?;
        Ok(archive.archived.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(from: &str, to: &str, hash: &str, block: u32) -> Transaction {
        Transaction::new(from, to, hash, 100u32, block)
    }

    #[test]
    fn test_block_marker() {
        let store = InMemoryTransactionStore::new();
        assert_eq!(store.last_block().unwrap(), 0);

        store.save_block(42).unwrap();
        assert_eq!(store.last_block().unwrap(), 42);
    }

    #[test]
    fn test_fan_out_to_both_parties() {
        let store = InMemoryTransactionStore::new();
        assert!(store.save_transaction(&tx("0xa", "0xb", "0x01", 1)).unwrap());

        assert_eq!(store.transactions("0xa").unwrap().len(), 1);
        assert_eq!(store.transactions("0xb").unwrap().len(), 1);
        assert!(store.transactions("0xc").unwrap().is_empty());
        assert_eq!(store.transaction_count().unwrap(), 1);
    }

    #[test]
    fn test_self_transfer_stored_twice() {
        let store = InMemoryTransactionStore::new();
        store.save_transaction(&tx("0xa", "0xa", "0x01", 1)).unwrap();

        let entries = store.transactions("0xa").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], entries[1]);
        assert_eq!(store.transaction_count().unwrap(), 1);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let store = InMemoryTransactionStore::new();
        store.save_transaction(&tx("0xa", "0xb", "0x03", 9)).unwrap();
        store.save_transaction(&tx("0xb", "0xa", "0x01", 2)).unwrap();

        let hashes: Vec<_> = store
            .transactions("0xa")
            .unwrap()
            .into_iter()
            .map(|t| t.hash)
            .collect();
        assert_eq!(hashes, vec!["0x03", "0x01"]);
    }

    #[test]
    fn test_resave_is_ignored() {
        let store = InMemoryTransactionStore::new();
        let t = tx("0xa", "0xb", "0x01", 1);

        assert!(store.save_transaction(&t).unwrap());
        assert!(!store.save_transaction(&t).unwrap());
        assert_eq!(store.transactions("0xa").unwrap().len(), 1);
        assert_eq!(store.transactions("0xb").unwrap().len(), 1);
    }
}
