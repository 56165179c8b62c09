//! In-memory block reader for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chain::{BlockReader, Transaction};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MockChain {
    latest: u64,
    blocks: HashMap<u64, Vec<Transaction>>,
    /// Remaining forced failures per block
    failing_blocks: HashMap<u64, u32>,
    fail_latest: bool,
    fetches: HashMap<u64, u32>,
}

/// Scriptable [`BlockReader`].
///
/// Blocks without transactions are served as empty. Failures can be injected
/// per block (for a fixed number of fetches) or for the head query.
#[derive(Debug, Default)]
pub struct MockReader {
    chain: Mutex<MockChain>,
}

impl MockReader {
    /// Create a chain whose head is `latest`
    pub fn new(latest: u64) -> Self {
        Self {
            chain: Mutex::new(MockChain {
                latest,
                ..Default::default()
            }),
        }
    }

    /// Builder form of [`MockReader::insert_block`]
    pub fn with_block(self, block_number: u64, transactions: Vec<Transaction>) -> Self {
        self.insert_block(block_number, transactions);
        self
    }

    /// Replace the contents of a block
    pub fn insert_block(&self, block_number: u64, transactions: Vec<Transaction>) {
        if let Ok(mut chain) = self.chain.lock() {
            chain.blocks.insert(block_number, transactions);
        }
    }

    /// Move the chain head
    pub fn set_latest(&self, latest: u64) {
        if let Ok(mut chain) = self.chain.lock() {
            chain.latest = latest;
        }
    }

    /// Fail the next `times` fetches of `block_number`
    pub fn fail_block(&self, block_number: u64, times: u32) {
        if let Ok(mut chain) = self.chain.lock() {
            chain.failing_blocks.insert(block_number, times);
        }
    }

    /// Make head queries fail until reset
    pub fn fail_latest(&self, fail: bool) {
        if let Ok(mut chain) = self.chain.lock() {
            chain.fail_latest = fail;
        }
    }

    /// How many times `block_number` was requested, failed attempts included
    pub fn fetch_count(&self, block_number: u64) -> u32 {
        self.chain
            .lock()
            .map(|chain| chain.fetches.get(&block_number).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl BlockReader for MockReader {
    async fn latest_block_number(&self) -> Result<u64> {
        let chain = self.chain.lock().map_err(|_| Error::Lock)?;
        if chain.fail_latest {
            return Err(Error::Rpc("head unavailable".into()));
        }
        Ok(chain.latest)
    }

    async fn block_transactions(&self, block_number: u64) -> Result<Vec<Transaction>> {
        let mut chain = self.chain.lock().map_err(|_| Error::Lock)?;
        *chain.fetches.entry(block_number).or_insert(0) += 1;

        if let Some(remaining) = chain.failing_blocks.get_mut(&block_number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Rpc(format!("block {} unavailable", block_number)));
            }
        }

        Ok(chain.blocks.get(&block_number).cloned().unwrap_or_default())
    }
}
