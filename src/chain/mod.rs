//! Blockchain reader boundary.
//!
//! The indexer only ever asks two questions of the chain: how high is the
//! head, and what transactions does block `n` hold. [`BlockReader`] captures
//! that contract; [`client::JsonRpcClient`] answers it over JSON-RPC and
//! [`mock::MockReader`] answers it from memory.

use async_trait::async_trait;

use crate::error::Result;

pub mod client;
pub mod mock;
pub mod types;

pub use client::{JsonRpcClient, RpcClientConfig};
pub use mock::MockReader;
pub use types::Transaction;

/// Read access to a chain node
#[async_trait]
pub trait BlockReader: Send + Sync {
    /// Height of the current chain head
    async fn latest_block_number(&self) -> Result<u64>;

    /// All transactions in `block_number`, in block order
    async fn block_transactions(&self, block_number: u64) -> Result<Vec<Transaction>>;
}
