//! # txwatch
//!
//! Subscription-gated Ethereum transaction indexer.
//!
//! Clients subscribe to addresses; the indexer polls the chain head, scans
//! every new block, and archives each transaction whose sender or recipient
//! is watched. On subscribe it also scans a short window of recent blocks so
//! a new watcher sees some history.
//!
//! ## Architecture
//!
//! - **Chain**: JSON-RPC block reader and the transaction model
//! - **Subscriptions**: the set of watched addresses
//! - **Store**: per-address transaction archive and the persisted cursor
//! - **Indexer**: polling, backfill and retry of skipped blocks
//! - **Notif**: wire projection handed to notification consumers
//! - **Rpc**: HTTP surface
//!
//! ## Example
//!
//! ```rust,ignore
//! use txwatch::prelude::*;
//!
//! let reader = Arc::new(JsonRpcClient::new(RpcClientConfig::default())?);
//! let engine = Engine::new(
//!     EngineConfig::default(),
//!     reader,
//!     Arc::new(SubscriptionRegistry::new()),
//!     Arc::new(InMemoryTransactionStore::new()),
//! );
//!
//! engine.initialize().await?;
//! engine.subscribe("0x1234")?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod chain;
pub mod config;
pub mod error;
pub mod indexer;
pub mod notif;
pub mod rpc;
pub mod store;
pub mod subscriptions;

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::chain::{BlockReader, JsonRpcClient, MockReader, RpcClientConfig, Transaction};
    pub use crate::config::IndexerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::indexer::{Engine, EngineConfig, EnginePhase, EngineStatistics};
    pub use crate::notif::{Notifier, WireTransaction};
    pub use crate::store::{InMemoryTransactionStore, TransactionStore};
    pub use crate::subscriptions::SubscriptionRegistry;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "txwatch";
