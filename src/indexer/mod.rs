//! Block indexing.
//!
//! ## Components
//!
//! - **Engine**: cursor state machine, polling ticks and subscription backfills
//! - **Retry**: skipped blocks owed a rescan
//! - **Stats**: counters and the status snapshot

pub mod engine;
pub mod retry;
pub mod stats;

pub use engine::{Engine, EngineConfig, RangeReport};
pub use retry::{RetryOutcome, RetryQueue};
pub use stats::{EnginePhase, EngineStatistics};
