//! Engine counters and the status snapshot built from them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "addresses")]
pub enum EnginePhase {
    /// Initial scan behind the chain head has not finished
    Initializing,
    /// Regular ticks only
    Polling,
    /// Backfills running for these addresses
    Backfilling(Vec<String>),
}

/// Monotonic counters updated from the poll loop and backfill tasks
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub blocks_scanned: AtomicU64,
    pub blocks_skipped: AtomicU64,
    pub blocks_abandoned: AtomicU64,
    pub retries_failed: AtomicU64,
    pub transactions_archived: AtomicU64,
    pub backfills_started: AtomicU64,
    pub backfills_in_flight: AtomicU64,
    pub polls_failed: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Lifecycle phase
    pub phase: EnginePhase,
    /// Highest block iterated over
    pub current_block: u64,
    /// Number of watched addresses
    pub subscriptions: usize,
    /// Watched addresses, sorted
    pub watched: Vec<String>,
    /// Blocks fetched and filtered, rescans included
    pub blocks_scanned: u64,
    /// Blocks skipped by a scan. A block is counted once until it recovers,
    /// however many scans fail on it meanwhile.
    pub blocks_skipped: u64,
    /// Retry fetches of skipped blocks that failed again
    pub retries_failed: u64,
    /// Skipped blocks given up on
    pub blocks_abandoned: u64,
    /// Skipped blocks still owed a retry
    pub blocks_pending_retry: usize,
    /// Distinct transactions written to the archive
    pub transactions_archived: u64,
    /// Backfills scheduled since start
    pub backfills_started: u64,
    /// Backfills not yet finished
    pub backfills_in_flight: u64,
    /// Ticks that could not read the chain head
    pub polls_failed: u64,
    /// Seconds since the engine was built
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_value(EnginePhase::Polling).unwrap(),
            serde_json::json!({ "state": "polling" })
        );
        assert_eq!(
            serde_json::to_value(EnginePhase::Backfilling(vec!["0xaa".into()])).unwrap(),
            serde_json::json!({ "state": "backfilling", "addresses": ["0xaa"] })
        );
    }

    #[test]
    fn test_counters() {
        let counters = Counters::default();
        Counters::incr(&counters.blocks_scanned);
        Counters::incr(&counters.blocks_scanned);
        assert_eq!(Counters::get(&counters.blocks_scanned), 2);
        assert_eq!(Counters::get(&counters.polls_failed), 0);
    }
}
