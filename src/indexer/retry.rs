//! Queue of blocks whose fetch failed and are owed a rescan.

use std::collections::BTreeMap;

/// Result of handing a block to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The block will be revisited; carries retries spent so far
    Queued(u32),
    /// The block will not be revisited
    Abandoned,
}

/// Bounded set of skipped block numbers with per-block attempt counts.
///
/// Blocks are revisited lowest first. A block leaves the queue when a fetch
/// succeeds or when it has used up `max_attempts` retries.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    pending: BTreeMap<u64, u32>,
    capacity: usize,
    max_attempts: u32,
}

impl RetryQueue {
    /// Create a queue holding at most `capacity` blocks
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            capacity,
            max_attempts,
        }
    }

    /// Register a block that was just skipped.
    ///
    /// A block already queued keeps its attempt count.
    pub fn enqueue(&mut self, block_number: u64) -> RetryOutcome {
        if let Some(attempts) = self.pending.get(&block_number) {
            return RetryOutcome::Queued(*attempts);
        }
        if self.max_attempts == 0 || self.pending.len() >= self.capacity {
            return RetryOutcome::Abandoned;
        }
        self.pending.insert(block_number, 0);
        RetryOutcome::Queued(0)
    }

    /// Record a failed retry of `block_number`
    pub fn record_failure(&mut self, block_number: u64) -> RetryOutcome {
        let Some(attempts) = self.pending.get_mut(&block_number) else {
            return RetryOutcome::Abandoned;
        };
        *attempts += 1;
        if *attempts >= self.max_attempts {
            self.pending.remove(&block_number);
            RetryOutcome::Abandoned
        } else {
            RetryOutcome::Queued(*attempts)
        }
    }

    /// Drop `block_number` after a successful fetch. Returns whether it was owed.
    pub fn resolve(&mut self, block_number: u64) -> bool {
        self.pending.remove(&block_number).is_some()
    }

    /// Check if `block_number` is owed a retry
    pub fn contains(&self, block_number: u64) -> bool {
        self.pending.contains_key(&block_number)
    }

    /// Blocks currently owed, lowest first
    pub fn due(&self) -> Vec<u64> {
        self.pending.keys().copied().collect()
    }

    /// Number of owed blocks
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is owed
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
