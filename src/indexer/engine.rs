//! Indexing engine.
//!
//! Drives the block cursor through `Initializing → Polling ⇄ Backfilling`:
//!
//! - **Initializing** scans `[head - lookback, head]` once.
//! - **Polling** rescans `[cursor, head]` on every tick.
//! - **Backfilling** rescans `[cursor - lookback, cursor]` for each new
//!   subscription, concurrently with polling.
//!
//! Every scanned transaction goes through the same filter: it is archived
//! when its sender or recipient is watched at the moment it is looked at.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::chain::{BlockReader, Transaction};
use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use crate::indexer::retry::{RetryOutcome, RetryQueue};
use crate::indexer::stats::{Counters, EnginePhase, EngineStatistics};
use crate::notif::{self, Notifier, WireTransaction};
use crate::store::TransactionStore;
use crate::subscriptions::SubscriptionRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Blocks behind the head/cursor covered at startup and on subscribe
    pub lookback_blocks: u64,
    /// Time between polling ticks
    pub poll_interval: Duration,
    /// Upper bound on concurrently running backfills
    pub max_concurrent_backfills: usize,
    /// Retries granted to a skipped block
    pub max_block_retries: u32,
    /// Maximum number of skipped blocks awaiting retry
    pub retry_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&IndexerConfig::default())
    }
}

impl From<&IndexerConfig> for EngineConfig {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            lookback_blocks: config.lookback_blocks,
            poll_interval: config.poll_interval(),
            max_concurrent_backfills: config.max_concurrent_backfills.max(1),
            max_block_retries: config.max_block_retries,
            retry_queue_capacity: config.retry_queue_capacity,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RANGE REPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of scanning a block range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeReport {
    /// First block of the range
    pub start: u64,
    /// Last block of the range
    pub end: u64,
    /// Blocks fetched and filtered
    pub scanned: u64,
    /// Blocks whose fetch failed
    pub skipped: u64,
    /// Transactions newly archived
    pub archived: u64,
}

impl RangeReport {
    fn empty(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

struct EngineInner {
    config: EngineConfig,
    reader: Arc<dyn BlockReader>,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<dyn TransactionStore>,
    /// Highest block iterated over
    cursor: AtomicU64,
    /// Serializes cursor advances with the archive's block marker
    cursor_write: Mutex<()>,
    initialized: AtomicBool,
    retries: Mutex<RetryQueue>,
    backfill_permits: Arc<Semaphore>,
    /// Addresses with a backfill scheduled or running, with multiplicity
    backfilling: Mutex<HashMap<String, usize>>,
    backfill_done: Notify,
    counters: Counters,
    started_at: Instant,
}

/// Subscription-gated block indexer.
///
/// Cheap to clone: clones share the same cursor, registry and archive.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine over the given reader, registry and archive
    pub fn new(
        config: EngineConfig,
        reader: Arc<dyn BlockReader>,
        registry: Arc<SubscriptionRegistry>,
        store: Arc<dyn TransactionStore>,
    ) -> Self {
        let permits = config.max_concurrent_backfills.max(1);
        let retries = RetryQueue::new(config.retry_queue_capacity, config.max_block_retries);

        Self {
            inner: Arc::new(EngineInner {
                config,
                reader,
                registry,
                store,
                cursor: AtomicU64::new(0),
                cursor_write: Mutex::new(()),
                initialized: AtomicBool::new(false),
                retries: Mutex::new(retries),
                backfill_permits: Arc::new(Semaphore::new(permits)),
                backfilling: Mutex::new(HashMap::new()),
                backfill_done: Notify::new(),
                counters: Counters::default(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Watched addresses
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }

    /// Transaction archive
    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.inner.store
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Scan the blocks just behind the chain head and move to polling.
    ///
    /// Failing to read the head is fatal: the engine must not serve in a
    /// half-initialized state.
    pub async fn initialize(&self) -> Result<RangeReport> {
        let latest = self
            .inner
            .reader
            .latest_block_number()
            .await
            .map_err(|e| Error::Initialization(format!("cannot read chain head: {}", e)))?;

        let start = latest.saturating_sub(self.inner.config.lookback_blocks);
        info!(start, latest, "Initial scan");

        let report = self.index_range(start, latest).await;
        self.advance_cursor(latest);
        self.inner.initialized.store(true, Ordering::SeqCst);

        info!(
            scanned = report.scanned,
            skipped = report.skipped,
            archived = report.archived,
            "Initial scan complete"
        );
        Ok(report)
    }

    /// Run polling ticks until `shutdown` flips to true or its sender is dropped.
    ///
    /// Shutdown is observed between ticks only; a tick in progress finishes
    /// its whole range first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.inner.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial scan already covered it.
        interval.tick().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    info!("Checking for new transactions");
                    if let Err(e) = self.poll_once().await {
                        Counters::incr(&self.inner.counters.polls_failed);
                        warn!(error = %e, "Failed to read chain head, waiting for next tick");
                    }
                }
            }
        }

        info!("Polling stopped");
    }

    /// One polling tick: retry owed blocks, then scan `[cursor, head]`.
    ///
    /// Returns an error only when the head cannot be read, in which case the
    /// cursor is left untouched.
    pub async fn poll_once(&self) -> Result<RangeReport> {
        self.retry_skipped().await;

        let latest = self.inner.reader.latest_block_number().await?;
        let from = self.current_block();

        if latest < from {
            debug!(latest, cursor = from, "Chain head behind cursor");
            return Ok(RangeReport::empty(from, latest));
        }

        let report = self.index_range(from, latest).await;
        self.advance_cursor(latest);

        debug!(
            start = report.start,
            end = report.end,
            archived = report.archived,
            "Tick complete"
        );
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INDEXING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Scan `[start, end]` inclusive.
    ///
    /// A block whose fetch fails is skipped and queued for retry; the scan
    /// continues and the cursor still moves past it.
    pub async fn index_range(&self, start: u64, end: u64) -> RangeReport {
        let mut report = RangeReport::empty(start, end);
        if start > end {
            return report;
        }

        for block_number in start..=end {
            match self.index_block(block_number).await {
                Ok(archived) => {
                    report.scanned += 1;
                    report.archived += archived;
                    self.resolve_retry(block_number);
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(
                        block_number,
                        transient = e.is_transient(),
                        error = %e,
                        "Failed to get transactions for block, skipping"
                    );
                    self.queue_retry(block_number);
                }
            }
            self.advance_cursor(block_number);
        }

        report
    }

    async fn index_block(&self, block_number: u64) -> Result<u64> {
        debug!(block_number, "Updating block");
        let transactions = self.inner.reader.block_transactions(block_number).await?;

        let mut archived = 0;
        for tx in &transactions {
            if self.filter_and_persist(tx)? {
                archived += 1;
            }
        }

        Counters::incr(&self.inner.counters.blocks_scanned);
        debug!(
            block_number,
            transaction_count = transactions.len(),
            archived,
            "Written transactions for block"
        );
        Ok(archived)
    }

    /// Archive `tx` if its sender or recipient is watched right now.
    ///
    /// Returns whether the archive gained a new transaction.
    pub fn filter_and_persist(&self, tx: &Transaction) -> Result<bool> {
        let registry = &self.inner.registry;
        if !(registry.check(&tx.from)? || registry.check(&tx.to)?) {
            return Ok(false);
        }

        let saved = self.inner.store.save_transaction(tx)?;
        if saved {
            Counters::incr(&self.inner.counters.transactions_archived);
        }
        Ok(saved)
    }

    fn advance_cursor(&self, block_number: u64) {
        let _guard = match self.inner.cursor_write.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let previous = self.inner.cursor.fetch_max(block_number, Ordering::SeqCst);
        if block_number > previous {
            if let Err(e) = self.inner.store.save_block(block_number) {
                error!(block_number, error = %e, "Failed to persist cursor");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RETRIES
    // ═══════════════════════════════════════════════════════════════════════════

    fn with_retries<T>(&self, f: impl FnOnce(&mut RetryQueue) -> T) -> T {
        let mut queue = match self.inner.retries.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut queue)
    }

    /// Queue a block a scan just skipped. A block already owed a retry is
    /// not counted again.
    fn queue_retry(&self, block_number: u64) {
        let outcome = self.with_retries(|q| {
            if q.contains(block_number) {
                None
            } else {
                Some(q.enqueue(block_number))
            }
        });

        match outcome {
            None => {}
            Some(RetryOutcome::Queued(_)) => {
                Counters::incr(&self.inner.counters.blocks_skipped);
            }
            Some(RetryOutcome::Abandoned) => {
                Counters::incr(&self.inner.counters.blocks_skipped);
                self.abandon(block_number);
            }
        }
    }

    fn resolve_retry(&self, block_number: u64) {
        if self.with_retries(|q| q.resolve(block_number)) {
            info!(block_number, "Recovered skipped block");
        }
    }

    fn abandon(&self, block_number: u64) {
        Counters::incr(&self.inner.counters.blocks_abandoned);
        error!(block_number, "Giving up on block, its transactions will not be indexed");
    }

    async fn retry_skipped(&self) {
        for block_number in self.with_retries(|q| q.due()) {
            match self.index_block(block_number).await {
                Ok(_) => self.resolve_retry(block_number),
                Err(e) => {
                    Counters::incr(&self.inner.counters.retries_failed);
                    match self.with_retries(|q| q.record_failure(block_number)) {
                        RetryOutcome::Queued(attempts) => {
                            warn!(block_number, attempts, error = %e, "Retry failed");
                        }
                        RetryOutcome::Abandoned => self.abandon(block_number),
                    }
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUBSCRIPTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Watch `address` and backfill its recent history in the background.
    ///
    /// Returns `false`, and schedules nothing, if it is already watched.
    pub fn subscribe(&self, address: &str) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Internal("subscribe requires a tokio runtime".into()))?;

        if !self.inner.registry.add(address)? {
            return Ok(false);
        }

        let end = self.current_block();
        let start = end.saturating_sub(self.inner.config.lookback_blocks);
        info!(address, start, end, "Subscribed, scheduling backfill");
        self.spawn_backfill(&runtime, address.to_string(), start, end);
        Ok(true)
    }

    /// Stop watching `address`. Archived history is kept.
    pub fn unsubscribe(&self, address: &str) -> Result<bool> {
        let removed = self.inner.registry.remove(address)?;
        if removed {
            info!(address, "Unsubscribed");
        }
        Ok(removed)
    }

    fn spawn_backfill(&self, runtime: &tokio::runtime::Handle, address: String, start: u64, end: u64) {
        Counters::incr(&self.inner.counters.backfills_started);
        Counters::incr(&self.inner.counters.backfills_in_flight);
        self.mark_backfilling(&address, true);

        let engine = self.clone();
        runtime.spawn(async move {
            match Arc::clone(&engine.inner.backfill_permits).acquire_owned().await {
                Ok(_permit) => {
                    let report = engine.index_range(start, end).await;
                    if report.skipped > 0 {
                        warn!(
                            address = %address,
                            skipped = report.skipped,
                            "Backfill finished with skipped blocks"
                        );
                    } else {
                        info!(address = %address, archived = report.archived, "Backfill complete");
                    }
                }
                Err(_) => info!(address = %address, "Backfill cancelled by shutdown"),
            }

            engine.mark_backfilling(&address, false);
            engine
                .inner
                .counters
                .backfills_in_flight
                .fetch_sub(1, Ordering::SeqCst);
            engine.inner.backfill_done.notify_waiters();
        });
    }

    fn mark_backfilling(&self, address: &str, running: bool) {
        let mut backfilling = match self.inner.backfilling.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running {
            *backfilling.entry(address.to_string()).or_insert(0) += 1;
        } else if let Some(count) = backfilling.get_mut(address) {
            *count -= 1;
            if *count == 0 {
                backfilling.remove(address);
            }
        }
    }

    /// Stop starting backfills.
    ///
    /// Backfills already running finish their range. Queued ones, and any
    /// scheduled later, end without scanning. Subscriptions keep working.
    pub fn stop_backfills(&self) {
        self.inner.backfill_permits.close();
    }

    /// Wait until every scheduled backfill has finished, up to `timeout`.
    ///
    /// Returns `false` if backfills were still running when time ran out.
    pub async fn drain_backfills(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.backfill_done.notified();
                if Counters::get(&self.inner.counters.backfills_in_flight) == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Highest block iterated over. Never queries the chain.
    pub fn current_block(&self) -> u64 {
        self.inner.cursor.load(Ordering::SeqCst)
    }

    /// Wire records for `address`, or nothing if it is not watched
    pub fn transactions(&self, address: &str) -> Result<Vec<WireTransaction>> {
        if !self.inner.registry.check(address)? {
            return Ok(Vec::new());
        }
        let archived = self.inner.store.transactions(address)?;
        Ok(notif::project(&archived))
    }

    /// Lifecycle phase
    pub fn phase(&self) -> EnginePhase {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return EnginePhase::Initializing;
        }

        let backfilling = match self.inner.backfilling.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if backfilling.is_empty() {
            EnginePhase::Polling
        } else {
            let mut addresses: Vec<String> = backfilling.keys().cloned().collect();
            addresses.sort();
            EnginePhase::Backfilling(addresses)
        }
    }

    /// Point-in-time statistics
    pub fn statistics(&self) -> Result<EngineStatistics> {
        let counters = &self.inner.counters;
        Ok(EngineStatistics {
            phase: self.phase(),
            current_block: self.current_block(),
            subscriptions: self.inner.registry.len()?,
            watched: self.inner.registry.snapshot()?,
            blocks_scanned: Counters::get(&counters.blocks_scanned),
            blocks_skipped: Counters::get(&counters.blocks_skipped),
            retries_failed: Counters::get(&counters.retries_failed),
            blocks_abandoned: Counters::get(&counters.blocks_abandoned),
            blocks_pending_retry: self.with_retries(|q| q.len()),
            transactions_archived: Counters::get(&counters.transactions_archived),
            backfills_started: Counters::get(&counters.backfills_started),
            backfills_in_flight: Counters::get(&counters.backfills_in_flight),
            polls_failed: Counters::get(&counters.polls_failed),
            uptime_secs: self.inner.started_at.elapsed().as_secs(),
        })
    }
}

impl Notifier for Engine {
    fn current_block(&self) -> u64 {
        Engine::current_block(self)
    }

    fn subscribe(&self, address: &str) -> Result<bool> {
        Engine::subscribe(self, address)
    }

    fn transactions(&self, address: &str) -> Result<Vec<WireTransaction>> {
        Engine::transactions(self, address)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
