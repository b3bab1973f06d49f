//! Write-behind replication from the in-memory engine to the relational
//! engine.
//!
//! The sink is registered as the [`CommitListener`] of the in-memory engine.
//! Each commit is queued as one [`FlushRecord`] per written row, under the
//! engine's commit lock, so the queue holds records in commit order. A
//! single worker thread (`idstore-flush`) takes batches off the queue and
//! applies each batch in one relational transaction with upsert semantics:
//!
//! - create/update of a present key updates it, of an absent key creates it
//!   under the same key
//! - delete of an absent key is skipped
//!
//! Re-applying a record is harmless, so delivery is at-least-once. A batch
//! that still hits transient conflicts after the flush retry policy goes
//! back to the front of the queue and is tried again after a backoff, for
//! as long as it takes. Only a non-transient failure drops a batch; the
//! next [`FlushSink::drain`] reports it.
//!
//! Producers never block on the worker. The queue is unbounded;
//! `queue_high_water` only controls when a warning is logged.

use crate::config::FlushConfig;
use crate::engine::{CommitListener, Mutation, MutationKind, RelationalEngine, StorageEngine};
use crate::error::{StoreError, StoreResult};
use crate::transaction::{EngineRunner, RetryingRunner, TransactionalRunner};
use crate::types::SequenceNumber;
use idstore_storage::StorageError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One row change waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRecord {
    /// Sequence of the in-memory commit that produced the change.
    pub sequence: SequenceNumber,
    /// The change.
    pub mutation: Mutation,
}

/// Flush sink counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Records accepted into the queue.
    pub enqueued: u64,
    /// Records persisted.
    pub applied: u64,
    /// Records dropped after a non-transient failure.
    pub failed: u64,
    /// Records refused because the sink was stopped.
    pub rejected: u64,
    /// Batches committed.
    pub batches: u64,
    /// Batches put back on the queue after transient failures.
    pub requeued: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<FlushRecord>,
    in_flight: usize,
    stopped: bool,
    above_high_water: bool,
    dropped_since_drain: u64,
    last_failure: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    batches: AtomicU64,
    requeued: AtomicU64,
}

/// How one batch ended.
#[derive(Debug)]
enum BatchOutcome {
    Applied,
    Retry(StoreError),
    Dropped(String),
}

#[derive(Debug)]
struct SinkInner {
    state: Mutex<QueueState>,
    work_ready: Condvar,
    drained: Condvar,
    counters: Counters,
    config: FlushConfig,
    target: Arc<RelationalEngine>,
}

/// Queue and worker persisting in-memory commits to the relational engine.
#[derive(Debug)]
pub struct FlushSink {
    inner: Arc<SinkInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FlushSink {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(target: Arc<RelationalEngine>, config: FlushConfig) -> StoreResult<Arc<Self>> {
        let inner = Arc::new(SinkInner {
            state: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            drained: Condvar::new(),
            counters: Counters::default(),
            config,
            target,
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("idstore-flush".into())
            .spawn(move || worker_loop(&worker_inner))
            .map_err(|e| StoreError::Storage(StorageError::Io(e)))?;

        info!(
            batch_size = inner.config.batch_size,
            high_water = inner.config.queue_high_water,
            "flush sink started"
        );
        Ok(Arc::new(Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }))
    }

    /// Queues the changes of one commit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FlushStopped`] once the sink is stopped; the
    /// records are counted as rejected.
    pub fn offer(&self, sequence: SequenceNumber, mutations: &[Mutation]) -> StoreResult<()> {
        let count = mutations.len() as u64;
        {
            let mut state = self.inner.state.lock();
            if state.stopped {
                self.inner.counters.rejected.fetch_add(count, Ordering::Relaxed);
                return Err(StoreError::FlushStopped);
            }

            state.queue.extend(mutations.iter().map(|m| FlushRecord {
                sequence,
                mutation: m.clone(),
            }));
            self.inner.counters.enqueued.fetch_add(count, Ordering::Relaxed);

            let depth = state.queue.len();
            if depth > self.inner.config.queue_high_water && !state.above_high_water {
                state.above_high_water = true;
                warn!(
                    depth,
                    high_water = self.inner.config.queue_high_water,
                    "flush queue above high-water mark"
                );
            }
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Blocks until every record queued before the call is persisted or
    /// dropped. The worker keeps running.
    ///
    /// Transient failures never end the wait; the worker retries until the
    /// relational engine accepts the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FlushFailed`] if records were dropped since the
    /// previous drain.
    pub fn drain(&self) -> StoreResult<()> {
        let mut state = self.inner.state.lock();
        while !state.queue.is_empty() || state.in_flight > 0 {
            self.inner.drained.wait(&mut state);
        }
        if state.dropped_since_drain == 0 {
            return Ok(());
        }
        let records = std::mem::take(&mut state.dropped_since_drain);
        let reason = state.last_failure.take().unwrap_or_default();
        Err(StoreError::FlushFailed { records, reason })
    }

    /// Drains the queue, stops the worker and returns the final counters.
    ///
    /// Later offers are rejected. Calling it again only returns the
    /// counters. Dropped records show up in [`FlushStats::failed`].
    pub fn drain_and_stop(&self) -> FlushStats {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            self.inner.work_ready.notify_all();
        }

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("flush worker terminated abnormally");
            }
            let stats = self.stats();
            info!(
                applied = stats.applied,
                failed = stats.failed,
                batches = stats.batches,
                requeued = stats.requeued,
                "flush sink stopped"
            );
        }
        self.stats()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> FlushStats {
        let c = &self.inner.counters;
        FlushStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            applied: c.applied.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
            requeued: c.requeued.load(Ordering::Relaxed),
        }
    }

    /// Records waiting or being applied.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        let state = self.inner.state.lock();
        state.queue.len() + state.in_flight
    }

    /// Whether the sink still accepts records.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.state.lock().stopped
    }
}

impl CommitListener for FlushSink {
    fn on_commit(&self, sequence: SequenceNumber, mutations: &[Mutation]) {
        if let Err(err) = self.offer(sequence, mutations) {
            warn!(%sequence, rows = mutations.len(), error = %err, "commit not queued for flushing");
        }
    }
}

impl Drop for FlushSink {
    fn drop(&mut self) {
        self.drain_and_stop();
    }
}

fn worker_loop(inner: &SinkInner) {
    let mut failures: u32 = 0;
    loop {
        let batch: Vec<FlushRecord> = {
            let mut state = inner.state.lock();
            loop {
                if !state.queue.is_empty() {
                    let n = state.queue.len().min(inner.config.batch_size.max(1));
                    let batch: Vec<FlushRecord> = state.queue.drain(..n).collect();
                    state.in_flight = batch.len();
                    break batch;
                }
                if state.stopped {
                    return;
                }
                inner
                    .work_ready
                    .wait_for(&mut state, inner.config.flush_interval);
            }
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| inner.apply(&batch)))
            .unwrap_or_else(|_| BatchOutcome::Dropped("flush batch panicked".into()));

        let mut backoff = None;
        let mut state = inner.state.lock();
        state.in_flight = 0;
        match outcome {
            BatchOutcome::Applied => failures = 0,
            BatchOutcome::Retry(err) => {
                failures = failures.saturating_add(1);
                let delay = inner.retry_delay(failures);
                warn!(
                    records = batch.len(),
                    failures,
                    ?delay,
                    error = %err,
                    "flush batch requeued"
                );
                inner.counters.requeued.fetch_add(1, Ordering::Relaxed);
                for record in batch.into_iter().rev() {
                    state.queue.push_front(record);
                }
                backoff = Some(delay);
            }
            BatchOutcome::Dropped(reason) => {
                failures = 0;
                let count = batch.len() as u64;
                inner.counters.failed.fetch_add(count, Ordering::Relaxed);
                error!(records = count, %reason, "flush batch dropped");
                state.dropped_since_drain += count;
                state.last_failure = Some(reason);
            }
        }
        if state.queue.is_empty() {
            state.above_high_water = false;
            inner.drained.notify_all();
        }
        drop(state);

        if let Some(delay) = backoff {
            thread::sleep(delay);
        }
    }
}

impl SinkInner {
    fn apply(&self, batch: &[FlushRecord]) -> BatchOutcome {
        let engine: Arc<dyn StorageEngine> = Arc::clone(&self.target) as Arc<dyn StorageEngine>;
        let runner = RetryingRunner::new(EngineRunner::new(engine), self.config.retry.clone());

        let result = runner.run_in_transaction(|tx| {
            let session = tx.session_mut();
            for record in batch {
                let m = &record.mutation;
                match m.kind {
                    MutationKind::Create | MutationKind::Update => session.upsert(
                        &m.table,
                        m.key,
                        m.name.clone(),
                        m.payload.clone().unwrap_or_default(),
                    ),
                    MutationKind::Delete => {
                        session.remove_if_present(&m.table, m.key);
                    }
                }
            }
            Ok(())
        });

        let count = batch.len() as u64;
        let first = batch.first().map(|r| r.sequence);
        let last = batch.last().map(|r| r.sequence);
        match result {
            Ok(()) => {
                self.counters.applied.fetch_add(count, Ordering::Relaxed);
                self.counters.batches.fetch_add(1, Ordering::Relaxed);
                debug!(records = count, ?first, ?last, "flush batch applied");
                BatchOutcome::Applied
            }
            Err(err @ StoreError::RetriesExhausted { .. }) => BatchOutcome::Retry(err),
            Err(err) if err.is_transient() => BatchOutcome::Retry(err),
            Err(err) => BatchOutcome::Dropped(err.to_string()),
        }
    }

    /// Pause before retrying a requeued batch after `failures` consecutive
    /// failed rounds.
    fn retry_delay(&self, failures: u32) -> Duration {
        self.config
            .retry
            .delay_for_attempt(failures)
            .max(self.config.flush_interval)
    }
}
