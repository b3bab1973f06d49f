//! The transaction context passed through a unit of work.

use crate::engine::{CommitOutcome, Session, StorageEngine};
use crate::error::{StoreError, StoreResult};
use crate::types::{EngineId, EngineKind, TransactionId};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How the outermost call of a chain ends a successful unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Commit on normal return.
    AutoCommit,
    /// Keep only what [`Transaction::commit`] made durable.
    ManualCommit,
}

#[derive(Debug, Clone)]
struct RollbackMark {
    reason: String,
    transient: bool,
}

/// An active transaction.
///
/// Created by a [`crate::TransactionalRunner`] for each top-level call and
/// handed to the work closure by `&mut`. Nested units of work run through
/// [`Transaction::run_in_transaction`] and friends and share this context:
/// nesting only moves the depth counter, never the commit boundary.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    engine: Arc<dyn StorageEngine>,
    session: Session,
    depth: u32,
    mode: CommitMode,
    committed_mid_flight: bool,
    rollback: Option<RollbackMark>,
}

impl Transaction {
    pub(crate) fn begin(engine: Arc<dyn StorageEngine>, mode: CommitMode) -> StoreResult<Self> {
        let session = engine.open_session()?;
        let id = engine.next_transaction_id();
        trace!(txn = %id, engine = %engine.kind(), ?mode, "transaction started");
        Ok(Self {
            id,
            engine,
            session,
            depth: 1,
            mode,
            committed_mid_flight: false,
            rollback: None,
        })
    }

    /// Transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Nesting depth; 1 for the outermost unit of work.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Commit mode of the outermost call.
    #[must_use]
    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    /// Kind of the engine this transaction runs on.
    #[must_use]
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Identity of the engine this transaction runs on.
    #[must_use]
    pub fn engine_id(&self) -> EngineId {
        self.engine.id()
    }

    /// True once [`Transaction::commit`] succeeded at least once.
    #[must_use]
    pub fn committed_mid_flight(&self) -> bool {
        self.committed_mid_flight
    }

    /// True if the transaction can no longer commit.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.rollback.is_some()
    }

    /// True if writes are buffered since the last commit.
    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        self.session.has_writes()
    }

    /// Marks the whole chain for rollback.
    ///
    /// The outermost call rolls back and fails with
    /// [`StoreError::RolledBack`] even if the work returns normally.
    pub fn set_rollback_only(&mut self, reason: impl Into<String>) {
        self.mark_rollback(reason.into(), false);
    }

    fn mark_rollback(&mut self, reason: String, transient: bool) {
        if self.rollback.is_none() {
            debug!(txn = %self.id, depth = self.depth, %reason, "transaction marked rollback-only");
            self.rollback = Some(RollbackMark { reason, transient });
        }
    }

    /// Makes every write so far durable as one physical commit.
    ///
    /// The transaction stays open; later writes form a new segment. A
    /// failed commit loses the segment and marks the chain for rollback,
    /// so nothing written after it can commit either.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::RolledBack`] if the transaction is
    /// rollback-only, or with the engine's commit error.
    pub fn commit(&mut self) -> StoreResult<()> {
        if let Some(mark) = &self.rollback {
            return Err(StoreError::rolled_back(mark.reason.clone()));
        }
        if let Err(err) = self.commit_segment() {
            self.mark_rollback(format!("commit failed: {err}"), err.is_transient());
            return Err(err);
        }
        self.committed_mid_flight = true;
        Ok(())
    }

    fn commit_segment(&mut self) -> StoreResult<CommitOutcome> {
        let outcome = self.engine.commit(&mut self.session)?;
        trace!(
            txn = %self.id,
            sequence = ?outcome.sequence,
            rows = outcome.mutations,
            "transaction segment committed"
        );
        Ok(outcome)
    }

    fn discard(&mut self) {
        self.engine.rollback(&mut self.session);
    }

    /// Runs a nested unit of work that joins this transaction.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, after marking the chain for rollback.
    pub fn run_in_transaction<F>(&mut self, work: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Transaction) -> StoreResult<()>,
    {
        self.run_nested(work)
    }

    /// Runs a nested unit of work that joins this transaction and returns a
    /// value.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, after marking the chain for rollback.
    pub fn run_in_transaction_ret<R, F>(&mut self, work: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Transaction) -> StoreResult<R>,
    {
        self.run_nested(work)
    }

    /// Runs a nested manual-commit unit of work.
    ///
    /// Joining an existing transaction keeps the outermost call's commit
    /// mode; only an explicit [`Transaction::commit`] moves the boundary.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, after marking the chain for rollback.
    pub fn run_in_transaction_no_auto_commit<F>(&mut self, work: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Transaction) -> StoreResult<()>,
    {
        self.run_nested(work)
    }

    fn run_nested<R, F>(&mut self, work: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Transaction) -> StoreResult<R>,
    {
        self.depth += 1;
        trace!(txn = %self.id, depth = self.depth, "joined transaction");
        let result = work(self);
        self.depth -= 1;
        if let Err(err) = &result {
            self.mark_rollback(err.to_string(), err.is_transient());
        }
        result
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Ends the transaction according to how `work` returned.
    fn finish<R>(&mut self, result: StoreResult<R>) -> StoreResult<R> {
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                self.discard();
                trace!(txn = %self.id, error = %err, "transaction rolled back");
                return Err(err);
            }
        };

        if let Some(mark) = self.rollback.take() {
            self.discard();
            trace!(txn = %self.id, reason = %mark.reason, "rollback-only transaction rolled back");
            return Err(if mark.transient {
                StoreError::transient(format!("unit of work failed: {}", mark.reason))
            } else {
                StoreError::rolled_back(mark.reason)
            });
        }

        match self.mode {
            CommitMode::AutoCommit => {
                self.commit_segment()?;
            }
            CommitMode::ManualCommit => {
                if self.session.has_writes() {
                    debug!(
                        txn = %self.id,
                        rows = self.session.write_count(),
                        "discarding writes made after the last commit"
                    );
                }
                self.discard();
            }
        }
        Ok(value)
    }
}

/// Owns the outermost transaction of a call chain.
///
/// Rolls back on drop unless the transaction was finished, so a panic in
/// the work closure never leaves buffered writes behind.
pub(crate) struct TransactionGuard {
    tx: Transaction,
    finished: bool,
}

impl TransactionGuard {
    pub(crate) fn begin(engine: Arc<dyn StorageEngine>, mode: CommitMode) -> StoreResult<Self> {
        Ok(Self {
            tx: Transaction::begin(engine, mode)?,
            finished: false,
        })
    }

    pub(crate) fn tx(&mut self) -> &mut Transaction {
        &mut self.tx
    }

    pub(crate) fn finish<R>(mut self, result: StoreResult<R>) -> StoreResult<R> {
        self.finished = true;
        self.tx.finish(result)
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.finished {
            if std::thread::panicking() {
                warn!(txn = %self.tx.id, "rolling back transaction after panic");
            }
            self.tx.discard();
        }
    }
}
