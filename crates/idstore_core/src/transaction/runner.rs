//! Entry points that open transactions.

use super::context::{CommitMode, Transaction, TransactionGuard};
use crate::engine::StorageEngine;
use crate::error::StoreResult;
use std::sync::Arc;

/// Runs units of work inside transactions.
///
/// Top-level work is `FnMut` because a retrying runner may execute it more
/// than once; it must be idempotent with respect to non-storage side
/// effects. Nested work joins the active context through the methods of
/// [`Transaction`] instead.
pub trait TransactionalRunner {
    /// Runs `work` in a fresh transaction with the given commit mode.
    ///
    /// # Errors
    ///
    /// Returns the error of `work` or of the final commit. The transaction
    /// is rolled back on every error path.
    fn run<T, F>(&self, mode: CommitMode, work: F) -> StoreResult<T>
    where
        F: FnMut(&mut Transaction) -> StoreResult<T>;

    /// Runs `work` and commits on normal return.
    ///
    /// # Errors
    ///
    /// See [`TransactionalRunner::run`].
    fn run_in_transaction<F>(&self, work: F) -> StoreResult<()>
    where
        F: FnMut(&mut Transaction) -> StoreResult<()>,
    {
        self.run(CommitMode::AutoCommit, work)
    }

    /// Runs `work`, commits on normal return and passes its value through.
    ///
    /// # Errors
    ///
    /// See [`TransactionalRunner::run`].
    fn run_in_transaction_ret<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnMut(&mut Transaction) -> StoreResult<T>,
    {
        self.run(CommitMode::AutoCommit, work)
    }

    /// Runs `work`; only writes it commits explicitly survive.
    ///
    /// # Errors
    ///
    /// See [`TransactionalRunner::run`].
    fn run_in_transaction_no_auto_commit<F>(&self, work: F) -> StoreResult<()>
    where
        F: FnMut(&mut Transaction) -> StoreResult<()>,
    {
        self.run(CommitMode::ManualCommit, work)
    }
}

/// Runner bound to one engine. Runs every unit of work exactly once.
#[derive(Debug, Clone)]
pub struct EngineRunner {
    engine: Arc<dyn StorageEngine>,
}

impl EngineRunner {
    /// Creates a runner for `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// The engine transactions are opened on.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }
}

impl TransactionalRunner for EngineRunner {
    fn run<T, F>(&self, mode: CommitMode, mut work: F) -> StoreResult<T>
    where
        F: FnMut(&mut Transaction) -> StoreResult<T>,
    {
        let mut guard = TransactionGuard::begin(Arc::clone(&self.engine), mode)?;
        let result = work(guard.tx());
        guard.finish(result)
    }
}

impl<R: TransactionalRunner + ?Sized> TransactionalRunner for &R {
    fn run<T, F>(&self, mode: CommitMode, work: F) -> StoreResult<T>
    where
        F: FnMut(&mut Transaction) -> StoreResult<T>,
    {
        (**self).run(mode, work)
    }
}
