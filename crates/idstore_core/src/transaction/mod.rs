//! Transactions, runners and retry.
//!
//! A unit of work is a closure receiving `&mut Transaction`:
//!
//! - a [`TransactionalRunner`] opens the outermost transaction, runs the
//!   closure, and commits or rolls back depending on how it returned
//! - nested units of work join the same transaction through
//!   [`Transaction::run_in_transaction`]; only the outermost call decides
//!   the outcome, and any nested failure dooms the whole chain
//! - [`RetryingRunner`] re-runs the whole outermost closure when the
//!   engine reports a transient conflict
//!
//! Rollback is guaranteed on every exit path, including panics.

mod context;
mod retry;
mod runner;

pub(crate) use context::TransactionGuard;
pub use context::{CommitMode, Transaction};
pub use retry::{RetryPolicy, RetryingRunner};
pub use runner::{EngineRunner, TransactionalRunner};
