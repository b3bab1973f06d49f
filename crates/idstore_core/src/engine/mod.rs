//! Backing engines.
//!
//! Both engines keep their rows in a [`TableStore`] and expose the same
//! [`StorageEngine`] contract, so DAOs and runners never branch on the
//! engine kind:
//!
//! - [`MemoryEngine`] - volatile; optionally reports commits to a
//!   [`CommitListener`] (the flush sink in hybrid mode)
//! - [`RelationalEngine`] - journals every commit through an
//!   `idstore_storage` backend before applying it, and replays the journal
//!   on open
//!
//! Isolation is optimistic: sessions buffer writes and record what they
//! read; the commit validates those reads under the table lock and fails
//! with a transient conflict if anything changed.

#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod pool;
mod relational;
mod session;
mod table;

pub use memory::{CommitListener, MemoryEngine};
pub use pool::{ConnectionPool, Lease};
pub use relational::RelationalEngine;
pub use session::Session;
pub use table::{Mutation, MutationKind, Row, TableStore};

use crate::error::StoreResult;
use crate::types::{EngineId, EngineKind, SequenceNumber, TransactionId};
use std::fmt;
use std::sync::Arc;

/// Result of committing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    /// Sequence of the commit; `None` if the session had no writes.
    pub sequence: Option<SequenceNumber>,
    /// Number of rows written.
    pub mutations: usize,
}

impl CommitOutcome {
    fn from_commit(result: Option<(SequenceNumber, Vec<table::Mutation>)>) -> Self {
        match result {
            Some((sequence, mutations)) => Self {
                sequence: Some(sequence),
                mutations: mutations.len(),
            },
            None => Self::default(),
        }
    }
}

/// A backing engine.
///
/// # Invariants
///
/// - `commit` applies all buffered writes of a session or none of them
/// - `commit` leaves the session empty whether it succeeds or fails
/// - commits are totally ordered by their sequence numbers
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Engine kind.
    fn kind(&self) -> EngineKind;

    /// Identity of this engine instance.
    fn id(&self) -> EngineId;

    /// Committed tables.
    fn tables(&self) -> &Arc<TableStore>;

    /// Allocates a transaction ID.
    fn next_transaction_id(&self) -> TransactionId;

    /// Opens a session.
    ///
    /// # Errors
    ///
    /// Returns a transient conflict if the engine has no free connection.
    fn open_session(&self) -> StoreResult<Session>;

    /// Commits the session's buffered writes.
    ///
    /// # Errors
    ///
    /// Returns a transient conflict if the session read stale data, or a
    /// fatal error if the commit could not be made durable.
    fn commit(&self, session: &mut Session) -> StoreResult<CommitOutcome>;

    /// Discards the session's buffered writes.
    fn rollback(&self, session: &mut Session) {
        session.clear();
    }
}
