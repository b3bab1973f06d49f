//! Volatile engine.

use super::session::Session;
use super::table::{Mutation, Row, TableSnapshot, TableStore};
use super::{CommitOutcome, StorageEngine};
use crate::config::MemoryConfig;
use crate::error::StoreResult;
use crate::types::{EngineId, EngineKind, SequenceNumber, TransactionId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Observer of in-memory commits.
///
/// Called under the engine's commit lock, once per commit, in sequence
/// order. Implementations must not block.
pub trait CommitListener: Send + Sync + fmt::Debug {
    /// Reports one applied commit.
    fn on_commit(&self, sequence: SequenceNumber, mutations: &[Mutation]);
}

/// Fast volatile engine.
#[derive(Debug)]
pub struct MemoryEngine {
    id: EngineId,
    tables: Arc<TableStore>,
    listener: RwLock<Option<Arc<dyn CommitListener>>>,
    txn_ids: AtomicU64,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: EngineId::fresh(),
            tables: Arc::new(TableStore::new()),
            listener: RwLock::new(None),
            txn_ids: AtomicU64::new(1),
        }
    }

    /// Creates an empty engine for the configured cluster.
    #[must_use]
    pub fn open(config: &MemoryConfig) -> Self {
        let engine = Self::new();
        info!(
            engine = %engine.id,
            cluster = %config.cluster_name,
            members = config.members.len(),
            "in-memory engine opened"
        );
        engine
    }

    /// Registers the commit listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn CommitListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Removes the commit listener.
    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    /// Loads rows into `table` outside any transaction.
    ///
    /// Listeners are not notified. Later key allocations continue above the
    /// largest loaded key.
    pub fn load_rows(&self, table: &str, rows: Vec<Row>) {
        self.tables.load(table, rows, 0);
    }

    /// Loads table images taken from another engine, key counters
    /// included. Listeners are not notified.
    pub(crate) fn load_snapshot(&self, images: Vec<TableSnapshot>) {
        for image in images {
            self.tables.load(&image.name, image.rows, image.last_key);
        }
    }
}

impl StorageEngine for MemoryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::InMemory
    }

    fn id(&self) -> EngineId {
        self.id
    }

    fn tables(&self) -> &Arc<TableStore> {
        &self.tables
    }

    fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.txn_ids.fetch_add(1, Ordering::Relaxed))
    }

    fn open_session(&self) -> StoreResult<Session> {
        Ok(Session::new(self.id, Arc::clone(&self.tables), None))
    }

    fn commit(&self, session: &mut Session) -> StoreResult<CommitOutcome> {
        let (reads, writes) = session.take();
        let listener = self.listener.read().clone();
        let result = self.tables.commit(
            &reads,
            &writes,
            |_, _| Ok(()),
            |sequence, mutations| {
                if let Some(listener) = &listener {
                    listener.on_commit(sequence, mutations);
                }
            },
        )?;
        Ok(CommitOutcome::from_commit(result))
    }
}
