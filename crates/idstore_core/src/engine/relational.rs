//! Durable journal-backed engine.

use super::pool::ConnectionPool;
use super::session::Session;
use super::table::{Mutation, TableSnapshot, TableStore};
use super::{CommitOutcome, StorageEngine};
use crate::config::{JournalLocation, RelationalConfig};
use crate::error::{StoreError, StoreResult};
use crate::types::{EngineId, EngineKind, SequenceNumber, TransactionId};
use idstore_codec::{from_cbor, to_cbor};
use idstore_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// One journal frame.
#[derive(Debug, Serialize, Deserialize)]
enum JournalRecord {
    Commit {
        sequence: SequenceNumber,
        mutations: Vec<Mutation>,
    },
    Snapshot {
        sequence: SequenceNumber,
        tables: Vec<TableSnapshot>,
    },
}

/// Durable engine.
///
/// Every commit is encoded as one journal frame and appended (and, with
/// `sync_on_commit`, synced) before it becomes visible. A commit that fails
/// after its frame was appended cuts the frame off again; if even that
/// fails, the engine refuses further commits until it is reopened. Opening
/// the engine replays the journal; [`RelationalEngine::checkpoint`]
/// compacts it.
pub struct RelationalEngine {
    id: EngineId,
    tables: Arc<TableStore>,
    journal: Mutex<Box<dyn StorageBackend>>,
    pool: ConnectionPool,
    sync_on_commit: bool,
    txn_ids: AtomicU64,
    poisoned: AtomicBool,
}

impl fmt::Debug for RelationalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalEngine")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .field("sync_on_commit", &self.sync_on_commit)
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}

impl RelationalEngine {
    /// Opens the engine at the configured journal URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the journal is locked by
    /// another process, or a journal frame cannot be decoded.
    pub fn open(config: &RelationalConfig) -> StoreResult<Self> {
        let backend: Box<dyn StorageBackend> = match config.location()? {
            JournalLocation::Memory => Box::new(InMemoryBackend::new()),
            JournalLocation::File(path) => Box::new(FileBackend::open_with_create_dirs(&path)?),
        };
        Self::with_backend(backend, config)
    }

    /// Opens the engine over an existing journal backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a journal frame cannot be read or decoded.
    pub fn with_backend(
        backend: Box<dyn StorageBackend>,
        config: &RelationalConfig,
    ) -> StoreResult<Self> {
        let tables = Arc::new(TableStore::new());
        let frames = backend.read_frames()?;

        for frame in &frames {
            match from_cbor::<JournalRecord>(frame)? {
                JournalRecord::Commit {
                    sequence,
                    mutations,
                } => tables.replay(sequence, &mutations),
                JournalRecord::Snapshot {
                    sequence,
                    tables: images,
                } => tables.restore(sequence, images),
            }
        }

        let engine = Self {
            id: EngineId::fresh(),
            tables,
            journal: Mutex::new(backend),
            pool: ConnectionPool::new(config.max_connections, config.acquire_timeout),
            sync_on_commit: config.sync_on_commit,
            txn_ids: AtomicU64::new(1),
            poisoned: AtomicBool::new(false),
        };
        info!(
            engine = %engine.id,
            url = %config.url,
            frames = frames.len(),
            sequence = %engine.tables.last_sequence(),
            "relational engine opened"
        );
        Ok(engine)
    }

    /// Rewrites the journal as a single snapshot frame.
    ///
    /// Commits wait until the rewrite finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or written.
    pub fn checkpoint(&self) -> StoreResult<()> {
        self.tables.with_snapshot(|sequence, tables| {
            let frame = to_cbor(&JournalRecord::Snapshot { sequence, tables })?;
            let mut journal = self.journal.lock();
            let before = journal.size()?;
            journal.rewrite(&[frame])?;
            journal.sync()?;
            info!(%sequence, before, after = journal.size()?, "journal checkpointed");
            Ok(())
        })
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn journal_size(&self) -> StoreResult<u64> {
        Ok(self.journal.lock().size()?)
    }

    /// The connection pool.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// True once a failed commit could not be removed from the journal.
    /// Every later commit fails until the engine is reopened.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Appends and syncs one commit frame, taking it back on failure.
    fn journal_commit(&self, sequence: SequenceNumber, mutations: &[Mutation]) -> StoreResult<()> {
        let frame = to_cbor(&JournalRecord::Commit {
            sequence,
            mutations: mutations.to_vec(),
        })?;
        let mut journal = self.journal.lock();
        let offset = journal.append_frame(&frame)?;
        if self.sync_on_commit {
            if let Err(err) = journal.sync() {
                if let Err(undo) = journal.truncate(offset) {
                    self.poisoned.store(true, Ordering::Release);
                    error!(
                        %sequence,
                        offset,
                        error = %undo,
                        "failed commit left in journal; engine poisoned"
                    );
                }
                return Err(err.into());
            }
        }
        debug!(%sequence, rows = mutations.len(), bytes = frame.len(), "journaled commit");
        Ok(())
    }
}

impl StorageEngine for RelationalEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Relational
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
        let lease = self.pool.acquire()?;
        Ok(Session::new(self.id, Arc::clone(&self.tables), Some(lease)))
    }

    fn commit(&self, session: &mut Session) -> StoreResult<CommitOutcome> {
        let (reads, writes) = session.take();
        if self.is_poisoned() {
            return Err(StoreError::Storage(StorageError::Corrupted(
                "journal holds a failed commit; reopen the engine".into(),
            )));
        }
        let result = self.tables.commit(
            &reads,
            &writes,
            |sequence, mutations| self.journal_commit(sequence, mutations),
            |_, _| {},
        )?;
        Ok(CommitOutcome::from_commit(result))
    }
}
