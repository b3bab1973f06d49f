//! The store facade.

use crate::cleaner::StorageCleaner;
use crate::config::{EngineMode, StorageConfig};
use crate::dao::{BasicDao, NamedDao};
use crate::dump::Dump;
use crate::engine::{CommitListener, MemoryEngine, RelationalEngine, StorageEngine};
use crate::error::{StoreError, StoreResult};
use crate::flush::{FlushSink, FlushStats};
use crate::registry::DaoRegistry;
use crate::transaction::{EngineRunner, RetryingRunner, TransactionalRunner};
use crate::types::EngineKind;
use idstore_codec::{EntityCodec, NamedEntity};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// An open store.
///
/// Owns the engines selected by [`StorageConfig::mode`]:
///
/// | mode | primary | also open |
/// |---|---|---|
/// | `Relational` | relational | |
/// | `InMemory` | in-memory | |
/// | `Hybrid` | in-memory | relational, fed by the flush sink |
///
/// DAOs and runners without an explicit engine use the primary engine.
///
/// # Example
///
/// ```rust,ignore
/// use idstore_core::{NamedCrudDao, Store, StorageConfig, TransactionalRunner};
///
/// let store = Store::open(StorageConfig::default())?;
/// let groups = store.named_dao::<Group>();
/// store.runner().run_in_transaction(|tx| {
///     groups.create(tx, &Group::new("/staff"))?;
///     Ok(())
/// })?;
/// ```
#[derive(Debug)]
pub struct Store {
    config: StorageConfig,
    primary: Arc<dyn StorageEngine>,
    relational: Option<Arc<RelationalEngine>>,
    memory: Option<Arc<MemoryEngine>>,
    flush: Option<Arc<FlushSink>>,
    registry: DaoRegistry,
}

impl Store {
    /// Opens the engines selected by the configuration.
    ///
    /// In hybrid mode the relational journal is replayed, every relational
    /// row is loaded into the in-memory engine, and the flush sink is
    /// started before the store is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or an engine cannot
    /// be opened.
    pub fn open(config: StorageConfig) -> StoreResult<Self> {
        config.validate()?;

        let (relational, memory, flush) = match config.mode {
            EngineMode::Relational => (
                Some(Arc::new(RelationalEngine::open(&config.relational)?)),
                None,
                None,
            ),
            EngineMode::InMemory => (
                None,
                Some(Arc::new(MemoryEngine::open(&config.memory))),
                None,
            ),
            EngineMode::Hybrid => {
                let relational = Arc::new(RelationalEngine::open(&config.relational)?);
                let memory = Arc::new(MemoryEngine::open(&config.memory));
                warm_start(&relational, &memory)?;
                let flush = FlushSink::start(Arc::clone(&relational), config.flush.clone())?;
                memory.set_listener(Arc::clone(&flush) as Arc<dyn CommitListener>);
                (Some(relational), Some(memory), Some(flush))
            }
        };

        let primary: Arc<dyn StorageEngine> = match (&memory, &relational) {
            (Some(memory), _) => Arc::clone(memory) as Arc<dyn StorageEngine>,
            (None, Some(relational)) => Arc::clone(relational) as Arc<dyn StorageEngine>,
            (None, None) => return Err(StoreError::config("no engine selected")),
        };

        info!(mode = %config.mode, primary = %primary.kind(), "store opened");
        Ok(Self {
            config,
            primary,
            relational,
            memory,
            flush,
            registry: DaoRegistry::new(),
        })
    }

    /// Engine mode.
    #[must_use]
    pub fn mode(&self) -> EngineMode {
        self.config.mode
    }

    /// Configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Kind of the primary engine.
    #[must_use]
    pub fn primary_kind(&self) -> EngineKind {
        self.primary.kind()
    }

    /// The primary engine.
    #[must_use]
    pub fn primary(&self) -> Arc<dyn StorageEngine> {
        Arc::clone(&self.primary)
    }

    /// The engine of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the mode does not run that engine.
    pub fn engine(&self, kind: EngineKind) -> StoreResult<Arc<dyn StorageEngine>> {
        let engine = match kind {
            EngineKind::Relational => self
                .relational
                .as_ref()
                .map(|e| Arc::clone(e) as Arc<dyn StorageEngine>),
            EngineKind::InMemory => self
                .memory
                .as_ref()
                .map(|e| Arc::clone(e) as Arc<dyn StorageEngine>),
        };
        engine.ok_or_else(|| {
            StoreError::config(format!(
                "the {kind} engine is not open in {} mode",
                self.config.mode
            ))
        })
    }

    /// The relational engine, if open.
    #[must_use]
    pub fn relational(&self) -> Option<&Arc<RelationalEngine>> {
        self.relational.as_ref()
    }

    /// The in-memory engine, if open.
    #[must_use]
    pub fn memory(&self) -> Option<&Arc<MemoryEngine>> {
        self.memory.as_ref()
    }

    /// Runner on the primary engine, retrying with the configured policy.
    #[must_use]
    pub fn runner(&self) -> RetryingRunner<EngineRunner> {
        RetryingRunner::new(EngineRunner::new(self.primary()), self.config.retry.clone())
    }

    /// Runner on the engine of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the mode does not run that engine.
    pub fn runner_on(&self, kind: EngineKind) -> StoreResult<RetryingRunner<EngineRunner>> {
        Ok(RetryingRunner::new(
            EngineRunner::new(self.engine(kind)?),
            self.config.retry.clone(),
        ))
    }

    /// Keyed DAO for `T` on the primary engine.
    #[must_use]
    pub fn dao<T: EntityCodec + 'static>(&self) -> Arc<BasicDao<T>> {
        self.registry.basic::<T>(self.primary.as_ref(), self.config.limits)
    }

    /// Named DAO for `T` on the primary engine.
    #[must_use]
    pub fn named_dao<T: NamedEntity + 'static>(&self) -> Arc<NamedDao<T>> {
        self.registry.named::<T>(self.primary.as_ref(), self.config.limits)
    }

    /// Keyed DAO for `T` on the engine of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the mode does not run that engine.
    pub fn dao_on<T: EntityCodec + 'static>(
        &self,
        kind: EngineKind,
    ) -> StoreResult<Arc<BasicDao<T>>> {
        let engine = self.engine(kind)?;
        Ok(self.registry.basic::<T>(engine.as_ref(), self.config.limits))
    }

    /// Named DAO for `T` on the engine of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the mode does not run that engine.
    pub fn named_dao_on<T: NamedEntity + 'static>(
        &self,
        kind: EngineKind,
    ) -> StoreResult<Arc<NamedDao<T>>> {
        let engine = self.engine(kind)?;
        Ok(self.registry.named::<T>(engine.as_ref(), self.config.limits))
    }

    /// The flush sink, in hybrid mode.
    #[must_use]
    pub fn flush_sink(&self) -> Option<&Arc<FlushSink>> {
        self.flush.as_ref()
    }

    /// Flush counters, in hybrid mode.
    #[must_use]
    pub fn flush_stats(&self) -> Option<FlushStats> {
        self.flush.as_ref().map(|f| f.stats())
    }

    /// Blocks until the relational engine has caught up with every
    /// in-memory commit made so far. Returns at once outside hybrid mode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FlushFailed`] if the flush sink dropped records
    /// since the previous sync.
    pub fn sync(&self) -> StoreResult<()> {
        match &self.flush {
            Some(flush) => flush.drain(),
            None => Ok(()),
        }
    }

    /// Cleaner over every open engine, primary first.
    #[must_use]
    pub fn cleaner(&self) -> StorageCleaner {
        let mut engines = vec![self.primary()];
        if self.config.mode == EngineMode::Hybrid {
            if let Some(relational) = &self.relational {
                engines.push(Arc::clone(relational) as Arc<dyn StorageEngine>);
            }
        }
        StorageCleaner::new(engines, self.flush.clone(), self.config.retry.clone())
    }

    /// Writes every table of the primary engine as a JSON dump. Returns the
    /// number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if the tables cannot be read or the dump cannot be
    /// written.
    pub fn export_to<W: Write>(&self, writer: W) -> StoreResult<usize> {
        let tables = self.primary().tables().table_names();
        let dump = self
            .runner()
            .run_in_transaction_ret(|tx| Ok(Dump::capture(tx, &tables)))?;
        dump.write_to(writer)?;
        info!(tables = dump.tables.len(), rows = dump.row_count(), "store exported");
        Ok(dump.row_count())
    }

    /// Replaces the dumped tables of the primary engine with the contents of
    /// a JSON dump, in one transaction. Returns the number of rows imported.
    ///
    /// # Errors
    ///
    /// Returns an error if the dump is malformed or the import transaction
    /// fails; nothing is changed in that case.
    pub fn import_from<R: Read>(&self, reader: R) -> StoreResult<usize> {
        let dump = Dump::read_from(reader)?;
        self.runner().run_in_transaction(|tx| dump.apply(tx))?;
        info!(tables = dump.tables.len(), rows = dump.row_count(), "store imported");
        Ok(dump.row_count())
    }

    /// Compacts the relational journal. In hybrid mode pending flush records
    /// are persisted first. Does nothing in in-memory mode.
    ///
    /// # Errors
    ///
    /// Returns an error if flushed records were dropped or the journal
    /// cannot be rewritten.
    pub fn checkpoint(&self) -> StoreResult<()> {
        self.sync()?;
        match &self.relational {
            Some(relational) => relational.checkpoint(),
            None => {
                debug!("checkpoint skipped; no relational engine");
                Ok(())
            }
        }
    }

    /// Stops the flush sink after persisting every pending record.
    ///
    /// Later in-memory commits are no longer replicated. Returns the final
    /// flush counters in hybrid mode. Calling it twice is harmless.
    pub fn close(&self) -> Option<FlushStats> {
        if let Some(memory) = &self.memory {
            memory.clear_listener();
        }
        let stats = self.flush.as_ref().map(|f| f.drain_and_stop());
        info!(mode = %self.config.mode, "store closed");
        stats
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.flush.as_ref().is_some_and(|f| f.is_running()) {
            self.close();
        }
    }
}

/// Copies every relational row and key counter into the in-memory engine.
fn warm_start(relational: &RelationalEngine, memory: &MemoryEngine) -> StoreResult<()> {
    relational.tables().with_snapshot(|sequence, images| {
        let tables = images.len();
        let rows: usize = images.iter().map(|image| image.rows.len()).sum();
        memory.load_snapshot(images);
        info!(tables, rows, %sequence, "in-memory engine warmed from relational");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationalConfig;
    use bytes::Bytes;

    #[test]
    fn primary_follows_mode() {
        let relational = Store::open(StorageConfig::new()).unwrap();
        assert_eq!(relational.primary_kind(), EngineKind::Relational);
        assert!(relational.memory().is_none());
        assert!(relational.engine(EngineKind::InMemory).is_err());

        let hybrid = Store::open(StorageConfig::new().mode(EngineMode::Hybrid)).unwrap();
        assert_eq!(hybrid.primary().kind(), EngineKind::InMemory);
        assert!(hybrid.engine(EngineKind::Relational).is_ok());
        assert!(hybrid.flush_stats().is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StorageConfig::new().relational(RelationalConfig::new().url("jdbc:h2:mem"));
        assert!(matches!(Store::open(config), Err(StoreError::Config { .. })));
    }

    #[test]
    fn close_is_idempotent() {
        let store = Store::open(StorageConfig::new().mode(EngineMode::Hybrid)).unwrap();
        store
            .runner()
            .run_in_transaction(|tx| {
                tx.session_mut().insert("t", 1, None, Bytes::from_static(b"v"));
                Ok(())
            })
            .unwrap();
        let first = store.close().unwrap();
        assert_eq!(first.applied, 1);
        let second = store.close().unwrap();
        assert_eq!(second, first);
        assert_eq!(store.relational().unwrap().tables().row_count("t"), 1);
    }
}
