//! Bulk deletion of stored data.

use crate::engine::StorageEngine;
use crate::error::StoreResult;
use crate::flush::FlushSink;
use crate::transaction::{EngineRunner, RetryPolicy, RetryingRunner, TransactionalRunner};
use std::sync::Arc;
use tracing::{info, warn};

/// Deletes rows from every engine of a store.
///
/// In hybrid mode the in-memory tier is cleared first; its deletions are
/// flushed, then the relational tier is cleared of whatever remains.
#[derive(Debug, Clone)]
pub struct StorageCleaner {
    engines: Vec<Arc<dyn StorageEngine>>,
    flush: Option<Arc<FlushSink>>,
    retry: RetryPolicy,
}

impl StorageCleaner {
    pub(crate) fn new(
        engines: Vec<Arc<dyn StorageEngine>>,
        flush: Option<Arc<FlushSink>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            engines,
            flush,
            retry,
        }
    }

    /// Deletes every row of every table. Returns the number of rows deleted
    /// from the primary engine.
    ///
    /// # Errors
    ///
    /// Returns the first error of a deleting transaction.
    pub fn reset(&self) -> StoreResult<usize> {
        self.clear(None)
    }

    /// Deletes every row of the named tables. Other tables are untouched.
    ///
    /// # Errors
    ///
    /// Returns the first error of a deleting transaction.
    pub fn delete_tables(&self, tables: &[&str]) -> StoreResult<usize> {
        self.clear(Some(tables))
    }

    fn clear(&self, only: Option<&[&str]>) -> StoreResult<usize> {
        let mut primary_deleted = None;
        for engine in &self.engines {
            if let Some(flush) = &self.flush {
                if let Err(err) = flush.drain() {
                    warn!(error = %err, "flush sink dropped records before cleanup");
                }
            }
            let deleted = self.clear_engine(engine, only)?;
            info!(engine = %engine.kind(), rows = deleted, "tables cleared");
            primary_deleted.get_or_insert(deleted);
        }
        Ok(primary_deleted.unwrap_or(0))
    }

    fn clear_engine(
        &self,
        engine: &Arc<dyn StorageEngine>,
        only: Option<&[&str]>,
    ) -> StoreResult<usize> {
        let tables: Vec<String> = match only {
            Some(names) => names.iter().map(|n| (*n).to_string()).collect(),
            None => engine.tables().table_names(),
        };
        let runner = RetryingRunner::new(EngineRunner::new(Arc::clone(engine)), self.retry.clone());
        runner.run_in_transaction_ret(|tx| {
            let session = tx.session_mut();
            let mut deleted = 0;
            for table in &tables {
                for row in session.scan(table) {
                    session.remove(table, row.key);
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use bytes::Bytes;

    fn seeded() -> Arc<dyn StorageEngine> {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        EngineRunner::new(Arc::clone(&engine))
            .run_in_transaction(|tx| {
                let s = tx.session_mut();
                for key in 1..=3 {
                    s.insert("a", key, None, Bytes::from_static(b"x"));
                    s.insert("b", key, None, Bytes::from_static(b"y"));
                }
                Ok(())
            })
            .unwrap();
        engine
    }

    #[test]
    fn reset_clears_everything() {
        let engine = seeded();
        let cleaner = StorageCleaner::new(vec![Arc::clone(&engine)], None, RetryPolicy::default());
        assert_eq!(cleaner.reset().unwrap(), 6);
        assert_eq!(engine.tables().row_count("a"), 0);
        assert_eq!(engine.tables().row_count("b"), 0);
    }

    #[test]
    fn delete_tables_is_selective() {
        let engine = seeded();
        let cleaner = StorageCleaner::new(vec![Arc::clone(&engine)], None, RetryPolicy::default());
        assert_eq!(cleaner.delete_tables(&["b", "missing"]).unwrap(), 3);
        assert_eq!(engine.tables().row_count("a"), 3);
        assert_eq!(engine.tables().row_count("b"), 0);
    }
}
