//! Journal backend with injectable failures.

use idstore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory journal whose syncs and truncations can be made to fail.
///
/// Clones share the image and the switches, so a test keeps one clone
/// while the engine owns another.
#[derive(Debug, Clone, Default)]
pub(crate) struct FaultyJournal {
    image: Arc<Mutex<InMemoryBackend>>,
    fail_sync: Arc<AtomicBool>,
    fail_truncate: Arc<AtomicBool>,
}

impl FaultyJournal {
    pub(crate) fn backend(&self) -> Box<dyn StorageBackend> {
        Box::new(self.clone())
    }

    /// A plain backend over the current image, as seen after a restart.
    pub(crate) fn reopened(&self) -> Box<dyn StorageBackend> {
        Box::new(InMemoryBackend::with_data(self.image.lock().data()))
    }

    pub(crate) fn fail_syncs(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_truncates(&self, fail: bool) {
        self.fail_truncate.store(fail, Ordering::SeqCst);
    }
}

impl StorageBackend for FaultyJournal {
    fn append_frame(&mut self, payload: &[u8]) -> StorageResult<u64> {
        self.image.lock().append_frame(payload)
    }

    fn read_frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        self.image.lock().read_frames()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(StorageError::Corrupted("disk".into()));
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        self.image.lock().size()
    }

    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()> {
        self.image.lock().rewrite(payloads)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        if self.fail_truncate.load(Ordering::SeqCst) {
            return Err(StorageError::Corrupted("truncate".into()));
        }
        self.image.lock().truncate(len)
    }
}
