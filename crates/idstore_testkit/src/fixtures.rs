//! Test fixtures and store helpers.
//!
//! Provides stores for every engine mode, with journal files in temporary
//! directories that live as long as the fixture.

use idstore_core::{
    EngineMode, FlushConfig, RelationalConfig, RetryPolicy, StorageConfig, Store,
};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        Self::open(base_config(EngineMode::InMemory), None)
    }

    /// Creates a relational store with a volatile journal.
    pub fn relational() -> Self {
        Self::open(base_config(EngineMode::Relational), None)
    }

    /// Creates a relational store journaling to a temporary file.
    pub fn relational_file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = file_config(EngineMode::Relational, temp_dir.path());
        Self::open(config, Some(temp_dir))
    }

    /// Creates a hybrid store with a volatile relational journal.
    pub fn hybrid() -> Self {
        Self::open(base_config(EngineMode::Hybrid), None)
    }

    /// Creates a hybrid store journaling to a temporary file.
    pub fn hybrid_file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = file_config(EngineMode::Hybrid, temp_dir.path());
        Self::open(config, Some(temp_dir))
    }

    /// Creates a store from an explicit configuration.
    pub fn with_config(config: StorageConfig) -> Self {
        Self::open(config, None)
    }

    fn open(config: StorageConfig, temp_dir: Option<TempDir>) -> Self {
        init_tracing();
        Self {
            store: Store::open(config).expect("Failed to open store"),
            temp_dir,
        }
    }

    /// Journal path if file-based, None otherwise.
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| journal_path(d.path()))
    }

    /// Closes the store and reopens it over the same journal.
    ///
    /// Panics for stores without a journal file.
    pub fn reopen(self) -> Self {
        let config = self.store.config().clone();
        let Self { store, temp_dir } = self;
        assert!(temp_dir.is_some(), "reopen needs a file journal");
        store.close();
        drop(store);
        Self::open(config, temp_dir)
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Configuration used by the fixtures: fast flushing, backoff-free retry.
pub fn base_config(mode: EngineMode) -> StorageConfig {
    StorageConfig::new()
        .mode(mode)
        .retry(RetryPolicy::new(50))
        .flush(
            FlushConfig::default()
                .batch_size(64)
                .flush_interval(Duration::from_millis(5)),
        )
}

fn journal_path(dir: &Path) -> PathBuf {
    dir.join("journal.log")
}

fn file_config(mode: EngineMode, dir: &Path) -> StorageConfig {
    let url = format!("file:{}", journal_path(dir).display());
    base_config(mode).relational(RelationalConfig::new().url(url))
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use idstore_testkit::with_memory_store;
///
/// #[test]
/// fn my_test() {
///     with_memory_store(|store| {
///         // ... test operations
///     });
/// }
/// ```
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let store = TestStore::memory();
    f(&store.store)
}

/// Runs `f` once against a store of every engine mode.
pub fn for_each_mode<F>(mut f: F)
where
    F: FnMut(EngineMode, &Store),
{
    for store in [TestStore::relational(), TestStore::memory(), TestStore::hybrid()] {
        f(store.mode(), &store.store);
    }
}

/// Installs a `tracing` subscriber writing to the test harness.
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
