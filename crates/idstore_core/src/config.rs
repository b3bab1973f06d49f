//! Store configuration.

use crate::error::{StoreError, StoreResult};
use crate::transaction::RetryPolicy;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which engines a store runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Durable engine only.
    #[default]
    Relational,
    /// Volatile engine only.
    InMemory,
    /// In-memory primary with write-behind flushing to the durable engine.
    Hybrid,
}

impl FromStr for EngineMode {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relational" | "rdbms" => Ok(Self::Relational),
            "in-memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(StoreError::config(format!("unknown engine mode '{other}'"))),
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => f.write_str("relational"),
            Self::InMemory => f.write_str("in-memory"),
            Self::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Where the relational engine keeps its journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalLocation {
    /// Volatile journal.
    Memory,
    /// Journal file at the given path.
    File(PathBuf),
}

/// Relational engine settings.
#[derive(Debug, Clone)]
pub struct RelationalConfig {
    /// Journal URL: `mem:`, `file:<path>` or `file://<path>`.
    pub url: String,
    /// Maximum number of concurrently open sessions.
    pub max_connections: usize,
    /// How long opening a session may wait for a free connection.
    pub acquire_timeout: Duration,
    /// Whether every commit syncs the journal before returning.
    pub sync_on_commit: bool,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            url: "mem:".to_string(),
            max_connections: 16,
            acquire_timeout: Duration::from_secs(5),
            sync_on_commit: true,
        }
    }
}

impl RelationalConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the journal URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the connection pool size.
    #[must_use]
    pub const fn max_connections(mut self, value: usize) -> Self {
        self.max_connections = value;
        self
    }

    /// Sets the connection acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Resolves the journal URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unknown scheme or an empty path.
    pub fn location(&self) -> StoreResult<JournalLocation> {
        let url = self.url.trim();
        if url == "mem:" || url == "mem://" {
            return Ok(JournalLocation::Memory);
        }
        let path = url
            .strip_prefix("file://")
            .or_else(|| url.strip_prefix("file:"))
            .ok_or_else(|| StoreError::config(format!("unsupported journal url '{url}'")))?;
        if path.is_empty() {
            return Err(StoreError::config("journal url has an empty path"));
        }
        Ok(JournalLocation::File(PathBuf::from(path)))
    }
}

/// In-memory engine settings.
///
/// The cluster parameters are opaque to the store; they are reported when
/// the engine opens.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Cluster name.
    pub cluster_name: String,
    /// Cluster member addresses.
    pub members: Vec<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cluster_name: "idstore".to_string(),
            members: Vec::new(),
        }
    }
}

impl MemoryConfig {
    /// Sets the cluster name.
    #[must_use]
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Adds a cluster member.
    #[must_use]
    pub fn member(mut self, address: impl Into<String>) -> Self {
        self.members.push(address.into());
        self
    }
}

/// Flush sink settings.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Queue depth above which a warning is logged.
    pub queue_high_water: usize,
    /// Maximum records applied in one relational transaction.
    pub batch_size: usize,
    /// How long the idle worker sleeps between queue checks.
    pub flush_interval: Duration,
    /// Retry policy for relational conflicts.
    pub retry: RetryPolicy,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            queue_high_water: 10_000,
            batch_size: 256,
            flush_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}

impl FlushConfig {
    /// Sets the high-water mark.
    #[must_use]
    pub const fn queue_high_water(mut self, value: usize) -> Self {
        self.queue_high_water = value;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = value;
        self
    }

    /// Sets the idle poll interval.
    #[must_use]
    pub const fn flush_interval(mut self, value: Duration) -> Self {
        self.flush_interval = value;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

/// Record size limits.
#[derive(Debug, Clone, Copy)]
pub struct StorageLimits {
    /// Largest encoded entity accepted by a DAO, in bytes.
    pub max_record_size: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_record_size: 256_000,
        }
    }
}

impl StorageLimits {
    /// Sets the record size limit.
    #[must_use]
    pub const fn max_record_size(mut self, value: usize) -> Self {
        self.max_record_size = value;
        self
    }
}

/// Configuration for opening a [`crate::Store`].
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Engine selection.
    pub mode: EngineMode,
    /// Relational engine settings.
    pub relational: RelationalConfig,
    /// In-memory engine settings.
    pub memory: MemoryConfig,
    /// Retry policy of the store's runner.
    pub retry: RetryPolicy,
    /// Flush sink settings (hybrid mode).
    pub flush: FlushConfig,
    /// Record size limits.
    pub limits: StorageLimits,
}

impl StorageConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine mode.
    #[must_use]
    pub fn mode(mut self, mode: EngineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the relational engine settings.
    #[must_use]
    pub fn relational(mut self, config: RelationalConfig) -> Self {
        self.relational = config;
        self
    }

    /// Sets the in-memory engine settings.
    #[must_use]
    pub fn memory(mut self, config: MemoryConfig) -> Self {
        self.memory = config;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the flush sink settings.
    #[must_use]
    pub fn flush(mut self, config: FlushConfig) -> Self {
        self.flush = config;
        self
    }

    /// Sets the record size limits.
    #[must_use]
    pub fn limits(mut self, limits: StorageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Checks the configuration for values the store cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] describing the first problem found.
    pub fn validate(&self) -> StoreResult<()> {
        if self.relational.max_connections == 0 {
            return Err(StoreError::config("max_connections must be at least 1"));
        }
        if self.flush.batch_size == 0 {
            return Err(StoreError::config("flush batch_size must be at least 1"));
        }
        if self.limits.max_record_size == 0 {
            return Err(StoreError::config("max_record_size must be at least 1"));
        }
        if self.mode != EngineMode::InMemory {
            self.relational.location()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.mode, EngineMode::Relational);
        assert_eq!(config.relational.url, "mem:");
        assert_eq!(config.limits.max_record_size, 256_000);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = StorageConfig::new()
            .mode(EngineMode::Hybrid)
            .relational(RelationalConfig::new().url("file:/tmp/j.log").max_connections(2))
            .memory(MemoryConfig::default().cluster_name("c1").member("10.0.0.1:5701"))
            .flush(FlushConfig::default().batch_size(10))
            .limits(StorageLimits::default().max_record_size(1024));

        assert_eq!(config.mode, EngineMode::Hybrid);
        assert_eq!(config.relational.max_connections, 2);
        assert_eq!(config.memory.members, vec!["10.0.0.1:5701".to_string()]);
        assert_eq!(config.flush.batch_size, 10);
        assert_eq!(config.limits.max_record_size, 1024);
    }

    #[test]
    fn engine_mode_parses() {
        assert_eq!("relational".parse::<EngineMode>().unwrap(), EngineMode::Relational);
        assert_eq!("in-memory".parse::<EngineMode>().unwrap(), EngineMode::InMemory);
        assert_eq!(" Hybrid ".parse::<EngineMode>().unwrap(), EngineMode::Hybrid);
        assert!("cassandra".parse::<EngineMode>().is_err());
        assert_eq!(EngineMode::InMemory.to_string(), "in-memory");
    }

    #[test]
    fn journal_locations() {
        let loc = |url: &str| RelationalConfig::new().url(url).location();
        assert_eq!(loc("mem:").unwrap(), JournalLocation::Memory);
        assert_eq!(
            loc("file:/var/lib/idstore/journal").unwrap(),
            JournalLocation::File(PathBuf::from("/var/lib/idstore/journal"))
        );
        assert_eq!(
            loc("file://data/journal").unwrap(),
            JournalLocation::File(PathBuf::from("data/journal"))
        );
        assert!(loc("jdbc:h2:mem:x").is_err());
        assert!(loc("file:").is_err());
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let config =
            StorageConfig::new().relational(RelationalConfig::new().max_connections(0));
        assert!(matches!(config.validate(), Err(StoreError::Config { .. })));
    }
}
