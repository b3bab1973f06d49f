//! # idstore Core
//!
//! Transactional storage core for an identity-management server.
//!
//! This crate provides:
//! - Generic CRUD DAOs over serialized entities, keyed by a surrogate
//!   `i64` key and, for named entities, a unique name
//! - A transaction context with nested units of work and auto/manual
//!   commit modes
//! - Two interchangeable engines: a volatile in-memory engine and a
//!   durable, journal-backed relational engine
//! - Automatic retry of units of work that hit a transient conflict
//! - Write-behind flushing from the in-memory engine to the relational
//!   engine (hybrid mode)
//! - Import/export and bulk cleanup of stored data
//!
//! ## Architecture
//!
//! ```text
//!   caller ─▶ TransactionalRunner ─▶ Transaction ─▶ DAO ─▶ Session
//!                 │ (retry)              │                    │
//!                 └──────────────────────┴──── commit ───▶ StorageEngine
//!                                                              │ hybrid
//!                                        MemoryEngine ─▶ FlushSink ─▶ RelationalEngine
//! ```
//!
//! ## Key Invariants
//!
//! - Keys are unique per table, immutable and never reused
//! - Names are unique per table
//! - A unit of work commits all of its writes or none of them
//! - Only the outermost call of a nested chain commits or rolls back
//! - Only [`RetryingRunner`] retries a unit of work on
//!   [`ErrorKind::TransientConflict`]; the flush sink requeues batches that
//!   still conflict
//! - The flush sink applies in-memory commits to the relational engine in
//!   commit order, at least once
//!
//! ## Example
//!
//! ```rust
//! use idstore_codec::{EntityCodec, NamedEntity};
//! use idstore_core::{
//!     BasicCrudDao, EngineMode, NamedCrudDao, StorageConfig, Store, TransactionalRunner,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Group {
//!     path: String,
//! }
//!
//! impl EntityCodec for Group {
//!     const ENTITY_TYPE: &'static str = "group";
//! }
//!
//! impl NamedEntity for Group {
//!     fn name(&self) -> &str {
//!         &self.path
//!     }
//! }
//!
//! let store = Store::open(StorageConfig::new().mode(EngineMode::InMemory)).unwrap();
//! let groups = store.named_dao::<Group>();
//! let runner = store.runner();
//!
//! let key = runner
//!     .run_in_transaction_ret(|tx| groups.create(tx, &Group { path: "/staff".into() }))
//!     .unwrap();
//! let found = runner
//!     .run_in_transaction_ret(|tx| groups.get_key_for_name(tx, "/staff"))
//!     .unwrap();
//! assert_eq!(found, key);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cleaner;
mod config;
mod dao;
mod dump;
mod engine;
mod error;
mod flush;
mod registry;
mod store;
mod transaction;
mod types;

pub use cleaner::StorageCleaner;
pub use config::{
    EngineMode, FlushConfig, JournalLocation, MemoryConfig, RelationalConfig, StorageConfig,
    StorageLimits,
};
pub use dao::{BasicCrudDao, BasicDao, NamedCrudDao, NamedDao};
pub use dump::{Dump, DumpRow, TableDump, DUMP_VERSION};
pub use engine::{
    CommitListener, CommitOutcome, ConnectionPool, Lease, MemoryEngine, Mutation, MutationKind,
    RelationalEngine, Row, Session, StorageEngine, TableStore,
};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use flush::{FlushRecord, FlushSink, FlushStats};
pub use store::Store;
pub use transaction::{
    CommitMode, EngineRunner, RetryPolicy, RetryingRunner, Transaction, TransactionalRunner,
};
pub use types::{EngineId, EngineKind, Key, SequenceNumber, TransactionId};
