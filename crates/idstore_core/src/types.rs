//! Core type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Surrogate key of a stored entity.
///
/// Keys are unique within a table, immutable, and never reused.
pub type Key = i64;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing per engine and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Sequence number of a physical commit.
///
/// Sequence numbers give a total order over the commits of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// The two kinds of backing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// Durable, journal-backed engine.
    Relational,
    /// Fast volatile engine.
    InMemory,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => f.write_str("relational"),
            Self::InMemory => f.write_str("in-memory"),
        }
    }
}

/// Identity of one engine instance.
///
/// DAOs remember the engine they were created for; a transaction opened on
/// another instance is rejected even when both are of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

impl EngineId {
    /// Allocates a process-unique engine ID.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert_eq!(format!("{}", TransactionId::new(3)), "txn:3");
    }

    #[test]
    fn sequence_number_next() {
        let s = SequenceNumber::new(5).next();
        assert_eq!(s.as_u64(), 6);
        assert_eq!(format!("{s}"), "seq:6");
    }

    #[test]
    fn engine_kind_display() {
        assert_eq!(EngineKind::Relational.to_string(), "relational");
        assert_eq!(EngineKind::InMemory.to_string(), "in-memory");
    }

    #[test]
    fn engine_ids_are_unique() {
        let a = EngineId::fresh();
        let b = EngineId::fresh();
        assert_ne!(a, b);
    }
}
