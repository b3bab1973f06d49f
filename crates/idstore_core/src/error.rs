//! Error types for the storage core.

use crate::types::EngineKind;
use std::fmt;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification of a [`StoreError`].
///
/// Callers branch on the kind, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed key or name does not exist.
    NotFound,
    /// A key or name is already taken.
    AlreadyExists,
    /// Contention; the whole unit of work may be retried.
    TransientConflict,
    /// Anything else. Never retried.
    Fatal,
}

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed entity does not exist.
    #[error("{entity_type} '{target}' not found")]
    NotFound {
        /// Table the lookup ran against.
        entity_type: String,
        /// Key or name that was looked up.
        target: String,
    },

    /// An entity with the same key or name already exists.
    #[error("{entity_type} '{target}' already exists")]
    AlreadyExists {
        /// Table the write ran against.
        entity_type: String,
        /// Conflicting key or name.
        target: String,
    },

    /// Concurrent modification or resource exhaustion that may clear up.
    #[error("transient conflict: {reason}")]
    TransientConflict {
        /// What was contended.
        reason: String,
    },

    /// Encoded record does not fit the storage limit.
    #[error("{entity_type} record of {size} bytes exceeds the limit of {limit} bytes")]
    SizeLimitExceeded {
        /// Table the write ran against.
        entity_type: String,
        /// Encoded size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A DAO was used with a transaction of another engine.
    #[error("DAO bound to the {expected} engine used with a {found} transaction")]
    WrongEngine {
        /// Engine the DAO belongs to.
        expected: EngineKind,
        /// Engine of the transaction.
        found: EngineKind,
    },

    /// The transaction was rolled back instead of committed.
    #[error("transaction rolled back: {reason}")]
    RolledBack {
        /// Why the context became rollback-only.
        reason: String,
    },

    /// The retry budget was spent on transient conflicts.
    #[error("transaction failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last transient error.
        #[source]
        source: Box<StoreError>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The application asked for a rollback.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason given by the application.
        reason: String,
    },

    /// The flush sink no longer accepts records.
    #[error("flush sink is stopped")]
    FlushStopped,

    /// The flush sink dropped records after a non-transient failure.
    #[error("flush sink dropped {records} records: {reason}")]
    FlushFailed {
        /// Records dropped since the previous drain.
        records: u64,
        /// The last failure.
        reason: String,
    },

    /// Import or export failed.
    #[error("dump failed: {message}")]
    Dump {
        /// Description of the failure.
        message: String,
    },

    /// Entity codec error.
    #[error("codec error: {0}")]
    Codec(#[from] idstore_codec::CodecError),

    /// Journal backend error.
    #[error("storage error: {0}")]
    Storage(#[from] idstore_storage::StorageError),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(entity_type: impl Into<String>, target: impl fmt::Display) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            target: target.to_string(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(entity_type: impl Into<String>, target: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            entity_type: entity_type.into(),
            target: target.to_string(),
        }
    }

    /// Creates a transient conflict error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientConflict {
            reason: reason.into(),
        }
    }

    /// Creates a rolled back error.
    pub fn rolled_back(reason: impl Into<String>) -> Self {
        Self::RolledBack {
            reason: reason.into(),
        }
    }

    /// Creates an application abort error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a dump error.
    pub fn dump(message: impl Into<String>) -> Self {
        Self::Dump {
            message: message.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::TransientConflict { .. } => ErrorKind::TransientConflict,
            _ => ErrorKind::Fatal,
        }
    }

    /// Returns true if retrying the whole unit of work may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientConflict
    }

    /// Returns true for [`ErrorKind::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idstore_codec::CodecError;

    #[test]
    fn kinds() {
        assert_eq!(StoreError::not_found("group", "/a").kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::already_exists("group", 3).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            StoreError::transient("row changed").kind(),
            ErrorKind::TransientConflict
        );
        assert_eq!(StoreError::aborted("no").kind(), ErrorKind::Fatal);
        assert_eq!(StoreError::FlushStopped.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn only_conflicts_are_transient() {
        assert!(StoreError::transient("x").is_transient());
        assert!(!StoreError::rolled_back("x").is_transient());
        let exhausted = StoreError::RetriesExhausted {
            attempts: 5,
            source: Box::new(StoreError::transient("x")),
        };
        assert!(!exhausted.is_transient());
    }

    #[test]
    fn codec_errors_convert() {
        let err: StoreError = CodecError::decoding_failed("bad").into();
        assert!(matches!(err, StoreError::Codec(_)));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn messages() {
        assert_eq!(
            StoreError::not_found("attributeType", "attr1").to_string(),
            "attributeType 'attr1' not found"
        );
        let err = StoreError::SizeLimitExceeded {
            entity_type: "attribute".into(),
            size: 256_001,
            limit: 256_000,
        };
        assert_eq!(
            err.to_string(),
            "attribute record of 256001 bytes exceeds the limit of 256000 bytes"
        );
    }
}
