//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame payload is larger than the format allows.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// The rejected payload length.
        len: usize,
        /// The maximum payload length.
        max: usize,
    },

    /// Another process holds the journal file.
    #[error("journal locked by another process: {path}")]
    Locked {
        /// Path of the locked journal.
        path: PathBuf,
    },

    /// The journal is unusable.
    #[error("journal corrupted: {0}")]
    Corrupted(String),
}
