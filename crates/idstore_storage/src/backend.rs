//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only journal of opaque frames.
///
/// # Invariants
///
/// - `append_frame` returns the byte offset where the frame starts
/// - `read_frames` returns every intact frame in append order
/// - `sync` makes every appended frame survive process termination
/// - `rewrite` atomically replaces the whole journal
/// - `truncate` drops every byte at or after an offset
/// - Backends must be `Send + Sync` so an engine can share them
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Appends one frame holding `payload`.
    ///
    /// Returns the offset of the frame header.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exceeds [`crate::MAX_FRAME_SIZE`] or
    /// an I/O error occurs.
    fn append_frame(&mut self, payload: &[u8]) -> StorageResult<u64>;

    /// Reads the payloads of all intact frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read.
    fn read_frames(&self) -> StorageResult<Vec<Vec<u8>>>;

    /// Makes all appended frames durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Replaces the journal content with exactly `payloads`.
    ///
    /// Used for checkpointing: the engine writes one snapshot frame and
    /// drops the history. Readers never observe a half-written journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement cannot be written.
    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()>;

    /// Cuts the journal back to `len` bytes.
    ///
    /// Used to take back a frame whose commit failed after it was
    /// appended. `len` is normally an offset returned by `append_frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be shortened.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;
}
