//! In-memory journal backend.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use crate::frame::{encode_frame, scan_frames};
use parking_lot::RwLock;

/// An in-memory journal.
///
/// Holds the framed journal image in a byte vector, so torn-tail and
/// corruption scenarios can be reproduced by handing crafted bytes to
/// [`InMemoryBackend::with_data`].
///
/// # Example
///
/// ```rust
/// use idstore_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append_frame(b"entry").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 13);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend over an existing journal image.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the raw journal image.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Clears the journal.
    pub fn clear(&mut self) {
        self.data.write().clear();
    }
}

impl StorageBackend for InMemoryBackend {
    fn append_frame(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let frame = encode_frame(payload)?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(&frame);
        Ok(offset)
    }

    fn read_frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        Ok(scan_frames(&self.data.read()).frames)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()> {
        let mut image = Vec::new();
        for payload in payloads {
            image.extend(encode_frame(payload)?);
        }
        *self.data.write() = image;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let len = usize::try_from(len).unwrap_or(usize::MAX).min(data.len());
        data.truncate(len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_HEADER_SIZE;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.read_frames().unwrap().is_empty());
    }

    #[test]
    fn memory_append_returns_frame_offsets() {
        let mut backend = InMemoryBackend::new();

        let first = backend.append_frame(b"hello").unwrap();
        assert_eq!(first, 0);

        let second = backend.append_frame(b"world").unwrap();
        assert_eq!(second, (FRAME_HEADER_SIZE + 5) as u64);

        assert_eq!(backend.size().unwrap(), 2 * (FRAME_HEADER_SIZE + 5) as u64);
    }

    #[test]
    fn memory_read_frames_in_order() {
        let mut backend = InMemoryBackend::new();
        backend.append_frame(b"a").unwrap();
        backend.append_frame(b"bb").unwrap();

        assert_eq!(
            backend.read_frames().unwrap(),
            vec![b"a".to_vec(), b"bb".to_vec()]
        );
    }

    #[test]
    fn memory_with_data_drops_torn_tail() {
        let mut image = encode_frame(b"intact").unwrap();
        image.extend_from_slice(&[9, 0, 0, 0, 1]);

        let backend = InMemoryBackend::with_data(image);
        assert_eq!(backend.read_frames().unwrap(), vec![b"intact".to_vec()]);
    }

    #[test]
    fn memory_rewrite_replaces_history() {
        let mut backend = InMemoryBackend::new();
        backend.append_frame(b"old-1").unwrap();
        backend.append_frame(b"old-2").unwrap();

        backend.rewrite(&[b"snapshot".to_vec()]).unwrap();
        assert_eq!(backend.read_frames().unwrap(), vec![b"snapshot".to_vec()]);
        assert_eq!(backend.size().unwrap(), (FRAME_HEADER_SIZE + 8) as u64);
    }

    #[test]
    fn memory_truncate_takes_back_last_frame() {
        let mut backend = InMemoryBackend::new();
        backend.append_frame(b"kept").unwrap();
        let offset = backend.append_frame(b"dropped").unwrap();
        backend.truncate(offset).unwrap();

        assert_eq!(backend.size().unwrap(), offset);
        assert_eq!(backend.read_frames().unwrap(), vec![b"kept".to_vec()]);
        assert_eq!(backend.append_frame(b"next").unwrap(), offset);
    }

    #[test]
    fn memory_clear() {
        let mut backend = InMemoryBackend::new();
        backend.append_frame(b"data").unwrap();
        backend.clear();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }
}
