//! Journal frame encoding.

use crate::error::{StorageError, StorageResult};

/// Size of the frame header (length + checksum).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a single frame may carry (64 MiB).
///
/// Also used while scanning: a header claiming more than this is garbage.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Encodes `payload` into a framed byte sequence.
///
/// # Errors
///
/// Returns [`StorageError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`].
#[allow(clippy::cast_possible_truncation)]
pub fn encode_frame(payload: &[u8]) -> StorageResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(StorageError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Result of scanning a journal image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameScan {
    /// Payloads of the intact frames, in order.
    pub frames: Vec<Vec<u8>>,
    /// Number of leading bytes covered by intact frames.
    pub valid_len: u64,
}

impl FrameScan {
    /// Returns true if bytes after the last intact frame were found.
    #[must_use]
    pub fn is_torn(&self, total_len: u64) -> bool {
        self.valid_len < total_len
    }
}

/// Scans a journal image, stopping at the first frame that does not validate.
#[must_use]
pub fn scan_frames(data: &[u8]) -> FrameScan {
    let mut scan = FrameScan::default();
    let mut pos = 0usize;

    while data.len() - pos >= FRAME_HEADER_SIZE {
        let len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let crc = u32::from_le_bytes([
            data[pos + 4],
            data[pos + 5],
            data[pos + 6],
            data[pos + 7],
        ]);

        if len > MAX_FRAME_SIZE || data.len() - pos - FRAME_HEADER_SIZE < len {
            break;
        }

        let start = pos + FRAME_HEADER_SIZE;
        let payload = &data[start..start + len];
        if crc32fast::hash(payload) != crc {
            break;
        }

        scan.frames.push(payload.to_vec());
        pos = start + len;
    }

    scan.valid_len = pos as u64;
    scan
}
