//! # idstore Storage
//!
//! Journal backends for the idstore relational engine.
//!
//! A backend is an **append-only log of opaque frames**. It knows nothing
//! about rows, tables or transactions: the relational engine encodes one
//! journal entry per committed transaction and hands the bytes over as a
//! frame.
//!
//! ## Frame Format
//!
//! ```text
//! | length (4, LE) | crc32 (4, LE) | payload (length) |
//! ```
//!
//! A frame whose header or checksum does not validate ends the log: it is
//! treated as a torn write from an interrupted append and is discarded.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - volatile journal for tests and `mem:` URLs
//! - [`FileBackend`] - durable, exclusively locked journal file
//!
//! ## Example
//!
//! ```rust
//! use idstore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append_frame(b"first").unwrap();
//! backend.append_frame(b"second").unwrap();
//! assert_eq!(backend.read_frames().unwrap(), vec![b"first".to_vec(), b"second".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use frame::{encode_frame, scan_frames, FrameScan, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use memory::InMemoryBackend;
