//! File-based journal backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::frame::{encode_frame, scan_frames};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A durable journal stored in a single file.
///
/// The journal is guarded by an exclusive advisory lock on a sibling
/// `<file>.lock`, so two processes can never append to the same journal.
///
/// # Durability
///
/// - `append_frame()` writes through to the OS
/// - `sync()` calls `File::sync_all()`
/// - `rewrite()` writes a temporary file, syncs it and renames it over the
///   journal
///
/// # Recovery
///
/// Opening a journal whose last frame was only partially written truncates
/// the file back to the last intact frame.
///
/// # Example
///
/// ```no_run
/// use idstore_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("journal.log")).unwrap();
/// backend.append_frame(b"committed").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a journal at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the journal,
    /// or an I/O error if the file cannot be opened or repaired.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock_path = lock_path_for(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut image = Vec::new();
        file.read_to_end(&mut image)?;
        let total = image.len() as u64;
        let scan = scan_frames(&image);

        if scan.is_torn(total) {
            warn!(
                path = %path.display(),
                valid = scan.valid_len,
                discarded = total - scan.valid_len,
                "truncating torn journal tail"
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(scan.valid_len),
            _lock_file: lock_file,
        })
    }

    /// Opens a journal, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the journal
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl StorageBackend for FileBackend {
    fn append_frame(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let frame = encode_frame(payload)?;

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&frame)?;
        file.flush()?;
        *size += frame.len() as u64;

        Ok(offset)
    }

    fn read_frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        let mut file = self.file.write();
        let size = *self.size.read();

        file.seek(SeekFrom::Start(0))?;
        let mut image = Vec::new();
        (&mut *file).take(size).read_to_end(&mut image)?;

        Ok(scan_frames(&image).frames)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()> {
        let mut image = Vec::new();
        for payload in payloads {
            image.extend(encode_frame(payload)?);
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&image)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let reopened = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *self.file.write() = reopened;
        *self.size.write() = image.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();
        let len = len.min(*size);
        file.set_len(len)?;
        file.sync_all()?;
        *size = len;
        Ok(())
    }
}
