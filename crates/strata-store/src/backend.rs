use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Durable home of a store's bytes.
///
/// A backend never interprets what it holds. The [`Database`](crate::Database)
/// keeps the authoritative in-memory image and asks the backend to persist
/// appended bytes and the rewritten file header.
///
/// Implementations must uphold:
/// - `append` is only ever called with `offset` equal to the current length.
/// - `write_header` only rewrites the leading header bytes; it never grows the
///   store.
/// - All I/O errors are propagated, never silently ignored.
pub trait Backend: Send + Sync {
    /// Read every byte currently persisted.
    fn load(&self) -> StoreResult<Vec<u8>>;

    /// Append `bytes` at `offset`.
    fn append(&self, offset: u64, bytes: &[u8]) -> StoreResult<()>;

    /// Overwrite the file header at offset zero.
    fn write_header(&self, bytes: &[u8]) -> StoreResult<()>;

    /// Force persisted bytes to stable storage.
    fn sync(&self) -> StoreResult<()>;
}

/// In-memory backend.
///
/// Clones share the same buffer, so a test can open a second [`Database`](crate::Database)
/// over a clone to observe what a fresh process would see.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes persisted.
    pub fn len(&self) -> usize {
        self.bytes.lock().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite persisted bytes in place. Used by tests to simulate corruption.
    pub fn corrupt(&self, offset: usize, bytes: &[u8]) {
        let mut buf = self.bytes.lock().expect("lock poisoned");
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> StoreResult<Vec<u8>> {
        Ok(self.bytes.lock().expect("lock poisoned").clone())
    }

    fn append(&self, offset: u64, bytes: &[u8]) -> StoreResult<()> {
        let mut buf = self.bytes.lock().expect("lock poisoned");
        if offset != buf.len() as u64 {
            return Err(StoreError::OutOfRange {
                addr: offset.into(),
                size: bytes.len() as u64,
                len: buf.len() as u64,
            });
        }
        buf.extend_from_slice(bytes);
        Ok(())
    }

    fn write_header(&self, bytes: &[u8]) -> StoreResult<()> {
        let mut buf = self.bytes.lock().expect("lock poisoned");
        if buf.len() < bytes.len() {
            return Err(StoreError::CorruptHeader(format!(
                "store holds {} bytes, header needs {}",
                buf.len(),
                bytes.len()
            )));
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// File-backed storage.
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileBackend {
    /// Open (or create) the store file at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        debug!(path = %path.display(), "opened store file");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open an existing store file for reading only. Neither creates the
    /// file nor needs write permission on it; appends through the result
    /// fail with an I/O error.
    pub fn open_read_only(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        debug!(path = %path.display(), "opened store file read-only");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for FileBackend {
    fn load(&self) -> StoreResult<Vec<u8>> {
        let mut file = self.file.lock().expect("file mutex poisoned");
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn append(&self, offset: u64, bytes: &[u8]) -> StoreResult<()> {
        let mut file = self.file.lock().expect("file mutex poisoned");
        let len = file.metadata()?.len();
        if offset != len {
            return Err(StoreError::OutOfRange {
                addr: offset.into(),
                size: bytes.len() as u64,
                len,
            });
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    fn write_header(&self, bytes: &[u8]) -> StoreResult<()> {
        let mut file = self.file.lock().expect("file mutex poisoned");
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    fn sync(&self) -> StoreResult<()> {
        let file = self.file.lock().expect("file mutex poisoned");
        file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .finish()
    }
}
