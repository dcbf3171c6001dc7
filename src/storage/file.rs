//! Storage file
//!
//! Append-only block file with bounds-checked reads.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::header::{FileHeader, HEADER_REGION, HEADER_SLOT_SIZE};
use crate::error::{ArborError, Result};

/// One database file
///
/// ## Concurrency:
/// - The OS handle and the logical length sit behind one Mutex, so a read
///   never observes a half-finished append.
/// - All methods use `&self`; the file is shared through `Arc`.
pub struct StorageFile {
    /// Where the file lives
    path: PathBuf,

    /// Process-unique id, used to key cached blocks
    id: u64,

    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,

    /// Logical end of the file (next append offset)
    len: u64,
}

impl StorageFile {
    /// Create a new file and write the initial header
    ///
    /// Fails if `path` already exists.
    pub fn create(path: &Path, id: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let storage = Self {
            path: path.to_path_buf(),
            id,
            inner: Mutex::new(FileInner { file, len: 0 }),
        };
        storage.initialize()?;
        Ok(storage)
    }

    /// Open an existing file and read its committed header
    ///
    /// A zero-length file, or one holding only a zeroed header region, is
    /// treated as new and initialized in place.
    pub fn open(path: &Path, id: u64) -> Result<(Self, FileHeader)> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        let storage = Self {
            path: path.to_path_buf(),
            id,
            inner: Mutex::new(FileInner { file, len }),
        };

        // Nothing but the zeroed header region of an interrupted create
        if len <= HEADER_REGION && storage.is_blank(len)? {
            storage.initialize()?;
            return Ok((storage, FileHeader::empty()));
        }

        if len < HEADER_REGION {
            return Err(ArborError::Corruption(format!(
                "file too small for header: {} bytes",
                len
            )));
        }

        let header = storage.read_header()?;
        Ok((storage, header))
    }

    /// Append bytes at the end of the file, returning their offset
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.len;

        inner.file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = inner.file.write_all(bytes) {
            // Drop whatever part of the write landed
            let _ = inner.file.set_len(offset);
            return Err(e.into());
        }

        inner.len = offset + bytes.len() as u64;
        Ok(offset)
    }

    /// Read exactly `length` bytes at `offset`
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();

        let end = offset.checked_add(length as u64);
        match end {
            Some(end) if offset >= HEADER_REGION && end <= inner.len => {}
            _ => {
                return Err(ArborError::Corruption(format!(
                    "read of {} bytes at offset {} outside data region [{}, {})",
                    length, offset, HEADER_REGION, inner.len
                )))
            }
        }

        let mut buf = vec![0u8; length];
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read up to `max` bytes at `offset`, stopping at the end of the file
    pub fn read_at_most(&self, offset: u64, max: usize) -> Result<Vec<u8>> {
        let len = self.len();
        if offset >= len {
            return Ok(Vec::new());
        }
        let available = (len - offset).min(max as u64) as usize;
        self.read(offset, available)
    }

    /// Make every appended byte durable
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.file.sync_data()?;
        Ok(())
    }

    /// Cut the file back to `len`, dropping a torn tail
    pub fn truncate(&self, len: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if len < HEADER_REGION || len > inner.len {
            return Err(ArborError::InvalidArgument(format!(
                "cannot truncate file of {} bytes to {}",
                inner.len, len
            )));
        }
        inner.file.set_len(len)?;
        inner.len = len;
        Ok(())
    }

    /// Read both header slots and return the newest valid one
    pub fn read_header(&self) -> Result<FileHeader> {
        let mut inner = self.inner.lock();
        let mut region = [0u8; HEADER_REGION as usize];
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.read_exact(&mut region)?;
        FileHeader::select(&region, inner.len)
    }

    /// Write `header` into the slot its revision owns
    ///
    /// Does not sync; callers pair this with [`StorageFile::sync`].
    pub fn write_header(&self, header: &FileHeader) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.seek(SeekFrom::Start(header.slot_offset()))?;
        inner.file.write_all(&header.encode())?;
        Ok(())
    }

    /// Current logical length in bytes
    pub fn len(&self) -> u64 {
        self.inner.lock().len
    }

    /// True when no block has been appended yet
    pub fn is_empty(&self) -> bool {
        self.len() <= HEADER_REGION
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// True when the first `len` bytes are all zero
    fn is_blank(&self, len: u64) -> Result<bool> {
        let mut inner = self.inner.lock();
        let mut prefix = vec![0u8; len as usize];
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.read_exact(&mut prefix)?;
        Ok(prefix.iter().all(|&b| b == 0))
    }

    /// Reserve the header region and commit revision 0
    fn initialize(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.file.set_len(0)?;
            inner.file.seek(SeekFrom::Start(0))?;
            inner.file.write_all(&[0u8; 2 * HEADER_SLOT_SIZE])?;
            inner.len = HEADER_REGION;
        }
        self.write_header(&FileHeader::empty())?;
        self.sync()
    }
}

impl std::fmt::Debug for StorageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFile")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}
