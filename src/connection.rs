//! Connection Module
//!
//! The public handle over one database file.
//!
//! ## Responsibilities
//! - Mount the file, its index and the recovered buffer on open
//! - Route put/delete through the file and the write-ahead buffer
//! - Commit on threshold, on request and on close
//! - Switch to a compacted file generation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::compaction::Compactor;
use crate::config::{Config, SyncStrategy};
use crate::document::{self, Document};
use crate::error::{ArborError, Result};
use crate::index::IndexTree;
use crate::runtime::{self, FileLease};
use crate::storage::{FileHeader, StorageFile};
use crate::wal::{Delta, RecoveryResult, WalRecovery, WriteAheadBuffer};

/// An open database
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/commit/compact/close): serialized by
///   `write_lock`, then take `state` exclusively for the in-memory update
/// - **Reads** (get): take `state` shared, concurrent with each other
/// - **Compaction**: holds `write_lock` for its whole run but takes `state`
///   exclusively only to fold pending deltas and to switch generations;
///   reads continue against the old file in between
///
/// Dropping a connection without [`Connection::close`] behaves like a crash:
/// pending deltas are not committed. Their document blocks are replayed on
/// the next open when `recover_uncommitted` is set.
pub struct Connection {
    config: Config,

    /// What the last open found in the uncommitted tail
    recovery: RecoveryResult,

    /// File the connection works on; changes when compaction switches files
    path: RwLock<PathBuf>,

    /// Serializes write operations
    write_lock: Mutex<()>,

    /// Active file generation, `None` once closed
    state: RwLock<Option<Generation>>,
}

/// Everything tied to one file
struct Generation {
    /// Keeps the file registered as open in this process
    lease: FileLease,

    file: Arc<StorageFile>,
    index: IndexTree,
    buffer: WriteAheadBuffer,

    /// Last committed header
    header: FileHeader,

    /// Highest sequence assigned, committed or not
    last_sequence: u64,
}

/// Snapshot of connection statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInfo {
    /// Path of the active file
    pub path: PathBuf,

    /// Active file size in bytes
    pub file_size: u64,

    /// Live documents in the last commit
    pub doc_count: u64,

    /// Deltas waiting for the next commit
    pub pending_count: usize,

    pub last_sequence: u64,

    /// Header revision of the last commit
    pub revision: u64,
}

impl Connection {
    /// Open or create the database described by `config`
    ///
    /// On startup:
    /// 1. Register the file as open in this process
    /// 2. Open it (or create it) and read the committed header
    /// 3. Attach the index to the committed root
    /// 4. Recover or discard the uncommitted tail
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let lease = FileLease::acquire(&config.path, config.buffer_cache_size)?;
        let (generation, recovery) = Self::mount(&config, lease)?;

        info!(
            "Opened {} (revision {}, {} documents, {} recovered)",
            config.path.display(),
            generation.header.revision,
            generation.header.doc_count,
            recovery.entries_recovered
        );

        Ok(Self {
            path: RwLock::new(config.path.clone()),
            config,
            recovery,
            write_lock: Mutex::new(()),
            state: RwLock::new(Some(generation)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the body stored under `key`
    ///
    /// Fails with [`ArborError::NotFound`] if the key is absent or deleted.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.get_document(key).map(|doc| doc.body)
    }

    /// Get the whole document stored under `key`
    ///
    /// Search order:
    /// 1. Write-ahead buffer (changes since the last commit)
    /// 2. Index (working copy, then the persisted tree)
    pub fn get_document(&self, key: &[u8]) -> Result<Document> {
        let state = self.state.read();
        let generation = Self::active(&state)?;
        self.check_key(key)?;

        let (offset, length) = match generation.buffer.lookup(key) {
            Some(delta) if delta.deleted => return Err(ArborError::NotFound),
            Some(delta) => (delta.offset, delta.length),
            None => match generation.index.lookup(key)? {
                Some(entry) => (entry.offset, entry.length),
                None => return Err(ArborError::NotFound),
            },
        };

        let bytes = generation.file.read(offset, length as usize)?;
        let doc = document::decode(&bytes)?;

        if doc.key != key {
            return Err(ArborError::Corruption(format!(
                "document at offset {} does not belong to the requested key",
                offset
            )));
        }
        if doc.deleted {
            return Err(ArborError::NotFound);
        }

        Ok(doc)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `body` and `metadata` under `key`, replacing any previous value
    pub fn put(&self, key: &[u8], metadata: &[u8], body: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let mut state = self.state.write();
        let generation = Self::active_mut(&mut state)?;

        self.check_key(key)?;
        if metadata.len() > self.config.max_meta_len {
            return Err(ArborError::InvalidArgument(format!(
                "metadata of {} bytes exceeds limit of {}",
                metadata.len(),
                self.config.max_meta_len
            )));
        }

        self.make_room(generation)?;
        let doc = Document::new(key, metadata, body, generation.last_sequence + 1);
        generation.append(&doc)
    }

    /// Delete `key` by writing a tombstone
    ///
    /// Deleting a key that does not exist is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let mut state = self.state.write();
        let generation = Self::active_mut(&mut state)?;

        self.check_key(key)?;

        self.make_room(generation)?;
        let doc = Document::tombstone(key, generation.last_sequence + 1);
        generation.append(&doc)
    }

    /// Make every change so far durable
    pub fn commit(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let mut state = self.state.write();
        let generation = Self::active_mut(&mut state)?;

        self.commit_generation(generation)
    }

    /// Rewrite the live documents into `new_path` and switch to it
    ///
    /// Steps:
    /// 1. Commit pending changes
    /// 2. Copy live documents into the new file (reads keep going)
    /// 3. Switch the connection to the new file
    /// 4. Remove the old file (if configured)
    pub fn compact(&self, new_path: impl AsRef<Path>) -> Result<()> {
        let new_path = new_path.as_ref();
        let _write_guard = self.write_lock.lock();

        // Step 1: fold pending deltas so the committed index is complete
        let (source_index, source_file, last_sequence) = {
            let mut state = self.state.write();
            let generation = Self::active_mut(&mut state)?;

            if runtime::resolve_path(new_path)? == generation.lease.path() {
                return Err(ArborError::InvalidArgument(format!(
                    "cannot compact {} onto itself",
                    new_path.display()
                )));
            }

            self.commit_generation(generation)?;
            (
                generation.index.snapshot(),
                Arc::clone(&generation.file),
                generation.last_sequence,
            )
        };

        // Step 2: build the new generation without blocking readers
        let lease = FileLease::acquire(new_path, self.config.buffer_cache_size)?;
        let output = Compactor::new(&source_index, &source_file, last_sequence).run(
            new_path,
            lease.file_id(),
            lease.cache(),
        )?;
        drop(source_index);
        drop(source_file);

        // Step 3: repoint
        let mut index = IndexTree::new(
            Arc::clone(&output.file),
            Arc::clone(lease.cache()),
            self.config.index_fanout,
        );
        index.load_root(output.header.root, output.header.doc_count);

        let replacement = Generation {
            lease,
            file: output.file,
            index,
            buffer: WriteAheadBuffer::new(),
            header: output.header,
            last_sequence,
        };

        let old_path = {
            let mut state = self.state.write();
            let generation = Self::active_mut(&mut state)?;
            let old = std::mem::replace(generation, replacement);
            *self.path.write() = new_path.to_path_buf();
            old.file.path().to_path_buf()
        };

        info!(
            "Compacted {} into {}: {} documents, {} -> {} bytes",
            old_path.display(),
            new_path.display(),
            output.stats.documents_copied,
            output.stats.bytes_before,
            output.stats.bytes_after
        );

        // Step 4: retire the old file
        if self.config.remove_after_compaction {
            if let Err(e) = fs::remove_file(&old_path) {
                warn!("Could not remove old file {}: {}", old_path.display(), e);
            }
        }

        Ok(())
    }

    /// Close the connection gracefully
    ///
    /// Commits pending changes and syncs. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let mut state = self.state.write();

        let Some(mut generation) = state.take() else {
            return Ok(());
        };

        let result = self
            .commit_generation(&mut generation)
            .and_then(|_| generation.file.sync());

        info!("Closed {}", generation.file.path().display());
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current statistics
    pub fn info(&self) -> Result<DbInfo> {
        let state = self.state.read();
        let generation = Self::active(&state)?;

        Ok(DbInfo {
            path: generation.file.path().to_path_buf(),
            file_size: generation.file.len(),
            doc_count: generation.header.doc_count,
            pending_count: generation.buffer.pending_count(),
            last_sequence: generation.last_sequence,
            revision: generation.header.revision,
        })
    }

    /// What the last open recovered from the uncommitted tail
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().is_none()
    }

    /// Path of the active file
    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    /// Get the configuration, with `path` naming the active file
    pub fn config(&self) -> Config {
        Config {
            path: self.path(),
            ..self.config.clone()
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn mount(config: &Config, lease: FileLease) -> Result<(Generation, RecoveryResult)> {
        let path = config.path.as_path();

        let (file, header) = if path.exists() {
            StorageFile::open(path, lease.file_id())?
        } else if config.create_if_missing {
            debug!("Creating {}", path.display());
            (StorageFile::create(path, lease.file_id())?, FileHeader::empty())
        } else {
            return Err(ArborError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("database file not found: {}", path.display()),
            )));
        };
        let file = Arc::new(file);

        let mut index = IndexTree::new(
            Arc::clone(&file),
            Arc::clone(lease.cache()),
            config.index_fanout,
        );
        index.load_root(header.root, header.doc_count);

        let mut buffer = WriteAheadBuffer::new();
        let mut last_sequence = header.last_sequence;

        let recovery = if config.recover_uncommitted {
            let (deltas, result) = WalRecovery::recover(&file, header.data_end)?;
            last_sequence = last_sequence.max(result.last_sequence);
            for delta in deltas {
                buffer.record(delta);
            }
            result
        } else {
            WalRecovery::discard(&file, header.data_end)?
        };

        let generation = Generation {
            lease,
            file,
            index,
            buffer,
            header,
            last_sequence,
        };
        Ok((generation, recovery))
    }

    /// Fold pending deltas into the index and write a new header
    ///
    /// Called with the write lock held.
    fn commit_generation(&self, generation: &mut Generation) -> Result<()> {
        if generation.buffer.is_empty() && generation.index.pending_len() == 0 {
            return Ok(());
        }

        let deltas = generation.buffer.drain();
        let folded = deltas.len();
        for delta in deltas {
            match delta.to_entry() {
                Some(entry) => generation.index.upsert(entry),
                None => generation.index.remove(&delta.key),
            }
        }

        let root = generation.index.snapshot_root()?;
        let fsync = self.config.sync_strategy == SyncStrategy::Fsync;
        if fsync {
            generation.file.sync()?;
        }

        let header = FileHeader {
            revision: generation.header.revision + 1,
            root,
            data_end: generation.file.len(),
            last_sequence: generation.last_sequence,
            doc_count: generation.index.len(),
        };
        generation.file.write_header(&header)?;
        if fsync {
            generation.file.sync()?;
        }

        debug!(
            "Committed revision {}: {} deltas, {} documents",
            header.revision, folded, header.doc_count
        );
        generation.header = header;
        Ok(())
    }

    /// Commit first when the buffer is full, so a failed commit fails the
    /// mutation before anything is appended. A working copy left behind by a
    /// failed commit is retried the same way.
    fn make_room(&self, generation: &mut Generation) -> Result<()> {
        if generation.buffer.is_full(self.config.wal_threshold)
            || generation.index.pending_len() > 0
        {
            self.commit_generation(generation)?;
        }
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(ArborError::InvalidArgument("key must not be empty".to_string()));
        }
        if key.len() > self.config.max_key_len {
            return Err(ArborError::InvalidArgument(format!(
                "key of {} bytes exceeds limit of {}",
                key.len(),
                self.config.max_key_len
            )));
        }
        Ok(())
    }

    fn active(state: &Option<Generation>) -> Result<&Generation> {
        state
            .as_ref()
            .ok_or_else(|| ArborError::InvalidState("connection is closed".to_string()))
    }

    fn active_mut(state: &mut Option<Generation>) -> Result<&mut Generation> {
        state
            .as_mut()
            .ok_or_else(|| ArborError::InvalidState("connection is closed".to_string()))
    }
}

impl Generation {
    /// Append a document block and record its delta
    fn append(&mut self, doc: &Document) -> Result<()> {
        let encoded_len = doc.encoded_len();
        if encoded_len > u32::MAX as usize {
            return Err(ArborError::InvalidArgument(format!(
                "document of {} bytes is too large",
                encoded_len
            )));
        }

        let bytes = document::encode(doc);
        let offset = self.file.append(&bytes)?;

        self.buffer.record(Delta {
            key: doc.key.clone(),
            offset,
            length: bytes.len() as u32,
            sequence: doc.sequence,
            deleted: doc.deleted,
        });
        self.last_sequence = doc.sequence;
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &*self.path.read())
            .field("closed", &self.is_closed())
            .finish()
    }
}
