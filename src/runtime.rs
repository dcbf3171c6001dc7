//! Runtime Module
//!
//! Process-wide state shared by every connection.
//!
//! ## Responsibilities
//! - Own the node cache all connections read through
//! - Track which files are open, so one file has one owner
//! - Hand out process-unique file ids
//! - Tear the shared state down on [`shutdown`]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{ArborError, Result};
use crate::index::NodeCache;

struct Runtime {
    cache: Arc<NodeCache>,
    open_files: HashSet<PathBuf>,
    next_file_id: u64,
}

static RUNTIME: Mutex<Option<Runtime>> = parking_lot::const_mutex(None);

/// Registration of one open file
///
/// Dropping the lease releases the file for other connections.
#[derive(Debug)]
pub struct FileLease {
    path: PathBuf,
    file_id: u64,
    cache: Arc<NodeCache>,
}

impl FileLease {
    /// Register `path` as open
    ///
    /// The first lease in the process creates the shared cache with
    /// `cache_bytes` of budget. Fails with `InvalidState` when the file is
    /// already open.
    pub fn acquire(path: &Path, cache_bytes: usize) -> Result<Self> {
        let key = resolve_path(path)?;

        let mut guard = RUNTIME.lock();
        let runtime = guard.get_or_insert_with(|| {
            debug!("Creating shared node cache ({} bytes)", cache_bytes);
            Runtime {
                cache: Arc::new(NodeCache::with_capacity_bytes(cache_bytes)),
                open_files: HashSet::new(),
                next_file_id: 1,
            }
        });

        if !runtime.open_files.insert(key.clone()) {
            return Err(ArborError::InvalidState(format!(
                "file already open: {}",
                key.display()
            )));
        }

        let file_id = runtime.next_file_id;
        runtime.next_file_id += 1;

        Ok(Self {
            path: key,
            file_id,
            cache: Arc::clone(&runtime.cache),
        })
    }

    /// Absolute path this lease covers
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        if let Some(runtime) = RUNTIME.lock().as_mut() {
            runtime.open_files.remove(&self.path);
        }
    }
}

/// Number of files currently open in this process
pub fn open_file_count() -> usize {
    RUNTIME
        .lock()
        .as_ref()
        .map(|runtime| runtime.open_files.len())
        .unwrap_or(0)
}

/// Release process-wide resources
///
/// Drops the shared node cache. Fails with `InvalidState` while any file is
/// still open; calling it again after it succeeded is a no-op.
pub fn shutdown() -> Result<()> {
    let mut guard = RUNTIME.lock();

    if let Some(runtime) = guard.as_ref() {
        if !runtime.open_files.is_empty() {
            return Err(ArborError::InvalidState(format!(
                "cannot shut down: {} file(s) still open",
                runtime.open_files.len()
            )));
        }
        info!("Shutting down, releasing node cache");
    }

    *guard = None;
    Ok(())
}

/// Absolute form of `path`, resolved even when the file does not exist yet
pub(crate) fn resolve_path(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let name = path.file_name().ok_or_else(|| {
                ArborError::InvalidArgument(format!("not a file path: {}", path.display()))
            })?;
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            Ok(fs::canonicalize(parent)?.join(name))
        }
        Err(e) => Err(e.into()),
    }
}
