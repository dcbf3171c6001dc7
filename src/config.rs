//! Configuration for ArborDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{ArborError, Result};

/// Main configuration for an ArborDB connection
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the database file
    pub path: PathBuf,

    /// Create the file when it does not exist yet
    pub create_if_missing: bool,

    /// How commits reach the disk
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Write-Ahead Buffer Configuration
    // -------------------------------------------------------------------------
    /// Commit automatically before a write once this many deltas are pending
    pub wal_threshold: usize,

    /// Replay valid document blocks found after the last committed header
    pub recover_uncommitted: bool,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Max entries per leaf and children per branch node
    pub index_fanout: usize,

    /// Budget for the process-wide node cache (in bytes). The first
    /// connection opened in the process sizes the cache.
    pub buffer_cache_size: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Delete the old file once compaction has switched over
    pub remove_after_compaction: bool,

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------
    pub max_key_len: usize,
    pub max_meta_len: usize,
}

/// Commit sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync data and header on every commit (durable)
    Fsync,

    /// Leave flushing to the OS (fast, commits may be lost on power failure)
    OsBuffered,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./arbordb.db"),
            create_if_missing: true,
            sync_strategy: SyncStrategy::Fsync,
            wal_threshold: 1024,
            recover_uncommitted: true,
            index_fanout: 64,
            buffer_cache_size: 1024 * 1024, // 1 MB
            remove_after_compaction: true,
            max_key_len: 3840,
            max_meta_len: 65512,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ArborError::Config("path must not be empty".to_string()));
        }
        if self.wal_threshold == 0 {
            return Err(ArborError::Config(
                "wal_threshold must be at least 1".to_string(),
            ));
        }
        if self.index_fanout < 3 {
            return Err(ArborError::Config(format!(
                "index_fanout must be at least 3, got {}",
                self.index_fanout
            )));
        }
        if self.max_key_len == 0 {
            return Err(ArborError::Config(
                "max_key_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Set the commit sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the number of pending deltas that forces a commit
    pub fn wal_threshold(mut self, threshold: usize) -> Self {
        self.config.wal_threshold = threshold;
        self
    }

    pub fn recover_uncommitted(mut self, recover: bool) -> Self {
        self.config.recover_uncommitted = recover;
        self
    }

    /// Set the index node fan-out
    pub fn index_fanout(mut self, fanout: usize) -> Self {
        self.config.index_fanout = fanout;
        self
    }

    /// Set the node cache budget (in bytes)
    pub fn buffer_cache_size(mut self, size: usize) -> Self {
        self.config.buffer_cache_size = size;
        self
    }

    pub fn remove_after_compaction(mut self, remove: bool) -> Self {
        self.config.remove_after_compaction = remove;
        self
    }

    pub fn max_key_len(mut self, len: usize) -> Self {
        self.config.max_key_len = len;
        self
    }

    pub fn max_meta_len(mut self, len: usize) -> Self {
        self.config.max_meta_len = len;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
