//! # ArborDB
//!
//! An embedded, single-file document store with:
//! - Append-only, checksummed document blocks
//! - Copy-on-write B+tree index with immutable committed roots
//! - Write-ahead buffering of index changes between commits
//! - Crash recovery of the uncommitted tail
//! - Online compaction into a fresh file
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Connection                             │
//! │     open / put / get / delete / commit / compact / close     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌─────────────┐
//!   │ Write-Ahead │ │    Index    │   │  Compactor  │
//!   │   Buffer    │ │  (CoW tree) │   │             │
//!   └──────┬──────┘ └──────┬──────┘   └──────┬──────┘
//!          │               │                 │
//!          ▼               ▼                 ▼
//!   ┌─────────────────────────────────────────────────┐
//!   │   Document Codec  ·  Storage File (append-only)  │
//!   └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use arbordb::Connection;
//!
//! let db = Connection::open_path("a.db")?;
//! db.put(b"user:1", b"", b"alice")?;
//! db.commit()?;
//! assert_eq!(db.get(b"user:1")?, b"alice");
//! db.delete(b"user:1")?;
//! assert!(db.get(b"user:1").unwrap_err().is_not_found());
//! db.close()?;
//! # Ok::<(), arbordb::ArborError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod document;
pub mod storage;
pub mod index;
pub mod wal;
pub mod compaction;
pub mod runtime;
pub mod connection;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ArborError, Result};
pub use config::{Config, SyncStrategy};
pub use connection::{Connection, DbInfo};
pub use document::Document;
pub use runtime::shutdown;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ArborDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
