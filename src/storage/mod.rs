//! Storage Module
//!
//! The single database file: two fixed header slots followed by an
//! append-only run of blocks.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header slot A (64 bytes)               │
//! ├────────────────────────────────────────┤
//! │ Header slot B (64 bytes)               │
//! ├────────────────────────────────────────┤
//! │ Block (document or index node)         │
//! │ Block                                  │
//! │ ... (append only)                      │
//! └────────────────────────────────────────┘
//! ```
//!
//! Commits write header revision `r` into slot `r % 2`, so the previous
//! committed header is never the one being overwritten.

mod file;
mod header;

use serde::{Deserialize, Serialize};

pub use file::StorageFile;
pub use header::{FileHeader, FORMAT_VERSION, HEADER_REGION, HEADER_SLOT_SIZE, MAGIC};

/// Location of one block inside the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPtr {
    pub offset: u64,
    pub length: u32,
}

impl BlockPtr {
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }
}
