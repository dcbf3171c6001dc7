//! Compaction Module
//!
//! Copies the live documents of one file generation into a fresh file.
//!
//! ## Steps
//! 1. Create the destination file (never overwrites an existing one)
//! 2. Walk the source index in key order, re-encoding each live document
//!    into the destination and feeding its new location to a tree builder
//! 3. Write the destination index and header, then sync
//!
//! The source is only read. If any step fails the partial destination is
//! removed and the source stays the active, intact generation.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::document;
use crate::error::{ArborError, Result};
use crate::index::{IndexEntry, IndexTree, NodeCache, TreeBuilder};
use crate::storage::{FileHeader, StorageFile};

/// Rewrites a committed index into a new file
pub struct Compactor<'a> {
    /// Committed view of the source index
    source: &'a IndexTree,

    source_file: &'a StorageFile,

    /// Carried over so sequence numbers keep increasing after the switch
    last_sequence: u64,

    fanout: usize,
}

/// A finished destination generation
pub struct CompactionOutput {
    pub file: Arc<StorageFile>,
    pub header: FileHeader,
    pub stats: CompactionStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub documents_copied: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl<'a> Compactor<'a> {
    pub fn new(source: &'a IndexTree, source_file: &'a StorageFile, last_sequence: u64) -> Self {
        Self {
            source,
            source_file,
            last_sequence,
            fanout: source.fanout(),
        }
    }

    /// Build the destination file at `dest`
    pub fn run(&self, dest: &Path, file_id: u64, cache: &Arc<NodeCache>) -> Result<CompactionOutput> {
        let file = Arc::new(StorageFile::create(dest, file_id)?);

        match self.copy_into(&file, cache) {
            Ok(output) => Ok(output),
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(dest) {
                    warn!(
                        "Could not remove partial compaction file {}: {}",
                        dest.display(),
                        remove_err
                    );
                }
                Err(e)
            }
        }
    }

    fn copy_into(&self, file: &Arc<StorageFile>, cache: &Arc<NodeCache>) -> Result<CompactionOutput> {
        let mut builder = TreeBuilder::new(Arc::clone(file), Arc::clone(cache), self.fanout);
        let mut copied = 0u64;

        for entry in self.source.iter() {
            let entry = entry?;
            let bytes = self.source_file.read(entry.offset, entry.length as usize)?;
            let doc = document::decode(&bytes)?;

            if doc.key != entry.key {
                return Err(ArborError::Corruption(format!(
                    "index entry at offset {} points to a document with a different key",
                    entry.offset
                )));
            }
            if doc.deleted {
                continue;
            }

            let encoded = document::encode(&doc);
            let offset = file.append(&encoded)?;
            builder.push(IndexEntry::new(doc.key, offset, encoded.len() as u32, doc.sequence))?;
            copied += 1;
        }

        let (root, doc_count) = builder.finish()?;
        file.sync()?;

        let header = FileHeader {
            revision: 1,
            root,
            data_end: file.len(),
            last_sequence: self.last_sequence,
            doc_count,
        };
        file.write_header(&header)?;
        file.sync()?;

        let stats = CompactionStats {
            documents_copied: copied,
            bytes_before: self.source_file.len(),
            bytes_after: file.len(),
        };
        debug!(
            "Compacted {} documents: {} -> {} bytes",
            stats.documents_copied, stats.bytes_before, stats.bytes_after
        );

        Ok(CompactionOutput {
            file: Arc::clone(file),
            header,
            stats,
        })
    }
}
