//! WAL Recovery
//!
//! Rebuilds the write-ahead buffer from the uncommitted tail of the file.

use tracing::{debug, warn};

use super::Delta;
use crate::document::{self, DOC_BLOCK_KIND, DOC_HEADER_SIZE};
use crate::error::Result;
use crate::index::{decode_node, node_block_length, NODE_BLOCK_KIND, NODE_HEADER_SIZE};
use crate::storage::StorageFile;

/// Handles recovery of the uncommitted tail after a crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Document blocks replayed into the buffer
    pub entries_recovered: u64,

    /// Index node blocks left behind by an interrupted commit
    pub blocks_skipped: u64,

    /// Bytes dropped from the end of the file
    pub bytes_discarded: u64,

    /// Highest sequence number seen in replayed documents
    pub last_sequence: u64,

    /// Whether the file was cut back
    pub was_truncated: bool,
}

/// Outcome of a scan without side effects
struct Scan {
    deltas: Vec<Delta>,
    blocks_skipped: u64,
    valid_end: u64,
}

impl WalRecovery {
    /// Recover document blocks appended after `data_end`
    ///
    /// This will:
    /// 1. Walk blocks from `data_end` to the end of the file
    /// 2. Collect every valid document block as a delta, in file order
    /// 3. Skip valid index node blocks
    /// 4. Stop at the first torn or corrupt block and truncate there
    pub fn recover(file: &StorageFile, data_end: u64) -> Result<(Vec<Delta>, RecoveryResult)> {
        let scan = Self::scan(file, data_end)?;
        let file_len = file.len();

        let mut result = RecoveryResult {
            entries_recovered: scan.deltas.len() as u64,
            blocks_skipped: scan.blocks_skipped,
            bytes_discarded: file_len - scan.valid_end,
            last_sequence: scan.deltas.iter().map(|d| d.sequence).max().unwrap_or(0),
            was_truncated: false,
        };

        if scan.valid_end < file_len {
            warn!(
                "Discarding {} bytes of torn tail at offset {}",
                result.bytes_discarded, scan.valid_end
            );
            file.truncate(scan.valid_end)?;
            result.was_truncated = true;
        }

        debug!(
            "Recovery scanned from {}: {} documents, {} stale nodes",
            data_end, result.entries_recovered, result.blocks_skipped
        );

        Ok((scan.deltas, result))
    }

    /// Drop everything after `data_end` without replaying it
    pub fn discard(file: &StorageFile, data_end: u64) -> Result<RecoveryResult> {
        let file_len = file.len();
        let mut result = RecoveryResult::default();

        if data_end < file_len {
            result.bytes_discarded = file_len - data_end;
            result.was_truncated = true;
            debug!("Discarding {} uncommitted bytes", result.bytes_discarded);
            file.truncate(data_end)?;
        }

        Ok(result)
    }

    /// Inspect the tail after `data_end` without modifying the file
    pub fn verify(file: &StorageFile, data_end: u64) -> Result<RecoveryResult> {
        let scan = Self::scan(file, data_end)?;
        Ok(RecoveryResult {
            entries_recovered: scan.deltas.len() as u64,
            blocks_skipped: scan.blocks_skipped,
            bytes_discarded: file.len() - scan.valid_end,
            last_sequence: scan.deltas.iter().map(|d| d.sequence).max().unwrap_or(0),
            was_truncated: false,
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn scan(file: &StorageFile, data_end: u64) -> Result<Scan> {
        let file_len = file.len();
        let peek_len = DOC_HEADER_SIZE.max(NODE_HEADER_SIZE);

        let mut scan = Scan {
            deltas: Vec::new(),
            blocks_skipped: 0,
            valid_end: data_end,
        };
        let mut pos = data_end;

        while pos < file_len {
            let head = file.read_at_most(pos, peek_len)?;

            let kind = head[0];
            let block_len = match kind {
                DOC_BLOCK_KIND => document::block_length(&head),
                NODE_BLOCK_KIND => node_block_length(&head),
                _ => break,
            };
            let block_len = match block_len {
                Ok(len) if pos + len as u64 <= file_len => len,
                _ => break,
            };

            let bytes = file.read(pos, block_len)?;
            if kind == DOC_BLOCK_KIND {
                let Ok(doc) = document::decode(&bytes) else {
                    break;
                };
                scan.deltas.push(Delta {
                    key: doc.key,
                    offset: pos,
                    length: block_len as u32,
                    sequence: doc.sequence,
                    deleted: doc.deleted,
                });
            } else {
                if decode_node(&bytes).is_err() {
                    break;
                }
                scan.blocks_skipped += 1;
            }

            pos += block_len as u64;
            scan.valid_end = pos;
        }

        Ok(scan)
    }
}
