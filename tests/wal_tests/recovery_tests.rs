//! Tests for recovery of the uncommitted tail
//!
//! These tests verify:
//! - Recovery from a clean tail (no corruption)
//! - Recovery with nothing after the committed region
//! - Recovery with a torn final block (truncated tail)
//! - Recovery with a corrupted block (CRC mismatch)
//! - Index node blocks from an interrupted commit are skipped
//! - Discard and verify modes

use std::path::PathBuf;

use arbordb::document::{self, Document};
use arbordb::index::{encode_node, IndexEntry, Node};
use arbordb::storage::{StorageFile, HEADER_REGION};
use arbordb::wal::WalRecovery;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf, StorageFile) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.db");
    let file = StorageFile::create(&path, 1).unwrap();
    (temp_dir, path, file)
}

/// Append `count` documents and return the offset after each block
fn append_documents(file: &StorageFile, count: u64) -> Vec<u64> {
    (0..count)
        .map(|i| {
            let doc = Document::new(
                format!("key{}", i).as_bytes(),
                b"",
                format!("value{}", i).as_bytes(),
                i + 1,
            );
            file.append(&document::encode(&doc)).unwrap();
            file.len()
        })
        .collect()
}

// =============================================================================
// Recover: Clean Tail Tests
// =============================================================================

#[test]
fn test_recover_nothing_uncommitted() {
    let (_temp, _path, file) = setup_temp_file();

    let (deltas, result) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    assert!(deltas.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_tail() {
    let (_temp, _path, file) = setup_temp_file();
    append_documents(&file, 5);

    let (deltas, result) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    assert_eq!(deltas.len(), 5);
    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.last_sequence, 5);
    assert_eq!(result.bytes_discarded, 0);
    assert_eq!(deltas[0].offset, HEADER_REGION);
    assert_eq!(deltas[2].key, b"key2");
}

#[test]
fn test_recovered_delta_points_at_readable_block() {
    let (_temp, _path, file) = setup_temp_file();
    append_documents(&file, 3);

    let (deltas, _) = WalRecovery::recover(&file, HEADER_REGION).unwrap();
    let last = &deltas[2];
    let doc = document::decode(&file.read(last.offset, last.length as usize).unwrap()).unwrap();

    assert_eq!(doc.body, b"value2");
}

#[test]
fn test_recover_starts_at_data_end() {
    let (_temp, _path, file) = setup_temp_file();
    let ends = append_documents(&file, 4);

    let (deltas, result) = WalRecovery::recover(&file, ends[1]).unwrap();

    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[0].key, b"key2");
    assert_eq!(result.last_sequence, 4);
}

#[test]
fn test_recover_tombstone() {
    let (_temp, _path, file) = setup_temp_file();
    file.append(&document::encode(&Document::tombstone(b"gone", 7))).unwrap();

    let (deltas, _) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    assert_eq!(deltas.len(), 1);
    assert!(deltas[0].deleted);
    assert_eq!(deltas[0].sequence, 7);
}

// =============================================================================
// Recover: Torn / Corrupt Tail Tests
// =============================================================================

#[test]
fn test_recover_torn_final_block() {
    let (_temp, path, file) = setup_temp_file();
    let ends = append_documents(&file, 3);

    // Half of a fourth block
    let doc = Document::new(b"torn", b"", b"never finished", 4);
    let bytes = document::encode(&doc);
    file.append(&bytes[..bytes.len() / 2]).unwrap();

    let (deltas, result) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    assert_eq!(deltas.len(), 3);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, (bytes.len() / 2) as u64);
    assert_eq!(file.len(), ends[2]);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), ends[2]);
}

#[test]
fn test_recover_stops_at_corrupt_block() {
    let (_temp, _path, file) = setup_temp_file();
    let ends = append_documents(&file, 1);

    let mut bad = document::encode(&Document::new(b"bad", b"", b"body", 2));
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;
    file.append(&bad).unwrap();
    append_documents(&file, 1);

    let (deltas, result) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    // Nothing after the corrupt block is trusted
    assert_eq!(deltas.len(), 1);
    assert!(result.was_truncated);
    assert_eq!(file.len(), ends[0]);
}

#[test]
fn test_recover_garbage_tail() {
    let (_temp, _path, file) = setup_temp_file();
    let ends = append_documents(&file, 2);
    file.append(&[0x00; 40]).unwrap();

    let (deltas, result) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    assert_eq!(deltas.len(), 2);
    assert_eq!(result.bytes_discarded, 40);
    assert_eq!(file.len(), ends[1]);
}

#[test]
fn test_recover_skips_node_blocks() {
    let (_temp, _path, file) = setup_temp_file();
    append_documents(&file, 2);

    let node = Node::Leaf(vec![IndexEntry::new(b"key0".to_vec(), HEADER_REGION, 36, 1)]);
    file.append(&encode_node(&node).unwrap()).unwrap();
    append_documents(&file, 1);

    let (deltas, result) = WalRecovery::recover(&file, HEADER_REGION).unwrap();

    assert_eq!(deltas.len(), 3);
    assert_eq!(result.blocks_skipped, 1);
    assert!(!result.was_truncated);
}

// =============================================================================
// Discard / Verify Tests
// =============================================================================

#[test]
fn test_discard_truncates_to_data_end() {
    let (_temp, _path, file) = setup_temp_file();
    let ends = append_documents(&file, 3);

    let result = WalRecovery::discard(&file, ends[0]).unwrap();

    assert!(result.was_truncated);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.bytes_discarded, ends[2] - ends[0]);
    assert_eq!(file.len(), ends[0]);
}

#[test]
fn test_discard_with_clean_file_is_noop() {
    let (_temp, _path, file) = setup_temp_file();

    let result = WalRecovery::discard(&file, HEADER_REGION).unwrap();

    assert!(!result.was_truncated);
    assert_eq!(file.len(), HEADER_REGION);
}

#[test]
fn test_verify_leaves_file_untouched() {
    let (_temp, _path, file) = setup_temp_file();
    append_documents(&file, 2);
    file.append(&[0xD0, 0x00, 0x01]).unwrap();
    let len = file.len();

    let result = WalRecovery::verify(&file, HEADER_REGION).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.bytes_discarded, 3);
    assert!(!result.was_truncated);
    assert_eq!(file.len(), len);
}
