//! Tests for StorageFile and the header slots
//!
//! These tests verify:
//! - Creating and reopening files
//! - Append-only writes with increasing offsets
//! - Bounds-checked reads
//! - Header slot alternation and fallback after a torn header

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use arbordb::storage::{BlockPtr, FileHeader, StorageFile, HEADER_REGION, HEADER_SLOT_SIZE};
use arbordb::ArborError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.db");
    (temp_dir, path)
}

fn header(revision: u64, data_end: u64) -> FileHeader {
    FileHeader {
        revision,
        root: Some(BlockPtr::new(HEADER_REGION, 10)),
        data_end,
        last_sequence: revision * 10,
        doc_count: revision,
    }
}

// =============================================================================
// Create/Open Tests
// =============================================================================

#[test]
fn test_create_writes_empty_header() {
    let (_temp, path) = setup_temp_path();

    let file = StorageFile::create(&path, 1).unwrap();

    assert_eq!(file.len(), HEADER_REGION);
    assert!(file.is_empty());
    assert_eq!(file.read_header().unwrap(), FileHeader::empty());
}

#[test]
fn test_create_fails_if_exists() {
    let (_temp, path) = setup_temp_path();

    let _file = StorageFile::create(&path, 1).unwrap();
    let result = StorageFile::create(&path, 2);

    assert!(matches!(result, Err(ArborError::Io(_))));
}

#[test]
fn test_open_missing_file() {
    let (_temp, path) = setup_temp_path();

    let result = StorageFile::open(&path, 1);

    assert!(matches!(result, Err(ArborError::Io(_))));
}

#[test]
fn test_open_zero_length_file_initializes() {
    let (_temp, path) = setup_temp_path();
    std::fs::File::create(&path).unwrap();

    let (file, header) = StorageFile::open(&path, 1).unwrap();

    assert_eq!(header, FileHeader::empty());
    assert_eq!(file.len(), HEADER_REGION);
}

#[test]
fn test_open_zeroed_header_region_initializes() {
    for len in [HEADER_REGION as usize, 40] {
        let (_temp, path) = setup_temp_path();
        std::fs::write(&path, vec![0u8; len]).unwrap();

        let (file, header) = StorageFile::open(&path, 1).unwrap();

        assert_eq!(header, FileHeader::empty(), "len {}", len);
        assert_eq!(file.len(), HEADER_REGION);
        assert_eq!(file.read_header().unwrap(), FileHeader::empty());
    }
}

#[test]
fn test_zeroed_header_with_data_is_corruption() {
    let (_temp, path) = setup_temp_path();
    std::fs::write(&path, vec![0u8; HEADER_REGION as usize + 16]).unwrap();

    let result = StorageFile::open(&path, 1);

    assert!(matches!(result, Err(ArborError::Corruption(_))));
}

#[test]
fn test_open_too_small_file() {
    let (_temp, path) = setup_temp_path();
    std::fs::write(&path, b"not a database").unwrap();

    let result = StorageFile::open(&path, 1);

    assert!(matches!(result, Err(ArborError::Corruption(_))));
}

#[test]
fn test_open_garbage_header() {
    let (_temp, path) = setup_temp_path();
    std::fs::write(&path, vec![0x5A; 512]).unwrap();

    let result = StorageFile::open(&path, 1);

    assert!(matches!(result, Err(ArborError::Corruption(_))));
}

// =============================================================================
// Append/Read Tests
// =============================================================================

#[test]
fn test_append_returns_increasing_offsets() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();

    let first = file.append(b"hello").unwrap();
    let second = file.append(b"world!").unwrap();

    assert_eq!(first, HEADER_REGION);
    assert_eq!(second, HEADER_REGION + 5);
    assert_eq!(file.len(), HEADER_REGION + 11);
}

#[test]
fn test_read_back_appended_bytes() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();

    let a = file.append(b"alpha").unwrap();
    let b = file.append(b"beta").unwrap();

    assert_eq!(file.read(a, 5).unwrap(), b"alpha");
    assert_eq!(file.read(b, 4).unwrap(), b"beta");
}

#[test]
fn test_read_past_end_is_corruption() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();
    let offset = file.append(b"abc").unwrap();

    assert!(file.read(offset, 4).unwrap_err().is_corruption());
    assert!(file.read(offset + 100, 1).unwrap_err().is_corruption());
    assert!(file.read(u64::MAX, 2).unwrap_err().is_corruption());
}

#[test]
fn test_read_inside_header_is_corruption() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();
    file.append(b"abc").unwrap();

    assert!(file.read(0, 8).unwrap_err().is_corruption());
}

#[test]
fn test_read_at_most_stops_at_eof() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();
    let offset = file.append(b"abc").unwrap();

    assert_eq!(file.read_at_most(offset, 100).unwrap(), b"abc");
    assert!(file.read_at_most(offset + 3, 100).unwrap().is_empty());
}

#[test]
fn test_truncate_drops_tail() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();
    let offset = file.append(b"keep").unwrap();
    file.append(b"drop").unwrap();

    file.truncate(offset + 4).unwrap();

    assert_eq!(file.len(), offset + 4);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), offset + 4);
    assert!(file.truncate(0).is_err());
}

#[test]
fn test_data_survives_reopen() {
    let (_temp, path) = setup_temp_path();

    let offset = {
        let file = StorageFile::create(&path, 1).unwrap();
        let offset = file.append(b"persisted").unwrap();
        file.write_header(&header(1, file.len())).unwrap();
        file.sync().unwrap();
        offset
    };

    let (file, committed) = StorageFile::open(&path, 2).unwrap();
    assert_eq!(committed, header(1, offset + 9));
    assert_eq!(file.read(offset, 9).unwrap(), b"persisted");
}

// =============================================================================
// Header Slot Tests
// =============================================================================

#[test]
fn test_header_encode_decode() {
    let original = header(5, 4096);

    let decoded = FileHeader::decode(&original.encode()).unwrap();

    assert_eq!(decoded, original);
}

#[test]
fn test_header_empty_root_round_trips_as_none() {
    let original = FileHeader::empty();

    let decoded = FileHeader::decode(&original.encode()).unwrap();

    assert_eq!(decoded.root, None);
}

#[test]
fn test_header_slots_alternate() {
    assert_eq!(header(1, 0).slot_offset(), HEADER_SLOT_SIZE as u64);
    assert_eq!(header(2, 0).slot_offset(), 0);
}

#[test]
fn test_newest_header_wins() {
    let (_temp, path) = setup_temp_path();
    let file = StorageFile::create(&path, 1).unwrap();
    file.append(&[0u8; 64]).unwrap();

    file.write_header(&header(1, HEADER_REGION)).unwrap();
    file.write_header(&header(2, HEADER_REGION + 64)).unwrap();

    assert_eq!(file.read_header().unwrap().revision, 2);
}

#[test]
fn test_torn_header_falls_back_to_previous_slot() {
    let (_temp, path) = setup_temp_path();
    {
        let file = StorageFile::create(&path, 1).unwrap();
        file.append(&[0u8; 64]).unwrap();
        file.write_header(&header(1, HEADER_REGION)).unwrap();
        file.write_header(&header(2, HEADER_REGION + 64)).unwrap();
        file.sync().unwrap();
    }

    // Revision 2 lives in slot A; scribble over part of it
    {
        let mut raw = OpenOptions::new().write(true).open(&path).unwrap();
        raw.seek(SeekFrom::Start(20)).unwrap();
        raw.write_all(&[0xFF; 8]).unwrap();
    }

    let (_file, committed) = StorageFile::open(&path, 2).unwrap();
    assert_eq!(committed.revision, 1);
    assert_eq!(committed.data_end, HEADER_REGION);
}

#[test]
fn test_header_past_end_of_file_falls_back() {
    let (_temp, path) = setup_temp_path();
    let committed_len = {
        let file = StorageFile::create(&path, 1).unwrap();
        file.append(&[1u8; 32]).unwrap();
        file.write_header(&header(1, file.len())).unwrap();
        let committed_len = file.len();
        file.append(&[2u8; 32]).unwrap();
        file.write_header(&header(2, file.len())).unwrap();
        file.sync().unwrap();
        committed_len
    };

    // Revision 2's header landed but its data did not
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(committed_len)
        .unwrap();

    let (_file, committed) = StorageFile::open(&path, 2).unwrap();
    assert_eq!(committed.revision, 1);
    assert_eq!(committed.data_end, committed_len);
}

#[test]
fn test_no_header_inside_file_is_corruption() {
    let (_temp, path) = setup_temp_path();
    {
        let file = StorageFile::create(&path, 1).unwrap();
        file.append(&[1u8; 32]).unwrap();
        file.write_header(&header(1, HEADER_REGION + 500)).unwrap();
        file.write_header(&header(2, HEADER_REGION + 600)).unwrap();
    }

    let result = StorageFile::open(&path, 2);

    assert!(matches!(result, Err(ArborError::Corruption(_))));
}

#[test]
fn test_header_bad_magic() {
    let mut slot = header(1, 0).encode();
    slot[0] = b'X';

    assert!(FileHeader::decode(&slot).unwrap_err().is_corruption());
}
