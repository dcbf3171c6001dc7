//! File header
//!
//! ## Slot Format
//! ```text
//! ┌──────────┬─────────┬─────────┬──────────┬────────────┬────────────┐
//! │Magic (4) │ Ver (2) │ Rsv (2) │ Rev (8)  │RootOff (8) │RootLen (4) │
//! └──────────┴─────────┴─────────┴──────────┴────────────┴────────────┘
//! ┌────────────┬────────────┬─────────────┬─────────┬───────────────┐
//! │DataEnd (8) │LastSeq (8) │DocCount (8) │ CRC (4) │   zero pad    │
//! └────────────┴────────────┴─────────────┴─────────┴───────────────┘
//! ```

use bytes::{Buf, BufMut, BytesMut};

use super::BlockPtr;
use crate::error::{ArborError, Result};

pub const MAGIC: &[u8; 4] = b"ARBR";
pub const FORMAT_VERSION: u16 = 1;

/// Size of one header slot
pub const HEADER_SLOT_SIZE: usize = 64;

/// Bytes reserved at the start of the file for both slots
pub const HEADER_REGION: u64 = 2 * HEADER_SLOT_SIZE as u64;

/// Bytes covered by the slot checksum
const CRC_OFFSET: usize = 52;

/// The committed head of a file generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Commit counter, bumped on every header write
    pub revision: u64,

    /// Root of the index tree, `None` while the index is empty
    pub root: Option<BlockPtr>,

    /// File length at the time of the commit; anything beyond is uncommitted
    pub data_end: u64,

    /// Highest sequence number covered by this commit
    pub last_sequence: u64,

    /// Live documents reachable from `root`
    pub doc_count: u64,
}

impl FileHeader {
    /// Header of a freshly created, empty file
    pub fn empty() -> Self {
        Self {
            revision: 0,
            root: None,
            data_end: HEADER_REGION,
            last_sequence: 0,
            doc_count: 0,
        }
    }

    /// Byte offset of the slot this revision lives in
    pub fn slot_offset(&self) -> u64 {
        (self.revision % 2) * HEADER_SLOT_SIZE as u64
    }

    pub fn encode(&self) -> [u8; HEADER_SLOT_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SLOT_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16(FORMAT_VERSION);
        buf.put_u16(0);
        buf.put_u64(self.revision);
        let root = self.root.unwrap_or(BlockPtr::new(0, 0));
        buf.put_u64(root.offset);
        buf.put_u32(root.length);
        buf.put_u64(self.data_end);
        buf.put_u64(self.last_sequence);
        buf.put_u64(self.doc_count);
        debug_assert_eq!(buf.len(), CRC_OFFSET);
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);

        let mut slot = [0u8; HEADER_SLOT_SIZE];
        slot[..buf.len()].copy_from_slice(&buf);
        slot
    }

    pub fn decode(slot: &[u8]) -> Result<Self> {
        if slot.len() < HEADER_SLOT_SIZE {
            return Err(ArborError::Corruption(format!(
                "truncated header slot: expected {} bytes, got {}",
                HEADER_SLOT_SIZE,
                slot.len()
            )));
        }
        if &slot[..4] != MAGIC {
            return Err(ArborError::Corruption("bad header magic".to_string()));
        }

        let mut buf = &slot[4..];
        let version = buf.get_u16();
        let _reserved = buf.get_u16();
        let revision = buf.get_u64();
        let root_offset = buf.get_u64();
        let root_length = buf.get_u32();
        let data_end = buf.get_u64();
        let last_sequence = buf.get_u64();
        let doc_count = buf.get_u64();
        let stored_crc = buf.get_u32();

        let computed_crc = crc32fast::hash(&slot[..CRC_OFFSET]);
        if stored_crc != computed_crc {
            return Err(ArborError::Corruption(format!(
                "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }
        if version != FORMAT_VERSION {
            return Err(ArborError::Corruption(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let root = (root_length > 0).then(|| BlockPtr::new(root_offset, root_length));

        Ok(Self {
            revision,
            root,
            data_end,
            last_sequence,
            doc_count,
        })
    }

    /// Pick the newest valid header out of the two slots
    ///
    /// A slot whose `data_end` lies outside a file of `file_len` bytes
    /// committed data that never reached the disk, and does not count.
    pub fn select(region: &[u8], file_len: u64) -> Result<Self> {
        let slot_a = Self::decode(&region[..HEADER_SLOT_SIZE])
            .and_then(|header| header.check_data_end(file_len));
        let slot_b = Self::decode(&region[HEADER_SLOT_SIZE..])
            .and_then(|header| header.check_data_end(file_len));

        match (slot_a, slot_b) {
            (Ok(a), Ok(b)) => Ok(if b.revision > a.revision { b } else { a }),
            (Ok(a), Err(_)) => Ok(a),
            (Err(_), Ok(b)) => Ok(b),
            (Err(e), Err(_)) => Err(e),
        }
    }

    fn check_data_end(self, file_len: u64) -> Result<Self> {
        if self.data_end < HEADER_REGION || self.data_end > file_len {
            return Err(ArborError::Corruption(format!(
                "header revision {} data end {} outside file of {} bytes",
                self.revision, self.data_end, file_len
            )));
        }
        Ok(self)
    }
}
