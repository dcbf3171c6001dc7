//! Document codec
//!
//! Encoding and decoding of document blocks.

use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

use super::Document;
use crate::error::{ArborError, Result};

/// Tag byte that opens every document block
pub const DOC_BLOCK_KIND: u8 = 0xD0;

/// Kind (1) + flags (1) + three lengths (12) + sequence (8) + CRC (4)
pub const DOC_HEADER_SIZE: usize = 26;

/// Offset of the CRC field inside the header
const CRC_OFFSET: usize = DOC_HEADER_SIZE - 4;

const FLAG_DELETED: u8 = 0x01;

/// Encode a document into a self-describing block
pub fn encode(doc: &Document) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(doc.encoded_len());

    buf.put_u8(DOC_BLOCK_KIND);
    buf.put_u8(if doc.deleted { FLAG_DELETED } else { 0 });
    buf.put_u32(doc.key.len() as u32);
    buf.put_u32(doc.metadata.len() as u32);
    buf.put_u32(doc.body.len() as u32);
    buf.put_u64(doc.sequence);

    let mut hasher = Hasher::new();
    hasher.update(&buf[..CRC_OFFSET]);
    hasher.update(&doc.key);
    hasher.update(&doc.metadata);
    hasher.update(&doc.body);
    buf.put_u32(hasher.finalize());

    buf.put_slice(&doc.key);
    buf.put_slice(&doc.metadata);
    buf.put_slice(&doc.body);

    buf.to_vec()
}

/// Decode a document block
///
/// `bytes` must hold exactly one block.
pub fn decode(bytes: &[u8]) -> Result<Document> {
    let total = block_length(bytes)?;
    if bytes.len() != total {
        return Err(ArborError::Corruption(format!(
            "document block length mismatch: header says {} bytes, got {}",
            total,
            bytes.len()
        )));
    }

    let mut header = &bytes[..DOC_HEADER_SIZE];
    let _kind = header.get_u8();
    let flags = header.get_u8();
    let key_len = header.get_u32() as usize;
    let meta_len = header.get_u32() as usize;
    let _body_len = header.get_u32() as usize;
    let sequence = header.get_u64();
    let stored_crc = header.get_u32();

    let payload = &bytes[DOC_HEADER_SIZE..];
    let mut hasher = Hasher::new();
    hasher.update(&bytes[..CRC_OFFSET]);
    hasher.update(payload);
    let computed_crc = hasher.finalize();

    if stored_crc != computed_crc {
        return Err(ArborError::Corruption(format!(
            "document checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }

    if flags & !FLAG_DELETED != 0 {
        return Err(ArborError::Corruption(format!(
            "unknown document flags: {:#04x}",
            flags
        )));
    }

    let (key, rest) = payload.split_at(key_len);
    let (metadata, body) = rest.split_at(meta_len);

    Ok(Document {
        key: key.to_vec(),
        metadata: metadata.to_vec(),
        body: body.to_vec(),
        sequence,
        deleted: flags & FLAG_DELETED != 0,
    })
}

/// Total length of the block whose header starts `bytes`
///
/// Only the header is inspected; the checksum is not verified.
pub fn block_length(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < DOC_HEADER_SIZE {
        return Err(ArborError::Corruption(format!(
            "truncated document header: expected {} bytes, got {}",
            DOC_HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..DOC_HEADER_SIZE];
    let kind = header.get_u8();
    if kind != DOC_BLOCK_KIND {
        return Err(ArborError::Corruption(format!(
            "not a document block: kind {:#04x}",
            kind
        )));
    }
    let _flags = header.get_u8();
    let key_len = header.get_u32() as u64;
    let meta_len = header.get_u32() as u64;
    let body_len = header.get_u32() as u64;

    let total = DOC_HEADER_SIZE as u64 + key_len + meta_len + body_len;
    usize::try_from(total).map_err(|_| {
        ArborError::Corruption(format!("document block too large: {} bytes", total))
    })
}
