//! CARv1 payload scanning.
//!
//! A piece's payload is a CARv1 stream: a varint-length-prefixed header
//! followed by sections of `varint(length) || cid || block bytes`. The
//! scanner walks the stream once and emits one index record per
//! section, addressing the block payload (not the section framing)
//! within the piece.

use crate::error::{ShardError, ShardResult};
use cid::Cid;
use tokio::io::{AsyncRead, AsyncReadExt};
use wharf_core::Record;

/// Largest section the scanner will accept. Pieces are power-of-two
/// padded, so a section claiming more than this is framing garbage.
const MAX_SECTION_BYTES: u64 = 1 << 30;

/// Read one unsigned varint. Returns `None` on clean EOF at a varint
/// boundary (end of stream or zero padding).
async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> ShardResult<Option<(u64, u64)>> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut read = 0u64;
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && read == 0 => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        read += 1;
        if shift > 63 {
            return Err(ShardError::CorruptPayload("varint overflow".to_string()));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(Some((value, read)));
        }
        shift += 7;
    }
}

/// Scan a CARv1 stream and build the piece's block index.
pub async fn scan_car_records<R: AsyncRead + Unpin>(mut reader: R) -> ShardResult<Vec<Record>> {
    let mut pos: u64 = 0;

    let (header_len, n) = read_varint(&mut reader)
        .await?
        .ok_or_else(|| ShardError::CorruptPayload("empty payload".to_string()))?;
    if header_len == 0 || header_len > MAX_SECTION_BYTES {
        return Err(ShardError::CorruptPayload(format!(
            "implausible header length {header_len}"
        )));
    }
    pos += n;

    // The header content (roots, version) is irrelevant to the index.
    let mut header = vec![0u8; header_len as usize];
    reader.read_exact(&mut header).await?;
    pos += header_len;

    let mut records = Vec::new();
    loop {
        let Some((section_len, n)) = read_varint(&mut reader).await? else {
            break;
        };
        if section_len == 0 {
            // Zero padding after the last section.
            break;
        }
        if section_len > MAX_SECTION_BYTES {
            return Err(ShardError::CorruptPayload(format!(
                "implausible section length {section_len}"
            )));
        }
        pos += n;

        let mut section = vec![0u8; section_len as usize];
        reader.read_exact(&mut section).await?;

        let mut cursor = std::io::Cursor::new(section.as_slice());
        let cid = Cid::read_bytes(&mut cursor)
            .map_err(|e| ShardError::CorruptPayload(format!("bad section cid: {e}")))?;
        let cid_len = cursor.position();
        if cid_len > section_len {
            return Err(ShardError::CorruptPayload(
                "section shorter than its cid".to_string(),
            ));
        }

        records.push(Record::new(cid, pos + cid_len, section_len - cid_len));
        pos += section_len;
    }

    Ok(records)
}
