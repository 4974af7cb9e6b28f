//! # Redirect Payload Codec
//!
//! Serializes a modified-column set into the small blob a key redirect
//! stores in the page arena, and back. The payload must be
//! self-describing: a later pass (or a recovery reader) has nothing but
//! the bytes, so the header carries the payload type and total length,
//! and bit positions follow the stable biased column numbering.
//!
//! ```text
//! +-------------------+--------------------------------------+
//! | RedirectHeader    | bitmap, bit (id - MIN_COLUMN_ID)     |
//! | tag:4  len:12     | set when column `id` changed         |
//! +-------------------+--------------------------------------+
//! ```
//!
//! The bitmap is sized for the relation's declared column count, so every
//! encodable id roundtrips, system columns included.

use eyre::{ensure, Result};

use super::columns::ColumnSet;
use crate::config::MIN_COLUMN_ID;
use crate::storage::{RedirectHeader, REDIRECT_HEADER_SIZE, REDIRECT_TAG_COLUMNS};

fn bitmap_len(column_count: usize) -> usize {
    let bits = (column_count as i64 - MIN_COLUMN_ID as i64 + 1) as usize;
    bits.div_ceil(8)
}

/// Serializes `set` into a payload blob sized for `column_count` columns.
pub fn encode_columns(set: &ColumnSet, column_count: usize) -> Result<Vec<u8>> {
    let total = REDIRECT_HEADER_SIZE + bitmap_len(column_count);
    ensure!(
        total < 1 << 12,
        "redirect payload of {total} bytes exceeds the length field"
    );

    let mut out = vec![0u8; total];
    RedirectHeader::new(REDIRECT_TAG_COLUMNS, total as u16).write_to(&mut out);
    for id in set.iter() {
        ensure!(
            id <= column_count as i32,
            "column id {id} not encodable for a {column_count} column relation"
        );
        let bit = (id - MIN_COLUMN_ID) as usize;
        out[REDIRECT_HEADER_SIZE + bit / 8] |= 1 << (bit % 8);
    }
    Ok(out)
}

/// Reconstructs the column set from payload bytes, header included.
pub fn decode_columns(payload: &[u8]) -> Result<ColumnSet> {
    let header = RedirectHeader::from_bytes(payload)?;
    ensure!(
        header.tag == REDIRECT_TAG_COLUMNS,
        "unknown redirect payload type {}",
        header.tag
    );
    ensure!(
        payload.len() >= header.len as usize,
        "redirect payload truncated: {} < {}",
        payload.len(),
        header.len
    );

    let mut set = ColumnSet::new();
    let bitmap = &payload[REDIRECT_HEADER_SIZE..header.len as usize];
    for (byte_index, &byte) in bitmap.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                set.insert((byte_index * 8 + bit) as i32 + MIN_COLUMN_ID);
            }
        }
    }
    Ok(set)
}
