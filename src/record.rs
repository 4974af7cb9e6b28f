//! # Row Payload Format
//!
//! The pruning layer needs exactly one thing from a row: which columns
//! differ between two versions. This module provides the minimal record
//! layout that makes per-column access possible without a catalog.
//!
//! ## Binary Layout
//!
//! ```text
//! +--------------+------------------+----------------+----------------+
//! | column_count | null bitmap      | end offsets    | column data    |
//! | (u16)        | [(N+7)/8 bytes]  | [u16; N]       | concatenated   |
//! +--------------+------------------+----------------+----------------+
//! ```
//!
//! Each end offset is relative to the start of the data region; column
//! `i`'s bytes run from the previous column's end to its own. A null
//! column contributes no bytes and repeats the previous end offset, with
//! its bit set in the null bitmap.
//!
//! Columns are numbered from 1 to match the rest of the system; ids
//! outside the stored range read as absent, which is how rows written
//! before a column was added behave.

use eyre::{ensure, Result};

use crate::prune::ColumnId;

/// Read-only view over serialized record bytes.
pub struct RecordView<'a> {
    data: &'a [u8],
    count: usize,
    bitmap_at: usize,
    offsets_at: usize,
    payload_at: usize,
}

impl<'a> RecordView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        ensure!(data.len() >= 2, "record too small for a column count");
        let count = u16::from_le_bytes([data[0], data[1]]) as usize;
        let bitmap_at = 2;
        let offsets_at = bitmap_at + count.div_ceil(8);
        let payload_at = offsets_at + count * 2;
        ensure!(
            data.len() >= payload_at,
            "record truncated: {} < {}",
            data.len(),
            payload_at
        );

        let view = Self {
            data,
            count,
            bitmap_at,
            offsets_at,
            payload_at,
        };
        let mut prev = 0u16;
        for i in 0..count {
            let end = view.end_offset(i);
            ensure!(end >= prev, "record offsets not monotonic at column {}", i + 1);
            prev = end;
        }
        ensure!(
            payload_at + prev as usize <= data.len(),
            "record data extends past the buffer"
        );
        Ok(view)
    }

    pub fn column_count(&self) -> usize {
        self.count
    }

    fn end_offset(&self, index: usize) -> u16 {
        let at = self.offsets_at + index * 2;
        u16::from_le_bytes([self.data[at], self.data[at + 1]])
    }

    fn is_null(&self, index: usize) -> bool {
        self.data[self.bitmap_at + index / 8] & (1 << (index % 8)) != 0
    }

    /// Bytes of a column, `None` when null or not stored in this row.
    pub fn column(&self, id: ColumnId) -> Option<&'a [u8]> {
        if id < 1 || id as usize > self.count {
            return None;
        }
        let index = id as usize - 1;
        if self.is_null(index) {
            return None;
        }
        let start = if index == 0 { 0 } else { self.end_offset(index - 1) } as usize;
        let end = self.end_offset(index) as usize;
        Some(&self.data[self.payload_at + start..self.payload_at + end])
    }
}

/// Serializes one row.
#[derive(Default)]
pub struct RecordBuilder {
    values: Vec<Option<Vec<u8>>>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Option<&[u8]>) -> &mut Self {
        self.values.push(value.map(|v| v.to_vec()));
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        let count = self.values.len();
        let mut out = Vec::new();
        out.extend_from_slice(&(count as u16).to_le_bytes());

        let mut bitmap = vec![0u8; count.div_ceil(8)];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_none() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        out.extend_from_slice(&bitmap);

        let mut end = 0u16;
        for value in &self.values {
            if let Some(v) = value {
                end += v.len() as u16;
            }
            out.extend_from_slice(&end.to_le_bytes());
        }
        for value in self.values.iter().flatten() {
            out.extend_from_slice(value);
        }
        out
    }
}

/// One-shot helper for rows of plain values.
pub fn build_record(columns: &[Option<&[u8]>]) -> Vec<u8> {
    let mut builder = RecordBuilder::new();
    for column in columns {
        builder.push(*column);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_nulls() {
        let bytes = build_record(&[Some(b"alpha"), None, Some(b""), Some(b"omega")]);
        let view = RecordView::new(&bytes).unwrap();

        assert_eq!(view.column_count(), 4);
        assert_eq!(view.column(1), Some(b"alpha".as_slice()));
        assert_eq!(view.column(2), None);
        assert_eq!(view.column(3), Some(b"".as_slice()));
        assert_eq!(view.column(4), Some(b"omega".as_slice()));
    }

    #[test]
    fn out_of_range_ids_are_absent() {
        let bytes = build_record(&[Some(b"x")]);
        let view = RecordView::new(&bytes).unwrap();

        assert_eq!(view.column(0), None);
        assert_eq!(view.column(2), None);
        assert_eq!(view.column(-1), None);
    }

    #[test]
    fn empty_record() {
        let bytes = build_record(&[]);
        let view = RecordView::new(&bytes).unwrap();
        assert_eq!(view.column_count(), 0);
        assert_eq!(view.column(1), None);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let mut bytes = build_record(&[Some(b"data")]);
        bytes.truncate(3);
        assert!(RecordView::new(&bytes).is_err());
    }

    #[test]
    fn rejects_non_monotonic_offsets() {
        let mut bytes = build_record(&[Some(b"ab"), Some(b"cd")]);
        // corrupt the second end offset to precede the first
        let offsets_at = 2 + 1;
        bytes[offsets_at + 2] = 0;
        bytes[offsets_at + 3] = 0;
        assert!(RecordView::new(&bytes).is_err());
    }
}
