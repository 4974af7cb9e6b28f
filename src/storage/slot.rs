//! # Line Pointers
//!
//! Every slot in a page's line pointer table is a single packed `u32`:
//!
//! ```text
//! bits 0..15   offset   byte offset of storage, or redirect target slot
//! bits 15..17  state    Unused / Normal / Redirect / Dead
//! bits 17..32  length   storage length, or redirect payload offset
//! ```
//!
//! ## States
//!
//! | State    | offset field        | length field           |
//! |----------|---------------------|------------------------|
//! | Unused   | 0                   | 0                      |
//! | Normal   | storage offset      | storage length         |
//! | Redirect | target slot id      | 0, or payload offset   |
//! | Dead     | 0                   | 0                      |
//!
//! A redirect whose length field is nonzero carries data: the length field
//! is reinterpreted as the byte offset of a small payload in the storage
//! arena. The payload begins with a [`RedirectHeader`] giving its type and
//! total length, so a reader needs no other context to parse it. Decoding
//! surfaces this case as the distinct [`Slot::RedirectWithData`] variant;
//! the packed representation stays bit-compatible with the 15/2/15 layout.
//!
//! An Unused slot is immediately reusable. A Dead slot is not: secondary
//! index entries may still reference it, and only index cleanup may
//! downgrade it to Unused.

use eyre::{bail, ensure, Result};

/// Index of a slot within a page's line pointer table.
pub type SlotId = u16;

const STATE_UNUSED: u32 = 0;
const STATE_NORMAL: u32 = 1;
const STATE_REDIRECT: u32 = 2;
const STATE_DEAD: u32 = 3;

const FIELD_MASK: u32 = 0x7FFF;

/// Decoded line pointer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Unused,
    Normal { offset: u16, length: u16 },
    Redirect { target: SlotId },
    RedirectWithData { target: SlotId, data_offset: u16 },
    Dead,
}

impl Slot {
    pub fn encode(self) -> u32 {
        let (offset, state, length) = match self {
            Slot::Unused => (0, STATE_UNUSED, 0),
            Slot::Normal { offset, length } => {
                debug_assert!(length > 0, "normal slot must have storage");
                (offset as u32, STATE_NORMAL, length as u32)
            }
            Slot::Redirect { target } => (target as u32, STATE_REDIRECT, 0),
            Slot::RedirectWithData {
                target,
                data_offset,
            } => {
                debug_assert!(data_offset > 0, "payload cannot live at offset zero");
                (target as u32, STATE_REDIRECT, data_offset as u32)
            }
            Slot::Dead => (0, STATE_DEAD, 0),
        };
        debug_assert!(offset <= FIELD_MASK && length <= FIELD_MASK);
        offset | (state << 15) | (length << 17)
    }

    pub fn decode(word: u32) -> Result<Slot> {
        let offset = (word & FIELD_MASK) as u16;
        let state = (word >> 15) & 0x3;
        let length = ((word >> 17) & FIELD_MASK) as u16;
        match state {
            STATE_UNUSED => {
                ensure!(
                    offset == 0 && length == 0,
                    "malformed unused slot: offset {offset}, length {length}"
                );
                Ok(Slot::Unused)
            }
            STATE_NORMAL => {
                ensure!(length > 0, "normal slot without storage");
                Ok(Slot::Normal { offset, length })
            }
            STATE_REDIRECT => {
                if length == 0 {
                    Ok(Slot::Redirect { target: offset })
                } else {
                    Ok(Slot::RedirectWithData {
                        target: offset,
                        data_offset: length,
                    })
                }
            }
            STATE_DEAD => {
                ensure!(
                    offset == 0 && length == 0,
                    "malformed dead slot: offset {offset}, length {length}"
                );
                Ok(Slot::Dead)
            }
            _ => bail!("unreachable slot state {state}"),
        }
    }

    pub fn is_used(&self) -> bool {
        !matches!(self, Slot::Unused)
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Slot::Normal { .. })
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Slot::Dead)
    }

    /// Redirect target, for both payload-free and payload-bearing redirects.
    pub fn redirect_target(&self) -> Option<SlotId> {
        match *self {
            Slot::Redirect { target } | Slot::RedirectWithData { target, .. } => Some(target),
            _ => None,
        }
    }

    /// True for a redirect that carries a modified-column payload.
    pub fn has_redirect_data(&self) -> bool {
        matches!(self, Slot::RedirectWithData { .. })
    }
}

/// Size of the header in front of every redirect payload.
pub const REDIRECT_HEADER_SIZE: usize = 2;

/// Payload type tag for a modified-column bitmap.
pub const REDIRECT_TAG_COLUMNS: u8 = 0;

/// Header of a redirect payload, packed into a `u16`:
/// bits 0..4 carry the payload type, bits 4..16 the total byte length
/// including the header itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectHeader {
    pub tag: u8,
    pub len: u16,
}

impl RedirectHeader {
    pub fn new(tag: u8, len: u16) -> Self {
        debug_assert!(tag < 16 && len < 1 << 12);
        Self { tag, len }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= REDIRECT_HEADER_SIZE,
            "buffer too small for redirect header: {}",
            data.len()
        );
        let word = u16::from_le_bytes([data[0], data[1]]);
        let header = Self {
            tag: (word & 0xF) as u8,
            len: word >> 4,
        };
        ensure!(
            header.len as usize >= REDIRECT_HEADER_SIZE,
            "redirect payload length {} smaller than its header",
            header.len
        );
        Ok(header)
    }

    pub fn write_to(&self, data: &mut [u8]) {
        debug_assert!(data.len() >= REDIRECT_HEADER_SIZE);
        let word = (self.tag as u16) | (self.len << 4);
        data[0..2].copy_from_slice(&word.to_le_bytes());
    }
}
