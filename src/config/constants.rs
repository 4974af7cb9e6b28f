//! # Configuration Constants
//!
//! Constants whose values constrain each other are collected here so the
//! relationships stay visible when one of them changes.
//!
//! ```text
//! PAGE_SIZE (16384 bytes)
//!       |
//!       +-> line pointer offset/length fields are 15 bits wide, so every
//!       |   byte offset within a page must fit in 0..=32767. PAGE_SIZE
//!       |   may not exceed 32768 without widening the slot word.
//!       |
//!       +-> MAX_SLOTS_PER_PAGE (derived)
//!             Upper bound on slots a page can hold: every slot costs at
//!             least SLOT_SIZE in the table plus TUPLE_HEADER_SIZE of
//!             storage. Sizes the per-pass marked set and chain bound.
//!
//! MIN_COLUMN_ID (-8)
//!       |
//!       +-> bias for the modified-column bitmap encoding: bit index =
//!       |   column id - MIN_COLUMN_ID. System columns occupy ids
//!       |   MIN_COLUMN_ID..0, user columns count from 1.
//!       |
//!       +-> MAX_COLUMNS (1600)
//!             With the bias, the widest bitmap is
//!             (1600 + 8 + 7) / 8 = 202 bytes, which must fit the 12-bit
//!             length field of a redirect payload header (4095 max,
//!             including the 2-byte header).
//! ```

use crate::mvcc::TUPLE_HEADER_SIZE;
use crate::storage::{PAGE_SIZE, PAGE_USABLE_SIZE, SLOT_SIZE};

/// Upper bound on the number of line pointers a page can hold.
pub const MAX_SLOTS_PER_PAGE: usize = PAGE_USABLE_SIZE / (SLOT_SIZE + TUPLE_HEADER_SIZE);

/// Lowest valid column id. Ids below 1 are reserved for system columns.
pub const MIN_COLUMN_ID: i32 = -8;

/// Highest supported user column id.
pub const MAX_COLUMNS: usize = 1600;

const _: () = assert!(
    PAGE_SIZE <= 1usize << 15,
    "page offsets must fit 15-bit slot fields"
);
const _: () = assert!(
    2 + (MAX_COLUMNS + (0 - MIN_COLUMN_ID) as usize + 7) / 8 < 1usize << 12,
    "widest column bitmap must fit the 12-bit payload length field"
);
const _: () = assert!(
    MAX_SLOTS_PER_PAGE < 1usize << 15,
    "slot ids must fit 15-bit redirect targets"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_bound_is_conservative() {
        // 16368 usable bytes / (4 + 20) per minimal tuple.
        assert_eq!(MAX_SLOTS_PER_PAGE, 682);
    }

    #[test]
    fn column_bias_covers_system_ids() {
        assert!(MIN_COLUMN_ID < 0);
        assert_eq!(0 - MIN_COLUMN_ID, 8);
    }
}
