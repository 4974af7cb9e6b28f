//! # Storage Module
//!
//! The page-level storage layer: a fixed-size slotted page over a
//! caller-provided byte buffer, with a packed line pointer table and a
//! tuple storage arena growing toward each other.
//!
//! ```text
//! +----------------------+ 0
//! | PageHeader (16 B)    |
//! +----------------------+ 16
//! | line pointer array   |  4 B per slot, grows downward
//! +----------------------+ free_start
//! | free space           |
//! +----------------------+ free_end
//! | tuples and redirect  |  grows upward from the page end
//! | payloads (arena)     |
//! +----------------------+ 16384
//! ```
//!
//! The engine never touches disk: buffers come from the caller's buffer
//! manager, already pinned and exclusively locked where mutation is
//! involved. [`HeapPage`] is the shared read view, [`HeapPageMut`] the
//! exclusive write view, mirroring how the lock is held.
//!
//! ## Module Organization
//!
//! - `slot`: packed line pointer word and its decoded tagged form
//! - `page`: page header, slot table access, tuple placement, compaction

mod page;
mod slot;

pub use page::{validate_page, HeapPage, HeapPageMut, PageHeader, PageType};
pub use slot::{RedirectHeader, Slot, SlotId, REDIRECT_HEADER_SIZE, REDIRECT_TAG_COLUMNS};

pub const PAGE_SIZE: usize = 16384;
pub const PAGE_HEADER_SIZE: usize = 16;
pub const PAGE_USABLE_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;
pub const SLOT_SIZE: usize = 4;
