//! # VerDB - Heap Page Engine with Version-Chain Pruning
//!
//! VerDB implements the in-page tuple-chain maintenance layer of a
//! slotted-page MVCC row store. Every logical row lives as a chain of
//! physical versions linked by update pointers inside one page. This crate
//! owns the hard part of keeping those chains healthy:
//!
//! - reclaiming dead versions from the front of a chain, and
//! - deciding, per update chain, how much secondary-index maintenance can
//!   be skipped: entirely (HOT), partially (PHOT), or not at all.
//!
//! ## Update Chain Model
//!
//! An update that changes no indexed column produces a heap-only (HOT)
//! tuple: no index entry points at it, lookups reach it through the chain
//! root. An update that changes *some* indexed columns produces a partial
//! heap-only (PHOT) tuple: only the affected indexes get new entries. A
//! bitmap of which columns changed is what keeps the remaining, older
//! index entries resolvable after the intermediate versions are pruned.
//!
//! ```text
//!  slot table                     tuple storage arena
//! +--------------+
//! | 1: REDIRECT+DATA ----------> [bitmap: changed cols]
//! | 2: REDIRECT  |                     |
//! | 3: NORMAL  --+--------------> [v4 xmin=105 (live)]
//! +--------------+
//!   1 -> 2 -> 3: each redirect hop crosses one indexed-column
//!   change epoch; the bitmap says which columns changed there.
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------+
//! |  prune::driver  (scan page, apply plan)  |
//! +------------------------------------------+
//! |  prune::chain   ->  prune::collapse      |
//! |  (walk one chain)   (decide slot fates)  |
//! +------------------------------------------+
//! |  prune::columns   |  prune::redirect     |
//! |  (diff tracking)  |  (bitmap codec)      |
//! +-------------------+----------------------+
//! |  mvcc  (tuple headers, visibility)       |
//! +------------------------------------------+
//! |  storage  (page buffer, line pointers)   |
//! +------------------------------------------+
//! ```
//!
//! ## Concurrency Contract
//!
//! A prune pass runs synchronously under an exclusive lock on exactly one
//! page, held by the caller. There is no I/O and no suspension; all
//! planned mutations are buffered in a [`prune::PrunePlan`] and applied in
//! one short atomic step, so concurrent readers of the page never observe
//! a half-pruned chain. Independent pages may be pruned by independent
//! workers because chains never span pages.
//!
//! Buffer management, WAL construction, and the heuristic for *when* to
//! prune opportunistically all live with the caller.

pub mod config;
pub mod mvcc;
pub mod prune;
pub mod record;
pub mod storage;

pub use mvcc::{HorizonVisibility, TupleHeader, TupleStatus, TxId, Visibility, INVALID_TX_ID};
pub use prune::{
    find_chain_roots, prune_page, BytewiseComparator, ColumnComparator, ColumnSet, PruneResult,
    RelationDesc,
};
pub use storage::{HeapPage, HeapPageMut, PageHeader, PageType, Slot, SlotId};
