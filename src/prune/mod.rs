//! # Version-Chain Pruning
//!
//! The page-local state machine that reclaims dead tuple versions and
//! maintains the redirect structure HOT and PHOT updates depend on.
//!
//! ## Pass Structure
//!
//! A pass over one page has two phases, and nothing in between may fail
//! halfway:
//!
//! 1. **Scan.** Every used, non-dead, not-yet-visited slot is treated as
//!    a potential chain root. The chain walker follows successor links,
//!    classifying members against the visibility horizon; the collapser
//!    then decides each member's fate and records it in a [`PrunePlan`].
//!    The page is not touched.
//! 2. **Apply.** The accumulated plan is executed in one short step:
//!    slot transitions, redirect payload placement, prune hint update,
//!    and fragmentation repair.
//!
//! Structural inconsistency discovered mid-scan (a redirect aimed outside
//! the slot table, a slot planned twice, a chain longer than the page
//! could hold) aborts the pass with an error rather than guessing: a
//! mis-walked chain risks silent data loss at apply time.
//!
//! ## Collapse Rules
//!
//! Scanning a dead-prefixed chain from its tail toward the root:
//!
//! - members on a fully dead chain need no bitmap work at all;
//! - a member whose diff against its predecessor is empty is redundant;
//! - the first partial member with surviving index entries becomes a
//!   plain "key" redirect aimed at the tail;
//! - later partial members fold into the newest key while their changed
//!   columns stay within what the chain has already recorded, and start
//!   a new key redirect (carrying the accumulated bitmap) when they
//!   don't;
//! - once every interesting column has changed somewhere along the
//!   chain, everything older can no longer be referenced by any index
//!   and collapses as if dead.
//!
//! The result: one small bitmap per distinct indexed-column change epoch,
//! and an index lookup landing on any surviving entry can resolve to the
//! live tail.

mod chain;
mod collapse;
mod columns;
mod driver;
mod plan;
mod redirect;

pub use columns::{
    modified_columns, BytewiseComparator, ColumnComparator, ColumnId, ColumnSet, RelationDesc,
};
pub use driver::{find_chain_roots, prune_page, PruneResult};
pub use plan::PrunePlan;
pub use redirect::{decode_columns, encode_columns};
