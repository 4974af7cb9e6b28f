//! # Page Driver
//!
//! Orchestrates one prune pass: scan every chain on the page into a
//! [`PrunePlan`], then apply the whole plan in one step. The split keeps
//! the mutation window short and gives crash recovery a single batch to
//! redo. Also hosts the read-only root-mapping traversal index
//! maintenance uses to find the index-visible entry for any chain
//! member.

use eyre::{ensure, Result};
use hashbrown::HashMap;
use tracing::{debug, trace};

use super::chain::prune_chain;
use super::columns::RelationDesc;
use super::plan::PrunePlan;
use crate::config::MAX_SLOTS_PER_PAGE;
use crate::mvcc::{TxId, Visibility, INVALID_TX_ID};
use crate::storage::{HeapPage, HeapPageMut, Slot, SlotId};

/// Outcome of one prune pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneResult {
    /// Tuples whose storage was reclaimed.
    pub deleted: usize,
    /// The page's new prune hint (0 when nothing will become prunable).
    pub new_prune_hint: TxId,
    /// Highest xmax among removed tuples, for conflict bookkeeping.
    pub latest_removed: TxId,
}

/// Prunes every chain on the page.
///
/// The caller holds the exclusive page lock and has computed the
/// visibility horizon once for the whole pass. All planned transitions
/// apply atomically at the end; when the pass plans nothing, only the
/// prune hint and the page-full flag are refreshed.
pub fn prune_page(
    data: &mut [u8],
    rel: &RelationDesc,
    vis: &dyn Visibility,
) -> Result<PruneResult> {
    let mut plan = PrunePlan::new();
    let mut deleted = 0;

    {
        let page = HeapPage::new(data)?;
        let slot_count = page.slot_count()?;
        ensure!(
            (slot_count as usize) <= MAX_SLOTS_PER_PAGE,
            "slot count {slot_count} exceeds page capacity"
        );
        trace!(slots = slot_count as usize, "scanning page for prunable chains");

        for slot_id in 0..slot_count {
            // Already swept up as part of an earlier chain.
            if plan.is_marked(slot_id) {
                continue;
            }
            match page.slot(slot_id)? {
                Slot::Unused | Slot::Dead => continue,
                _ => {}
            }
            deleted += prune_chain(&page, rel, vis, slot_id, &mut plan)?;
        }
    }

    let mut page = HeapPageMut::new(data)?;
    if !plan.is_empty() {
        plan.apply(&mut page)?;
        debug!(
            deleted,
            transitions = plan.transition_count(),
            "applied prune plan"
        );
    } else {
        // Nothing to reclaim, but the hint may have moved and a stale
        // page-full flag would keep callers retrying.
        let header = page.header()?;
        if header.prune_hint() != plan.new_prune_hint() || header.is_full() {
            page.set_prune_hint(plan.new_prune_hint())?;
            page.set_full(false)?;
        }
    }

    Ok(PruneResult {
        deleted,
        new_prune_hint: plan.new_prune_hint(),
        latest_removed: plan.latest_removed(),
    })
}

/// Maps every chain member to the slot an index entry would use to reach
/// it. Payload-free and payload-bearing redirects are treated alike:
/// both are index-visible entries, so each appears as the root for the
/// members behind it while getting no mapping of its own.
pub fn find_chain_roots(data: &[u8]) -> Result<HashMap<SlotId, SlotId>> {
    let page = HeapPage::new(data)?;
    let slot_count = page.slot_count()?;
    let mut roots: HashMap<SlotId, SlotId> = HashMap::new();

    for slot_id in 0..slot_count {
        let (mut next, mut prior_xmax) = match page.slot(slot_id)? {
            Slot::Unused | Slot::Dead => continue,
            Slot::Redirect { target } | Slot::RedirectWithData { target, .. } => {
                (target, INVALID_TX_ID)
            }
            Slot::Normal { .. } => {
                let tuple = page.tuple_header(slot_id)?;
                // Reached through its chain, not a root.
                if tuple.is_heap_only() || tuple.is_partial_heap_only() {
                    continue;
                }
                roots.insert(slot_id, slot_id);
                if !tuple.is_updated() {
                    continue;
                }
                (tuple.next, tuple.xmax)
            }
        };

        let mut hops = 0;
        loop {
            ensure!(
                hops <= MAX_SLOTS_PER_PAGE,
                "chain cycle while mapping roots"
            );
            hops += 1;
            if next >= slot_count {
                break;
            }
            match page.slot(next)? {
                Slot::Redirect { target } | Slot::RedirectWithData { target, .. } => {
                    // An interior key left by a previous prune: follow
                    // it, but the continuity check does not survive the
                    // collapsed members it replaced.
                    next = target;
                    prior_xmax = INVALID_TX_ID;
                    continue;
                }
                Slot::Normal { .. } => {}
                _ => break,
            }
            let tuple = page.tuple_header(next)?;
            if prior_xmax != INVALID_TX_ID && tuple.xmin != prior_xmax {
                break;
            }
            roots.entry(next).or_insert(slot_id);
            if !tuple.is_updated() {
                break;
            }
            prior_xmax = tuple.xmax;
            next = tuple.next;
        }
    }

    Ok(roots)
}
