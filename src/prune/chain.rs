//! # Chain Walker
//!
//! Follows one update chain from its root, producing the ordered member
//! list the collapser consumes. Each member is classified against the
//! visibility horizon and flagged as partial when index entries may still
//! point at it: a partial heap-only tuple, a non-heap-only tuple
//! superseded by a partial update, or a redirect carrying a
//! modified-column payload.
//!
//! The walk records members up to and including the first one that is
//! not dead; that member is where the root will be redirected. Several
//! stop conditions are ordinary concurrency artifacts rather than
//! errors: a successor whose xmin does not match the predecessor's xmax
//! (the update aborted and the slot was reused), a slot already visited
//! by this pass, an unused or dead slot. A redirect aimed outside the
//! slot table is different: redirect targets must resolve within the
//! page, so that is corruption and the pass aborts.

use eyre::{ensure, Result};
use smallvec::SmallVec;

use super::collapse::collapse_chain;
use super::columns::RelationDesc;
use super::plan::PrunePlan;
use crate::config::MAX_SLOTS_PER_PAGE;
use crate::mvcc::{TupleStatus, Visibility, INVALID_TX_ID};
use crate::storage::{HeapPage, Slot, SlotId};

/// One chain member, in root-to-tail order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainMember {
    pub slot: SlotId,
    /// Index entries may still reference this member directly.
    pub partial: bool,
}

/// Prunes the chain rooted at `root`, recording transitions into `plan`.
/// Returns the number of tuples this chain will delete.
pub(crate) fn prune_chain(
    page: &HeapPage,
    rel: &RelationDesc,
    vis: &dyn Visibility,
    root: SlotId,
    plan: &mut PrunePlan,
) -> Result<usize> {
    let root_slot = page.slot(root)?;

    if root_slot.is_normal() {
        let tuple = page.tuple_header(root)?;
        if tuple.is_heap_only() || tuple.is_partial_heap_only() {
            // Not a chain root. If it is dead and nothing chains to it
            // anymore (an aborted update, typically: the parent was
            // re-updated before any pruning ran), reclaim it on its own.
            // Heap-only tuples have no index entries and free the whole
            // slot; partial ones may still be referenced and only
            // downgrade to dead.
            if vis.classify(&tuple) == TupleStatus::Dead && !tuple.is_updated() {
                if tuple.is_heap_only() {
                    plan.record_unused(root)?;
                } else {
                    plan.record_dead(root)?;
                }
                plan.note_removed(tuple.xmax);
                return Ok(1);
            }
            return Ok(0);
        }
    }

    let slot_count = page.slot_count()?;
    let mut members: SmallVec<[ChainMember; 16]> = SmallVec::new();
    let mut last_dead: Option<SlotId> = None;
    let mut prior_xmax = INVALID_TX_ID;
    let mut offnum = root;

    loop {
        // A successor pointing outside the table is a stale link, not
        // part of this chain.
        if offnum >= slot_count {
            break;
        }
        if plan.is_marked(offnum) {
            break;
        }
        ensure!(
            members.len() <= MAX_SLOTS_PER_PAGE,
            "chain has more members than the page can hold"
        );

        let slot = page.slot(offnum)?;
        match slot {
            Slot::Unused | Slot::Dead => break,

            Slot::Redirect { target } | Slot::RedirectWithData { target, .. } => {
                // An interior redirect only ever exists as a key item
                // from an earlier pass, so index entries point at it
                // even when it carries no payload. At the root the
                // payload is what distinguishes a key from the plain
                // redirect a pure heap-only collapse leaves behind.
                members.push(ChainMember {
                    slot: offnum,
                    partial: slot.has_redirect_data() || !members.is_empty(),
                });
                ensure!(
                    target < slot_count,
                    "redirect target {target} outside the slot table"
                );
                offnum = target;
            }

            Slot::Normal { .. } => {
                let tuple = page.tuple_header(offnum)?;
                if prior_xmax != INVALID_TX_ID && tuple.xmin != prior_xmax {
                    break;
                }

                members.push(ChainMember {
                    slot: offnum,
                    partial: tuple.is_partial_heap_only()
                        || (!tuple.is_heap_only() && tuple.is_phot_updated()),
                });

                let dead = match vis.classify(&tuple) {
                    TupleStatus::Dead => {
                        last_dead = Some(offnum);
                        plan.note_removed(tuple.xmax);
                        true
                    }
                    TupleStatus::RecentlyDead | TupleStatus::InProgress => {
                        // May soon become dead; make sure the page is
                        // reconsidered once the horizon passes it.
                        plan.record_prunable(tuple.xmax);
                        false
                    }
                    TupleStatus::Live => false,
                };

                if !dead || !tuple.is_updated() {
                    break;
                }
                offnum = tuple.next;
                prior_xmax = tuple.xmax;
            }
        }
    }

    if let Some(last_dead) = last_dead {
        collapse_chain(page, rel, plan, &members, last_dead)
    } else if members.len() < 2 && root_slot.redirect_target().is_some() {
        // A redirect with no valid follow-on item. Happens when the scan
        // reclaimed the dead successor before visiting the redirect
        // itself; the slot keeps its index entries, so it becomes dead
        // rather than unused.
        plan.record_dead(root)?;
        Ok(0)
    } else {
        Ok(0)
    }
}
