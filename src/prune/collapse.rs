//! # Dead-Tail Collapser
//!
//! Given a walked chain with a dead prefix, decides every member's final
//! slot state. Members are visited tail to root so the bitmap
//! accumulators can be maintained incrementally:
//!
//! - `pending`: indexed-column changes gathered since the most recent key
//!   item. Becomes the payload of the next key created rootward, which
//!   keeps the invariant that a stored payload equals the union of all
//!   changes between that redirect and its target.
//! - `covered`: union of every key epoch's changes. A member whose own
//!   diff fits inside `covered` adds no reachability information and can
//!   go; one that doesn't starts a new epoch.
//!
//! When `covered` grows to the whole interesting set, every index is
//! guaranteed a newer entry somewhere tailward, so the rest of the chain
//! and the root collapse exactly like a fully dead chain.

use eyre::{ensure, Result};
use smallvec::SmallVec;

use super::chain::ChainMember;
use super::columns::{modified_columns, ColumnSet, RelationDesc};
use super::plan::PrunePlan;
use super::redirect::encode_columns;
use crate::storage::{HeapPage, SlotId};

/// Records the collapse of `members` (root-to-tail order, dead prefix
/// ending at `last_dead`) into `plan`. Returns the number of tuples
/// whose storage goes away.
pub(crate) fn collapse_chain(
    page: &HeapPage,
    rel: &RelationDesc,
    plan: &mut PrunePlan,
    members: &[ChainMember],
    last_dead: SlotId,
) -> Result<usize> {
    ensure!(!members.is_empty(), "cannot collapse an empty chain");
    let n = members.len();
    let root = members[0];
    let tail = members[n - 1];
    let mut ndeleted = 0;

    let any_partial = members.iter().any(|m| m.partial);
    let mut chain_dead = tail.slot == last_dead;

    let mut keys: SmallVec<[SlotId; 8]> = SmallVec::new();
    let mut pending = ColumnSet::new();
    let mut covered = ColumnSet::new();

    // The tail. On a fully dead chain it is reclaimed outright: a
    // partial member anywhere means index entries might still land on
    // it, so it only downgrades to dead; otherwise the slot frees
    // completely. A live partial tail instead seeds the key structure:
    // it is the destination the first key redirect will point at.
    if chain_dead {
        if page.slot(tail.slot)?.is_normal() {
            ndeleted += 1;
        }
        if n == 1 || any_partial {
            plan.record_dead(tail.slot)?;
        } else {
            plan.record_unused(tail.slot)?;
        }
    } else if tail.partial && n > 1 && !rel.interesting.is_empty() {
        keys.push(tail.slot);
        pending = modified_columns(page, rel, members[n - 2].slot, tail.slot, true)?;
        covered = pending.clone();
    }
    let mut has_key = !keys.is_empty();

    // Interior members, nearest the tail first.
    for i in (1..n.saturating_sub(1)).rev() {
        let member = members[i];
        if page.slot(member.slot)?.is_normal() {
            ndeleted += 1;
        }

        // Cheap path: no bitmap work when the rest of the chain is dead
        // or nothing partial has surfaced yet.
        if chain_dead || (!has_key && !member.partial) {
            if member.partial {
                plan.record_dead(member.slot)?;
            } else {
                plan.record_unused(member.slot)?;
            }
            continue;
        }

        let modified = modified_columns(page, rel, members[i - 1].slot, member.slot, member.partial)?;

        // No interesting column changed here: redundant regardless of
        // partial status.
        if modified.is_empty() {
            plan.record_unused(member.slot)?;
            continue;
        }

        // First partial member with surviving index entries: becomes the
        // key redirect aimed at the tail. Its own diff starts the
        // accumulators; the payload materializes on the next key.
        if member.partial && !has_key {
            plan.record_redirect(member.slot, tail.slot)?;
            keys.push(member.slot);
            covered = modified.clone();
            pending = modified;
            has_key = true;
            continue;
        }

        // A heap-only member between keys has no index entries of its
        // own and the key structure already spans it.
        if !member.partial {
            plan.record_unused(member.slot)?;
            continue;
        }

        // Partial member whose changes the chain already records: fold
        // it into the pending payload and release the slot to index
        // cleanup.
        if modified.is_subset(&covered) {
            plan.record_dead(member.slot)?;
            pending.union_with(&modified);
            continue;
        }

        // A change epoch the chain has not seen: this member becomes a
        // new key pointing at the previous one, carrying everything
        // accumulated since that key was created.
        let Some(&prev_key) = keys.last() else {
            eyre::bail!("key accumulator empty with has_key set");
        };
        let payload = encode_columns(&pending, rel.column_count)?;
        plan.record_redirect_with_data(member.slot, prev_key, payload)?;
        keys.push(member.slot);
        covered.union_with(&modified);
        pending = modified;
        if covered == rel.interesting {
            // Every index already resolves through newer entries;
            // nothing older needs to stay reachable.
            chain_dead = true;
        }
    }

    // The root. A single-member chain was fully handled as its own tail.
    if n > 1 {
        if page.slot(root.slot)?.is_normal() {
            ndeleted += 1;
        }
        if chain_dead {
            plan.record_dead(root.slot)?;
        } else if let Some(&key) = keys.last() {
            let payload = encode_columns(&pending, rel.column_count)?;
            plan.record_redirect_with_data(root.slot, key, payload)?;
        } else {
            plan.record_redirect(root.slot, tail.slot)?;
        }
    }

    Ok(ndeleted)
}
