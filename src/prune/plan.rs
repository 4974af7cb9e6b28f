//! # Prune Plan
//!
//! Pass-local accumulator for the slot transitions a prune pass decides
//! on, and their atomic application. Scanning never touches the page;
//! everything funnels through here so the mutation step stays short and
//! a durability layer can serialize the batch before it runs.
//!
//! The marked set enforces the structural invariant that each slot joins
//! at most one chain per pass: planning a second transition for a slot
//! means the walk went wrong, and the pass aborts instead of applying a
//! plan that would corrupt the slot table.

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::config::MAX_SLOTS_PER_PAGE;
use crate::mvcc::{TxId, INVALID_TX_ID};
use crate::storage::{HeapPageMut, Slot, SlotId};

pub struct PrunePlan {
    redirected: SmallVec<[(SlotId, SlotId); 8]>,
    redirected_data: Vec<(SlotId, SlotId, Vec<u8>)>,
    now_dead: SmallVec<[SlotId; 8]>,
    now_unused: SmallVec<[SlotId; 8]>,
    marked: [bool; MAX_SLOTS_PER_PAGE],
    new_prune_hint: TxId,
    latest_removed: TxId,
}

impl PrunePlan {
    pub fn new() -> Self {
        Self {
            redirected: SmallVec::new(),
            redirected_data: Vec::new(),
            now_dead: SmallVec::new(),
            now_unused: SmallVec::new(),
            marked: [false; MAX_SLOTS_PER_PAGE],
            new_prune_hint: INVALID_TX_ID,
            latest_removed: INVALID_TX_ID,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.redirected.is_empty()
            && self.redirected_data.is_empty()
            && self.now_dead.is_empty()
            && self.now_unused.is_empty()
    }

    pub fn transition_count(&self) -> usize {
        self.redirected.len()
            + self.redirected_data.len()
            + self.now_dead.len()
            + self.now_unused.len()
    }

    pub fn is_marked(&self, slot: SlotId) -> bool {
        self.marked[slot as usize]
    }

    pub fn new_prune_hint(&self) -> TxId {
        self.new_prune_hint
    }

    pub fn latest_removed(&self) -> TxId {
        self.latest_removed
    }

    /// Planned payload-free redirects, `(from, to)`.
    pub fn redirects(&self) -> &[(SlotId, SlotId)] {
        &self.redirected
    }

    /// Planned payload-bearing redirects, `(from, to, payload)`.
    pub fn data_redirects(&self) -> &[(SlotId, SlotId, Vec<u8>)] {
        &self.redirected_data
    }

    pub fn dead(&self) -> &[SlotId] {
        &self.now_dead
    }

    pub fn unused(&self) -> &[SlotId] {
        &self.now_unused
    }

    /// Lowest transaction id that could soon make something on this page
    /// prunable; becomes the page's new prune hint.
    pub fn record_prunable(&mut self, xid: TxId) {
        if xid == INVALID_TX_ID {
            return;
        }
        if self.new_prune_hint == INVALID_TX_ID || xid < self.new_prune_hint {
            self.new_prune_hint = xid;
        }
    }

    /// Highest xmax among tuples whose storage this pass reclaims, for
    /// the caller's conflict/durability bookkeeping.
    pub fn note_removed(&mut self, xid: TxId) {
        if xid != INVALID_TX_ID && xid > self.latest_removed {
            self.latest_removed = xid;
        }
    }

    /// Claims `slot` for a transition. Fatal if the slot already has one.
    fn claim(&mut self, slot: SlotId) -> Result<()> {
        ensure!(
            (slot as usize) < MAX_SLOTS_PER_PAGE,
            "slot {slot} out of range"
        );
        ensure!(!self.marked[slot as usize], "slot {slot} planned twice");
        self.marked[slot as usize] = true;
        Ok(())
    }

    /// Marks a redirect destination as visited. Destinations may be
    /// shared (several keys can funnel into one), so no double-claim
    /// check applies.
    fn mark_destination(&mut self, slot: SlotId) -> Result<()> {
        ensure!(
            (slot as usize) < MAX_SLOTS_PER_PAGE,
            "redirect target {slot} out of range"
        );
        self.marked[slot as usize] = true;
        Ok(())
    }

    pub fn record_redirect(&mut self, from: SlotId, to: SlotId) -> Result<()> {
        self.claim(from)?;
        self.mark_destination(to)?;
        self.redirected.push((from, to));
        Ok(())
    }

    pub fn record_redirect_with_data(
        &mut self,
        from: SlotId,
        to: SlotId,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.claim(from)?;
        self.mark_destination(to)?;
        self.redirected_data.push((from, to, payload));
        Ok(())
    }

    pub fn record_dead(&mut self, slot: SlotId) -> Result<()> {
        self.claim(slot)?;
        self.now_dead.push(slot);
        Ok(())
    }

    pub fn record_unused(&mut self, slot: SlotId) -> Result<()> {
        self.claim(slot)?;
        self.now_unused.push(slot);
        Ok(())
    }

    /// Executes the batch: payload placement first (it reads the dead
    /// tuples' current storage), then the slot transitions, the page
    /// hints, and fragmentation repair.
    pub fn apply(&self, page: &mut HeapPageMut) -> Result<()> {
        for (from, to, payload) in &self.redirected_data {
            let data_offset = page.place_redirect_payload(*from, payload)?;
            page.set_slot(
                *from,
                Slot::RedirectWithData {
                    target: *to,
                    data_offset,
                },
            )?;
        }
        for &(from, to) in &self.redirected {
            page.set_slot(from, Slot::Redirect { target: to })?;
        }
        for &slot in &self.now_dead {
            page.set_slot(slot, Slot::Dead)?;
        }
        for &slot in &self.now_unused {
            page.set_slot(slot, Slot::Unused)?;
        }

        page.set_prune_hint(self.new_prune_hint)?;
        page.set_full(false)?;
        page.compact()
    }
}

impl Default for PrunePlan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_plan_is_empty() {
        let plan = PrunePlan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.transition_count(), 0);
        assert_eq!(plan.new_prune_hint(), INVALID_TX_ID);
    }

    #[test]
    fn recording_marks_slots() {
        let mut plan = PrunePlan::new();
        plan.record_dead(3).unwrap();
        plan.record_unused(5).unwrap();
        plan.record_redirect(0, 7).unwrap();

        assert!(plan.is_marked(3));
        assert!(plan.is_marked(5));
        assert!(plan.is_marked(0));
        assert!(plan.is_marked(7));
        assert!(!plan.is_marked(1));
        assert_eq!(plan.transition_count(), 3);
    }

    #[test]
    fn double_transition_is_fatal() {
        let mut plan = PrunePlan::new();
        plan.record_dead(3).unwrap();
        assert!(plan.record_unused(3).is_err());
    }

    #[test]
    fn shared_redirect_destination_is_allowed() {
        let mut plan = PrunePlan::new();
        plan.record_redirect(2, 9).unwrap();
        plan.record_redirect_with_data(1, 2, vec![0, 0]).unwrap();
        assert_eq!(plan.transition_count(), 2);
    }

    #[test]
    fn prune_hint_keeps_minimum() {
        let mut plan = PrunePlan::new();
        plan.record_prunable(INVALID_TX_ID);
        assert_eq!(plan.new_prune_hint(), INVALID_TX_ID);

        plan.record_prunable(50);
        plan.record_prunable(80);
        plan.record_prunable(20);
        assert_eq!(plan.new_prune_hint(), 20);
    }

    #[test]
    fn latest_removed_keeps_maximum() {
        let mut plan = PrunePlan::new();
        plan.note_removed(5);
        plan.note_removed(2);
        plan.note_removed(9);
        assert_eq!(plan.latest_removed(), 9);
    }
}
