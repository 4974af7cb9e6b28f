//! Tuple visibility classification against a pruning horizon.
//!
//! Pruning needs a coarser answer than reader-facing snapshot checks: not
//! "can transaction T see this version" but "can *anyone* still see it".
//! The caller computes the horizon once per pass and every chain on the
//! page is judged against the same value, which is what makes a pass
//! internally consistent.

use hashbrown::HashSet;

use super::{TupleHeader, TxId, INVALID_TX_ID};

/// What a prune pass may do with a tuple version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleStatus {
    /// No one can see it; storage is reclaimable.
    Dead,
    /// Superseded, but a transaction behind the horizon may still see it.
    RecentlyDead,
    /// The superseding transaction has not finished.
    InProgress,
    /// Current, or not superseded at all.
    Live,
}

/// Classification seam between pruning and the transaction machinery.
pub trait Visibility {
    fn classify(&self, tuple: &TupleHeader) -> TupleStatus;
}

/// Horizon-based classification.
///
/// `horizon` is the oldest transaction id that may still need old
/// versions: anything superseded by an older, finished transaction is
/// dead. `in_progress` names transactions whose deletes are still
/// unresolved at classification time.
#[derive(Debug, Clone, Default)]
pub struct HorizonVisibility {
    pub horizon: TxId,
    pub in_progress: HashSet<TxId>,
}

impl HorizonVisibility {
    pub fn new(horizon: TxId) -> Self {
        Self {
            horizon,
            in_progress: HashSet::new(),
        }
    }

    pub fn with_in_progress(horizon: TxId, xids: impl IntoIterator<Item = TxId>) -> Self {
        Self {
            horizon,
            in_progress: xids.into_iter().collect(),
        }
    }
}

impl Visibility for HorizonVisibility {
    fn classify(&self, tuple: &TupleHeader) -> TupleStatus {
        if tuple.xmin == INVALID_TX_ID {
            // Aborted insert: the version never existed for anyone.
            return TupleStatus::Dead;
        }
        if tuple.xmax == INVALID_TX_ID {
            return TupleStatus::Live;
        }
        if self.in_progress.contains(&tuple.xmax) {
            return TupleStatus::InProgress;
        }
        if tuple.xmax < self.horizon {
            TupleStatus::Dead
        } else {
            TupleStatus::RecentlyDead
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(xmin: TxId, xmax: TxId) -> TupleHeader {
        let mut header = TupleHeader::new(xmin);
        header.xmax = xmax;
        header
    }

    #[test]
    fn unsuperseded_tuple_is_live() {
        let vis = HorizonVisibility::new(100);
        assert_eq!(vis.classify(&tuple(10, INVALID_TX_ID)), TupleStatus::Live);
    }

    #[test]
    fn superseded_behind_horizon_is_dead() {
        let vis = HorizonVisibility::new(100);
        assert_eq!(vis.classify(&tuple(10, 50)), TupleStatus::Dead);
    }

    #[test]
    fn superseded_at_or_after_horizon_is_recently_dead() {
        let vis = HorizonVisibility::new(100);
        assert_eq!(vis.classify(&tuple(10, 100)), TupleStatus::RecentlyDead);
        assert_eq!(vis.classify(&tuple(10, 150)), TupleStatus::RecentlyDead);
    }

    #[test]
    fn unresolved_delete_is_in_progress() {
        let vis = HorizonVisibility::with_in_progress(100, [50]);
        assert_eq!(vis.classify(&tuple(10, 50)), TupleStatus::InProgress);
    }

    #[test]
    fn aborted_insert_is_dead_regardless_of_xmax() {
        let vis = HorizonVisibility::new(100);
        assert_eq!(
            vis.classify(&tuple(INVALID_TX_ID, INVALID_TX_ID)),
            TupleStatus::Dead
        );
    }
}
