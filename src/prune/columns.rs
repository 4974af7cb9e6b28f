//! # Column Sets and Modified-Column Tracking
//!
//! A [`ColumnSet`] is a small bitset over column ids, including the
//! negative ids reserved for system columns. The bias constant fixes the
//! bit numbering, so sets written into redirect payloads by one pass
//! decode identically in a later, unrelated pass.
//!
//! [`modified_columns`] computes which interesting columns differ between
//! two adjacent chain members. When the older member still has storage
//! the answer comes from the column comparator; when it was already
//! collapsed into a payload-bearing redirect, the stored bitmap stands in
//! for it. Intersecting the stored bitmap with the *current* interesting
//! set keeps the answer correct when indexes were created or dropped
//! after the payload was written.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use super::redirect::decode_columns;
use crate::config::{MAX_COLUMNS, MIN_COLUMN_ID};
use crate::record::RecordView;
use crate::storage::{HeapPage, Slot, SlotId};

/// Column identifier. User columns count from 1; ids in
/// `MIN_COLUMN_ID..=0` are reserved for system columns.
pub type ColumnId = i32;

fn bit_index(id: ColumnId) -> usize {
    assert!(
        (MIN_COLUMN_ID..=MAX_COLUMNS as ColumnId).contains(&id),
        "column id {id} out of range"
    );
    (id - MIN_COLUMN_ID) as usize
}

/// Set of column ids, word-packed over the biased id range.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    words: SmallVec<[u64; 4]>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The conservative interesting set: every user column of a relation.
    pub fn all_user_columns(column_count: usize) -> Self {
        (1..=column_count as ColumnId).collect()
    }

    pub fn insert(&mut self, id: ColumnId) {
        let bit = bit_index(id);
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % 64);
    }

    pub fn contains(&self, id: ColumnId) -> bool {
        let bit = bit_index(id);
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1u64 << (bit % 64)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn union_with(&mut self, other: &ColumnSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= src;
        }
    }

    pub fn intersect(&self, other: &ColumnSet) -> ColumnSet {
        let words = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| a & b)
            .collect();
        ColumnSet { words }
    }

    pub fn is_subset(&self, other: &ColumnSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, &w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..64).filter_map(move |b| {
                if word & (1u64 << b) != 0 {
                    Some((w * 64 + b) as ColumnId + MIN_COLUMN_ID)
                } else {
                    None
                }
            })
        })
    }
}

impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        let longest = self.words.len().max(other.words.len());
        (0..longest).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for ColumnSet {}

impl FromIterator<ColumnId> for ColumnSet {
    fn from_iter<T: IntoIterator<Item = ColumnId>>(iter: T) -> Self {
        let mut set = ColumnSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Per-column equality, pluggable per deployment.
///
/// Bytewise comparison is correct for plain storage formats but not for
/// types whose equality is wider than their representation (collated
/// text, custom types). Callers with such columns supply their own
/// implementation.
pub trait ColumnComparator {
    /// `None` means the column is null or not stored in that version.
    fn columns_equal(&self, column: ColumnId, old: Option<&[u8]>, new: Option<&[u8]>) -> bool;
}

/// Default comparator: byte equality, null equals null.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl ColumnComparator for BytewiseComparator {
    fn columns_equal(&self, _column: ColumnId, old: Option<&[u8]>, new: Option<&[u8]>) -> bool {
        old == new
    }
}

/// What pruning needs to know about the relation owning a page: how many
/// columns rows can have, which of them any index/predicate/constraint
/// references, and how to compare them.
pub struct RelationDesc<'a> {
    pub column_count: usize,
    pub interesting: ColumnSet,
    pub comparator: &'a dyn ColumnComparator,
}

impl<'a> RelationDesc<'a> {
    /// Conservative descriptor: every user column is interesting.
    pub fn new(column_count: usize, comparator: &'a dyn ColumnComparator) -> Self {
        Self {
            column_count,
            interesting: ColumnSet::all_user_columns(column_count),
            comparator,
        }
    }

    pub fn with_interesting(
        column_count: usize,
        interesting: ColumnSet,
        comparator: &'a dyn ColumnComparator,
    ) -> Self {
        Self {
            column_count,
            interesting,
            comparator,
        }
    }
}

/// Interesting columns that differ between chain member `old` and its
/// successor `new`.
///
/// `old` may have been collapsed by an earlier pass: a payload-bearing
/// redirect answers from its stored bitmap. A payload-free redirect
/// carries no information; when the successor is not partial there are
/// no index entries to preserve and the answer is empty, otherwise the
/// full interesting set is returned so the successor stays reachable.
pub fn modified_columns(
    page: &HeapPage,
    rel: &RelationDesc,
    old: SlotId,
    new: SlotId,
    new_is_partial: bool,
) -> Result<ColumnSet> {
    if rel.interesting.is_empty() {
        return Ok(ColumnSet::new());
    }

    match page.slot(old)? {
        Slot::Normal { .. } => {
            ensure!(
                page.slot(new)?.is_normal(),
                "chain member {new} has no storage but its predecessor {old} does"
            );
            let old_record = RecordView::new(page.record_bytes(old)?)?;
            let new_record = RecordView::new(page.record_bytes(new)?)?;
            let mut modified = ColumnSet::new();
            for id in rel.interesting.iter() {
                let old_value = old_record.column(id);
                let new_value = new_record.column(id);
                if !rel.comparator.columns_equal(id, old_value, new_value) {
                    modified.insert(id);
                }
            }
            Ok(modified)
        }
        Slot::RedirectWithData { data_offset, .. } => {
            let payload = page.redirect_payload(data_offset)?;
            Ok(decode_columns(payload)?.intersect(&rel.interesting))
        }
        Slot::Redirect { .. } => {
            if new_is_partial {
                Ok(rel.interesting.clone())
            } else {
                Ok(ColumnSet::new())
            }
        }
        other => bail!("unexpected slot state for chain member {old}: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains_with_system_ids() {
        let mut set = ColumnSet::new();
        set.insert(-8);
        set.insert(1);
        set.insert(200);

        assert!(set.contains(-8));
        assert!(set.contains(1));
        assert!(set.contains(200));
        assert!(!set.contains(2));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn empty_set_properties() {
        let set = ColumnSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn union_and_subset() {
        let a: ColumnSet = [1, 3].into_iter().collect();
        let b: ColumnSet = [3, 200].into_iter().collect();

        let mut u = a.clone();
        u.union_with(&b);
        assert_eq!(u, [1, 3, 200].into_iter().collect());

        assert!(a.is_subset(&u));
        assert!(b.is_subset(&u));
        assert!(!u.is_subset(&a));
        assert!(ColumnSet::new().is_subset(&a));
    }

    #[test]
    fn intersect_drops_uncommon_ids() {
        let a: ColumnSet = [1, 2, 3].into_iter().collect();
        let b: ColumnSet = [2, 3, 4].into_iter().collect();
        assert_eq!(a.intersect(&b), [2, 3].into_iter().collect());
    }

    #[test]
    fn equality_ignores_trailing_zero_words() {
        let narrow: ColumnSet = [1].into_iter().collect();
        let wide: ColumnSet = [1, 500].into_iter().collect();
        // intersect keeps wide's word count but zeroes the high word
        assert_eq!(wide.intersect(&narrow), narrow);
        assert_eq!(wide.intersect(&ColumnSet::new()), ColumnSet::new());
    }

    #[test]
    fn iter_is_ascending_and_biased() {
        let set: ColumnSet = [5, -8, 1].into_iter().collect();
        let ids: Vec<_> = set.iter().collect();
        assert_eq!(ids, vec![-8, 1, 5]);
    }

    #[test]
    fn all_user_columns_excludes_system_ids() {
        let set = ColumnSet::all_user_columns(3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    #[should_panic]
    fn out_of_range_id_panics() {
        let mut set = ColumnSet::new();
        set.insert(MIN_COLUMN_ID - 1);
    }

    #[test]
    fn bytewise_comparator_null_semantics() {
        let cmp = BytewiseComparator;
        assert!(cmp.columns_equal(1, None, None));
        assert!(!cmp.columns_equal(1, None, Some(b"x")));
        assert!(cmp.columns_equal(1, Some(b"x"), Some(b"x")));
        assert!(!cmp.columns_equal(1, Some(b"x"), Some(b"y")));
    }
}
