//! Source heap and its ordering predicate.
//!
//! The merge keeps every live source in a binary min-heap so the next
//! statement in merge order is always at the top. Heap entries are the
//! typed discriminant [`HeapEntry`]: a source id, or the transient
//! **sentinel** inserted during a key collapse.
//!
//! The sentinel resolves to the iterator's current candidate and ranks
//! greater than every source entry at the candidate's key, so "is there
//! anything left at this key?" reduces to "is the sentinel on top?" —
//! one total order, no special-cased peeks.

use std::cmp::Ordering;

use crate::stmt::{KeyDef, Statement, merge_order};

use super::source::{SourceId, SourcePool};

// ------------------------------------------------------------------------------------------------
// Heap entries
// ------------------------------------------------------------------------------------------------

/// One element of the source heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeapEntry {
    /// A live merge source, resolved through the pool to its head.
    Source(SourceId),
    /// The key-collapse boundary, resolved to the current candidate.
    Sentinel,
}

// ------------------------------------------------------------------------------------------------
// Ordering predicate
// ------------------------------------------------------------------------------------------------

/// Borrowed view implementing the heap's total order.
///
/// Rebuilt at each heap operation from the iterator's fields, because the
/// order depends on live state: source heads move as streams advance, and
/// the sentinel tracks the current candidate.
pub(crate) struct MergeOrder<'a> {
    key_def: &'a KeyDef,
    sources: &'a SourcePool,
    current: Option<&'a Statement>,
}

impl<'a> MergeOrder<'a> {
    pub(crate) fn new(
        key_def: &'a KeyDef,
        sources: &'a SourcePool,
        current: Option<&'a Statement>,
    ) -> Self {
        Self {
            key_def,
            sources,
            current,
        }
    }

    fn resolve(&self, entry: HeapEntry) -> &Statement {
        match entry {
            HeapEntry::Source(id) => self
                .sources
                .head(id)
                .expect("a source in the heap holds a head"),
            HeapEntry::Sentinel => self
                .current
                .expect("the sentinel requires a current candidate"),
        }
    }

    /// Whether `a` orders strictly before `b`.
    ///
    /// Key ascending; at equal keys the sentinel is greatest; otherwise
    /// LSN descending, terminal statements before UPSERTs.
    pub(crate) fn less(&self, a: HeapEntry, b: HeapEntry) -> bool {
        debug_assert!(
            !(a == HeapEntry::Sentinel && b == HeapEntry::Sentinel),
            "at most one sentinel may be compared"
        );
        let stmt_a = self.resolve(a);
        let stmt_b = self.resolve(b);

        match self.key_def.compare(stmt_a, stmt_b) {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
        if a == HeapEntry::Sentinel {
            return false;
        }
        if b == HeapEntry::Sentinel {
            return true;
        }
        merge_order(self.key_def, stmt_a, stmt_b) == Ordering::Less
    }
}

// ------------------------------------------------------------------------------------------------
// SourceHeap
// ------------------------------------------------------------------------------------------------

/// Binary min-heap over [`HeapEntry`] values.
///
/// Supports the three mutations the merge needs beyond `insert`/`top`:
/// repositioning an entry whose head advanced (`update`) and removing an
/// arbitrary entry (`remove`). Entries are located by linear scan — the
/// heap holds one entry per merge source, a small number.
pub(crate) struct SourceHeap {
    slots: Vec<HeapEntry>,
}

impl SourceHeap {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// The least entry, if any.
    pub(crate) fn top(&self) -> Option<HeapEntry> {
        self.slots.first().copied()
    }

    pub(crate) fn insert(&mut self, entry: HeapEntry, ord: &MergeOrder<'_>) {
        self.slots.push(entry);
        self.sift_up(self.slots.len() - 1, ord);
    }

    /// Repositions `entry` after the statement it resolves to changed.
    pub(crate) fn update(&mut self, entry: HeapEntry, ord: &MergeOrder<'_>) {
        let pos = self.position(entry);
        let pos = self.sift_up(pos, ord);
        self.sift_down(pos, ord);
    }

    /// Removes `entry` from anywhere in the heap.
    pub(crate) fn remove(&mut self, entry: HeapEntry, ord: &MergeOrder<'_>) {
        let pos = self.position(entry);
        self.slots.swap_remove(pos);
        if pos < self.slots.len() {
            let pos = self.sift_up(pos, ord);
            self.sift_down(pos, ord);
        }
    }

    fn position(&self, entry: HeapEntry) -> usize {
        self.slots
            .iter()
            .position(|&slot| slot == entry)
            .expect("entry is in the heap")
    }

    /// Moves the entry at `pos` towards the root; returns its final
    /// position.
    fn sift_up(&mut self, mut pos: usize, ord: &MergeOrder<'_>) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !ord.less(self.slots[pos], self.slots[parent]) {
                break;
            }
            self.slots.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    /// Moves the entry at `pos` towards the leaves.
    fn sift_down(&mut self, mut pos: usize, ord: &MergeOrder<'_>) {
        loop {
            let mut least = pos;
            for child in [2 * pos + 1, 2 * pos + 2] {
                if child < self.slots.len() && ord.less(self.slots[child], self.slots[least]) {
                    least = child;
                }
            }
            if least == pos {
                return;
            }
            self.slots.swap(pos, least);
            pos = least;
        }
    }
}
