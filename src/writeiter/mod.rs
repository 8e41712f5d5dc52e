//! # Write Iterator
//!
//! The merge-and-compact operator behind dumps and compactions: consumes
//! several sorted sources of versioned statements and produces one sorted
//! stream, ready to be written into a new run.
//!
//! ## Merge semantics
//!
//! Sources are merged through a min-heap ordered by key ascending, LSN
//! descending within a key, terminal statements first on LSN ties. For
//! each candidate popped off the merge the iterator decides:
//!
//! 1. **Visibility.** A version above `oldest_vlsn` is still readable by
//!    a live transaction, and so are the versions below it — the
//!    candidate is emitted unchanged, no history is collapsed.
//! 2. **Secondary no-op.** In a secondary index, a REPLACE/DELETE whose
//!    column mask shares no bit with the index's mask did not touch any
//!    indexed column and is dropped.
//! 3. **Key collapse.** Otherwise the candidate is the newest version at
//!    or below the horizon; every older version of the key is absorbed:
//!    UPSERT candidates are folded against each successor via
//!    [`apply_upsert`], terminal candidates simply shadow them. At the
//!    last level an UPSERT is finalized even with no base left.
//! 4. **Tombstone elimination.** A DELETE that survives collapse at the
//!    last level shadows nothing and is dropped.
//!
//! ## The sentinel
//!
//! The collapse loop inserts a sentinel entry into the heap. It compares
//! through the current candidate's key and ranks greatest at that key, so
//! the loop consumes same-key successors until the sentinel surfaces —
//! the ordinary heap order answers "anything left at this key?".
//!
//! ## Ownership of heads
//!
//! Mem sources hand out shared (`Arc`) statements; run sources hand out
//! owned decoded values (see [`HeldStmt`]). The holder
//! ([`CurrentTuple`]) is the single acquire/release site: replacing the
//! candidate drops the previous reference, installing a shared one keeps
//! exactly one `Arc` alive inside the iterator.
//!
//! ## Failure
//!
//! Every error is fatal to the in-progress [`WriteIterator::next`] call:
//! the caller gets the error and no statement. The iterator stays safe to
//! drop — teardown releases the candidate and closes every source — but
//! must not be advanced again.

#[cfg(test)]
mod tests;

mod heap;
mod source;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::mem::{Mem, MemStream};
use crate::run::{DecodeContext, Run, RunStream};
use crate::stmt::{KeyDef, Statement, StmtType, TupleFormat, UpsertError, apply_upsert};
use crate::stream::{HeldStmt, StmtStream, StreamError};

use heap::{HeapEntry, MergeOrder, SourceHeap};
use source::{SourcePool, WriteSource};

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by [`WriteIterator::next`].
///
/// All are fatal to the call that raised them; afterwards the iterator
/// may only be dropped.
#[derive(Debug, Error)]
pub enum WriteIterError {
    /// A source failed to produce its next head.
    #[error("source advance failed: {0}")]
    Stream(#[from] StreamError),

    /// UPSERT resolution failed during a key collapse. The candidate is
    /// left in the holder so teardown releases it.
    #[error("upsert resolution failed: {0}")]
    Upsert(#[from] UpsertError),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Static parameters of one merge.
#[derive(Clone)]
pub struct WriteIteratorConfig {
    /// Key definition the sources are ordered by.
    pub key_def: Arc<KeyDef>,
    /// Shape of REPLACE/DELETE statements produced by folding.
    pub replace_format: Arc<TupleFormat>,
    /// Shape of UPSERT statements produced by folding.
    pub upsert_format: Arc<TupleFormat>,
    /// Whether this merge feeds a primary index. Secondary merges apply
    /// the column-mask no-op filter.
    pub is_primary: bool,
    /// Bitmap of columns indexed by a secondary index.
    pub index_column_mask: u64,
    /// Whether the output lands on the deepest level of the tree (no
    /// older statements exist below).
    pub is_last_level: bool,
    /// Lowest version still needed by any live reader; versions strictly
    /// above it must be preserved.
    pub oldest_vlsn: u64,
}

// ------------------------------------------------------------------------------------------------
// Current-tuple holder
// ------------------------------------------------------------------------------------------------

/// Holder of the iterator's current output candidate.
///
/// Replacement is the only acquire/release site: dropping the previous
/// [`HeldStmt`] releases its reference (if any), moving the new one in
/// transfers exactly one.
struct CurrentTuple {
    held: Option<HeldStmt>,
}

impl CurrentTuple {
    fn empty() -> Self {
        Self { held: None }
    }

    fn stmt(&self) -> Option<&Statement> {
        self.held.as_ref().map(HeldStmt::stmt)
    }

    fn replace(&mut self, key_def: &KeyDef, new: Option<HeldStmt>) {
        if cfg!(debug_assertions) {
            if let (Some(old), Some(new_stmt)) = (self.stmt(), new.as_ref().map(HeldStmt::stmt)) {
                // Same-key replacements must carry an older-or-equal
                // version; a squash carries the candidate's version
                // forward, hence "not newer" rather than "strictly older".
                assert!(
                    key_def.compare(old, new_stmt) == std::cmp::Ordering::Less
                        || new_stmt.lsn() <= old.lsn(),
                    "holder replacement must move to a greater key or a not-newer version"
                );
            }
        }
        self.held = new;
    }
}

// ------------------------------------------------------------------------------------------------
// WriteIterator
// ------------------------------------------------------------------------------------------------

/// K-way merge over mem and run sources producing the statements of a new
/// run.
///
/// Create one with [`WriteIterator::new`], attach sources, then drain it
/// with [`next`](WriteIterator::next). Dropping the iterator releases the
/// held candidate and closes all sources, at any point of the iteration.
pub struct WriteIterator {
    config: WriteIteratorConfig,
    sources: SourcePool,
    heap: SourceHeap,
    current: CurrentTuple,
}

impl WriteIterator {
    /// Creates an empty iterator; attach inputs with
    /// [`add_mem_source`](Self::add_mem_source) and
    /// [`add_run_source`](Self::add_run_source) before draining it.
    pub fn new(config: WriteIteratorConfig) -> Self {
        Self {
            config,
            sources: SourcePool::new(),
            heap: SourceHeap::new(),
            current: CurrentTuple::empty(),
        }
    }

    /// Attaches a frozen mem as a merge source.
    ///
    /// An empty mem is skipped entirely.
    pub fn add_mem_source(&mut self, mem: &Arc<Mem>) -> Result<(), WriteIterError> {
        debug_assert_eq!(
            **mem.key_def(),
            *self.config.key_def,
            "mem must be ordered by the merge key definition"
        );
        self.add_source(Box::new(MemStream::open(Arc::clone(mem))))
    }

    /// Attaches an opened run as a merge source, decoding through `ctx`.
    ///
    /// An empty run is skipped entirely.
    pub fn add_run_source(
        &mut self,
        run: &Arc<Run>,
        ctx: DecodeContext,
    ) -> Result<(), WriteIterError> {
        self.add_source(Box::new(RunStream::open(Arc::clone(run), ctx)))
    }

    fn add_source(&mut self, mut stream: Box<dyn StmtStream>) -> Result<(), WriteIterError> {
        let Some(head) = stream.next()? else {
            trace!("empty source skipped");
            return Ok(());
        };
        let id = self.sources.add(WriteSource::new(stream, head));
        let ord = MergeOrder::new(&self.config.key_def, &self.sources, self.current.stmt());
        self.heap.insert(HeapEntry::Source(id), &ord);
        debug!(live_sources = self.sources.live_count(), "source attached");
        Ok(())
    }

    /// Produces the next output statement, or `None` at end of stream.
    ///
    /// The returned reference stays valid until the following `next` call
    /// or the iterator's destruction. After an error the iterator must
    /// only be dropped.
    pub fn next(&mut self) -> Result<Option<&Statement>, WriteIterError> {
        loop {
            let Some(top) = self.heap.top() else {
                return Ok(None);
            };
            let HeapEntry::Source(id) = top else {
                unreachable!("the sentinel lives only inside a key collapse");
            };
            let head = self
                .sources
                .get_mut(id)
                .take_head()
                .expect("a source in the heap holds a head");
            self.current.replace(&self.config.key_def, Some(head));
            self.step()?;

            let cur = self.current.stmt().expect("candidate installed above");
            if cur.lsn() > self.config.oldest_vlsn {
                // Still visible to a live reader. Older versions of this
                // key may be visible to readers between this version and
                // the horizon, so nothing is collapsed.
                break;
            }

            if !self.config.is_primary
                && cur.stype().is_terminal()
                && self.config.index_column_mask & cur.column_mask() == 0
            {
                // The update touched no indexed column; the secondary
                // index holds nothing to rewrite for it.
                trace!(lsn = cur.lsn(), "secondary no-op update skipped");
                continue;
            }

            self.collapse_key()?;

            let cur = self.current.stmt().expect("collapse keeps the candidate");
            if cur.stype() == StmtType::Delete && self.config.is_last_level {
                // No older statement survives below the last level, so
                // the tombstone shadows nothing.
                trace!(lsn = cur.lsn(), "redundant DELETE dropped at last level");
                continue;
            }
            break;
        }
        Ok(self.current.stmt())
    }

    /// Advances the top source and repositions it in the heap, removing it
    /// when exhausted.
    fn step(&mut self) -> Result<(), WriteIterError> {
        let top = self.heap.top().expect("step requires a non-empty heap");
        let HeapEntry::Source(id) = top else {
            unreachable!("the sentinel is never stepped");
        };
        let advanced = self.sources.get_mut(id).advance()?;
        let ord = MergeOrder::new(&self.config.key_def, &self.sources, self.current.stmt());
        if advanced {
            self.heap.update(top, &ord);
        } else {
            self.heap.remove(top, &ord);
            self.sources.remove(id);
            trace!(live_sources = self.sources.live_count(), "source exhausted");
        }
        Ok(())
    }

    /// Absorbs every remaining same-key statement into the current
    /// candidate, folding UPSERTs along the way.
    fn collapse_key(&mut self) -> Result<(), WriteIterError> {
        debug_assert!(self.current.stmt().is_some());
        {
            let ord = MergeOrder::new(&self.config.key_def, &self.sources, self.current.stmt());
            self.heap.insert(HeapEntry::Sentinel, &ord);
        }

        let result = loop {
            let top = self
                .heap
                .top()
                .expect("the sentinel keeps the heap non-empty");
            let at_sentinel = top == HeapEntry::Sentinel;

            let is_upsert = self
                .current
                .stmt()
                .is_some_and(|cur| cur.stype() == StmtType::Upsert);
            if is_upsert && (!at_sentinel || self.config.is_last_level) {
                // Fold the next same-key version into the candidate. At
                // the last level there is no older base beyond what the
                // merge sees, so a lone UPSERT is finalized against
                // nothing; above it, it stays deferred.
                let base = match top {
                    HeapEntry::Source(id) => self.sources.head(id),
                    HeapEntry::Sentinel => None,
                };
                let cur = self.current.stmt().expect("collapse requires a candidate");
                let applied = apply_upsert(
                    cur,
                    base,
                    &self.config.key_def,
                    &self.config.replace_format,
                    &self.config.upsert_format,
                    self.config.is_primary,
                    false,
                    None,
                );
                match applied {
                    Ok(stmt) => {
                        self.current
                            .replace(&self.config.key_def, Some(HeldStmt::Shared(Arc::new(stmt))));
                    }
                    // The candidate stays in the holder so teardown can
                    // release it.
                    Err(err) => break Err(WriteIterError::Upsert(err)),
                }
            }

            if at_sentinel {
                break Ok(());
            }
            if let Err(err) = self.step() {
                break Err(err);
            }
        };

        let ord = MergeOrder::new(&self.config.key_def, &self.sources, self.current.stmt());
        self.heap.remove(HeapEntry::Sentinel, &ord);
        result
    }
}
