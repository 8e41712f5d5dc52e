//! # Mem Source
//!
//! A frozen in-memory multi-version index and its merge-order stream.
//!
//! ## Design Invariants
//!
//! - A [`Mem`] may hold multiple versions per key; versions are kept
//!   newest-first (descending LSN, terminal statements before UPSERTs on
//!   LSN ties), matching the merge order.
//! - Statements are stored as `Arc<Statement>` and shared with the rest of
//!   the engine; every [`MemStream`] head is one acquired reference.
//! - A mem is built with [`Mem::insert`] and then frozen behind an `Arc`;
//!   streams only ever observe the frozen state.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use tracing::trace;

use crate::stmt::{KeyDef, Statement, Value, merge_order};
use crate::stream::{HeldStmt, StmtStream, StreamError};

// ------------------------------------------------------------------------------------------------
// Mem
// ------------------------------------------------------------------------------------------------

/// An in-memory multi-version index ordered by the key definition.
pub struct Mem {
    key_def: Arc<KeyDef>,
    /// Extracted key row → versions, newest-first.
    versions: BTreeMap<Vec<Value>, Vec<Arc<Statement>>>,
    count: usize,
}

impl Mem {
    /// Creates an empty mem for the given key definition.
    pub fn new(key_def: Arc<KeyDef>) -> Self {
        Self {
            key_def,
            versions: BTreeMap::new(),
            count: 0,
        }
    }

    /// Inserts a statement, keeping the key's version list in merge order.
    ///
    /// Returns the shared handle under which the statement is stored.
    pub fn insert(&mut self, stmt: Statement) -> Arc<Statement> {
        let stmt = Arc::new(stmt);
        self.insert_shared(Arc::clone(&stmt));
        stmt
    }

    /// Inserts an already-shared statement (e.g. one also referenced by a
    /// transaction log).
    pub fn insert_shared(&mut self, stmt: Arc<Statement>) {
        let key = self.key_def.key_of(stmt.row());
        let versions = self.versions.entry(key).or_default();
        let pos = versions.partition_point(|existing| {
            merge_order(&self.key_def, existing, &stmt) == std::cmp::Ordering::Less
        });
        versions.insert(pos, stmt);
        self.count += 1;
    }

    /// Total number of statements across all keys.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the mem holds no statements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.versions.len()
    }

    /// The key definition this mem is ordered by.
    pub fn key_def(&self) -> &Arc<KeyDef> {
        &self.key_def
    }
}

// ------------------------------------------------------------------------------------------------
// MemStream
// ------------------------------------------------------------------------------------------------

enum Cursor {
    /// Before the first statement.
    Start,
    /// Positioned at a key, `next` indexing into its version list.
    At { key: Vec<Value>, next: usize },
    /// Past the last statement.
    Done,
}

/// Merge-order stream over a frozen [`Mem`].
///
/// Yields [`HeldStmt::Shared`] clones; cannot fail.
pub struct MemStream {
    mem: Arc<Mem>,
    cursor: Cursor,
}

impl MemStream {
    /// Opens a stream over the given frozen mem.
    pub fn open(mem: Arc<Mem>) -> Self {
        trace!(keys = mem.key_count(), stmts = mem.len(), "mem stream open");
        Self {
            mem,
            cursor: Cursor::Start,
        }
    }

    fn first_key(&self) -> Option<Vec<Value>> {
        self.mem.versions.keys().next().cloned()
    }

    fn key_after(&self, key: &[Value]) -> Option<Vec<Value>> {
        self.mem
            .versions
            .range::<Vec<Value>, _>((Bound::Excluded(key.to_vec()), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone())
    }
}

impl StmtStream for MemStream {
    fn next(&mut self) -> Result<Option<HeldStmt>, StreamError> {
        loop {
            match std::mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::Start => match self.first_key() {
                    Some(key) => self.cursor = Cursor::At { key, next: 0 },
                    None => return Ok(None),
                },
                Cursor::At { key, next } => {
                    let versions = self.mem.versions.get(&key);
                    match versions.and_then(|v| v.get(next)) {
                        Some(stmt) => {
                            let stmt = Arc::clone(stmt);
                            self.cursor = Cursor::At {
                                key,
                                next: next + 1,
                            };
                            return Ok(Some(HeldStmt::Shared(stmt)));
                        }
                        None => match self.key_after(&key) {
                            Some(key) => self.cursor = Cursor::At { key, next: 0 },
                            None => return Ok(None),
                        },
                    }
                }
                Cursor::Done => return Ok(None),
            }
        }
    }
}
