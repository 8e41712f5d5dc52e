//! # Statement Model
//!
//! The unit of data flowing through the merge is the **statement**: an
//! immutable, versioned record of one write operation against one key.
//!
//! ## Design Invariants
//!
//! - A statement never changes after construction; folding two statements
//!   produces a fresh one.
//! - Versions (LSNs) are assigned monotonically by the surrounding engine;
//!   the merge relies on them only for ordering and visibility.
//! - A [`StmtType::Delete`] row carries at least the key fields (the fields
//!   at the key definition's part positions).
//! - Only [`StmtType::Upsert`] statements carry update operations; the
//!   operation list is empty for terminal statements.
//! - A statement produced by a full-row write carries the
//!   [`FULL_COLUMN_MASK`]; update-produced statements carry the bitmap of
//!   columns their operations touched.
//!
//! ## Ordering
//!
//! Streams and the merge share one total order, [`merge_order`]:
//! key ascending (per [`KeyDef`]), then LSN descending, then terminal
//! statements before UPSERTs. The terminal-first tie rule makes a squashed
//! result win over the UPSERT it absorbed when both carry the same LSN.

#[cfg(test)]
mod tests;

mod encoding_impls;
pub mod upsert;

pub use upsert::{UpdateOp, UpsertError, apply_upsert};

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Column mask of a statement that touches (or may touch) every column.
///
/// Full-row writes (inserts, replaces not produced by an update operation)
/// carry this mask so they are never mistaken for a no-op in a secondary
/// index.
pub const FULL_COLUMN_MASK: u64 = u64::MAX;

// ------------------------------------------------------------------------------------------------
// Field values
// ------------------------------------------------------------------------------------------------

/// A single field value inside a statement row.
///
/// The variant order defines the cross-type sort order used by key
/// comparison: `Null < Int < Str`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// Absent / nil field.
    Null,
    /// Signed integer field.
    Int(i64),
    /// UTF-8 string field.
    Str(String),
}

impl Value {
    /// Returns the contained integer, if this is an [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Statement type
// ------------------------------------------------------------------------------------------------

/// The operation a statement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StmtType {
    /// Full-row write: the row replaces any older version of the key.
    Replace,
    /// Point tombstone: the key has no value at this version.
    Delete,
    /// Deferred update: resolved against an older base version by
    /// [`apply_upsert`] during merge.
    Upsert,
}

impl StmtType {
    /// Whether this statement type is terminal (REPLACE or DELETE), i.e.
    /// resolvable without looking at older versions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, StmtType::Upsert)
    }
}

// ------------------------------------------------------------------------------------------------
// Statement
// ------------------------------------------------------------------------------------------------

/// An immutable versioned record of one write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    stype: StmtType,
    lsn: u64,
    column_mask: u64,
    row: Vec<Value>,
    /// Update operations; non-empty only for UPSERT statements.
    ops: Vec<UpdateOp>,
}

impl Statement {
    /// Creates a full-row REPLACE statement.
    pub fn replace(row: Vec<Value>, lsn: u64) -> Self {
        Self {
            stype: StmtType::Replace,
            lsn,
            column_mask: FULL_COLUMN_MASK,
            row,
            ops: Vec::new(),
        }
    }

    /// Creates a DELETE statement. `key_row` must carry the key fields.
    pub fn delete(key_row: Vec<Value>, lsn: u64) -> Self {
        Self {
            stype: StmtType::Delete,
            lsn,
            column_mask: FULL_COLUMN_MASK,
            row: key_row,
            ops: Vec::new(),
        }
    }

    /// Creates an UPSERT statement from its default row (inserted when no
    /// base version exists) and the operations applied to an existing base.
    pub fn upsert(default_row: Vec<Value>, ops: Vec<UpdateOp>, lsn: u64) -> Self {
        let column_mask = ops.iter().fold(0u64, |mask, op| mask | op.column_bit());
        Self {
            stype: StmtType::Upsert,
            lsn,
            column_mask,
            row: default_row,
            ops,
        }
    }

    /// Overrides the column mask, e.g. for a REPLACE produced by an update
    /// operation that touched a known set of columns.
    pub fn with_column_mask(mut self, column_mask: u64) -> Self {
        self.column_mask = column_mask;
        self
    }

    pub(crate) fn from_parts(
        stype: StmtType,
        lsn: u64,
        column_mask: u64,
        row: Vec<Value>,
        ops: Vec<UpdateOp>,
    ) -> Self {
        Self {
            stype,
            lsn,
            column_mask,
            row,
            ops,
        }
    }

    /// The statement type.
    pub fn stype(&self) -> StmtType {
        self.stype
    }

    /// The log sequence number (version) of this statement.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    /// Bitmap of columns touched by the operation that produced this
    /// statement; [`FULL_COLUMN_MASK`] for full-row writes.
    pub fn column_mask(&self) -> u64 {
        self.column_mask
    }

    /// The statement row (the key fields plus payload; key fields only for
    /// DELETE).
    pub fn row(&self) -> &[Value] {
        &self.row
    }

    /// Update operations carried by an UPSERT; empty for terminal types.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }
}

// ------------------------------------------------------------------------------------------------
// Key definition
// ------------------------------------------------------------------------------------------------

/// Defines which row fields form the index key and how statements compare.
///
/// A part is an index into the statement row. Keys compare part by part
/// using [`Value`]'s total order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    parts: Vec<usize>,
}

impl KeyDef {
    /// Creates a key definition from row field indexes.
    pub fn new(parts: Vec<usize>) -> Self {
        debug_assert!(!parts.is_empty(), "a key needs at least one part");
        Self { parts }
    }

    /// Number of key parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Extracts the key fields of `row` in part order. Missing fields
    /// (row shorter than a part index) extract as [`Value::Null`].
    pub fn key_of(&self, row: &[Value]) -> Vec<Value> {
        self.parts
            .iter()
            .map(|&part| row.get(part).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Compares two rows by their key fields.
    pub fn compare_rows(&self, a: &[Value], b: &[Value]) -> Ordering {
        for &part in &self.parts {
            let av = a.get(part).unwrap_or(&Value::Null);
            let bv = b.get(part).unwrap_or(&Value::Null);
            match av.cmp(bv) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Compares two statements by key.
    pub fn compare(&self, a: &Statement, b: &Statement) -> Ordering {
        self.compare_rows(a.row(), b.row())
    }
}

// ------------------------------------------------------------------------------------------------
// Tuple formats
// ------------------------------------------------------------------------------------------------

/// Shape descriptor for statements produced during the merge.
///
/// One format describes the REPLACE/DELETE output tuples, another the
/// UPSERT tuples; [`apply_upsert`] validates its results against the
/// matching format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleFormat {
    field_count: usize,
}

impl TupleFormat {
    /// Creates a format expecting `field_count` row fields.
    pub fn new(field_count: usize) -> Arc<Self> {
        Arc::new(Self { field_count })
    }

    /// Expected number of row fields.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Whether `row` fits this format. Rows may be shorter (trailing
    /// fields omitted, e.g. DELETE key rows) but never longer.
    pub fn fits(&self, row: &[Value]) -> bool {
        row.len() <= self.field_count
    }
}

// ------------------------------------------------------------------------------------------------
// Merge order
// ------------------------------------------------------------------------------------------------

/// The total order of the merged stream: key ascending, then LSN
/// descending, then terminal statements before UPSERTs.
///
/// Every source must yield its statements in this order, and the merge
/// preserves it across sources.
pub fn merge_order(key_def: &KeyDef, a: &Statement, b: &Statement) -> Ordering {
    key_def
        .compare(a, b)
        .then_with(|| b.lsn().cmp(&a.lsn()))
        .then_with(|| {
            // Terminal first: an UPSERT ranks after REPLACE/DELETE at the
            // same key and LSN.
            let a_upsert = !a.stype().is_terminal();
            let b_upsert = !b.stype().is_terminal();
            a_upsert.cmp(&b_upsert)
        })
}
