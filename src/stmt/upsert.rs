//! UPSERT resolution — folding a deferred update into an older base version.
//!
//! An UPSERT carries two things: a **default row** (what to insert when the
//! key has no live version) and a list of **update operations** (what to do
//! to an existing row). [`apply_upsert`] resolves an UPSERT against a base
//! statement:
//!
//! - base absent or DELETE → terminal REPLACE of the default row (or a
//!   DELETE when that row is empty);
//! - base REPLACE → terminal REPLACE of the base row with the operations
//!   applied in order;
//! - base UPSERT → a new UPSERT whose default row is the (older) base's and
//!   whose operation list is the base's followed by the newer one's.
//!
//! The result always carries the newer statement's LSN, so repeated folding
//! walks a key's history without disturbing the merge order.
//!
//! Failing operations either abort the fold or, with `suppress_errors`, are
//! skipped, logged, and reported to the caller's `error_sink` — there is no
//! process-global diagnostics channel.

use thiserror::Error;
use tracing::warn;

use super::{FULL_COLUMN_MASK, KeyDef, Statement, StmtType, TupleFormat, Value};

// ------------------------------------------------------------------------------------------------
// Update operations
// ------------------------------------------------------------------------------------------------

/// One field update carried by an UPSERT statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOp {
    /// Set the field to a literal value.
    Assign {
        /// Row field index.
        field: u32,
        /// The value to store.
        value: Value,
    },
    /// Add a signed delta to an integer field.
    Add {
        /// Row field index.
        field: u32,
        /// The delta; negative values subtract.
        delta: i64,
    },
}

impl UpdateOp {
    /// The row field this operation touches.
    pub fn field(&self) -> u32 {
        match self {
            UpdateOp::Assign { field, .. } => *field,
            UpdateOp::Add { field, .. } => *field,
        }
    }

    /// The column-mask bit for this operation. Fields beyond 63 share the
    /// top bit, so wide rows degrade to "maybe touched" rather than
    /// wrapping around.
    pub fn column_bit(&self) -> u64 {
        1u64 << u64::from(self.field()).min(63)
    }
}

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

/// Errors raised while resolving an UPSERT.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpsertError {
    /// An operation addressed a field the row does not have.
    #[error("update of field {field} out of range (row has {row_len} fields)")]
    FieldOutOfRange {
        /// Field index addressed by the operation.
        field: u32,
        /// Actual row length.
        row_len: usize,
    },

    /// An arithmetic operation hit a non-integer field.
    #[error("arithmetic update of non-integer field {field}")]
    NotAnInteger {
        /// Field index addressed by the operation.
        field: u32,
    },

    /// An arithmetic operation overflowed the field.
    #[error("arithmetic update of field {field} overflows")]
    Overflow {
        /// Field index addressed by the operation.
        field: u32,
    },

    /// The resolved row does not fit the output tuple format.
    #[error("resolved row has {fields} fields, format allows {max}")]
    FormatMismatch {
        /// Field count of the resolved row.
        fields: usize,
        /// Field count allowed by the format.
        max: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// apply_upsert
// ------------------------------------------------------------------------------------------------

/// Resolves `upsert` against `base`, producing a fresh statement.
///
/// `upsert` must be an UPSERT statement, newer than `base` (when present)
/// and at the same key; UPSERTs exist only in primary indexes, so
/// `is_primary` must hold. The result carries `upsert`'s LSN.
///
/// With `suppress_errors`, failing operations are skipped: each is logged
/// at WARN and appended to `error_sink` when one is supplied. Without it,
/// the first failing operation aborts the fold.
#[allow(clippy::too_many_arguments)]
pub fn apply_upsert(
    upsert: &Statement,
    base: Option<&Statement>,
    key_def: &KeyDef,
    replace_format: &TupleFormat,
    upsert_format: &TupleFormat,
    is_primary: bool,
    suppress_errors: bool,
    mut error_sink: Option<&mut Vec<UpsertError>>,
) -> Result<Statement, UpsertError> {
    debug_assert!(is_primary, "UPSERT statements exist only in primary indexes");
    debug_assert_eq!(upsert.stype(), StmtType::Upsert);
    if let Some(base) = base {
        debug_assert_eq!(
            key_def.compare(upsert, base),
            std::cmp::Ordering::Equal,
            "upsert and base must share a key"
        );
        debug_assert!(upsert.lsn() >= base.lsn(), "base must not be newer");
    }

    let Some(base) = base else {
        return finalize_insert(upsert, None, key_def, replace_format);
    };

    match base.stype() {
        // A DELETE base means the key has no live value: insert semantics,
        // same as an absent base.
        StmtType::Delete => finalize_insert(upsert, Some(base), key_def, replace_format),

        StmtType::Replace => {
            let mut row = base.row().to_vec();
            apply_ops(&mut row, upsert.ops(), suppress_errors, &mut error_sink)?;
            if row.is_empty() {
                return Ok(Statement::delete(key_def.key_of(base.row()), upsert.lsn()));
            }
            check_format(&row, replace_format)?;
            Ok(Statement::from_parts(
                StmtType::Replace,
                upsert.lsn(),
                base.column_mask() | upsert.column_mask(),
                row,
                Vec::new(),
            ))
        }

        StmtType::Upsert => {
            // Merge the operation lists, older first, and keep the older
            // default row. Resolution is deferred again.
            let row = base.row().to_vec();
            check_format(&row, upsert_format)?;
            let mut ops = Vec::with_capacity(base.ops().len() + upsert.ops().len());
            ops.extend_from_slice(base.ops());
            ops.extend_from_slice(upsert.ops());
            Ok(Statement::from_parts(
                StmtType::Upsert,
                upsert.lsn(),
                base.column_mask() | upsert.column_mask(),
                row,
                ops,
            ))
        }
    }
}

/// Insert semantics: there is no live version to update, so the UPSERT's
/// default row becomes the value. Operations apply only to existing rows.
fn finalize_insert(
    upsert: &Statement,
    base: Option<&Statement>,
    key_def: &KeyDef,
    replace_format: &TupleFormat,
) -> Result<Statement, UpsertError> {
    let row = upsert.row().to_vec();
    if row.is_empty() {
        let key_row = base.map_or(row, |b| key_def.key_of(b.row()));
        return Ok(Statement::delete(key_row, upsert.lsn()));
    }
    check_format(&row, replace_format)?;
    Ok(Statement::from_parts(
        StmtType::Replace,
        upsert.lsn(),
        FULL_COLUMN_MASK,
        row,
        Vec::new(),
    ))
}

/// Applies `ops` to `row` in order.
///
/// With `suppress`, a failing operation is skipped, logged, and reported
/// to the sink; otherwise the first failure aborts.
fn apply_ops(
    row: &mut [Value],
    ops: &[UpdateOp],
    suppress: bool,
    error_sink: &mut Option<&mut Vec<UpsertError>>,
) -> Result<(), UpsertError> {
    for op in ops {
        match apply_one(row, op) {
            Ok(()) => {}
            Err(err) if suppress => {
                warn!(field = op.field(), %err, "skipping failed upsert operation");
                if let Some(sink) = error_sink.as_deref_mut() {
                    sink.push(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn apply_one(row: &mut [Value], op: &UpdateOp) -> Result<(), UpsertError> {
    let field = op.field();
    let row_len = row.len();
    let slot = row
        .get_mut(field as usize)
        .ok_or(UpsertError::FieldOutOfRange { field, row_len })?;
    match op {
        UpdateOp::Assign { value, .. } => {
            *slot = value.clone();
            Ok(())
        }
        UpdateOp::Add { delta, .. } => {
            let Value::Int(current) = slot else {
                return Err(UpsertError::NotAnInteger { field });
            };
            *current = current
                .checked_add(*delta)
                .ok_or(UpsertError::Overflow { field })?;
            Ok(())
        }
    }
}

fn check_format(row: &[Value], format: &TupleFormat) -> Result<(), UpsertError> {
    if format.fits(row) {
        Ok(())
    } else {
        Err(UpsertError::FormatMismatch {
            fields: row.len(),
            max: format.field_count(),
        })
    }
}
