//! Source stream contract consumed by the write iterator.
//!
//! Every merge source — an in-memory index or an on-disk run — is driven
//! through [`StmtStream`]: a pull interface yielding statements in merge
//! order (key ascending, LSN descending within a key, terminal statements
//! before UPSERTs on LSN ties). Closing a stream is dropping it.
//!
//! The two source kinds hand out statements under different ownership
//! regimes, captured by [`HeldStmt`]:
//!
//! - **mem** statements are shared with the rest of the engine; the stream
//!   yields an `Arc` clone and that clone *is* the acquired reference —
//!   dropping it releases.
//! - **run** statements are decoded into a buffer owned by the stream;
//!   `next` moves the decoded value out, so a retained head can never
//!   dangle across an advance.

use std::sync::Arc;

use thiserror::Error;

use crate::run::RunError;
use crate::stmt::Statement;

// ------------------------------------------------------------------------------------------------
// HeldStmt — ownership regimes for a statement held by the iterator
// ------------------------------------------------------------------------------------------------

/// A statement held by the write iterator, tagged with its ownership
/// regime.
#[derive(Debug, Clone)]
pub enum HeldStmt {
    /// Reference-counted statement shared with the engine (mem sources,
    /// freshly squashed UPSERT results).
    Shared(Arc<Statement>),
    /// Statement owned exclusively by the iterator (run sources).
    Owned(Statement),
}

impl HeldStmt {
    /// The statement itself.
    pub fn stmt(&self) -> &Statement {
        match self {
            HeldStmt::Shared(stmt) => stmt,
            HeldStmt::Owned(stmt) => stmt,
        }
    }

    /// Whether this statement participates in engine-wide reference
    /// counting.
    pub fn refable(&self) -> bool {
        matches!(self, HeldStmt::Shared(_))
    }
}

// ------------------------------------------------------------------------------------------------
// Stream contract
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by a source stream while producing its next head.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The underlying run file failed to produce a statement.
    #[error("run stream error: {0}")]
    Run(#[from] RunError),
}

/// A pull stream of statements in merge order.
///
/// `next` yields `Ok(Some(..))` until the source is exhausted, then
/// `Ok(None)`. After an error the stream is dead; the only valid
/// operation is dropping it.
pub trait StmtStream {
    /// Produces the next statement, or `None` at end of stream.
    fn next(&mut self) -> Result<Option<HeldStmt>, StreamError>;
}
