//! Merge source handles and their owning pool.
//!
//! Each source wraps one opened stream plus the stream's current head.
//! Handles live in a [`SourcePool`] arena and are addressed by
//! [`SourceId`]; the heap stores ids, never handles, so removing an
//! exhausted source never invalidates another entry.

use crate::stmt::Statement;
use crate::stream::{HeldStmt, StmtStream, StreamError};

/// Stable identifier of a source inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceId(u32);

/// One merge input: a stream and its current head statement.
pub(crate) struct WriteSource {
    stream: Box<dyn StmtStream>,
    head: Option<HeldStmt>,
}

impl WriteSource {
    /// Wraps an opened stream whose first head has already been pulled.
    pub(crate) fn new(stream: Box<dyn StmtStream>, head: HeldStmt) -> Self {
        Self {
            stream,
            head: Some(head),
        }
    }

    /// The current head, if the source still has one.
    pub(crate) fn head(&self) -> Option<&HeldStmt> {
        self.head.as_ref()
    }

    /// Moves the current head out, leaving the source headless until the
    /// next [`advance`](Self::advance).
    pub(crate) fn take_head(&mut self) -> Option<HeldStmt> {
        self.head.take()
    }

    /// Replaces the head with the stream's next statement.
    ///
    /// Returns whether a new head was produced; `false` means the source
    /// is exhausted. On error the head is left empty and the source must
    /// be discarded.
    pub(crate) fn advance(&mut self) -> Result<bool, StreamError> {
        self.head = self.stream.next()?;
        Ok(self.head.is_some())
    }
}

/// Arena of live sources.
///
/// Slots are never reused within one iterator's lifetime, so a
/// [`SourceId`] stays unambiguous even after its source is removed.
pub(crate) struct SourcePool {
    slots: Vec<Option<WriteSource>>,
    live: usize,
}

impl SourcePool {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }

    /// Number of live (non-exhausted) sources.
    pub(crate) fn live_count(&self) -> usize {
        self.live
    }

    pub(crate) fn add(&mut self, source: WriteSource) -> SourceId {
        let id = SourceId(self.slots.len() as u32);
        self.slots.push(Some(source));
        self.live += 1;
        id
    }

    pub(crate) fn get_mut(&mut self, id: SourceId) -> &mut WriteSource {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("source id refers to a removed source")
    }

    /// The statement at the head of a live source.
    pub(crate) fn head(&self, id: SourceId) -> Option<&Statement> {
        self.slots[id.0 as usize]
            .as_ref()
            .and_then(WriteSource::head)
            .map(HeldStmt::stmt)
    }

    /// Removes a source, dropping its stream (which closes it).
    pub(crate) fn remove(&mut self, id: SourceId) {
        if self.slots[id.0 as usize].take().is_some() {
            self.live -= 1;
        }
    }
}
