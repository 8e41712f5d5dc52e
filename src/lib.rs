//! # Vellum
//!
//! The **compaction write stream** of an LSM-tree storage engine: a K-way
//! merge over sorted sources of versioned statements that collapses each
//! key's history down to what live readers can still see, resolves
//! deferred UPSERTs, and drops redundant tombstones — producing the
//! statement sequence of a new on-disk run.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      WriteIterator                        │
//! │                                                           │
//! │  mem sources ──┐                                          │
//! │  (Arc'd heads) │   ┌────────────┐    ┌────────────────┐   │
//! │                ├──►│ SourceHeap │───►│ main loop      │   │
//! │  run sources ──┘   │ (+sentinel)│    │  visibility    │   │
//! │  (decoded heads)   └────────────┘    │  no-op filter  │   │
//! │                                      │  key collapse  │   │
//! │                                      │  (UPSERT fold) │   │
//! │                                      └───────┬────────┘   │
//! │                                              ▼            │
//! │                                   one statement per pull  │
//! └───────────────────────────────────────────────────────────┘
//!                                                │
//!                                                ▼
//!                                            RunWriter
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`writeiter`] | The write iterator — source pool, heap, key collapse, main loop |
//! | [`stmt`] | Statement model — values, key definitions, UPSERT resolution |
//! | [`stream`] | The pull contract every merge source implements |
//! | [`mem`] | Frozen in-memory multi-version index and its stream |
//! | [`run`] | On-disk run files — writer, mmap reader, stream |
//! | [`encoding`] | Deterministic binary wire format for run cells |
//!
//! ## Key behaviors
//!
//! - **Version collapse** — at most one statement per key survives below
//!   the visibility horizon (`oldest_vlsn`); versions above it are passed
//!   through untouched for the readers that still need them.
//! - **UPSERT folding** — deferred updates are folded against older
//!   versions during the merge, across source boundaries, and finalized
//!   at the last level of the tree.
//! - **Tombstone elimination** — DELETEs reaching the last level shadow
//!   nothing and are dropped.
//! - **Secondary no-op suppression** — updates that touch no indexed
//!   column never reach a secondary index's runs.
//! - **Checksummed persistence** — run files carry CRC32-protected
//!   blocks, written atomically via `.tmp` → rename.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vellum::{
//!     KeyDef, Mem, RunWriter, Statement, TupleFormat, Value, WriteIterator,
//!     WriteIteratorConfig,
//! };
//!
//! let key_def = Arc::new(KeyDef::new(vec![0]));
//!
//! // A frozen in-memory index with two versions of one key.
//! let mut mem = Mem::new(Arc::clone(&key_def));
//! mem.insert(Statement::replace(vec![Value::Int(1), Value::from("new")], 20));
//! mem.insert(Statement::replace(vec![Value::Int(1), Value::from("old")], 10));
//! let mem = Arc::new(mem);
//!
//! // Merge it down to the last level: one survivor per key.
//! let mut iter = WriteIterator::new(WriteIteratorConfig {
//!     key_def: Arc::clone(&key_def),
//!     replace_format: TupleFormat::new(2),
//!     upsert_format: TupleFormat::new(2),
//!     is_primary: true,
//!     index_column_mask: u64::MAX,
//!     is_last_level: true,
//!     oldest_vlsn: 100,
//! });
//! iter.add_mem_source(&mem)?;
//!
//! // Drain into a new on-disk run.
//! let mut writer = RunWriter::create("/tmp/000001.run", Arc::clone(&key_def))?;
//! while let Some(stmt) = iter.next()? {
//!     writer.push(stmt)?;
//! }
//! writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod encoding;
pub mod mem;
pub mod run;
pub mod stmt;
pub mod stream;
pub mod writeiter;

pub use mem::{Mem, MemStream};
pub use run::{DecodeContext, Run, RunError, RunStream, RunSummary, RunWriter};
pub use stmt::{
    KeyDef, Statement, StmtType, TupleFormat, UpdateOp, UpsertError, Value, apply_upsert,
};
pub use stream::{HeldStmt, StmtStream, StreamError};
pub use writeiter::{WriteIterError, WriteIterator, WriteIteratorConfig};
