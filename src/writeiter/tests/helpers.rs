use std::sync::Arc;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::mem::Mem;
use crate::run::{Run, RunWriter};
use crate::stmt::{KeyDef, Statement, TupleFormat, UpdateOp, Value};
use crate::writeiter::{WriteIterator, WriteIteratorConfig};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Single-part key on field 0.
pub fn key_def() -> Arc<KeyDef> {
    Arc::new(KeyDef::new(vec![0]))
}

/// Primary-index merge config with two-field tuples.
pub fn config(oldest_vlsn: u64, is_last_level: bool) -> WriteIteratorConfig {
    init_tracing();
    WriteIteratorConfig {
        key_def: key_def(),
        replace_format: TupleFormat::new(2),
        upsert_format: TupleFormat::new(2),
        is_primary: true,
        index_column_mask: u64::MAX,
        is_last_level,
        oldest_vlsn,
    }
}

/// Secondary-index merge config filtering on `index_column_mask`.
pub fn secondary_config(index_column_mask: u64, oldest_vlsn: u64) -> WriteIteratorConfig {
    init_tracing();
    WriteIteratorConfig {
        key_def: key_def(),
        replace_format: TupleFormat::new(2),
        upsert_format: TupleFormat::new(2),
        is_primary: false,
        index_column_mask,
        is_last_level: false,
        oldest_vlsn,
    }
}

pub fn replace(key: i64, payload: &str, lsn: u64) -> Statement {
    Statement::replace(vec![Value::Int(key), Value::from(payload)], lsn)
}

pub fn replace_int(key: i64, value: i64, lsn: u64) -> Statement {
    Statement::replace(vec![Value::Int(key), Value::Int(value)], lsn)
}

pub fn delete(key: i64, lsn: u64) -> Statement {
    Statement::delete(vec![Value::Int(key)], lsn)
}

/// UPSERT with default row `[key, 0]` adding `delta` to field 1.
pub fn upsert_add(key: i64, delta: i64, lsn: u64) -> Statement {
    Statement::upsert(
        vec![Value::Int(key), Value::Int(0)],
        vec![UpdateOp::Add { field: 1, delta }],
        lsn,
    )
}

/// Builds a frozen mem from statements in any order.
pub fn mem_of(stmts: Vec<Statement>) -> Arc<Mem> {
    let mut mem = Mem::new(key_def());
    for stmt in stmts {
        mem.insert(stmt);
    }
    Arc::new(mem)
}

/// Writes `stmts` (already in merge order) into a run file and reopens it.
pub fn run_of(dir: &TempDir, name: &str, stmts: &[Statement]) -> Arc<Run> {
    let path = dir.path().join(name);
    let mut writer = RunWriter::create(&path, key_def()).unwrap();
    for stmt in stmts {
        writer.push(stmt).unwrap();
    }
    writer.finish().unwrap();
    Arc::new(Run::open(&path).unwrap())
}

/// Drains the iterator, cloning every emitted statement.
pub fn drain(iter: &mut WriteIterator) -> Vec<Statement> {
    let mut out = Vec::new();
    while let Some(stmt) = iter.next().unwrap() {
        out.push(stmt.clone());
    }
    out
}
