#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::mem::{Mem, MemStream};
    use crate::stmt::{KeyDef, Statement, StmtType, UpdateOp, Value};
    use crate::stream::StmtStream;

    fn key_def() -> Arc<KeyDef> {
        Arc::new(KeyDef::new(vec![0]))
    }

    fn drain(mem: Mem) -> Vec<Statement> {
        let mut stream = MemStream::open(Arc::new(mem));
        let mut out = Vec::new();
        while let Some(held) = stream.next().unwrap() {
            out.push(held.stmt().clone());
        }
        out
    }

    #[test]
    fn test_empty_mem() {
        let mem = Mem::new(key_def());
        assert!(mem.is_empty());
        assert_eq!(mem.len(), 0);
        assert_eq!(mem.key_count(), 0);
    }

    #[test]
    fn test_insert_counts_keys_and_versions() {
        let mut mem = Mem::new(key_def());
        mem.insert(Statement::replace(vec![Value::Int(1), Value::from("a")], 10));
        mem.insert(Statement::replace(vec![Value::Int(1), Value::from("b")], 20));
        mem.insert(Statement::replace(vec![Value::Int(2), Value::from("c")], 15));

        assert_eq!(mem.len(), 3);
        assert_eq!(mem.key_count(), 2);
    }

    #[test]
    fn test_insert_returns_shared_handle() {
        let mut mem = Mem::new(key_def());
        let stmt = mem.insert(Statement::replace(vec![Value::Int(1)], 10));
        // One reference in the mem, one returned.
        assert_eq!(Arc::strong_count(&stmt), 2);
    }

    #[test]
    fn test_versions_kept_newest_first_regardless_of_insert_order() {
        let mut mem = Mem::new(key_def());
        mem.insert(Statement::replace(vec![Value::Int(1), Value::from("old")], 10));
        mem.insert(Statement::replace(vec![Value::Int(1), Value::from("new")], 30));
        mem.insert(Statement::replace(vec![Value::Int(1), Value::from("mid")], 20));

        let lsns: Vec<u64> = drain(mem).iter().map(Statement::lsn).collect();
        assert_eq!(lsns, vec![30, 20, 10]);
    }

    #[test]
    fn test_terminal_sorts_before_upsert_on_lsn_tie() {
        let mut mem = Mem::new(key_def());
        mem.insert(Statement::upsert(
            vec![Value::Int(1), Value::Int(0)],
            vec![UpdateOp::Add { field: 1, delta: 1 }],
            10,
        ));
        mem.insert(Statement::replace(vec![Value::Int(1), Value::Int(5)], 10));

        let types: Vec<StmtType> = drain(mem).iter().map(Statement::stype).collect();
        assert_eq!(types, vec![StmtType::Replace, StmtType::Upsert]);
    }
}
