#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::run::{DecodeContext, Run, RunStream, RunWriter};
    use crate::stmt::{KeyDef, Statement, Value};
    use crate::stream::StmtStream;

    fn key_def() -> Arc<KeyDef> {
        Arc::new(KeyDef::new(vec![0]))
    }

    /// Enough statements to span several 4 KiB blocks.
    fn sample_statements() -> Vec<Statement> {
        (0..500)
            .map(|i| {
                Statement::replace(
                    vec![Value::Int(i), Value::Str(format!("payload-{i:04}"))],
                    1000 + i as u64,
                )
            })
            .collect()
    }

    #[test]
    fn test_stream_yields_everything_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.run");
        let statements = sample_statements();

        let mut writer = RunWriter::create(&path, key_def()).unwrap();
        for stmt in &statements {
            writer.push(stmt).unwrap();
        }
        let summary = writer.finish().unwrap();
        assert_eq!(summary.stmt_count, statements.len() as u64);
        assert!(summary.block_count > 1, "test data must span blocks");

        let run = Arc::new(Run::open(&path).unwrap());
        assert_eq!(run.min_lsn(), 1000);
        assert_eq!(run.max_lsn(), 1499);

        let mut stream = RunStream::open(Arc::clone(&run), DecodeContext::new());
        let mut seen = Vec::new();
        while let Some(held) = stream.next().unwrap() {
            // Run heads are owned by the iterator side, not refcounted.
            assert!(!held.refable());
            seen.push(held.stmt().clone());
        }
        assert_eq!(seen, statements);

        // Exhaustion is sticky.
        assert!(stream.next().unwrap().is_none());
    }

    #[test]
    fn test_multi_version_keys_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("versions.run");

        let statements = vec![
            Statement::replace(vec![Value::Int(1), Value::from("new")], 20),
            Statement::replace(vec![Value::Int(1), Value::from("old")], 10),
            Statement::delete(vec![Value::Int(2)], 15),
        ];
        let mut writer = RunWriter::create(&path, key_def()).unwrap();
        for stmt in &statements {
            writer.push(stmt).unwrap();
        }
        writer.finish().unwrap();

        let run = Arc::new(Run::open(&path).unwrap());
        let mut stream = RunStream::open(run, DecodeContext::new());
        let mut seen = Vec::new();
        while let Some(held) = stream.next().unwrap() {
            seen.push(held.stmt().clone());
        }
        assert_eq!(seen, statements);
    }
}
