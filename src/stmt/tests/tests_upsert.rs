#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::stmt::{
        FULL_COLUMN_MASK, KeyDef, Statement, StmtType, TupleFormat, UpdateOp, UpsertError, Value,
        apply_upsert,
    };

    fn key_def() -> KeyDef {
        KeyDef::new(vec![0])
    }

    fn formats() -> (Arc<TupleFormat>, Arc<TupleFormat>) {
        (TupleFormat::new(2), TupleFormat::new(2))
    }

    fn add_one(lsn: u64) -> Statement {
        Statement::upsert(
            vec![Value::Int(1), Value::Int(0)],
            vec![UpdateOp::Add { field: 1, delta: 1 }],
            lsn,
        )
    }

    #[test]
    fn test_null_base_inserts_default_row() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let upsert = add_one(30);

        let result = apply_upsert(
            &upsert, None, &key_def, &replace_fmt, &upsert_fmt, true, false, None,
        )
        .unwrap();

        assert_eq!(result.stype(), StmtType::Replace);
        assert_eq!(result.lsn(), 30);
        assert_eq!(result.row(), upsert.row());
        assert_eq!(result.column_mask(), FULL_COLUMN_MASK);
        assert!(result.ops().is_empty());
    }

    #[test]
    fn test_delete_base_inserts_default_row() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let upsert = add_one(30);
        let base = Statement::delete(vec![Value::Int(1)], 10);

        let result = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap();

        assert_eq!(result.stype(), StmtType::Replace);
        assert_eq!(result.row(), upsert.row());
    }

    #[test]
    fn test_empty_default_row_degrades_to_delete() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let upsert = Statement::upsert(Vec::new(), Vec::new(), 30);
        let base = Statement::delete(vec![Value::Int(1)], 10);

        let result = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap();

        assert_eq!(result.stype(), StmtType::Delete);
        assert_eq!(result.lsn(), 30);
        assert_eq!(result.row(), &[Value::Int(1)]);
    }

    #[test]
    fn test_replace_base_applies_ops_in_order() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let base = Statement::replace(vec![Value::Int(1), Value::Int(5)], 10)
            .with_column_mask(0b0100);
        let upsert = Statement::upsert(
            vec![Value::Int(1), Value::Int(0)],
            vec![
                UpdateOp::Add { field: 1, delta: 2 },
                UpdateOp::Assign {
                    field: 1,
                    value: Value::Int(9),
                },
                UpdateOp::Add { field: 1, delta: 1 },
            ],
            20,
        );

        let result = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap();

        // 5 +2 → assign 9 → +1.
        assert_eq!(result.row(), &[Value::Int(1), Value::Int(10)]);
        assert_eq!(result.stype(), StmtType::Replace);
        assert_eq!(result.lsn(), 20);
        assert_eq!(result.column_mask(), 0b0110);
    }

    #[test]
    fn test_upsert_base_merges_ops_older_first() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let older = Statement::upsert(
            vec![Value::Int(1), Value::Int(7)],
            vec![UpdateOp::Add { field: 1, delta: 1 }],
            20,
        );
        let newer = Statement::upsert(
            vec![Value::Int(1), Value::Int(0)],
            vec![UpdateOp::Add { field: 1, delta: 4 }],
            30,
        );

        let merged = apply_upsert(
            &newer,
            Some(&older),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap();

        assert_eq!(merged.stype(), StmtType::Upsert);
        assert_eq!(merged.lsn(), 30);
        // Default row comes from the older statement.
        assert_eq!(merged.row(), older.row());
        assert_eq!(
            merged.ops(),
            &[
                UpdateOp::Add { field: 1, delta: 1 },
                UpdateOp::Add { field: 1, delta: 4 },
            ]
        );

        // Resolving the merged UPSERT against a terminal base applies both
        // deltas on top of the base row.
        let base = Statement::replace(vec![Value::Int(1), Value::Int(5)], 10);
        let resolved = apply_upsert(
            &merged,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap();
        assert_eq!(resolved.row(), &[Value::Int(1), Value::Int(10)]);
        assert_eq!(resolved.lsn(), 30);
    }

    #[test]
    fn test_add_on_string_field_fails() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let base = Statement::replace(vec![Value::Int(1), Value::from("text")], 10);
        let upsert = add_one(20);

        let err = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap_err();
        assert_eq!(err, UpsertError::NotAnInteger { field: 1 });
    }

    #[test]
    fn test_out_of_range_field_fails() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let base = Statement::replace(vec![Value::Int(1)], 10);
        let upsert = Statement::upsert(
            vec![Value::Int(1)],
            vec![UpdateOp::Add { field: 5, delta: 1 }],
            20,
        );

        let err = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap_err();
        assert_eq!(err, UpsertError::FieldOutOfRange { field: 5, row_len: 1 });
    }

    #[test]
    fn test_add_overflow_fails() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let base = Statement::replace(vec![Value::Int(1), Value::Int(i64::MAX)], 10);
        let upsert = add_one(20);

        let err = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            false,
            None,
        )
        .unwrap_err();
        assert_eq!(err, UpsertError::Overflow { field: 1 });
    }

    #[test]
    fn test_suppressed_errors_skip_the_op_and_report() {
        let key_def = key_def();
        let (replace_fmt, upsert_fmt) = formats();
        let base = Statement::replace(vec![Value::Int(1), Value::from("text")], 10);
        let upsert = Statement::upsert(
            vec![Value::Int(1), Value::Int(0)],
            vec![
                UpdateOp::Add { field: 1, delta: 1 },
                UpdateOp::Assign {
                    field: 1,
                    value: Value::Int(3),
                },
            ],
            20,
        );

        let mut sink = Vec::new();
        let result = apply_upsert(
            &upsert,
            Some(&base),
            &key_def,
            &replace_fmt,
            &upsert_fmt,
            true,
            true,
            Some(&mut sink),
        )
        .unwrap();

        // The failed Add is skipped; the Assign still lands.
        assert_eq!(result.row(), &[Value::Int(1), Value::Int(3)]);
        assert_eq!(sink, vec![UpsertError::NotAnInteger { field: 1 }]);
    }

    #[test]
    fn test_oversized_result_rejected_by_format() {
        let key_def = key_def();
        let replace_fmt = TupleFormat::new(1);
        let upsert_fmt = TupleFormat::new(1);
        let upsert = add_one(20);

        let err = apply_upsert(
            &upsert, None, &key_def, &replace_fmt, &upsert_fmt, true, false, None,
        )
        .unwrap_err();
        assert_eq!(err, UpsertError::FormatMismatch { fields: 2, max: 1 });
    }
}
