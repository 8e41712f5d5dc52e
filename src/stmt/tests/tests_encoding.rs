#[cfg(test)]
mod tests {
    use crate::encoding::{EncodingError, decode_from_slice, encode_to_vec};
    use crate::stmt::{Statement, StmtType, UpdateOp, Value};

    #[test]
    fn test_statement_cell_roundtrip() {
        let stmt = Statement::upsert(
            vec![Value::Int(1), Value::from("payload"), Value::Null],
            vec![
                UpdateOp::Add { field: 1, delta: -3 },
                UpdateOp::Assign {
                    field: 2,
                    value: Value::from("x"),
                },
            ],
            42,
        );

        let buf = encode_to_vec(&stmt).unwrap();
        let (decoded, n) = decode_from_slice::<Statement>(&buf).unwrap();
        assert_eq!(decoded, stmt);
        assert_eq!(n, buf.len());
    }

    #[test]
    fn test_delete_cell_has_no_ops() {
        let stmt = Statement::delete(vec![Value::Int(9)], 7);
        let buf = encode_to_vec(&stmt).unwrap();
        let (decoded, _) = decode_from_slice::<Statement>(&buf).unwrap();
        assert_eq!(decoded.stype(), StmtType::Delete);
        assert!(decoded.ops().is_empty());
    }

    #[test]
    fn test_unknown_statement_tag_is_rejected() {
        let stmt = Statement::replace(vec![Value::Int(1)], 1);
        let mut buf = encode_to_vec(&stmt).unwrap();
        buf[0] = 0x77; // statement type tag
        assert!(matches!(
            decode_from_slice::<Statement>(&buf),
            Err(EncodingError::InvalidTag {
                type_name: "StmtType",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_value_tag_is_rejected() {
        assert!(matches!(
            decode_from_slice::<Value>(&[0x09]),
            Err(EncodingError::InvalidTag {
                type_name: "Value",
                ..
            })
        ));
    }
}
