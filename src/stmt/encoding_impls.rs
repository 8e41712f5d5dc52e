//! Wire-format implementations for statement types stored in run files.
//!
//! Layouts:
//!
//! ```text
//! Value:     [u8 tag: 0=Null 1=Int 2=Str][payload]
//! UpdateOp:  [u8 tag: 0=Assign 1=Add][u32 field][payload]
//! Statement: [u8 type: 0=Replace 1=Delete 2=Upsert]
//!            [u64 lsn][u64 column_mask]
//!            [row: Vec<Value>][ops: Vec<UpdateOp>]
//! ```

use crate::encoding::{Decode, Encode, EncodingError};

use super::{Statement, StmtType, UpdateOp, Value};

const VALUE_TAG_NULL: u8 = 0;
const VALUE_TAG_INT: u8 = 1;
const VALUE_TAG_STR: u8 = 2;

const OP_TAG_ASSIGN: u8 = 0;
const OP_TAG_ADD: u8 = 1;

const STMT_TAG_REPLACE: u8 = 0;
const STMT_TAG_DELETE: u8 = 1;
const STMT_TAG_UPSERT: u8 = 2;

impl Encode for Value {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            Value::Null => VALUE_TAG_NULL.encode_to(buf),
            Value::Int(v) => {
                VALUE_TAG_INT.encode_to(buf)?;
                v.encode_to(buf)
            }
            Value::Str(v) => {
                VALUE_TAG_STR.encode_to(buf)?;
                v.encode_to(buf)
            }
        }
    }
}

impl Decode for Value {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, off) = u8::decode_from(buf)?;
        match tag {
            VALUE_TAG_NULL => Ok((Value::Null, off)),
            VALUE_TAG_INT => {
                let (v, n) = i64::decode_from(&buf[off..])?;
                Ok((Value::Int(v), off + n))
            }
            VALUE_TAG_STR => {
                let (v, n) = String::decode_from(&buf[off..])?;
                Ok((Value::Str(v), off + n))
            }
            tag => Err(EncodingError::InvalidTag {
                tag,
                type_name: "Value",
            }),
        }
    }
}

impl Encode for UpdateOp {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            UpdateOp::Assign { field, value } => {
                OP_TAG_ASSIGN.encode_to(buf)?;
                field.encode_to(buf)?;
                value.encode_to(buf)
            }
            UpdateOp::Add { field, delta } => {
                OP_TAG_ADD.encode_to(buf)?;
                field.encode_to(buf)?;
                delta.encode_to(buf)
            }
        }
    }
}

impl Decode for UpdateOp {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, mut off) = u8::decode_from(buf)?;
        let (field, n) = u32::decode_from(&buf[off..])?;
        off += n;
        match tag {
            OP_TAG_ASSIGN => {
                let (value, n) = Value::decode_from(&buf[off..])?;
                Ok((UpdateOp::Assign { field, value }, off + n))
            }
            OP_TAG_ADD => {
                let (delta, n) = i64::decode_from(&buf[off..])?;
                Ok((UpdateOp::Add { field, delta }, off + n))
            }
            tag => Err(EncodingError::InvalidTag {
                tag,
                type_name: "UpdateOp",
            }),
        }
    }
}

impl Encode for StmtType {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let tag = match self {
            StmtType::Replace => STMT_TAG_REPLACE,
            StmtType::Delete => STMT_TAG_DELETE,
            StmtType::Upsert => STMT_TAG_UPSERT,
        };
        tag.encode_to(buf)
    }
}

impl Decode for StmtType {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, off) = u8::decode_from(buf)?;
        let stype = match tag {
            STMT_TAG_REPLACE => StmtType::Replace,
            STMT_TAG_DELETE => StmtType::Delete,
            STMT_TAG_UPSERT => StmtType::Upsert,
            tag => {
                return Err(EncodingError::InvalidTag {
                    tag,
                    type_name: "StmtType",
                });
            }
        };
        Ok((stype, off))
    }
}

impl Encode for Statement {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.stype().encode_to(buf)?;
        self.lsn().encode_to(buf)?;
        self.column_mask().encode_to(buf)?;
        self.row().encode_to(buf)?;
        self.ops().encode_to(buf)
    }
}

impl Decode for Statement {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (stype, mut off) = StmtType::decode_from(buf)?;
        let (lsn, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (column_mask, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (row, n) = Vec::<Value>::decode_from(&buf[off..])?;
        off += n;
        let (ops, n) = Vec::<UpdateOp>::decode_from(&buf[off..])?;
        off += n;
        Ok((Statement::from_parts(stype, lsn, column_mask, row, ops), off))
    }
}
