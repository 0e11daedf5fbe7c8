//! Identity key encoding.
//!
//! Integer identities are stored big-endian with the sign bit flipped so that
//! the lexicographic order of keys matches numeric order and a table scan
//! returns rows in identity order. String identities are stored as UTF-8.

use crate::error::{Result, StoreError};
use ormrepo_proto::Value;

const SIGN_BIT: u64 = 1 << 63;

/// Encode an identity value as a tree key.
pub fn encode_identity(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Int32(i) => Ok(encode_int(*i as i64)),
        Value::Int64(i) => Ok(encode_int(*i)),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Err(StoreError::Constraint(format!(
            "{} cannot be used as an identity",
            other.type_name()
        ))
        .into()),
    }
}

/// Decode an integer identity key.
pub fn decode_identity(bytes: &[u8]) -> Option<i64> {
    let buf: [u8; 8] = bytes.try_into().ok()?;
    Some((u64::from_be_bytes(buf) ^ SIGN_BIT) as i64)
}

fn encode_int(i: i64) -> Vec<u8> {
    ((i as u64) ^ SIGN_BIT).to_be_bytes().to_vec()
}
