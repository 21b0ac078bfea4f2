//! Canonical CBOR encoding for Beenet
//!
//! All hashed and signed objects use deterministic CBOR with strict
//! constraints:
//! - Map keys are sorted by the byte ordering of their encoded form
//! - Integers take their shortest encoding (native to CBOR)
//! - Floating-point values are rejected outright
//! - The encoding of the same logical value is bit-identical across encoders

use crate::error::{Error, Result};
use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a value to canonical CBOR bytes.
///
/// This is the normative encoding for all hashing and signing operations.
/// Implementations in other languages MUST produce identical bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    ciborium::ser::into_writer(value, &mut raw).map_err(|e| Error::Encode(e.to_string()))?;
    let decoded: Value =
        ciborium::de::from_reader(raw.as_slice()).map_err(|e| Error::Encode(e.to_string()))?;
    let canonical = canonicalize(decoded)?;
    encode_value(&canonical)
}

/// Deserialize a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| Error::Decode(e.to_string()))
}

fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(out)
}

/// Rewrite a decoded CBOR tree into canonical form.
///
/// Map entries are sorted by their encoded key bytes; floats are rejected.
fn canonicalize(value: Value) -> Result<Value> {
    match value {
        Value::Float(_) => Err(Error::FloatDisallowed),
        Value::Array(items) => {
            let canonical: Result<Vec<Value>> = items.into_iter().map(canonicalize).collect();
            Ok(Value::Array(canonical?))
        }
        Value::Map(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (key, val) in entries {
                let key = canonicalize(key)?;
                let val = canonicalize(val)?;
                let key_bytes = encode_value(&key)?;
                keyed.push((key_bytes, key, val));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(Value::Map(keyed.into_iter().map(|(_, k, v)| (k, v)).collect()))
        }
        Value::Tag(tag, inner) => Ok(Value::Tag(tag, Box::new(canonicalize(*inner)?))),
        other => Ok(other),
    }
}
