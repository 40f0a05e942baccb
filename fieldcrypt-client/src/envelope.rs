//! The `{"v": value}` envelope for explicit encryption.
//!
//! The engine's explicit encrypt/decrypt only accept documents, so single
//! values travel wrapped in a one-field document and are unwrapped from
//! the engine's output.

use crate::error::{CryptError, CryptResult};
use fieldcrypt_engine::{Binary, Document, Value};

/// Field name carrying the value inside the envelope.
pub const ENVELOPE_FIELD: &str = "v";

/// Wraps `value` as `{"v": value}`.
pub fn wrap(value: Value) -> Document {
    let mut envelope = Document::new();
    envelope.insert(ENVELOPE_FIELD.to_string(), value);
    envelope
}

/// Takes the value out of an engine output envelope.
pub fn unwrap(mut envelope: Document) -> CryptResult<Value> {
    envelope.remove(ENVELOPE_FIELD).ok_or_else(|| {
        CryptError::InvalidOutput(format!("missing \"{ENVELOPE_FIELD}\" field"))
    })
}

/// Takes a binary value out of an engine output envelope.
pub fn unwrap_binary(envelope: Document) -> CryptResult<Binary> {
    let value = unwrap(envelope)?;
    Binary::from_value(&value).ok_or_else(|| {
        CryptError::InvalidOutput(format!("\"{ENVELOPE_FIELD}\" is not a binary value"))
    })
}
