//! Boundary to the native field-level encryption engine.
//!
//! The engine itself (AEAD, key wrapping, schema analysis) lives in a
//! native library and is consumed here as a black box. This crate only
//! defines the shape of that black box:
//!
//! - [`CryptoEngine`]: factory producing one [`CryptoContext`] per request
//! - [`CryptoContext`]: a resumable state machine reporting a [`State`]
//! - [`KeyDecryptor`]: one pending KMS round trip owned by a context
//! - [`OperationRequest`]: everything needed to construct a context
//!
//! # Documents
//!
//! Documents cross the boundary already decoded, as JSON maps. BSON values
//! with no JSON equivalent use canonical extended JSON; the only one this
//! layer needs to understand is binary (see [`Binary`]), which carries key
//! ids and ciphertext.
//!
//! # Lifetime
//!
//! A context is released when its box is dropped. Implementations free the
//! native handle in `Drop`, so every exit path of a request releases it
//! exactly once.

mod context;
mod document;
mod error;
mod options;
mod request;
mod state;

pub use context::{CryptoContext, CryptoEngine, KeyDecryptor};
pub use document::{BINARY_SUBTYPE_ENCRYPTED, BINARY_SUBTYPE_UUID, Binary, Document, Value};
pub use error::{EngineError, EngineResult};
pub use options::{
    Algorithm, DataKeyOptions, EncryptOptions, KEY_MATERIAL_SIZE, KeyMaterial, QueryType,
    RewrapManyDataKeyOptions,
};
pub use request::OperationRequest;
pub use state::State;
