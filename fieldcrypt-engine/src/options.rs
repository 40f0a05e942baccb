//! Options for data key creation, explicit encryption and rewrap.

use crate::document::Document;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of caller-supplied data key material.
pub const KEY_MATERIAL_SIZE: usize = 96;

/// Caller-supplied plaintext key material for a new data key.
///
/// Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    /// Wraps key material, checking its length.
    pub fn new(bytes: Vec<u8>) -> EngineResult<Self> {
        if bytes.len() != KEY_MATERIAL_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "key material must be {KEY_MATERIAL_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Options for creating a data key.
#[derive(Clone, Debug, Default)]
pub struct DataKeyOptions {
    pub key_alt_names: Vec<String>,
    /// Provider-specific master key description. Not needed for `local`.
    pub master_key: Option<Document>,
    pub key_material: Option<KeyMaterial>,
}

/// Explicit encryption algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AEAD_AES_256_CBC_HMAC_SHA_512-Deterministic")]
    Deterministic,
    #[serde(rename = "AEAD_AES_256_CBC_HMAC_SHA_512-Random")]
    Random,
    Indexed,
    Unindexed,
    Range,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deterministic => "AEAD_AES_256_CBC_HMAC_SHA_512-Deterministic",
            Self::Random => "AEAD_AES_256_CBC_HMAC_SHA_512-Random",
            Self::Indexed => "Indexed",
            Self::Unindexed => "Unindexed",
            Self::Range => "Range",
        }
    }

    /// Whether values encrypted with this algorithm are queryable
    /// (and so accept a contention factor and query type).
    pub fn is_queryable(self) -> bool {
        matches!(self, Self::Indexed | Self::Range)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Deterministic,
            Self::Random,
            Self::Indexed,
            Self::Unindexed,
            Self::Range,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
        .ok_or_else(|| EngineError::InvalidArgument(format!("unknown algorithm: {s}")))
    }
}

/// Query type for queryable encryption payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Equality,
    Range,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equality => "equality",
            Self::Range => "range",
        }
    }
}

/// Options for explicit encryption of a single value.
#[derive(Clone, Debug, PartialEq)]
pub struct EncryptOptions {
    pub algorithm: Algorithm,
    pub key_id: Option<Uuid>,
    pub key_alt_name: Option<String>,
    pub contention_factor: Option<i64>,
    pub query_type: Option<QueryType>,
}

impl EncryptOptions {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            key_id: None,
            key_alt_name: None,
            contention_factor: None,
            query_type: None,
        }
    }

    pub fn key_id(mut self, key_id: Uuid) -> Self {
        self.key_id = Some(key_id);
        self
    }

    pub fn key_alt_name(mut self, name: impl Into<String>) -> Self {
        self.key_alt_name = Some(name.into());
        self
    }

    pub fn contention_factor(mut self, factor: i64) -> Self {
        self.contention_factor = Some(factor);
        self
    }

    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = Some(query_type);
        self
    }

    /// Checks option combinations before a context is built.
    ///
    /// Exactly one of `key_id` / `key_alt_name` identifies the data key.
    /// Contention factor and query type only apply to queryable algorithms.
    pub fn validate(&self) -> EngineResult<()> {
        match (&self.key_id, &self.key_alt_name) {
            (Some(_), Some(_)) => {
                return Err(EngineError::InvalidArgument(
                    "key_id and key_alt_name are mutually exclusive".to_string(),
                ));
            }
            (None, None) => {
                return Err(EngineError::InvalidArgument(
                    "one of key_id or key_alt_name is required".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(name) = &self.key_alt_name {
            if name.is_empty() {
                return Err(EngineError::InvalidArgument(
                    "key_alt_name must not be empty".to_string(),
                ));
            }
        }

        if !self.algorithm.is_queryable() {
            if self.contention_factor.is_some() {
                return Err(EngineError::InvalidArgument(format!(
                    "contention factor is not valid with algorithm {}",
                    self.algorithm
                )));
            }
            if self.query_type.is_some() {
                return Err(EngineError::InvalidArgument(format!(
                    "query type is not valid with algorithm {}",
                    self.algorithm
                )));
            }
        }

        if self.contention_factor.is_some_and(|f| f < 0) {
            return Err(EngineError::InvalidArgument(
                "contention factor must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Options for rewrapping data keys under a new master key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RewrapManyDataKeyOptions {
    /// Target KMS provider. `None` rewraps each key under its current provider.
    pub provider: Option<String>,
    pub master_key: Option<Document>,
}

impl RewrapManyDataKeyOptions {
    /// A master key is provider-specific, so it needs a provider.
    pub fn validate(&self) -> EngineResult<()> {
        if self.master_key.is_some() && self.provider.is_none() {
            return Err(EngineError::InvalidArgument(
                "missing the provider for the new master key".to_string(),
            ));
        }
        if self.provider.as_deref().is_some_and(str::is_empty) {
            return Err(EngineError::InvalidArgument(
                "provider must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
