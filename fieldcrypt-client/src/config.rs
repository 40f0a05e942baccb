//! Encryption client configuration.

use crate::error::{CryptError, CryptResult};
use fieldcrypt_engine::Document;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Serializable part of the encryption client configuration.
///
/// Collaborators and on-demand credential suppliers are attached at
/// runtime through [`CryptBuilder`](crate::CryptBuilder).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptConfig {
    /// Static KMS provider credentials (`provider -> properties`). An empty
    /// property map marks a provider whose credentials are fetched on demand.
    pub kms_providers: HashMap<String, Document>,

    /// Skip auto-encryption of outgoing commands. Responses are still
    /// decrypted.
    pub bypass_auto_encryption: bool,

    /// `database.collection` holding the data key documents. Only the
    /// driver's [`KeyRetriever`](crate::KeyRetriever) reads it; this crate
    /// just checks its shape.
    pub key_vault_namespace: String,

    /// Timeout for establishing a KMS connection (milliseconds).
    pub kms_connect_timeout_ms: u64,

    /// Timeout for each KMS read or write (milliseconds).
    pub kms_io_timeout_ms: u64,

    /// Upper bound on a single KMS response.
    pub kms_max_response_bytes: usize,
}

impl Default for CryptConfig {
    fn default() -> Self {
        Self {
            kms_providers: HashMap::new(),
            bypass_auto_encryption: false,
            key_vault_namespace: "keyvault.datakeys".to_string(),
            kms_connect_timeout_ms: 10_000,
            kms_io_timeout_ms: 30_000,
            kms_max_response_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl CryptConfig {
    pub fn kms_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.kms_connect_timeout_ms)
    }

    pub fn kms_io_timeout(&self) -> Duration {
        Duration::from_millis(self.kms_io_timeout_ms)
    }

    /// Splits the key vault namespace into database and collection.
    pub fn key_vault(&self) -> CryptResult<(&str, &str)> {
        match self.key_vault_namespace.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok((db, coll)),
            _ => Err(CryptError::Configuration(format!(
                "invalid key vault namespace {:?}",
                self.key_vault_namespace
            ))),
        }
    }

    /// Rejects empty provider names, a malformed key vault namespace and
    /// zero timeouts/limits.
    pub fn validate(&self) -> CryptResult<()> {
        self.key_vault()?;
        if self.kms_providers.keys().any(String::is_empty) {
            return Err(CryptError::Configuration(
                "KMS provider name must not be empty".to_string(),
            ));
        }
        if self.kms_connect_timeout_ms == 0 || self.kms_io_timeout_ms == 0 {
            return Err(CryptError::Configuration(
                "KMS timeouts must be greater than zero".to_string(),
            ));
        }
        if self.kms_max_response_bytes == 0 {
            return Err(CryptError::Configuration(
                "kms_max_response_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
