//! Encryption client error types.

use crate::collaborators::BoxError;
use fieldcrypt_engine::{EngineError, State};
use thiserror::Error;

/// Result type for encryption client operations.
pub type CryptResult<T> = Result<T, CryptError>;

/// Prefix carried by every error raised inside the encryption layer, so
/// callers can tell it apart from validation and transport failures.
pub const ENCRYPTION_ERROR_PREFIX: &str = "Exception in encryption library: ";

/// Errors that can occur while encrypting or decrypting.
#[derive(Debug, Error)]
pub enum CryptError {
    /// A collaborator or database name needed by the current state is missing.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("Exception in encryption library: {0}")]
    Engine(#[from] EngineError),

    /// Any other error, wrapped for the client.
    #[error("Exception in encryption library: {0}")]
    Encryption(#[source] Box<CryptError>),

    #[error("collection info lookup failed: {0}")]
    CollectionInfo(#[source] BoxError),

    #[error("command marking failed: {0}")]
    Marking(#[source] BoxError),

    #[error("key vault query failed: {0}")]
    KeyVault(#[source] BoxError),

    #[error("KMS request failed: {0}")]
    Kms(#[from] KmsError),

    #[error("failed to obtain credentials for KMS provider {provider}: {source}")]
    Credentials {
        provider: String,
        #[source]
        source: BoxError,
    },

    /// The engine reported a state this driver does not handle.
    #[error("unsupported encryptor state: {0}")]
    UnsupportedState(State),

    #[error("failed to release {resource}: {source}")]
    Release {
        resource: &'static str,
        #[source]
        source: BoxError,
    },

    /// Engine output does not have the expected shape.
    #[error("invalid engine output: {0}")]
    InvalidOutput(String),

    #[error("encryption client is closed")]
    Closed,
}

impl CryptError {
    /// Wraps the error for the client unless it already carries the
    /// encryption prefix.
    pub fn into_client_error(self) -> Self {
        match self {
            e @ (Self::Engine(_) | Self::Encryption(_)) => e,
            other => Self::Encryption(Box::new(other)),
        }
    }

    /// Looks through client wrapping to the underlying error.
    pub fn root(&self) -> &CryptError {
        match self {
            Self::Encryption(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), Self::Configuration(_))
    }

    /// True if the error was raised inside the encryption layer.
    pub fn is_encryption_error(&self) -> bool {
        matches!(self, Self::Engine(_) | Self::Encryption(_))
    }
}

/// Errors from a KMS round trip.
#[derive(Debug, Error)]
pub enum KmsError {
    #[error("invalid KMS host {0:?}")]
    InvalidHost(String),

    #[error("failed to connect to KMS host {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KMS I/O error with {host}: {source}")]
    Io {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KMS {operation} with {host} timed out")]
    Timeout {
        host: String,
        operation: &'static str,
    },

    #[error("KMS host {host} closed the connection with {remaining} bytes outstanding")]
    UnexpectedEof { host: String, remaining: usize },

    #[error("KMS response from {host} exceeded {limit} bytes")]
    ResponseTooLarge { host: String, limit: usize },

    #[error("engine rejected KMS response: {0}")]
    Engine(#[from] EngineError),

    #[error("key management service is closed")]
    Closed,

    /// Failure reported by a custom key management service.
    #[error("{0}")]
    Provider(#[source] BoxError),
}
