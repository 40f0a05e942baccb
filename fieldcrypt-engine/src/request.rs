use crate::document::Document;
use crate::options::{DataKeyOptions, EncryptOptions, RewrapManyDataKeyOptions};

/// Everything the engine needs to construct a context for one request.
#[derive(Clone, Debug)]
pub enum OperationRequest {
    /// Auto-encrypt an outgoing command.
    EncryptCommand { db: String, command: Document },
    /// Auto-decrypt a server response.
    DecryptResponse { response: Document },
    /// Create a new data key under `provider`.
    CreateDataKey {
        provider: String,
        options: DataKeyOptions,
    },
    /// Encrypt a single value wrapped in a `{"v": value}` envelope.
    EncryptExplicit {
        value: Document,
        options: EncryptOptions,
    },
    /// Decrypt a single value wrapped in a `{"v": value}` envelope.
    DecryptExplicit { value: Document },
    /// Rewrap the key vault documents matching `filter`.
    RewrapManyDataKey {
        filter: Document,
        options: RewrapManyDataKeyOptions,
    },
}

impl OperationRequest {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EncryptCommand { .. } => "encrypt",
            Self::DecryptResponse { .. } => "decrypt",
            Self::CreateDataKey { .. } => "create_data_key",
            Self::EncryptExplicit { .. } => "encrypt_explicit",
            Self::DecryptExplicit { .. } => "decrypt_explicit",
            Self::RewrapManyDataKey { .. } => "rewrap_many_data_key",
        }
    }
}
