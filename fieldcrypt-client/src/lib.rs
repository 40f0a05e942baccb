//! Client-side field-level encryption orchestration.
//!
//! [`Crypt`] drives a native [`CryptoContext`](fieldcrypt_engine::CryptoContext)
//! through its states, performing the side effect each state asks for:
//! - Collection metadata lookup (`listCollections`)
//! - Command marking (fields that must be encrypted)
//! - KMS credential assembly (static + on-demand)
//! - Data key lookup in the key vault
//! - Key material decryption via a KMS round trip
//!
//! The database-facing pieces are collaborator traits supplied by the
//! driver; this crate only sequences them.

pub mod collaborators;
pub mod config;
pub mod credentials;
pub mod crypt;
pub mod envelope;
pub mod error;
pub mod kms;
mod state_machine;

pub use collaborators::{
    BoxError, CollectionInfoRetriever, CommandMarker, InternalClient, KeyManagementService,
    KeyRetriever,
};
pub use config::CryptConfig;
pub use credentials::{CredentialSource, CredentialSupplier};
pub use crypt::{AutoEncryption, Crypt, CryptBuilder};
pub use error::{CryptError, CryptResult, KmsError};
pub use kms::{KmsConnector, StreamKeyManagementService, TcpConnector};
