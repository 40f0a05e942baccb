//! Database and KMS collaborators consumed by the state machine.
//!
//! Implementations live in the driver (they need a connection pool, server
//! selection, TLS); the state machine only relies on these contracts.

use crate::error::KmsError;
use async_trait::async_trait;
use fieldcrypt_engine::{Document, KeyDecryptor};

/// Boxed error returned by collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runs `listCollections` against the target database.
#[async_trait]
pub trait CollectionInfoRetriever: Send + Sync {
    /// Returns the first collection description matching `filter`, if any.
    async fn filter(&self, database: &str, filter: Document) -> Result<Option<Document>, BoxError>;
}

/// Annotates a command with the fields that must be encrypted
/// (a query-analysis process or shared library).
#[async_trait]
pub trait CommandMarker: Send + Sync {
    async fn mark(&self, database: &str, command: Document) -> Result<Document, BoxError>;

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Queries the key vault collection.
#[async_trait]
pub trait KeyRetriever: Send + Sync {
    /// Returns every key document matching `filter`. Order is not significant.
    async fn find(&self, filter: Document) -> Result<Vec<Document>, BoxError>;
}

/// Performs the network round trip a [`KeyDecryptor`] asks for.
#[async_trait]
pub trait KeyManagementService: Send + Sync {
    /// Sends the decryptor's message and feeds the full response back.
    async fn decrypt_key(&self, decryptor: &mut dyn KeyDecryptor) -> Result<(), KmsError>;

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Auxiliary database connection owned by an auto-encryption client
/// (used by the driver's retrievers for metadata and key vault reads).
#[async_trait]
pub trait InternalClient: Send + Sync {
    async fn close(&self) -> Result<(), BoxError>;
}
