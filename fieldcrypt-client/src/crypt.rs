//! The encryption client.
//!
//! One [`Crypt`] serves every request of a driver instance. Each operation
//! builds a fresh context, drives it to completion and drops it before
//! returning, so contexts never outlive the call that created them.

use crate::collaborators::{
    BoxError, CollectionInfoRetriever, CommandMarker, InternalClient, KeyManagementService,
    KeyRetriever,
};
use crate::config::CryptConfig;
use crate::credentials::CredentialSource;
use crate::envelope;
use crate::error::{CryptError, CryptResult};
use crate::state_machine::Collaborators;
use fieldcrypt_engine::{
    Binary, CryptoEngine, DataKeyOptions, Document, EncryptOptions, OperationRequest,
    RewrapManyDataKeyOptions, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Collaborators that only an auto-encryption client has.
///
/// A client built without this can still decrypt responses and do explicit
/// encryption and key management; contexts that ask for collection info or
/// markings fail with a configuration error.
#[derive(Clone)]
pub struct AutoEncryption {
    pub collection_info: Arc<dyn CollectionInfoRetriever>,
    pub command_marker: Arc<dyn CommandMarker>,
    pub internal_client: Option<Arc<dyn InternalClient>>,
}

/// Builder for [`Crypt`].
pub struct CryptBuilder {
    engine: Arc<dyn CryptoEngine>,
    key_retriever: Arc<dyn KeyRetriever>,
    kms: Arc<dyn KeyManagementService>,
    credentials: CredentialSource,
    bypass_auto_encryption: bool,
    auto: Option<AutoEncryption>,
}

impl CryptBuilder {
    /// Takes static credentials and the bypass flag from `config` after
    /// validating it. Replaces any credential source set earlier.
    pub fn config(mut self, config: &CryptConfig) -> CryptResult<Self> {
        config.validate()?;
        self.credentials = CredentialSource::new(config.kms_providers.clone());
        self.bypass_auto_encryption = config.bypass_auto_encryption;
        Ok(self)
    }

    pub fn credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn bypass_auto_encryption(mut self, bypass: bool) -> Self {
        self.bypass_auto_encryption = bypass;
        self
    }

    pub fn auto_encryption(mut self, auto: AutoEncryption) -> Self {
        self.auto = Some(auto);
        self
    }

    pub fn build(self) -> Crypt {
        info!(
            "encryption client created (auto encryption: {}, bypass: {})",
            self.auto.is_some(),
            self.bypass_auto_encryption
        );
        Crypt {
            engine: self.engine,
            collaborators: Collaborators {
                key_retriever: self.key_retriever,
                kms: self.kms,
                credentials: self.credentials,
                auto: self.auto,
            },
            bypass_auto_encryption: self.bypass_auto_encryption,
            closed: AtomicBool::new(false),
        }
    }
}

/// Field-level encryption client.
///
/// Safe to share across tasks; concurrent requests only read the
/// configuration and collaborators.
pub struct Crypt {
    engine: Arc<dyn CryptoEngine>,
    collaborators: Collaborators,
    bypass_auto_encryption: bool,
    closed: AtomicBool,
}

impl Crypt {
    pub fn builder(
        engine: Arc<dyn CryptoEngine>,
        key_retriever: Arc<dyn KeyRetriever>,
        kms: Arc<dyn KeyManagementService>,
    ) -> CryptBuilder {
        CryptBuilder {
            engine,
            key_retriever,
            kms,
            credentials: CredentialSource::default(),
            bypass_auto_encryption: false,
            auto: None,
        }
    }

    /// Creates a client for explicit encryption and data key management.
    pub fn explicit(
        engine: Arc<dyn CryptoEngine>,
        key_retriever: Arc<dyn KeyRetriever>,
        kms: Arc<dyn KeyManagementService>,
        credentials: CredentialSource,
    ) -> Self {
        Self::builder(engine, key_retriever, kms)
            .credentials(credentials)
            .build()
    }

    /// Creates a client for automatic encryption and decryption.
    pub fn auto(
        engine: Arc<dyn CryptoEngine>,
        key_retriever: Arc<dyn KeyRetriever>,
        kms: Arc<dyn KeyManagementService>,
        credentials: CredentialSource,
        bypass_auto_encryption: bool,
        auto: AutoEncryption,
    ) -> Self {
        Self::builder(engine, key_retriever, kms)
            .credentials(credentials)
            .bypass_auto_encryption(bypass_auto_encryption)
            .auto_encryption(auto)
            .build()
    }

    pub fn is_auto_encryption(&self) -> bool {
        self.collaborators.auto.is_some()
    }

    pub fn bypasses_auto_encryption(&self) -> bool {
        self.bypass_auto_encryption
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Encrypts an outgoing command.
    ///
    /// With bypass set the command is returned as is, without touching the
    /// engine.
    pub async fn encrypt(&self, database: &str, command: Document) -> CryptResult<Document> {
        self.ensure_open()?;
        if database.is_empty() {
            return Err(CryptError::Configuration(
                "database name must not be empty".to_string(),
            ));
        }
        if self.bypasses_auto_encryption() {
            debug!("auto encryption bypassed for command on {database}");
            return Ok(command);
        }

        let request = OperationRequest::EncryptCommand {
            db: database.to_string(),
            command,
        };
        self.execute(request, Some(database)).await
    }

    /// Decrypts a server response. Runs even when auto encryption is
    /// bypassed, since responses may still carry ciphertext.
    pub async fn decrypt(&self, response: Document) -> CryptResult<Document> {
        self.execute(OperationRequest::DecryptResponse { response }, None)
            .await
            .map_err(CryptError::into_client_error)
    }

    /// Creates a data key document under `provider`.
    pub async fn create_data_key(
        &self,
        provider: &str,
        options: DataKeyOptions,
    ) -> CryptResult<Document> {
        if provider.is_empty() {
            return Err(CryptError::Configuration(
                "KMS provider must not be empty".to_string(),
            ));
        }
        let request = OperationRequest::CreateDataKey {
            provider: provider.to_string(),
            options,
        };
        self.execute(request, None).await
    }

    /// Encrypts a single value.
    pub async fn encrypt_explicitly(
        &self,
        value: Value,
        options: EncryptOptions,
    ) -> CryptResult<Binary> {
        options
            .validate()
            .map_err(|e| CryptError::Configuration(e.to_string()))?;

        let request = OperationRequest::EncryptExplicit {
            value: envelope::wrap(value),
            options,
        };
        let output = self.execute(request, None).await?;
        envelope::unwrap_binary(output)
    }

    /// Decrypts a single encrypted value.
    pub async fn decrypt_explicitly(&self, value: &Binary) -> CryptResult<Value> {
        if !value.is_encrypted() {
            return Err(CryptError::Configuration(format!(
                "expected an encrypted binary (subtype 6), got subtype {}",
                value.subtype
            )));
        }

        let request = OperationRequest::DecryptExplicit {
            value: envelope::wrap(value.to_value()),
        };
        let output = self.execute(request, None).await?;
        envelope::unwrap(output)
    }

    /// Rewraps the data keys matching `filter`. Returns an empty document
    /// when nothing matched.
    pub async fn rewrap_many_data_key(
        &self,
        filter: Document,
        options: RewrapManyDataKeyOptions,
    ) -> CryptResult<Document> {
        options
            .validate()
            .map_err(|e| CryptError::Configuration(e.to_string()))?;

        let request = OperationRequest::RewrapManyDataKey { filter, options };
        self.execute(request, None).await
    }

    /// Releases the engine, command marker, internal client and KMS
    /// service, in that order.
    ///
    /// Every resource is attempted even if an earlier one fails. The first
    /// failure is returned; later ones are logged. Closing twice is a no-op.
    pub async fn close(&self) -> CryptResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("closing encryption client");

        let mut released: Vec<(&'static str, Result<(), BoxError>)> = Vec::with_capacity(4);
        released.push(("crypto engine", self.engine.close().map_err(BoxError::from)));
        if let Some(auto) = &self.collaborators.auto {
            released.push(("command marker", auto.command_marker.close().await));
            if let Some(client) = &auto.internal_client {
                released.push(("internal client", client.close().await));
            }
        }
        released.push((
            "key management service",
            self.collaborators.kms.close().await,
        ));

        first_release_error(released)
    }

    fn ensure_open(&self) -> CryptResult<()> {
        if self.is_closed() {
            return Err(CryptError::Closed);
        }
        Ok(())
    }

    /// Builds a context for `request` and drives it. The context is dropped,
    /// and so released, on every path out of this function.
    async fn execute(
        &self,
        request: OperationRequest,
        database: Option<&str>,
    ) -> CryptResult<Document> {
        self.ensure_open()?;

        let kind = request.kind();
        let mut context = self.engine.create_context(request)?;
        let result = self.collaborators.drive(context.as_mut(), database).await;
        drop(context);

        if let Err(e) = &result {
            debug!("{kind} failed: {e}");
        }
        result
    }
}

fn first_release_error(released: Vec<(&'static str, Result<(), BoxError>)>) -> CryptResult<()> {
    let mut first: Option<CryptError> = None;
    for (resource, result) in released {
        let Err(source) = result else { continue };
        if first.is_some() {
            warn!("additional failure while releasing {resource}: {source}");
        } else {
            first = Some(CryptError::Release { resource, source });
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
