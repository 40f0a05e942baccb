//! The per-request state machine runner.
//!
//! Drives one context from construction to `Ready`/`Done`. Every state is
//! handled inline: the loop performs the side effect, folds the result
//! back into the context and asks for the next state. Collaborator calls
//! are strictly sequential within a request.

use crate::collaborators::{KeyManagementService, KeyRetriever};
use crate::credentials::CredentialSource;
use crate::crypt::AutoEncryption;
use crate::error::{CryptError, CryptResult};
use fieldcrypt_engine::{CryptoContext, Document, State};
use std::sync::Arc;
use tracing::{debug, trace};

/// Collaborators shared by every request of one client.
pub(crate) struct Collaborators {
    pub(crate) key_retriever: Arc<dyn KeyRetriever>,
    pub(crate) kms: Arc<dyn KeyManagementService>,
    pub(crate) credentials: CredentialSource,
    pub(crate) auto: Option<AutoEncryption>,
}

impl Collaborators {
    /// Runs `context` to a terminal state and returns its output.
    ///
    /// `database` is only needed by the auto-encryption states.
    pub(crate) async fn drive(
        &self,
        context: &mut dyn CryptoContext,
        database: Option<&str>,
    ) -> CryptResult<Document> {
        loop {
            let state = context.state()?;
            debug!("executing encryption state machine: {state}");

            match state {
                State::NeedCollectionInfo => self.collection_info(context, database).await?,
                State::NeedMarkings => self.mark(context, database).await?,
                State::NeedKmsCredentials => self.provide_credentials(context).await?,
                State::NeedKeys => self.fetch_keys(context).await?,
                State::NeedKms => self.decrypt_keys(context).await?,
                State::Ready => return Ok(context.finish()?),
                State::Done => return Ok(Document::new()),
                State::Unrecognized(_) => return Err(CryptError::UnsupportedState(state)),
            }
        }
    }

    /// Auto-encryption states need the auto collaborators and a database.
    fn auto_for<'a>(
        &'a self,
        database: Option<&'a str>,
        missing: &str,
    ) -> CryptResult<(&'a AutoEncryption, &'a str)> {
        let auto = self
            .auto
            .as_ref()
            .ok_or_else(|| CryptError::Configuration(format!("missing {missing}")))?;
        let database = database
            .ok_or_else(|| CryptError::Configuration("missing database name".to_string()))?;
        Ok((auto, database))
    }

    async fn collection_info(
        &self,
        context: &mut dyn CryptoContext,
        database: Option<&str>,
    ) -> CryptResult<()> {
        let (auto, database) = self.auto_for(database, "collection info retriever")?;
        let filter = context.operation()?;

        let info = auto
            .collection_info
            .filter(database, filter)
            .await
            .map_err(CryptError::CollectionInfo)?;
        match info {
            Some(info) => context.add_operation_result(info)?,
            None => trace!("no collection info found in {database}"),
        }
        context.complete_operation()?;
        Ok(())
    }

    /// Marker failures carry the encryption prefix. A missing marker or
    /// database name does not: it is returned as a bare configuration
    /// error, same as at `NeedCollectionInfo`.
    async fn mark(
        &self,
        context: &mut dyn CryptoContext,
        database: Option<&str>,
    ) -> CryptResult<()> {
        let (auto, database) = self.auto_for(database, "command marker")?;
        let command = context.operation()?;

        let marked = auto
            .command_marker
            .mark(database, command)
            .await
            .map_err(|e| CryptError::Marking(e).into_client_error())?;
        context.add_operation_result(marked)?;
        context.complete_operation()?;
        Ok(())
    }

    async fn provide_credentials(&self, context: &mut dyn CryptoContext) -> CryptResult<()> {
        let credentials = self.credentials.fetch().await?;
        context.provide_kms_credentials(credentials)?;
        Ok(())
    }

    async fn fetch_keys(&self, context: &mut dyn CryptoContext) -> CryptResult<()> {
        let filter = context.operation()?;
        let keys = self
            .key_retriever
            .find(filter)
            .await
            .map_err(CryptError::KeyVault)?;

        debug!("key vault returned {} data keys", keys.len());
        for key in keys {
            context.add_operation_result(key)?;
        }
        context.complete_operation()?;
        Ok(())
    }

    /// One KMS round trip per pending decryptor, then phase completion.
    async fn decrypt_keys(&self, context: &mut dyn CryptoContext) -> CryptResult<()> {
        let mut decrypted = 0usize;
        while let Some(decryptor) = context.next_key_decryptor()? {
            debug!(
                "decrypting data key via KMS provider {}",
                decryptor.kms_provider()
            );
            self.kms
                .decrypt_key(decryptor)
                .await
                .map_err(|e| CryptError::Kms(e).into_client_error())?;
            decrypted += 1;
        }

        trace!("key decryption phase complete after {decrypted} KMS requests");
        context.complete_key_decryptors()?;
        Ok(())
    }
}
