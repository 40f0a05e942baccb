//! KMS provider credential assembly.
//!
//! Credentials come from two places: a static map fixed at construction,
//! and on-demand suppliers (cloud metadata endpoints, vaults) that are
//! only invoked when a context actually asks for credentials.

use crate::collaborators::BoxError;
use crate::error::{CryptError, CryptResult};
use async_trait::async_trait;
use fieldcrypt_engine::{Document, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Produces credentials for one KMS provider on demand.
///
/// Returning `Ok(None)` leaves the provider's static entry as it is.
#[async_trait]
pub trait CredentialSupplier: Send + Sync {
    async fn credentials(&self) -> Result<Option<Document>, BoxError>;
}

#[async_trait]
impl<F> CredentialSupplier for F
where
    F: Fn() -> Result<Option<Document>, BoxError> + Send + Sync,
{
    async fn credentials(&self) -> Result<Option<Document>, BoxError> {
        self()
    }
}

/// Static provider credentials plus on-demand suppliers.
#[derive(Clone, Default)]
pub struct CredentialSource {
    providers: HashMap<String, Document>,
    suppliers: HashMap<String, Arc<dyn CredentialSupplier>>,
}

impl CredentialSource {
    pub fn new(providers: HashMap<String, Document>) -> Self {
        Self {
            providers,
            suppliers: HashMap::new(),
        }
    }

    /// Registers an on-demand supplier for `provider`.
    pub fn with_supplier(
        mut self,
        provider: impl Into<String>,
        supplier: impl CredentialSupplier + 'static,
    ) -> Self {
        self.suppliers.insert(provider.into(), Arc::new(supplier));
        self
    }

    pub fn providers(&self) -> &HashMap<String, Document> {
        &self.providers
    }

    pub fn has_supplier(&self, provider: &str) -> bool {
        self.suppliers.contains_key(provider)
    }

    /// Assembles the `{provider: {properties}}` document for the engine.
    ///
    /// A supplier is called only when the provider has no static entry or
    /// an empty one; configured static credentials always win.
    pub async fn fetch(&self) -> CryptResult<Document> {
        let mut credentials: Document = self
            .providers
            .iter()
            .map(|(name, props)| (name.clone(), Value::Object(props.clone())))
            .collect();

        for (provider, supplier) in &self.suppliers {
            let has_static = credentials
                .get(provider)
                .and_then(Value::as_object)
                .is_some_and(|props| !props.is_empty());
            if has_static {
                continue;
            }

            debug!("fetching on-demand credentials for KMS provider {provider}");
            let supplied = supplier
                .credentials()
                .await
                .map_err(|source| CryptError::Credentials {
                    provider: provider.clone(),
                    source,
                })?;

            match supplied {
                Some(props) => {
                    credentials.insert(provider.clone(), Value::Object(props));
                }
                None => debug!("supplier for KMS provider {provider} returned no credentials"),
            }
        }

        Ok(credentials)
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&String> = self.providers.keys().collect();
        providers.sort();
        let mut suppliers: Vec<&String> = self.suppliers.keys().collect();
        suppliers.sort();
        f.debug_struct("CredentialSource")
            .field("providers", &providers)
            .field("suppliers", &suppliers)
            .finish()
    }
}
