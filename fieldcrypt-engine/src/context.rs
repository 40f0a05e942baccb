//! Traits implemented by the native engine binding.

use crate::document::Document;
use crate::error::EngineResult;
use crate::request::OperationRequest;
use crate::state::State;

/// Process-wide engine handle.
///
/// Shared by every in-flight request, so it must be safe for concurrent
/// use. Each call to [`create_context`](Self::create_context) yields an
/// independent context.
pub trait CryptoEngine: Send + Sync {
    /// Builds a fresh context for `request`.
    fn create_context(&self, request: OperationRequest) -> EngineResult<Box<dyn CryptoContext>>;

    /// Releases the native handle. Contexts created earlier are unaffected;
    /// later `create_context` calls should fail with `EngineError::Closed`.
    fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// A per-request state machine.
///
/// Owned by exactly one request. Dropping it releases the native context.
pub trait CryptoContext: Send {
    fn state(&self) -> EngineResult<State>;

    /// The database operation the current state needs run: a
    /// `listCollections` filter, a command to mark, or a key vault filter.
    fn operation(&self) -> EngineResult<Document>;

    /// Feeds one result of the database operation back in.
    fn add_operation_result(&mut self, result: Document) -> EngineResult<()>;

    /// Signals that all results of the database operation were fed.
    fn complete_operation(&mut self) -> EngineResult<()>;

    /// Supplies the `{provider: {properties}}` credential document.
    fn provide_kms_credentials(&mut self, credentials: Document) -> EngineResult<()>;

    /// Returns the next key whose material still needs a KMS round trip.
    fn next_key_decryptor(&mut self) -> EngineResult<Option<&mut dyn KeyDecryptor>>;

    /// Signals that every pending decryptor has been satisfied.
    fn complete_key_decryptors(&mut self) -> EngineResult<()>;

    /// Produces the output document once `Ready`.
    fn finish(&mut self) -> EngineResult<Document>;
}

/// One KMS round trip requested by a context.
///
/// The driver sends [`message`](Self::message) to
/// [`host_name`](Self::host_name) and feeds the response back until
/// [`bytes_needed`](Self::bytes_needed) reaches zero.
pub trait KeyDecryptor: Send {
    fn kms_provider(&self) -> &str;

    /// `host` or `host:port`.
    fn host_name(&self) -> &str;

    /// Raw request bytes, including HTTP framing.
    fn message(&self) -> &[u8];

    /// Upper bound on the bytes still expected. Zero once complete.
    fn bytes_needed(&self) -> usize;

    fn feed(&mut self, bytes: &[u8]) -> EngineResult<()>;
}
