//! Shared mocks for encryption client tests.
//!
//! `MockEngine` hands out scripted contexts: each context walks a fixed
//! list of states, advancing only when the driver performs the call that
//! completes the current state. Every collaborator call is recorded in a
//! shared `Recorder` so tests can assert ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use fieldcrypt_client::{
    AutoEncryption, BoxError, CollectionInfoRetriever, CommandMarker, CredentialSource, Crypt,
    InternalClient, KeyManagementService, KeyRetriever, KmsError,
};
use fieldcrypt_engine::{
    Binary, CryptoContext, CryptoEngine, Document, EngineError, EngineResult, KeyDecryptor,
    OperationRequest, State,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Collects formatted log lines written by a test-local subscriber.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Installs a `warn`-level subscriber for the current thread. Logs are
    /// captured until the returned guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn doc(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

// ── Recorder ────────────────────────────────────────────────────

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

// ── Mock Engine ─────────────────────────────────────────────────

pub struct MockEngine {
    pub recorder: Arc<Recorder>,
    pub created: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    states: Vec<State>,
    decryptors: usize,
    fail_create: bool,
    close_error: Option<String>,
}

impl MockEngine {
    pub fn new(recorder: Arc<Recorder>, states: Vec<State>) -> Self {
        Self {
            recorder,
            created: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            states,
            decryptors: 0,
            fail_create: false,
            close_error: None,
        }
    }

    /// Number of pending key decryptors each context reports at `NeedKms`.
    pub fn with_decryptors(mut self, count: usize) -> Self {
        self.decryptors = count;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_close(mut self, message: &str) -> Self {
        self.close_error = Some(message.to_string());
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl CryptoEngine for MockEngine {
    fn create_context(&self, request: OperationRequest) -> EngineResult<Box<dyn CryptoContext>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(format!("create:{}", request.kind()));
        if self.fail_create {
            return Err(EngineError::status(1, "cannot build context"));
        }

        let decryptors = (0..self.decryptors)
            .map(|i| MockDecryptor::new(format!("kms-{i}.example.com"), 8))
            .collect();
        Ok(Box::new(MockContext {
            output: output_for(&request),
            request,
            states: self.states.iter().copied().collect(),
            decryptors,
            next_decryptor: 0,
            results: Vec::new(),
            recorder: self.recorder.clone(),
            released: self.released.clone(),
        }))
    }

    fn close(&self) -> EngineResult<()> {
        self.recorder.push("close:engine");
        match &self.close_error {
            Some(message) => Err(EngineError::status(2, message.clone())),
            None => Ok(()),
        }
    }
}

/// What a context returns from `finish`, derived from its request.
fn output_for(request: &OperationRequest) -> Document {
    match request {
        OperationRequest::EncryptCommand { command, .. } => {
            let mut out = command.clone();
            out.insert("encrypted".into(), json!(true));
            out
        }
        OperationRequest::DecryptResponse { response } => {
            let mut out = response.clone();
            out.insert("decrypted".into(), json!(true));
            out
        }
        OperationRequest::CreateDataKey { provider, options } => doc(json!({
            "_id": Binary::new(0x04, vec![7; 16]).to_value(),
            "keyAltNames": options.key_alt_names,
            "masterKey": {"provider": provider},
        })),
        OperationRequest::EncryptExplicit { value, .. } => {
            let plaintext = serde_json::to_vec(&value["v"]).unwrap();
            doc(json!({"v": Binary::encrypted(plaintext).to_value()}))
        }
        OperationRequest::DecryptExplicit { value } => {
            let binary = Binary::from_value(&value["v"]).unwrap();
            let plaintext: serde_json::Value = serde_json::from_slice(&binary.bytes).unwrap();
            doc(json!({"v": plaintext}))
        }
        OperationRequest::RewrapManyDataKey { .. } => doc(json!({"v": []})),
    }
}

/// States that accept `operation`, `add_operation_result` and `complete_operation`.
const OPERATION_STATES: [State; 3] = [
    State::NeedCollectionInfo,
    State::NeedMarkings,
    State::NeedKeys,
];

pub struct MockContext {
    request: OperationRequest,
    states: VecDeque<State>,
    decryptors: Vec<MockDecryptor>,
    next_decryptor: usize,
    results: Vec<Document>,
    output: Document,
    recorder: Arc<Recorder>,
    released: Arc<AtomicUsize>,
}

impl MockContext {
    fn current(&self) -> State {
        self.states.front().copied().unwrap_or(State::Done)
    }

    fn expect(&self, allowed: &[State]) -> EngineResult<State> {
        let state = self.current();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(EngineError::InvalidState(state))
        }
    }

    fn advance(&mut self) {
        self.states.pop_front();
    }
}

impl CryptoContext for MockContext {
    fn state(&self) -> EngineResult<State> {
        Ok(self.current())
    }

    fn operation(&self) -> EngineResult<Document> {
        let state = self.expect(&OPERATION_STATES)?;
        Ok(match (state, &self.request) {
            (State::NeedMarkings, OperationRequest::EncryptCommand { command, .. }) => {
                command.clone()
            }
            (State::NeedCollectionInfo, _) => doc(json!({"name": "coll"})),
            _ => doc(json!({"$or": [{"_id": {"$in": []}}]})),
        })
    }

    fn add_operation_result(&mut self, result: Document) -> EngineResult<()> {
        let state = self.expect(&OPERATION_STATES)?;
        self.recorder.push(format!("add_result:{state}"));
        self.results.push(result);
        Ok(())
    }

    fn complete_operation(&mut self) -> EngineResult<()> {
        let state = self.expect(&OPERATION_STATES)?;
        self.recorder.push(format!("complete:{state}"));
        self.advance();
        Ok(())
    }

    fn provide_kms_credentials(&mut self, credentials: Document) -> EngineResult<()> {
        self.expect(&[State::NeedKmsCredentials])?;
        let mut providers: Vec<&String> = credentials.keys().collect();
        providers.sort();
        self.recorder.push(format!(
            "credentials:{}",
            providers
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ));
        self.advance();
        Ok(())
    }

    fn next_key_decryptor(&mut self) -> EngineResult<Option<&mut dyn KeyDecryptor>> {
        self.expect(&[State::NeedKms])?;
        let index = self.next_decryptor;
        if index >= self.decryptors.len() {
            return Ok(None);
        }
        self.next_decryptor += 1;
        Ok(self
            .decryptors
            .get_mut(index)
            .map(|d| d as &mut dyn KeyDecryptor))
    }

    fn complete_key_decryptors(&mut self) -> EngineResult<()> {
        self.expect(&[State::NeedKms])?;
        if self.decryptors.iter().any(|d| d.bytes_needed() > 0) {
            return Err(EngineError::status(3, "KMS response incomplete"));
        }
        self.recorder.push("complete:NEED_KMS");
        self.advance();
        Ok(())
    }

    fn finish(&mut self) -> EngineResult<Document> {
        self.expect(&[State::Ready])?;
        self.recorder.push("finish");
        self.advance();
        Ok(self.output.clone())
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.recorder.push("release");
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Mock Key Decryptor ──────────────────────────────────────────

pub struct MockDecryptor {
    host: String,
    message: Vec<u8>,
    expected: usize,
    received: Vec<u8>,
}

impl MockDecryptor {
    pub fn new(host: impl Into<String>, expected: usize) -> Self {
        Self {
            host: host.into(),
            message: b"POST / HTTP/1.1\r\n\r\n".to_vec(),
            expected,
            received: Vec::new(),
        }
    }

    pub fn received(&self) -> &[u8] {
        &self.received
    }
}

impl KeyDecryptor for MockDecryptor {
    fn kms_provider(&self) -> &str {
        "aws"
    }

    fn host_name(&self) -> &str {
        &self.host
    }

    fn message(&self) -> &[u8] {
        &self.message
    }

    fn bytes_needed(&self) -> usize {
        self.expected - self.received.len()
    }

    fn feed(&mut self, bytes: &[u8]) -> EngineResult<()> {
        if bytes.len() > self.bytes_needed() {
            return Err(EngineError::InvalidArgument("too many bytes".into()));
        }
        self.received.extend_from_slice(bytes);
        Ok(())
    }
}

// ── Mock Collaborators ──────────────────────────────────────────

pub struct MockCollectionInfo {
    pub recorder: Arc<Recorder>,
    pub info: Option<Document>,
    pub fail: bool,
}

#[async_trait]
impl CollectionInfoRetriever for MockCollectionInfo {
    async fn filter(
        &self,
        database: &str,
        _filter: Document,
    ) -> Result<Option<Document>, BoxError> {
        self.recorder.push(format!("collinfo:{database}"));
        if self.fail {
            return Err("listCollections failed".into());
        }
        Ok(self.info.clone())
    }
}

pub struct MockMarker {
    pub recorder: Arc<Recorder>,
    pub fail: bool,
    pub close_error: Option<String>,
}

#[async_trait]
impl CommandMarker for MockMarker {
    async fn mark(&self, database: &str, command: Document) -> Result<Document, BoxError> {
        self.recorder.push(format!("mark:{database}"));
        if self.fail {
            return Err("mongocryptd unavailable".into());
        }
        Ok(doc(json!({"result": command, "hasEncryptedPlaceholders": true})))
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.recorder.push("close:marker");
        match &self.close_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

pub struct MockKeyRetriever {
    pub recorder: Arc<Recorder>,
    pub keys: usize,
    pub fail: bool,
}

#[async_trait]
impl KeyRetriever for MockKeyRetriever {
    async fn find(&self, _filter: Document) -> Result<Vec<Document>, BoxError> {
        self.recorder.push("find_keys");
        if self.fail {
            return Err("key vault unreachable".into());
        }
        Ok((0..self.keys)
            .map(|i| doc(json!({"_id": i, "keyMaterial": "..."})))
            .collect())
    }
}

pub struct MockKms {
    pub recorder: Arc<Recorder>,
    pub calls: AtomicUsize,
    pub fail: bool,
    pub close_error: Option<String>,
}

#[async_trait]
impl KeyManagementService for MockKms {
    async fn decrypt_key(&self, decryptor: &mut dyn KeyDecryptor) -> Result<(), KmsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(format!("kms:{}", decryptor.host_name()));
        if self.fail {
            return Err(KmsError::Provider("KMS returned 503".into()));
        }
        let response = vec![0u8; decryptor.bytes_needed()];
        decryptor.feed(&response)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.recorder.push("close:kms");
        match &self.close_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

pub struct MockInternalClient {
    pub recorder: Arc<Recorder>,
    pub close_error: Option<String>,
}

#[async_trait]
impl InternalClient for MockInternalClient {
    async fn close(&self) -> Result<(), BoxError> {
        self.recorder.push("close:internal_client");
        match &self.close_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

// ── Harness ─────────────────────────────────────────────────────

/// A client wired to mocks, with handles to every mock for assertions.
pub struct Harness {
    pub recorder: Arc<Recorder>,
    pub engine: Arc<MockEngine>,
    pub kms: Arc<MockKms>,
    pub crypt: Crypt,
}

impl Harness {
    pub fn kms_calls(&self) -> usize {
        self.kms.calls.load(Ordering::SeqCst)
    }
}

pub struct HarnessBuilder {
    pub recorder: Arc<Recorder>,
    pub states: Vec<State>,
    pub decryptors: usize,
    pub keys: usize,
    pub auto: bool,
    pub internal_client: bool,
    pub bypass: bool,
    pub fail_create: bool,
    pub fail_collinfo: bool,
    pub fail_mark: bool,
    pub fail_keys: bool,
    pub fail_kms: bool,
    pub engine_close_error: Option<String>,
    pub marker_close_error: Option<String>,
    pub client_close_error: Option<String>,
    pub kms_close_error: Option<String>,
    pub credentials: CredentialSource,
}

impl HarnessBuilder {
    pub fn new(states: Vec<State>) -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            states,
            decryptors: 0,
            keys: 0,
            auto: false,
            internal_client: false,
            bypass: false,
            fail_create: false,
            fail_collinfo: false,
            fail_mark: false,
            fail_keys: false,
            fail_kms: false,
            engine_close_error: None,
            marker_close_error: None,
            client_close_error: None,
            kms_close_error: None,
            credentials: CredentialSource::default(),
        }
    }

    pub fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    pub fn build(self) -> Harness {
        let recorder = self.recorder;

        let mut engine =
            MockEngine::new(recorder.clone(), self.states).with_decryptors(self.decryptors);
        if self.fail_create {
            engine = engine.failing_create();
        }
        if let Some(message) = &self.engine_close_error {
            engine = engine.failing_close(message);
        }
        let engine = Arc::new(engine);

        let kms = Arc::new(MockKms {
            recorder: recorder.clone(),
            calls: AtomicUsize::new(0),
            fail: self.fail_kms,
            close_error: self.kms_close_error,
        });
        let keys = Arc::new(MockKeyRetriever {
            recorder: recorder.clone(),
            keys: self.keys,
            fail: self.fail_keys,
        });

        let mut builder = Crypt::builder(engine.clone(), keys, kms.clone())
            .credentials(self.credentials)
            .bypass_auto_encryption(self.bypass);

        if self.auto {
            let internal_client: Option<Arc<dyn InternalClient>> = if self.internal_client {
                Some(Arc::new(MockInternalClient {
                    recorder: recorder.clone(),
                    close_error: self.client_close_error,
                }))
            } else {
                None
            };
            builder = builder.auto_encryption(AutoEncryption {
                collection_info: Arc::new(MockCollectionInfo {
                    recorder: recorder.clone(),
                    info: Some(doc(json!({"name": "coll", "options": {}}))),
                    fail: self.fail_collinfo,
                }),
                command_marker: Arc::new(MockMarker {
                    recorder: recorder.clone(),
                    fail: self.fail_mark,
                    close_error: self.marker_close_error,
                }),
                internal_client,
            });
        }

        Harness {
            recorder,
            engine,
            kms,
            crypt: builder.build(),
        }
    }
}
