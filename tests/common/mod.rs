//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use valkey_iam_client::auth::HandshakeContext;
use valkey_iam_client::{
    CredentialError, CredentialsProvider, Error, KeyValueStore, Result, StatusSink, Token,
    TokenSource,
};

/// Hands out scripted tokens in order and counts exchanges
pub struct ScriptedSource {
    tokens: Mutex<VecDeque<std::result::Result<Token, CredentialError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(tokens: Vec<std::result::Result<Token, CredentialError>>) -> Arc<Self> {
        Arc::new(ScriptedSource {
            tokens: Mutex::new(tokens.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedSource {
    async fn fetch_token(&self) -> std::result::Result<Token, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CredentialError::Other("script exhausted".into())))
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

/// Step at which [`FakeValkey`] injects a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailAt {
    Never,
    Set,
    Get,
}

/// In-memory store that authenticates through a credentials provider on
/// every handshake, like the real connection layer
pub struct FakeValkey {
    credentials: Arc<dyn CredentialsProvider>,
    data: HashMap<String, String>,
    fail_at: FailAt,
    pub handshakes: u64,
    pub secrets_seen: Vec<String>,
    pub set_calls: usize,
    pub get_calls: usize,
    pub closed: bool,
}

impl FakeValkey {
    pub fn new(credentials: Arc<dyn CredentialsProvider>) -> Self {
        FakeValkey {
            credentials,
            data: HashMap::new(),
            fail_at: FailAt::Never,
            handshakes: 0,
            secrets_seen: Vec::new(),
            set_calls: 0,
            get_calls: 0,
            closed: false,
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    /// Handshake again, as the connection layer does after a reconnect
    pub async fn handshake(&mut self) -> Result<()> {
        self.handshakes += 1;
        let ctx = HandshakeContext::new("localhost:8001", self.handshakes);
        let creds = self
            .credentials
            .credentials(&ctx)
            .await
            .map_err(|e| e.with_context("handshake"))?;

        assert_eq!(creds.username(), "default");
        self.secrets_seen.push(creds.password().as_str().to_string());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FakeValkey {
    async fn connect(&mut self) -> Result<()> {
        self.handshake().await
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_calls += 1;
        if self.fail_at == FailAt::Set {
            return Err(Error::connection("SET", "broken pipe"));
        }
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<String> {
        self.get_calls += 1;
        if self.fail_at == FailAt::Get {
            return Err(Error::operation("GET", "NOPERM this user has no permissions"));
        }
        self.data
            .get(key)
            .cloned()
            .ok_or_else(|| Error::operation("GET", format!("key {:?} not found", key)))
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// Sink recording every observed value
#[derive(Default)]
pub struct RecordingSink {
    pub values: Vec<(String, String)>,
}

impl StatusSink for RecordingSink {
    fn observe(&mut self, key: &str, value: &str) {
        self.values.push((key.to_string(), value.to_string()));
    }
}
