//! Client session loop: connect once, then write and read until failure

use crate::auth::CredentialsProvider;
use crate::connection::{KeyValueStore, ServerAddr};
use crate::error::{Error, Result};
use crate::tls::TlsSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Everything needed to establish the connection. Immutable once built.
#[derive(Clone)]
pub struct SessionConfig {
    addr: ServerAddr,
    tls: TlsSettings,
    credentials: Arc<dyn CredentialsProvider>,
}

impl SessionConfig {
    /// Create a session configuration
    pub fn new(
        addr: ServerAddr,
        tls: TlsSettings,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        SessionConfig {
            addr,
            tls,
            credentials,
        }
    }

    /// Target address
    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    /// Server verification settings
    pub fn tls(&self) -> &TlsSettings {
        &self.tls
    }

    /// Source of handshake credentials
    pub fn credentials(&self) -> &Arc<dyn CredentialsProvider> {
        &self.credentials
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("addr", &self.addr)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

/// What the loop writes and how often
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopSettings {
    /// Key written and read back
    pub key: String,
    /// Value written
    pub value: String,
    /// Pause between iterations
    pub interval: Duration,
    /// Stop successfully after this many iterations; `None` runs until failure
    pub max_iterations: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        LoopSettings {
            key: "key".to_string(),
            value: "OK".to_string(),
            interval: Duration::from_secs(1),
            max_iterations: None,
        }
    }
}

/// Session lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Establishing the connection
    Connecting,
    /// Issuing writes and reads
    Active,
    /// Terminal; the error has been returned to the caller
    Failed,
}

/// Receives every value read back from the store
pub trait StatusSink: Send {
    /// Report an observed value
    fn observe(&mut self, key: &str, value: &str);
}

/// Prints observed values to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StatusSink for StdoutSink {
    fn observe(&mut self, _key: &str, value: &str) {
        println!("Value: {}", value);
    }
}

/// Write/read loop over a single connection.
///
/// Fail-fast: the first failure of connect, write or read ends the session
/// in [`SessionState::Failed`]. Nothing is retried and no reconnect is
/// attempted here.
pub struct ClientSession<S> {
    store: S,
    settings: LoopSettings,
    state: SessionState,
    iterations: u64,
}

impl<S: KeyValueStore> ClientSession<S> {
    /// Create a session over a store
    pub fn new(store: S, settings: LoopSettings) -> Self {
        ClientSession {
            store,
            settings,
            state: SessionState::Connecting,
            iterations: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Completed write/read iterations
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run until failure, or until `max_iterations` is reached.
    pub async fn run(&mut self, sink: &mut dyn StatusSink) -> Result<()> {
        if self.state == SessionState::Failed {
            return Err(Error::connection("session", "session has already failed"));
        }

        let result = self.drive(sink).await;

        if let Err(e) = &result {
            self.transition(SessionState::Failed);
            error!("Session failed after {} iteration(s): {}", self.iterations, e);
        }

        self.store.close().await;
        result
    }

    async fn drive(&mut self, sink: &mut dyn StatusSink) -> Result<()> {
        self.transition(SessionState::Connecting);
        self.store
            .connect()
            .await
            .map_err(|e| e.with_context("failed to create client"))?;
        self.transition(SessionState::Active);

        loop {
            if self.is_done() {
                info!("Completed {} iteration(s)", self.iterations);
                return Ok(());
            }

            self.store
                .set(&self.settings.key, &self.settings.value)
                .await
                .map_err(|e| e.with_context("failed to set key/value"))?;

            let observed = self
                .store
                .get(&self.settings.key)
                .await
                .map_err(|e| e.with_context("failed to get string"))?;

            debug!("Read back {} = {}", self.settings.key, observed);
            sink.observe(&self.settings.key, &observed);
            self.iterations += 1;

            if self.is_done() {
                continue;
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }

    fn is_done(&self) -> bool {
        self.settings
            .max_iterations
            .is_some_and(|max| self.iterations >= max)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("Session state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
