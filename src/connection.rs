//! Connection layer adapter over the redis client

use crate::auth::{AuthCredentials, HandshakeContext};
use crate::error::{Error, ErrorKind, Result};
use crate::session::SessionConfig;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Host and port of the Valkey endpoint
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    host: String,
    port: u16,
}

impl ServerAddr {
    /// Create an address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerAddr {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without brackets
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ServerAddr {
    type Err = Error;

    /// Parse `host:port`, with IPv6 literals in brackets
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            rest.split_once("]:")
                .ok_or_else(|| Error::config(format!("invalid address {:?}: expected [host]:port", s)))?
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| Error::config(format!("invalid address {:?}: missing port", s)))?
        };

        if host.is_empty() {
            return Err(Error::config(format!("invalid address {:?}: empty host", s)));
        }

        if !s.starts_with('[') && host.contains(':') {
            return Err(Error::config(format!(
                "invalid address {:?}: IPv6 hosts must be bracketed",
                s
            )));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| Error::config(format!("invalid address {:?}: bad port", s)))?;

        if port == 0 {
            return Err(Error::config(format!("invalid address {:?}: port 0", s)));
        }

        Ok(ServerAddr::new(host, port))
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The commands the session loop needs from a key-value connection
#[async_trait]
pub trait KeyValueStore: Send {
    /// Establish the connection
    async fn connect(&mut self) -> Result<()>;

    /// Store `value` under `key`
    async fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Read the string stored under `key`
    async fn get(&mut self, key: &str) -> Result<String>;

    /// Release the connection
    async fn close(&mut self) {}
}

/// Build redis connection info for a TLS endpoint with AUTH credentials
pub fn connection_info(addr: &ServerAddr, creds: &AuthCredentials) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::TcpTls {
            host: addr.host().to_string(),
            port: addr.port(),
            insecure: false,
            tls_params: None,
        },
        redis: RedisConnectionInfo {
            username: Some(creds.username().to_string()),
            password: Some(creds.password().as_str().to_string()),
            ..Default::default()
        },
    }
}

/// Performs authenticated TLS handshakes.
///
/// Credentials are requested from the session's credentials provider on
/// every handshake, never reused from a previous one.
pub struct ValkeyConnector {
    config: SessionConfig,
    handshakes: AtomicU64,
}

impl ValkeyConnector {
    /// Create a connector
    pub fn new(config: SessionConfig) -> Self {
        ValkeyConnector {
            config,
            handshakes: AtomicU64::new(0),
        }
    }

    /// Session configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of handshakes attempted
    pub fn handshake_count(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }

    /// Open a new authenticated connection
    pub async fn handshake(&self) -> Result<MultiplexedConnection> {
        let attempt = self.handshakes.fetch_add(1, Ordering::Relaxed) + 1;
        let addr = self.config.addr();
        let ctx = HandshakeContext::new(addr.to_string(), attempt);

        let creds = self
            .config
            .credentials()
            .credentials(&ctx)
            .await
            .map_err(|e| e.with_context("handshake"))?;

        let client = redis::Client::build_with_tls(
            connection_info(addr, &creds),
            self.config.tls().certificates(),
        )
        .map_err(|e| Error::tls_error(format!("Failed to create client for {}: {}", addr, e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::connection(format!("failed to connect to {}", addr), e.to_string()))?;

        info!(
            "Connected to {} as {} (handshake #{})",
            addr,
            creds.username(),
            attempt
        );

        Ok(conn)
    }
}

/// [`KeyValueStore`] backed by a Valkey server.
///
/// A connection-level failure drops the connection; the next command then
/// performs a fresh handshake, which asks for fresh credentials.
pub struct ValkeyStore {
    connector: ValkeyConnector,
    conn: Option<MultiplexedConnection>,
}

impl ValkeyStore {
    /// Create a store; no connection is made until [`KeyValueStore::connect`]
    pub fn new(config: SessionConfig) -> Self {
        ValkeyStore {
            connector: ValkeyConnector::new(config),
            conn: None,
        }
    }

    /// Underlying connector
    pub fn connector(&self) -> &ValkeyConnector {
        &self.connector
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connection(&mut self) -> Result<&mut MultiplexedConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connector.handshake().await?,
        };

        Ok(self.conn.insert(conn))
    }

    fn command_error(&mut self, command: &str, err: RedisError) -> Error {
        let mapped = classify_command_error(command, &err);

        if mapped.kind() == ErrorKind::Connection {
            warn!(
                "Connection to {} lost during {}: {}",
                self.connector.config().addr(),
                command,
                err
            );
            self.conn = None;
        }

        mapped
    }
}

/// Connection-level failures (I/O, dropped, refused, timeout) map to
/// `Connection`; anything the server answered maps to `Operation`
fn classify_command_error(command: &str, err: &RedisError) -> Error {
    if is_connection_failure(err) {
        Error::connection(command, err.to_string())
    } else {
        Error::operation(command, err.to_string())
    }
}

fn is_connection_failure(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

/// A nil `GET` reply is an `Operation` failure
fn require_value(key: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| Error::operation("GET", format!("key {:?} not found", key)))
}

#[async_trait]
impl KeyValueStore for ValkeyStore {
    async fn connect(&mut self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection().await?;
        let result: std::result::Result<(), RedisError> = conn.set(key, value).await;

        result.map_err(|e| self.command_error("SET", e))?;
        debug!("SET {}", key);
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<String> {
        let conn = self.connection().await?;
        let result: std::result::Result<Option<String>, RedisError> = conn.get(key).await;

        let value = result.map_err(|e| self.command_error("GET", e))?;
        require_value(key, value)
    }

    async fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!("Closed connection to {}", self.connector.config().addr());
        }
    }
}
