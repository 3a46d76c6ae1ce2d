//! Handshake credentials derived from bearer tokens

use crate::auth::provider::TokenProvider;
use crate::auth::token::AccessToken;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Principal name Memorystore expects alongside an IAM token
pub const DEFAULT_PRINCIPAL: &str = "default";

/// What the connection layer knows about the handshake it is performing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeContext {
    addr: String,
    attempt: u64,
}

impl HandshakeContext {
    /// Create a context for the `attempt`-th handshake against `addr`
    pub fn new(addr: impl Into<String>, attempt: u64) -> Self {
        HandshakeContext {
            addr: addr.into(),
            attempt,
        }
    }

    /// Server being authenticated against
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// 1 for the initial connection, higher for reconnects
    pub fn attempt(&self) -> u64 {
        self.attempt
    }
}

/// Username and secret presented in the AUTH handshake.
///
/// Built per handshake and dropped afterwards.
#[derive(Clone)]
pub struct AuthCredentials {
    username: String,
    password: AccessToken,
}

impl AuthCredentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: AccessToken) -> Self {
        AuthCredentials {
            username: username.into(),
            password,
        }
    }

    /// Principal name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Secret
    pub fn password(&self) -> &AccessToken {
        &self.password
    }
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

/// Produces credentials whenever the connection layer authenticates.
///
/// May be invoked at any time, including from reconnects the caller did not
/// initiate, and concurrently with other calls.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Current credentials, or an [`Error::Credential`]
    async fn credentials(&self, ctx: &HandshakeContext) -> Result<AuthCredentials>;
}

/// Maps the current bearer token to `(principal, token)` credentials.
///
/// Asks the [`TokenProvider`] on every handshake and keeps no token of its
/// own. There is no anonymous fallback.
#[derive(Debug, Clone)]
pub struct TokenAuthBridge {
    provider: Arc<TokenProvider>,
    principal: String,
}

impl TokenAuthBridge {
    /// Bridge using the default principal
    pub fn new(provider: Arc<TokenProvider>) -> Self {
        Self::with_principal(provider, DEFAULT_PRINCIPAL)
    }

    /// Bridge using a custom principal
    pub fn with_principal(provider: Arc<TokenProvider>, principal: impl Into<String>) -> Self {
        TokenAuthBridge {
            provider,
            principal: principal.into(),
        }
    }

    /// Principal presented on every handshake
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

#[async_trait]
impl CredentialsProvider for TokenAuthBridge {
    async fn credentials(&self, ctx: &HandshakeContext) -> Result<AuthCredentials> {
        let token = self.provider.token().await.map_err(|e| {
            Error::credential(format!("failed to get token for {}", ctx.addr()), e)
        })?;

        debug!(
            "Handshake #{} with {} as {}, token expires at {}",
            ctx.attempt(),
            ctx.addr(),
            self.principal,
            token.expires_at()
        );

        Ok(AuthCredentials::new(
            self.principal.clone(),
            token.access_token().clone(),
        ))
    }
}
