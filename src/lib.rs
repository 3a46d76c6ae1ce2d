//! Valkey IAM Client
//!
//! Connects to a Valkey endpoint over TLS, authenticating every handshake
//! with a short-lived bearer token from the platform identity backend, and
//! exercises the connection with a write/read loop.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod session;
pub mod tls;
pub mod trust_anchor;

pub use auth::{AuthCredentials, CredentialsProvider, Token, TokenAuthBridge, TokenProvider, TokenSource};
pub use config::ClientSettings;
pub use connection::{KeyValueStore, ServerAddr, ValkeyStore};
pub use error::{CredentialError, Error, ErrorKind, ParseError, Result};
pub use session::{ClientSession, LoopSettings, SessionConfig, SessionState, StatusSink};
pub use tls::TlsSettings;
pub use trust_anchor::{TrustAnchor, TrustAnchorSet};

