//! Bearer-token authentication for Valkey handshakes
//!
//! Tokens come from a [`TokenSource`] (one exchange with the identity
//! backend per call), are cached by the [`TokenProvider`] until they expire,
//! and are turned into AUTH credentials by the [`TokenAuthBridge`] every
//! time the connection layer performs a handshake.

pub mod bridge;
pub mod google;
pub mod provider;
pub mod source;
pub mod token;

pub use bridge::{AuthCredentials, CredentialsProvider, HandshakeContext, TokenAuthBridge};
pub use provider::TokenProvider;
pub use source::{discover, TokenSource, CLOUD_PLATFORM_SCOPE};
pub use token::{AccessToken, Token};
