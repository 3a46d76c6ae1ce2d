//! Error types for the Valkey IAM client

use thiserror::Error;

/// Failure to turn a textual root CA into a trust anchor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Input has no PEM block, or its first block is not a certificate
    #[error("failed to find a suitable PEM block: {0}")]
    NoCertificateBlock(String),

    /// A PEM block was found but could not be decoded
    #[error("malformed PEM: {0}")]
    MalformedPem(String),

    /// The PEM payload is not a valid X.509 certificate
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
}

/// Failure to obtain a bearer token from the identity backend
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No credential source could be located on this host
    #[error("could not find default credentials: {0}")]
    NotFound(String),

    /// A credentials file exists but cannot be used
    #[error("invalid credentials file {path}: {reason}")]
    InvalidCredentialsFile {
        /// Location of the file
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Transport failure talking to the token endpoint
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status
    #[error("token endpoint returned {status}: {body}")]
    Exchange {
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// Signing the service account assertion failed
    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// The token endpoint answered with something that is not a usable token
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// Generic error for unspecified conditions
    #[error("{0}")]
    Other(String),
}

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configured root CA could not be parsed
    #[error("invalid root CA #{index}: {source}")]
    Parse {
        /// Position of the offending input
        index: usize,
        /// Underlying parse failure
        #[source]
        source: ParseError,
    },

    /// Bearer token could not be obtained
    #[error("{context}: {source}")]
    Credential {
        /// Step that needed the token
        context: String,
        /// Underlying identity backend failure
        #[source]
        source: CredentialError,
    },

    /// Transport or handshake failure
    #[error("{context}: {message}")]
    Connection {
        /// Step that failed
        context: String,
        /// Failure reported by the connection layer
        message: String,
    },

    /// Command failed after a successful handshake
    #[error("{context}: {message}")]
    Operation {
        /// Step that failed
        context: String,
        /// Failure reported by the service
        message: String,
    },

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsError(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed trust-anchor input
    Parse,
    /// Identity backend unreachable or refusing
    Credential,
    /// Transport or handshake failure
    Connection,
    /// Service-side command failure
    Operation,
    /// Configuration, TLS setup or local I/O
    Config,
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a credential failure with the step that needed the token
    pub fn credential(context: impl Into<String>, source: CredentialError) -> Self {
        Self::Credential {
            context: context.into(),
            source,
        }
    }

    /// Create a Connection error with detailed message
    pub fn connection(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an Operation error with detailed message
    pub fn operation(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a TlsError with detailed message
    pub fn tls_error(msg: impl Into<String>) -> Self {
        Self::TlsError(msg.into())
    }

    /// Create a Config error with detailed message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Credential { .. } => ErrorKind::Credential,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Operation { .. } => ErrorKind::Operation,
            Self::TlsError(_) | Self::Config(_) | Self::IoError(_) => ErrorKind::Config,
        }
    }

    /// Prefix the error with the step that failed, keeping its kind
    pub fn with_context(self, step: impl Into<String>) -> Self {
        let step = step.into();
        match self {
            Self::Credential { context, source } => Self::Credential {
                context: format!("{}: {}", step, context),
                source,
            },
            Self::Connection { context, message } => Self::Connection {
                context: format!("{}: {}", step, context),
                message,
            },
            Self::Operation { context, message } => Self::Operation {
                context: format!("{}: {}", step, context),
                message,
            },
            Self::TlsError(msg) => Self::TlsError(format!("{}: {}", step, msg)),
            Self::Config(msg) => Self::Config(format!("{}: {}", step, msg)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_prefixed_and_kind_kept() {
        let err = Error::operation("SET", "READONLY replica").with_context("failed to set key/value");

        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(
            err.to_string(),
            "failed to set key/value: SET: READONLY replica"
        );
    }

    #[test]
    fn test_credential_source_is_preserved() {
        let err = Error::credential("handshake", CredentialError::Other("revoked".into()))
            .with_context("connect");

        assert_eq!(err.kind(), ErrorKind::Credential);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("revoked"));
    }

    #[test]
    fn test_parse_error_message() {
        let err = ParseError::NoCertificateBlock("no PEM data".into());
        assert_eq!(
            err.to_string(),
            "failed to find a suitable PEM block: no PEM data"
        );
    }
}
