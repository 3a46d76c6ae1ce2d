//! Token sources and default credential discovery

use crate::auth::google::{CredentialsFile, MetadataServerSource};
use crate::auth::token::Token;
use crate::error::CredentialError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// OAuth scope accepted by the managed data store
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Environment variable naming an explicit credentials file
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variable overriding the metadata server host
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Default metadata server host on Google Cloud compute
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// One exchange with the identity backend.
///
/// Implementations do not cache; every call asks the backend for a new
/// token. Caching and expiry handling belong to
/// [`TokenProvider`](crate::auth::TokenProvider).
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a new token
    async fn fetch_token(&self) -> Result<Token, CredentialError>;

    /// Short human-readable name for logs
    fn describe(&self) -> String;
}

/// Where discovery looks for credentials
#[derive(Clone, Debug, Default)]
pub struct DiscoveryEnv {
    /// Explicit credentials file, usually from `GOOGLE_APPLICATION_CREDENTIALS`
    pub credentials_file: Option<PathBuf>,
    /// gcloud application default credentials file
    pub well_known_file: Option<PathBuf>,
    /// Metadata server host
    pub metadata_host: String,
}

impl DiscoveryEnv {
    /// Read discovery inputs from the process environment
    pub fn from_process() -> Self {
        let credentials_file = std::env::var_os(CREDENTIALS_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let metadata_host = std::env::var(METADATA_HOST_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());

        DiscoveryEnv {
            credentials_file,
            well_known_file: well_known_file(),
            metadata_host,
        }
    }
}

fn well_known_file() -> Option<PathBuf> {
    let config_dir = if cfg!(windows) {
        PathBuf::from(std::env::var_os("APPDATA")?).join("gcloud")
    } else {
        PathBuf::from(std::env::var_os("HOME")?)
            .join(".config")
            .join("gcloud")
    };

    Some(config_dir.join("application_default_credentials.json"))
}

/// Locate default credentials for the given scopes using the process environment
pub fn discover(scopes: &[String]) -> Result<Arc<dyn TokenSource>, CredentialError> {
    discover_with(&DiscoveryEnv::from_process(), scopes)
}

/// Locate default credentials.
///
/// Order: explicit credentials file, gcloud well-known file, metadata server.
/// An explicit file that cannot be used is an error, not a fall-through.
pub fn discover_with(
    env: &DiscoveryEnv,
    scopes: &[String],
) -> Result<Arc<dyn TokenSource>, CredentialError> {
    if scopes.is_empty() {
        return Err(CredentialError::Other("at least one scope is required".into()));
    }

    if let Some(path) = &env.credentials_file {
        info!("Using credentials file from {}", CREDENTIALS_ENV);
        return from_file(path, scopes);
    }

    if let Some(path) = env.well_known_file.as_deref().filter(|p| p.is_file()) {
        info!("Using application default credentials at {}", path.display());
        return from_file(path, scopes);
    }

    debug!("No credentials file found, falling back to metadata server");

    let source = MetadataServerSource::new(&env.metadata_host, scopes.to_vec())?;
    Ok(Arc::new(source))
}

fn from_file(path: &Path, scopes: &[String]) -> Result<Arc<dyn TokenSource>, CredentialError> {
    let file = CredentialsFile::load(path)?;
    file.into_source(scopes.to_vec())
        .map_err(|e| match e {
            CredentialError::Signing(err) => CredentialError::InvalidCredentialsFile {
                path: path.display().to_string(),
                reason: err.to_string(),
            },
            other => other,
        })
}
