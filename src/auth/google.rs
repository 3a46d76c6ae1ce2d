//! Google identity backend exchanges

use crate::auth::source::TokenSource;
use crate::auth::token::Token;
use crate::error::CredentialError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Contents of an application default credentials file
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    /// Service account key
    ServiceAccount(ServiceAccountKey),
    /// User credentials produced by `gcloud auth application-default login`
    AuthorizedUser(AuthorizedUserCredentials),
}

/// Service account key file fields used for the jwt-bearer grant
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account e-mail, used as issuer
    pub client_email: String,
    /// PEM-encoded RSA private key
    pub private_key: String,
    /// Key identifier placed in the JWT header
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Authorized user file fields used for the refresh-token grant
#[derive(Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for AuthorizedUserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl CredentialsFile {
    /// Read and parse a credentials file
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let invalid = |reason: String| CredentialError::InvalidCredentialsFile {
            path: path.display().to_string(),
            reason,
        };

        let data = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| invalid(e.to_string()))
    }

    /// Build the token source matching this file
    pub fn into_source(self, scopes: Vec<String>) -> Result<Arc<dyn TokenSource>, CredentialError> {
        let client = http_client()?;

        match self {
            CredentialsFile::ServiceAccount(key) => {
                Ok(Arc::new(ServiceAccountSource::new(client, key, scopes)?))
            }
            CredentialsFile::AuthorizedUser(creds) => {
                Ok(Arc::new(AuthorizedUserSource::new(client, creds)))
            }
        }
    }
}

fn http_client() -> Result<reqwest::Client, CredentialError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(CredentialError::from)
}

/// Standard OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
}

/// Send a token request and turn the response into a [`Token`]
async fn exchange(request: reqwest::RequestBuilder) -> Result<Token, CredentialError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CredentialError::Exchange {
            status: status.as_u16(),
            body,
        });
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

    if body.access_token.is_empty() {
        return Err(CredentialError::InvalidResponse("empty access_token".into()));
    }

    if let Some(kind) = body.token_type.as_deref() {
        if !kind.eq_ignore_ascii_case("bearer") {
            return Err(CredentialError::InvalidResponse(format!(
                "unsupported token_type {}",
                kind
            )));
        }
    }

    debug!("Token exchange succeeded, expires_in={}s", body.expires_in);

    Token::checked_from_expires_in(body.access_token, body.expires_in).ok_or_else(|| {
        CredentialError::InvalidResponse(format!("expires_in {} out of range", body.expires_in))
    })
}

/// Tokens for the service account attached to a compute instance
pub struct MetadataServerSource {
    client: reqwest::Client,
    endpoint: Url,
    scopes: Vec<String>,
}

impl MetadataServerSource {
    /// Source talking to the metadata server at `host`
    pub fn new(host: &str, scopes: Vec<String>) -> Result<Self, CredentialError> {
        let endpoint = Url::parse(&format!("http://{}{}", host, METADATA_TOKEN_PATH))
            .map_err(|e| CredentialError::Other(format!("invalid metadata host {}: {}", host, e)))?;

        Ok(Self::with_endpoint(http_client()?, endpoint, scopes))
    }

    /// Source using an explicit token endpoint
    pub fn with_endpoint(client: reqwest::Client, endpoint: Url, scopes: Vec<String>) -> Self {
        MetadataServerSource {
            client,
            endpoint,
            scopes,
        }
    }
}

#[async_trait]
impl TokenSource for MetadataServerSource {
    async fn fetch_token(&self) -> Result<Token, CredentialError> {
        let request = self
            .client
            .get(self.endpoint.clone())
            .header("Metadata-Flavor", "Google")
            .query(&[("scopes", self.scopes.join(","))]);

        exchange(request).await
    }

    fn describe(&self) -> String {
        format!(
            "metadata server {}",
            self.endpoint.host_str().unwrap_or_default()
        )
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Tokens for a service account key, via a self-signed JWT assertion
pub struct ServiceAccountSource {
    client: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    scopes: Vec<String>,
}

impl ServiceAccountSource {
    /// Create the source, rejecting a private key that cannot sign
    pub fn new(
        client: reqwest::Client,
        key: ServiceAccountKey,
        scopes: Vec<String>,
    ) -> Result<Self, CredentialError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;

        Ok(ServiceAccountSource {
            client,
            key,
            signing_key,
            scopes,
        })
    }

    fn assertion(&self) -> Result<String, CredentialError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        Ok(jsonwebtoken::encode(&header, &claims, &self.signing_key)?)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountSource {
    async fn fetch_token(&self) -> Result<Token, CredentialError> {
        let assertion = self.assertion()?;
        let request = self.client.post(&self.key.token_uri).form(&[
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ]);

        exchange(request).await
    }

    fn describe(&self) -> String {
        format!("service account {}", self.key.client_email)
    }
}

/// Tokens for end-user credentials, via the refresh-token grant
pub struct AuthorizedUserSource {
    client: reqwest::Client,
    creds: AuthorizedUserCredentials,
}

impl AuthorizedUserSource {
    /// Create the source
    pub fn new(client: reqwest::Client, creds: AuthorizedUserCredentials) -> Self {
        AuthorizedUserSource { client, creds }
    }
}

#[async_trait]
impl TokenSource for AuthorizedUserSource {
    async fn fetch_token(&self) -> Result<Token, CredentialError> {
        let request = self.client.post(&self.creds.token_uri).form(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.creds.client_id.as_str()),
            ("client_secret", self.creds.client_secret.as_str()),
            ("refresh_token", self.creds.refresh_token.as_str()),
        ]);

        exchange(request).await
    }

    fn describe(&self) -> String {
        format!("authorized user {}", self.creds.client_id)
    }
}
