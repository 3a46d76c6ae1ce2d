//! Trust anchors assembled from configured root CAs

use crate::error::{Error, ParseError, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// PEM label accepted as a trust anchor
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// A parsed root certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustAnchor {
    /// DER encoding as found in the PEM block
    der: Vec<u8>,
    subject: String,
    issuer: String,
    not_after: DateTime<Utc>,
}

impl TrustAnchor {
    /// Parse a single PEM certificate.
    ///
    /// Literal `\n` sequences are expanded to line breaks first, so a
    /// certificate squeezed onto one line (as in an environment variable)
    /// parses the same as its multi-line form. Only the first PEM block is
    /// considered and it must be a `CERTIFICATE`.
    pub fn parse(input: &str) -> std::result::Result<Self, ParseError> {
        let normalized = input.replace("\\n", "\n");

        if !normalized.contains("-----BEGIN") {
            return Err(ParseError::NoCertificateBlock("no PEM data found".into()));
        }

        let block =
            pem::parse(normalized.as_bytes()).map_err(|e| ParseError::MalformedPem(e.to_string()))?;

        if block.tag() != CERTIFICATE_TAG {
            return Err(ParseError::NoCertificateBlock(format!(
                "expected {} block, found {}",
                CERTIFICATE_TAG,
                block.tag()
            )));
        }

        Self::from_der(block.into_contents())
    }

    /// Build an anchor from raw DER bytes
    pub fn from_der(der: Vec<u8>) -> std::result::Result<Self, ParseError> {
        let (subject, issuer, not_after) = {
            let (rest, cert) = X509Certificate::from_der(&der)
                .map_err(|e| ParseError::MalformedCertificate(e.to_string()))?;

            if !rest.is_empty() {
                return Err(ParseError::MalformedCertificate(format!(
                    "{} trailing bytes after certificate",
                    rest.len()
                )));
            }

            let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
                .ok_or_else(|| {
                    ParseError::MalformedCertificate("validity out of range".into())
                })?;

            (cert.subject().to_string(), cert.issuer().to_string(), not_after)
        };

        Ok(TrustAnchor {
            der,
            subject,
            issuer,
            not_after,
        })
    }

    /// DER encoding
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// End of the validity period
    pub fn not_after(&self) -> &DateTime<Utc> {
        &self.not_after
    }

    /// Check if the certificate has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.not_after
    }
}

/// Ordered set of root certificates used to verify the server.
///
/// An empty set is valid and leaves trust to the platform roots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustAnchorSet {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every input, failing on the first malformed one
    pub fn from_pem_inputs<I, S>(inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = TrustAnchorSet::new();

        for (index, input) in inputs.into_iter().enumerate() {
            set.add_pem(input.as_ref())
                .map_err(|source| Error::Parse { index, source })?;
        }

        info!("Loaded {} trust anchor(s)", set.len());

        Ok(set)
    }

    /// Parse one input and append it. Nothing is added on failure.
    pub fn add_pem(&mut self, input: &str) -> std::result::Result<&TrustAnchor, ParseError> {
        let anchor = TrustAnchor::parse(input)?;

        if anchor.is_expired() {
            warn!(
                "Trust anchor {} expired at {}",
                anchor.subject(),
                anchor.not_after()
            );
        }

        debug!("Added trust anchor: {}", anchor.subject());

        self.anchors.push(anchor);
        Ok(&self.anchors[self.anchors.len() - 1])
    }

    /// Anchors in insertion order
    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether no anchors were configured
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Whether an anchor with this DER encoding is present
    pub fn contains(&self, der: &[u8]) -> bool {
        self.anchors.iter().any(|a| a.der() == der)
    }

    /// Re-encode all anchors as one PEM bundle, `None` when empty
    pub fn to_pem_bundle(&self) -> Option<Vec<u8>> {
        if self.anchors.is_empty() {
            return None;
        }

        let blocks: Vec<pem::Pem> = self
            .anchors
            .iter()
            .map(|a| pem::Pem::new(CERTIFICATE_TAG, a.der().to_vec()))
            .collect();

        Some(pem::encode_many(&blocks).into_bytes())
    }
}
