//! TLS trust configuration for the Valkey connection

use crate::error::{Error, Result};
use crate::trust_anchor::TrustAnchorSet;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use tracing::{debug, info};

/// Server verification settings handed to the connection layer
#[derive(Clone, Debug)]
pub struct TlsSettings {
    /// PEM bundle of the configured anchors, `None` for platform roots
    root_pem: Option<Vec<u8>>,
    anchor_count: usize,
}

impl TlsSettings {
    /// Build settings from the configured trust anchors.
    ///
    /// Every anchor is loaded into a rustls root store up front so that a
    /// certificate which cannot act as a root is rejected at startup rather
    /// than at the first handshake.
    pub fn from_trust_anchors(anchors: &TrustAnchorSet) -> Result<Self> {
        if anchors.is_empty() {
            info!("No root CAs configured, using platform trust roots");
            return Ok(TlsSettings {
                root_pem: None,
                anchor_count: 0,
            });
        }

        let root_store = build_root_store(anchors)?;

        debug!("Added {} certificates to root store", root_store.len());

        Ok(TlsSettings {
            root_pem: anchors.to_pem_bundle(),
            anchor_count: root_store.len(),
        })
    }

    /// Whether verification falls back to the platform roots
    pub fn uses_platform_roots(&self) -> bool {
        self.root_pem.is_none()
    }

    /// Number of configured trust anchors
    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    /// Certificates in the shape the redis connection layer expects
    pub fn certificates(&self) -> redis::TlsCertificates {
        redis::TlsCertificates {
            client_tls: None,
            root_cert: self.root_pem.clone(),
        }
    }
}

/// Load every anchor into a rustls root store
pub fn build_root_store(anchors: &TrustAnchorSet) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();

    for anchor in anchors.anchors() {
        let cert = CertificateDer::from(anchor.der().to_vec());
        root_store.add(cert).map_err(|e| {
            Error::tls_error(format!(
                "Failed to add root certificate {}: {}",
                anchor.subject(),
                e
            ))
        })?;
    }

    Ok(root_store)
}

/// Select ring as the process-wide rustls provider.
///
/// Several providers may be compiled in through transitive features, in
/// which case rustls refuses to pick one on its own.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}
