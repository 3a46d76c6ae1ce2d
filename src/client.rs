//! Process wiring for the `client` command

use crate::auth::{self, TokenAuthBridge, TokenProvider, TokenSource};
use crate::config::ClientSettings;
use crate::connection::{ServerAddr, ValkeyStore};
use crate::error::{Error, Result};
use crate::session::{ClientSession, SessionConfig, StatusSink, StdoutSink};
use crate::tls::{self, TlsSettings};
use std::sync::Arc;
use tracing::info;

/// Run the client with default credential discovery, printing observed values
pub async fn run(settings: &ClientSettings) -> Result<()> {
    let (addr, tls_settings) = transport(settings)?;

    let source = auth::discover(&settings.scopes)
        .map_err(|e| Error::credential("failed to get default token source", e))?;

    run_session(settings, addr, tls_settings, source, &mut StdoutSink).await
}

/// Run the client with an explicit token source
pub async fn run_with_source(
    settings: &ClientSettings,
    source: Arc<dyn TokenSource>,
    sink: &mut dyn StatusSink,
) -> Result<()> {
    let (addr, tls_settings) = transport(settings)?;
    run_session(settings, addr, tls_settings, source, sink).await
}

/// Trust anchors and target address; malformed input fails here, before
/// any token exchange
fn transport(settings: &ClientSettings) -> Result<(ServerAddr, TlsSettings)> {
    let anchors = settings.trust_anchors()?;
    let tls_settings = TlsSettings::from_trust_anchors(&anchors)?;
    let addr = settings.server_addr()?;

    tls::install_crypto_provider();

    Ok((addr, tls_settings))
}

async fn run_session(
    settings: &ClientSettings,
    addr: ServerAddr,
    tls_settings: TlsSettings,
    source: Arc<dyn TokenSource>,
    sink: &mut dyn StatusSink,
) -> Result<()> {
    let provider =
        Arc::new(TokenProvider::new(source).with_expiry_skew(settings.expiry_skew()));
    let bridge = TokenAuthBridge::with_principal(provider, settings.principal.clone());
    let config = SessionConfig::new(addr, tls_settings, Arc::new(bridge));

    info!("valkey client started, target {}", config.addr());

    let mut session = ClientSession::new(ValkeyStore::new(config), settings.loop_settings());
    session.run(sink).await
}
