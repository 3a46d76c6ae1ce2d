//! Cached, refresh-on-expiry access to bearer tokens

use crate::auth::source::TokenSource;
use crate::auth::token::Token;
use crate::error::CredentialError;
use chrono::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh this long before the declared expiry
pub const DEFAULT_EXPIRY_SKEW_SECS: i64 = 10;

/// Single source of truth for token freshness.
///
/// The cached token is handed out until it comes within the expiry skew of
/// its declared expiry. Refresh happens under an async mutex, so concurrent
/// callers share one in-flight exchange and all observe its result. Failed
/// exchanges are returned to the caller and never cached.
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<Token>>,
    expiry_skew: Duration,
    fetches: AtomicU64,
}

impl TokenProvider {
    /// Create a provider over a token source
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        TokenProvider {
            source,
            cached: Mutex::new(None),
            expiry_skew: Duration::seconds(DEFAULT_EXPIRY_SKEW_SECS),
            fetches: AtomicU64::new(0),
        }
    }

    /// Override how early tokens are refreshed
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    /// Current token, refreshing it if missing or about to expire
    pub async fn token(&self) -> Result<Token, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.expires_within(self.expiry_skew) {
                return Ok(token.clone());
            }
            debug!("Cached token expires at {}, refreshing", token.expires_at());
        }

        *cached = None;

        let token = self.source.fetch_token().await?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        if token.is_expired() {
            warn!(
                "{} issued a token that expired at {}",
                self.source.describe(),
                token.expires_at()
            );
            return Err(CredentialError::InvalidResponse(
                "token already expired on arrival".into(),
            ));
        }

        info!(
            "Obtained token from {}, expires at {}",
            self.source.describe(),
            token.expires_at()
        );

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Number of exchanges performed so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("source", &self.source.describe())
            .field("expiry_skew", &self.expiry_skew)
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;

    /// Hands out scripted tokens in order, optionally slowly
    struct ScriptedSource {
        tokens: SyncMutex<VecDeque<Result<Token, CredentialError>>>,
        delay: std::time::Duration,
    }

    impl ScriptedSource {
        fn new(tokens: Vec<Result<Token, CredentialError>>) -> Arc<Self> {
            Arc::new(ScriptedSource {
                tokens: SyncMutex::new(tokens.into()),
                delay: std::time::Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl TokenSource for ScriptedSource {
        async fn fetch_token(&self) -> Result<Token, CredentialError> {
            tokio::time::sleep(self.delay).await;
            self.tokens
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(CredentialError::Other("script exhausted".into())))
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let source = ScriptedSource::new(vec![Ok(Token::from_expires_in("first", 3600))]);
        let provider = TokenProvider::new(source);

        let a = provider.token().await.unwrap();
        let b = provider.token().await.unwrap();

        assert_eq!(a.access_token(), b.access_token());
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_token_inside_skew_is_refreshed() {
        let source = ScriptedSource::new(vec![
            Ok(Token::from_expires_in("short", 5)),
            Ok(Token::from_expires_in("long", 3600)),
        ]);
        let provider = TokenProvider::new(source);

        assert_eq!(provider.token().await.unwrap().access_token().as_str(), "short");
        assert_eq!(provider.token().await.unwrap().access_token().as_str(), "long");
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_skew_refreshes_instead_of_overflowing() {
        let source = ScriptedSource::new(vec![
            Ok(Token::from_expires_in("first", 3600)),
            Ok(Token::from_expires_in("second", 3600)),
        ]);
        let skew = Duration::try_seconds(i64::MAX / 1000).unwrap();
        let provider = TokenProvider::new(source).with_expiry_skew(skew);

        assert_eq!(provider.token().await.unwrap().access_token().as_str(), "first");
        assert_eq!(provider.token().await.unwrap().access_token().as_str(), "second");
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached_or_retried() {
        let source = ScriptedSource::new(vec![
            Err(CredentialError::Other("metadata server unreachable".into())),
            Ok(Token::from_expires_in("recovered", 3600)),
        ]);
        let provider = TokenProvider::new(source);

        assert!(provider.token().await.is_err());
        assert_eq!(provider.fetch_count(), 0);

        let token = provider.token().await.unwrap();
        assert_eq!(token.access_token().as_str(), "recovered");
    }

    #[tokio::test]
    async fn test_expired_on_arrival_is_rejected() {
        let source = ScriptedSource::new(vec![
            Ok(Token::new("dead", Utc::now())),
            Ok(Token::from_expires_in("alive", 3600)),
        ]);
        let provider = TokenProvider::new(source).with_expiry_skew(Duration::zero());

        let err = provider.token().await.unwrap_err();
        assert!(matches!(err, CredentialError::InvalidResponse(_)));
        assert_eq!(provider.token().await.unwrap().access_token().as_str(), "alive");
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let source = Arc::new(ScriptedSource {
            tokens: SyncMutex::new(
                vec![
                    Ok(Token::from_expires_in("shared", 3600)),
                    Ok(Token::from_expires_in("duplicate", 3600)),
                ]
                .into(),
            ),
            delay: std::time::Duration::from_millis(50),
        });
        let provider = Arc::new(TokenProvider::new(source));

        let calls = (0..16).map(|_| {
            let provider = provider.clone();
            tokio::spawn(async move { provider.token().await })
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            let token = result.unwrap().unwrap();
            assert_eq!(token.access_token().as_str(), "shared");
        }
        assert_eq!(provider.fetch_count(), 1);
    }
}
