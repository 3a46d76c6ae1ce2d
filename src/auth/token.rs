//! Bearer token types

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// The secret part of a bearer token.
///
/// Never logged or displayed in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token value
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value for use as a handshake secret
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// A bearer token with its declared expiry
#[derive(Clone, Debug)]
pub struct Token {
    access_token: AccessToken,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Create a token expiring at a fixed instant
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Token {
            access_token: AccessToken::new(access_token),
            expires_at,
        }
    }

    /// Create a token from an `expires_in` lifetime in seconds, counted from
    /// now. Lifetimes beyond the representable range saturate.
    pub fn from_expires_in(access_token: impl Into<String>, expires_in: i64) -> Self {
        let access_token = access_token.into();

        match Self::checked_from_expires_in(access_token.clone(), expires_in) {
            Some(token) => token,
            None if expires_in > 0 => Self::new(access_token, DateTime::<Utc>::MAX_UTC),
            None => Self::new(access_token, DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Like [`Token::from_expires_in`], but `None` when the expiry instant
    /// cannot be represented
    pub fn checked_from_expires_in(
        access_token: impl Into<String>,
        expires_in: i64,
    ) -> Option<Self> {
        let lifetime = Duration::try_seconds(expires_in)?;
        let expires_at = Utc::now().checked_add_signed(lifetime)?;
        Some(Self::new(access_token, expires_at))
    }

    /// Get the access token
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Get the expiration time
    pub fn expires_at(&self) -> &DateTime<Utc> {
        &self.expires_at
    }

    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the token expires within `window` from now
    pub fn expires_within(&self, window: Duration) -> bool {
        Utc::now()
            .checked_add_signed(window)
            .map_or(true, |deadline| deadline >= self.expires_at)
    }

    /// Get time until expiration
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_hides_value_in_debug() {
        let token = Token::from_expires_in("ya29.a0AfH6SMBx", 3600);
        let debug = format!("{:?}", token);

        assert!(!debug.contains("ya29"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_expiry() {
        let fresh = Token::from_expires_in("fresh", 3600);
        assert!(!fresh.is_expired());
        assert!(!fresh.expires_within(Duration::seconds(10)));
        assert!(fresh.expires_within(Duration::hours(2)));

        let stale = Token::new("stale", Utc::now() - Duration::seconds(1));
        assert!(stale.is_expired());
        assert!(stale.time_until_expiry() < Duration::zero());
    }

    #[test]
    fn test_out_of_range_lifetime_does_not_panic() {
        assert!(Token::checked_from_expires_in("huge", i64::MAX).is_none());
        assert!(Token::checked_from_expires_in("tiny", i64::MIN).is_none());
        assert!(Token::checked_from_expires_in("normal", 3600).is_some());

        let saturated = Token::from_expires_in("huge", i64::MAX);
        assert!(!saturated.is_expired());
        assert!(Token::from_expires_in("tiny", i64::MIN).is_expired());
    }

    #[test]
    fn test_oversized_window_counts_as_expiring() {
        let token = Token::from_expires_in("fresh", 3600);
        assert!(token.expires_within(Duration::try_seconds(i64::MAX / 1000).unwrap()));
        assert!(!token.expires_within(Duration::zero()));
    }

    #[test]
    fn test_zero_lifetime_is_expired() {
        let token = Token::from_expires_in("zero", 0);
        assert!(token.is_expired());
    }
}
