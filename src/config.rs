//! Client settings from a YAML file and command-line overrides

use crate::auth::bridge::DEFAULT_PRINCIPAL;
use crate::auth::provider::DEFAULT_EXPIRY_SKEW_SECS;
use crate::auth::CLOUD_PLATFORM_SCOPE;
use crate::connection::ServerAddr;
use crate::error::{Error, Result};
use crate::session::LoopSettings;
use crate::trust_anchor::TrustAnchorSet;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default Valkey discovery address
pub const DEFAULT_ADDR: &str = "localhost:8001";

/// Largest accepted `expirySkew`, in seconds
pub const MAX_EXPIRY_SKEW_SECS: u64 = 3600;

/// Settings for the `client` command.
///
/// YAML keys follow the command-line flag names (`addr`, `rootCAs`, ...).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    /// Valkey discovery address, `host:port`
    pub addr: String,
    /// PEM root CAs; literal `\n` sequences are accepted
    #[serde(rename = "rootCAs")]
    pub root_cas: Vec<String>,
    /// Principal presented with the token
    pub principal: String,
    /// OAuth scopes requested from the identity backend
    pub scopes: Vec<String>,
    /// Key written and read back
    pub key: String,
    /// Value written
    pub value: String,
    /// Seconds between iterations
    pub interval: u64,
    /// Stop after this many iterations
    pub iterations: Option<u64>,
    /// Seconds before expiry at which tokens are refreshed
    #[serde(rename = "expirySkew")]
    pub expiry_skew: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            addr: DEFAULT_ADDR.to_string(),
            root_cas: Vec::new(),
            principal: DEFAULT_PRINCIPAL.to_string(),
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            key: "key".to_string(),
            value: "OK".to_string(),
            interval: 1,
            iterations: None,
            expiry_skew: DEFAULT_EXPIRY_SKEW_SECS as u64,
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct SettingsOverrides {
    pub addr: Option<String>,
    /// Replaces the file's list when non-empty
    pub root_cas: Vec<String>,
    pub principal: Option<String>,
    /// Replaces the file's list when non-empty
    pub scopes: Vec<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub interval: Option<u64>,
    pub iterations: Option<u64>,
}

impl ClientSettings {
    /// Parse settings from YAML; an empty document yields the defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(ClientSettings::default());
        }

        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("invalid YAML: {}", e)))
    }

    /// Read settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;

        debug!("Loaded config file {}", path.display());

        Self::from_yaml_str(&yaml).map_err(|e| e.with_context(path.display().to_string()))
    }

    /// Defaults, then the optional file, then overrides
    pub fn resolve(config_file: Option<&Path>, overrides: SettingsOverrides) -> Result<Self> {
        let mut settings = match config_file {
            Some(path) => Self::load(path)?,
            None => ClientSettings::default(),
        };

        settings.apply(overrides);
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides on top of the current values
    pub fn apply(&mut self, overrides: SettingsOverrides) {
        if let Some(addr) = overrides.addr {
            self.addr = addr;
        }
        if !overrides.root_cas.is_empty() {
            self.root_cas = overrides.root_cas;
        }
        if let Some(principal) = overrides.principal {
            self.principal = principal;
        }
        if !overrides.scopes.is_empty() {
            self.scopes = overrides.scopes;
        }
        if let Some(key) = overrides.key {
            self.key = key;
        }
        if let Some(value) = overrides.value {
            self.value = value;
        }
        if let Some(interval) = overrides.interval {
            self.interval = interval;
        }
        if overrides.iterations.is_some() {
            self.iterations = overrides.iterations;
        }
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        self.server_addr()?;

        if self.principal.is_empty() {
            return Err(Error::config("principal cannot be empty"));
        }

        if self.scopes.is_empty() {
            return Err(Error::config("at least one scope is required"));
        }

        if self.key.is_empty() {
            return Err(Error::config("key cannot be empty"));
        }

        if self.expiry_skew > MAX_EXPIRY_SKEW_SECS {
            return Err(Error::config(format!(
                "expirySkew {} exceeds {} seconds",
                self.expiry_skew, MAX_EXPIRY_SKEW_SECS
            )));
        }

        Ok(())
    }

    /// Parsed target address
    pub fn server_addr(&self) -> Result<ServerAddr> {
        self.addr.parse()
    }

    /// Parsed root CAs
    pub fn trust_anchors(&self) -> Result<TrustAnchorSet> {
        TrustAnchorSet::from_pem_inputs(&self.root_cas)
    }

    /// Loop parameters
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            key: self.key.clone(),
            value: self.value.clone(),
            interval: Duration::from_secs(self.interval),
            max_iterations: self.iterations,
        }
    }

    /// Token refresh margin, capped at [`MAX_EXPIRY_SKEW_SECS`]
    pub fn expiry_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_skew.min(MAX_EXPIRY_SKEW_SECS) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults_match_client_flags() {
        let settings = ClientSettings::default();
        assert_eq!(settings.addr, "localhost:8001");
        assert!(settings.root_cas.is_empty());
        assert_eq!(settings.principal, "default");
        assert_eq!(settings.scopes, vec![CLOUD_PLATFORM_SCOPE.to_string()]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_uses_flag_names() {
        let settings = ClientSettings::from_yaml_str(
            "addr: 10.0.0.3:6378\nrootCAs:\n  - \"-----BEGIN CERTIFICATE-----\\\\n...\"\ninterval: 5\n",
        )
        .unwrap();

        assert_eq!(settings.addr, "10.0.0.3:6378");
        assert_eq!(settings.root_cas.len(), 1);
        assert_eq!(settings.interval, 5);
        assert_eq!(settings.key, "key");
    }

    #[test]
    fn test_unknown_yaml_key_is_rejected() {
        let err = ClientSettings::from_yaml_str("adress: localhost:1\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "addr: file-host:1\nkey: from-file\nrootCAs: [a, b]").unwrap();

        let overrides = SettingsOverrides {
            addr: Some("flag-host:2".into()),
            iterations: Some(3),
            ..SettingsOverrides::default()
        };
        let settings = ClientSettings::resolve(Some(file.path()), overrides).unwrap();

        assert_eq!(settings.addr, "flag-host:2");
        assert_eq!(settings.key, "from-file");
        assert_eq!(settings.root_cas, vec!["a", "b"]);
        assert_eq!(settings.loop_settings().max_iterations, Some(3));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ClientSettings::resolve(
            Some(Path::new("/nonexistent/valkey.yaml")),
            SettingsOverrides::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_invalid_addr_fails_validation() {
        let overrides = SettingsOverrides {
            addr: Some("no-port".into()),
            ..SettingsOverrides::default()
        };
        assert!(ClientSettings::resolve(None, overrides).is_err());
    }

    #[test]
    fn test_oversized_expiry_skew_is_rejected() {
        let settings = ClientSettings::from_yaml_str("expirySkew: 10000000000000000\n").unwrap();

        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(settings.expiry_skew(), chrono::Duration::seconds(3600));

        let settings = ClientSettings::from_yaml_str("expirySkew: 30\n").unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.expiry_skew(), chrono::Duration::seconds(30));
    }

    #[test]
    fn test_malformed_root_ca_is_parse_error() {
        let settings = ClientSettings {
            root_cas: vec!["not a certificate".into()],
            ..ClientSettings::default()
        };
        assert_eq!(settings.trust_anchors().unwrap_err().kind(), ErrorKind::Parse);
    }
}
