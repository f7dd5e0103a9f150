//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend REST API location.
    pub backend: BackendCfg,
    /// Identity provider selection.
    pub auth: AuthCfg,
    /// Import polling knobs.
    #[serde(default)]
    pub import: ImportCfg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCfg {
    /// Base URL without trailing slash, e.g. `http://localhost:3000`.
    pub base_url: String,
}

/// Which identity provider issues access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Keycloak,
    Auth0,
    /// Preset token (or none) for public/export use.
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCfg {
    pub provider: ProviderKind,
    /// Seed provider settings from the backend's public `/env` endpoint.
    #[serde(default)]
    pub discover: bool,
    #[serde(default)]
    pub client_id: String,
    /// Keycloak server URL or Auth0 tenant URL.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Only used by the static provider.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_token_path")]
    pub token_path: String,
}

/// Poll interval and transport retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportCfg {
    pub poll_interval_ms: u64,
    pub max_transport_retries: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// Collection preselected in the import wizard; empty means none.
    pub default_collection: String,
}

fn default_realm() -> String {
    "akvo".into()
}

fn default_token_path() -> String {
    "token.json".into()
}

impl Default for ImportCfg {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_transport_retries: 3,
            retry_initial_backoff_ms: 500,
            retry_max_backoff_ms: 8000,
            default_collection: String::new(),
        }
    }
}

impl ImportCfg {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }
}

impl Default for Config {
    /// Defaults target a local backend without authentication.
    fn default() -> Self {
        Self {
            backend: BackendCfg {
                base_url: "http://localhost:3000".into(),
            },
            auth: AuthCfg {
                provider: ProviderKind::Static,
                discover: false,
                client_id: "".into(),
                url: "".into(),
                realm: default_realm(),
                access_token: "".into(),
                token_path: default_token_path(),
            },
            import: ImportCfg::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_or_default(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
        // 保存したファイルを読み直しても同じ値になる。
        assert_eq!(Config::load_or_default(&path).unwrap(), cfg);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[backend]
base_url = "https://lumen.example.org"

[auth]
provider = "keycloak"
client_id = "akvo-lumen"
url = "https://login.example.org/auth"

[import]
poll_interval_ms = 250
"#,
        )
        .unwrap();
        let cfg = Config::load_or_default(&path).unwrap();
        assert_eq!(cfg.auth.provider, ProviderKind::Keycloak);
        assert_eq!(cfg.auth.realm, "akvo");
        assert_eq!(cfg.auth.token_path, "token.json");
        assert_eq!(cfg.import.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.import.max_transport_retries, 3);
    }
}
