//! Configuration file parser for `podscrape.toml`.
//!
//! Every key is optional and a missing or blank file means defaults. Keys
//! this loader does not know are logged and skipped. Environment and CLI
//! overrides are applied by the binary after loading.
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::scrape::{MasterMeta, DEFAULT_WORKERS};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid listen address {value:?}: {source}")]
    ListenAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("Invalid master image url {value:?}: {source}")]
    MasterImage {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level process configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: String,

    /// Catalog JSON location: a file path or an http(s) URL.
    pub catalog: Option<String>,

    /// Concurrent media probes per enrichment pass (min 1).
    pub enclosure_workers: usize,

    /// Hours a built feed is served before the next request rebuilds it (min 1).
    pub cache_ttl_hours: u64,

    /// Timeout applied to every outbound request.
    pub request_timeout_secs: u64,

    /// Channel metadata for the aggregate feed.
    pub master: MasterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            catalog: None,
            enclosure_workers: DEFAULT_WORKERS,
            cache_ttl_hours: 24,
            request_timeout_secs: 30,
            master: MasterConfig::default(),
        }
    }
}

/// `[master]` table.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl Config {
    /// Largest config file accepted, 1 MiB.
    pub const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "listen_addr",
        "catalog",
        "enclosure_workers",
        "cache_ttl_hours",
        "request_timeout_secs",
        "master",
    ];

    /// Reads `path` as TOML.
    ///
    /// A missing or whitespace-only file gives `Config::default()`. Files
    /// over [`Self::MAX_FILE_SIZE`] are refused before being read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "{} is {size} bytes, limit is {}",
                path.display(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let table: toml::Table = content.parse()?;
        for key in table.keys().filter(|k| !Self::KNOWN_KEYS.contains(&k.as_str())) {
            tracing::warn!(key = %key, path = %path.display(), "Ignoring unknown config key");
        }

        let config: Config = toml::Value::Table(table).try_into()?;
        tracing::info!(
            path = %path.display(),
            listen_addr = %config.listen_addr,
            catalog = ?config.catalog,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies the deployment environment: `PORT` replaces the port of
    /// `listen_addr`, `CONFIG_URL` fills `catalog` when nothing else set it.
    pub fn apply_env(&mut self, port: Option<&str>, config_url: Option<&str>) {
        if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
            let host = self
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or("0.0.0.0");
            self.listen_addr = format!("{host}:{port}");
        }
        if self.catalog.is_none() {
            self.catalog = config_url
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_owned);
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|source| ConfigError::ListenAddr {
                value: self.listen_addr.clone(),
                source,
            })
    }

    pub fn workers(&self) -> usize {
        self.enclosure_workers.max(1)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.max(1) * 60 * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Master channel metadata with defaults filled in.
    pub fn master_meta(&self) -> Result<MasterMeta, ConfigError> {
        let defaults = MasterMeta::default();
        let image_url = match self.master.image_url.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => {
                Some(Url::parse(value).map_err(|source| ConfigError::MasterImage {
                    value: value.to_owned(),
                    source,
                })?)
            }
            _ => None,
        };
        Ok(MasterMeta {
            title: self.master.title.clone().unwrap_or(defaults.title),
            description: self
                .master
                .description
                .clone()
                .unwrap_or(defaults.description),
            image_url,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::assembler::{DEFAULT_MASTER_DESCRIPTION, DEFAULT_MASTER_TITLE};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.catalog.is_none());
        assert_eq!(config.enclosure_workers, 3);
        assert_eq!(config.cache_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/podscrape_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("podscrape_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("podscrape.toml");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("podscrape_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("podscrape.toml");

        let content = r#"
listen_addr = "127.0.0.1:9000"
catalog = "https://cfg.example.com/podcasts.json"
enclosure_workers = 5
cache_ttl_hours = 6
request_timeout_secs = 10

[master]
title = "All Shows"
image_url = "https://www.example.com/logo.png"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert_eq!(
            config.catalog.as_deref(),
            Some("https://cfg.example.com/podcasts.json")
        );
        assert_eq!(config.workers(), 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(6 * 3600));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));

        let master = config.master_meta().unwrap();
        assert_eq!(master.title, "All Shows");
        assert_eq!(master.description, DEFAULT_MASTER_DESCRIPTION);
        assert_eq!(
            master.image_url.map(|u| u.to_string()).as_deref(),
            Some("https://www.example.com/logo.png")
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("podscrape_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("podscrape.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("podscrape_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("podscrape.toml");
        std::fs::write(&path, "enclosure_workers = 2\ntotally_fake_key = 42\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.workers(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("podscrape_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("podscrape.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_minimums_enforced() {
        let config = Config {
            enclosure_workers: 0,
            cache_ttl_hours: 0,
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.workers(), 1);
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_port_replaces_listen_port() {
        let mut config = Config::default();
        config.apply_env(Some("9090"), None);
        assert_eq!(config.listen_addr, "0.0.0.0:9090");

        let mut config = Config::default();
        config.apply_env(Some(""), None);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_env_config_url_only_fills_missing_catalog() {
        let mut config = Config::default();
        config.apply_env(None, Some("https://cfg.example.com/a.json"));
        assert_eq!(config.catalog.as_deref(), Some("https://cfg.example.com/a.json"));

        let mut config = Config {
            catalog: Some("local.json".to_string()),
            ..Default::default()
        };
        config.apply_env(None, Some("https://cfg.example.com/a.json"));
        assert_eq!(config.catalog.as_deref(), Some("local.json"));
    }

    #[test]
    fn test_master_defaults_and_bad_image() {
        let master = Config::default().master_meta().unwrap();
        assert_eq!(master.title, DEFAULT_MASTER_TITLE);
        assert!(master.image_url.is_none());

        let mut config = Config::default();
        config.master.image_url = Some("not a url".to_string());
        assert!(matches!(
            config.master_meta(),
            Err(ConfigError::MasterImage { .. })
        ));
    }
}
