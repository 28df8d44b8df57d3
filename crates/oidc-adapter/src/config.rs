//! Adapter and bridge configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [provider]
//! public_base_url = "https://id.example.com"
//! mount_path = "/oauth"
//!
//! [bridge]
//! redirect_policy = "upgrade_on_location"
//!
//! [storage]
//! backend = "postgres"
//! database_url = "postgres://localhost/idp"
//! acquire_timeout = "5s"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::RedirectPolicy;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Public identity of the provider.
    pub provider: ProviderConfig,

    /// HTTP request/response bridge behaviour.
    pub bridge: BridgeConfig,

    /// Backing store.
    pub storage: StorageConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

/// Where the provider is reachable and where the engine is mounted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// The application's own public base URL. Used for the synthetic `Host`
    /// header and interaction URLs.
    pub public_base_url: String,

    /// Path prefix the protocol engine is mounted under. Stripped from
    /// request URLs before they reach the engine.
    pub mount_path: String,

    /// Interaction path below the mount path; the interaction uid is
    /// appended to it.
    pub interaction_path: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000".to_string(),
            mount_path: "/oauth".to_string(),
            interaction_path: "/consent".to_string(),
        }
    }
}

/// HTTP bridge settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// What the response collector does with a `Location` header on a 200.
    pub redirect_policy: RedirectPolicy,

    /// Header carrying the client address when running behind a proxy.
    pub forwarded_for_header: String,

    /// Remote address reported when the forwarded header is absent.
    pub fallback_remote_address: String,

    /// Largest request body the bridge buffers. Larger bodies are rejected
    /// with 413 before the engine runs.
    pub max_body_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            redirect_policy: RedirectPolicy::default(),
            forwarded_for_header: "x-forwarded-for".to_string(),
            fallback_remote_address: "127.0.0.1".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Which store backs the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    /// PostgreSQL via `oidc-adapter-postgres`.
    Postgres,
}

/// Store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Connection string, required for `postgres`.
    pub database_url: Option<String>,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// How long to wait for a pooled connection.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Colourise output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl AdapterConfig {
    /// Parses the public base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the URL does not parse.
    pub fn public_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.provider.public_base_url).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "public_base_url '{}' is not a valid URL: {e}",
                self.provider.public_base_url
            ))
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The public base URL is not an absolute http(s) URL with a host
    /// - The mount or interaction path does not start with `/`
    /// - The forwarded-for header name is empty
    /// - The body limit or the pool size is zero
    /// - The logging level is not a valid filter directive
    ///
    /// Returns `ConfigError::Missing` if the postgres backend is selected
    /// without a database URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.public_base_url()?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "public_base_url must be an http(s) URL with a host, got '{}'",
                self.provider.public_base_url
            )));
        }

        for (name, path) in [
            ("mount_path", &self.provider.mount_path),
            ("interaction_path", &self.provider.interaction_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must start with '/', got '{path}'"
                )));
            }
        }

        if self.bridge.forwarded_for_header.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "forwarded_for_header cannot be empty".to_string(),
            ));
        }

        if self.bridge.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_body_bytes must be > 0".to_string(),
            ));
        }

        crate::observability::parse_filter(&self.logging.level)?;

        if self.storage.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "max_connections must be > 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Postgres
            && self
                .storage
                .database_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
        {
            return Err(ConfigError::Missing("storage.database_url".to_string()));
        }

        Ok(())
    }
}

pub mod loader {
    use super::{AdapterConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default file looked up when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "oidc-adapter.toml";

    /// Environment variable prefix, e.g. `OIDC_ADAPTER__PROVIDER__MOUNT_PATH`.
    pub const ENV_PREFIX: &str = "OIDC_ADAPTER";

    /// Loads configuration from an optional TOML file and the environment,
    /// then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized, or if
    /// validation fails.
    pub fn load_config(path: Option<&str>) -> Result<AdapterConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: AdapterConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validates() {
        let config = AdapterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.mount_path, "/oauth");
        assert_eq!(config.bridge.redirect_policy, RedirectPolicy::UpgradeOnLocation);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        let mut config = AdapterConfig::default();
        config.provider.public_base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        config.provider.public_base_url = "mailto:admin@example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_mount_path_fails_validation() {
        let mut config = AdapterConfig::default();
        config.provider.mount_path = "oauth".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mount_path"));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let mut config = AdapterConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        config.storage.database_url = Some("postgres://localhost/idp".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_fails_validation() {
        let mut config = AdapterConfig::default();
        config.storage.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_fails_validation() {
        let mut config = AdapterConfig::default();
        config.logging.level = "oidc_adapter=loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_body_limit_fails_validation() {
        let mut config = AdapterConfig::default();
        config.bridge.max_body_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[provider]
public_base_url = "https://id.example.com"

[bridge]
redirect_policy = "preserve"
max_body_bytes = 4096

[storage]
acquire_timeout = "250ms"
"#
        )
        .unwrap();

        let config = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(config.provider.public_base_url, "https://id.example.com");
        assert_eq!(config.provider.mount_path, "/oauth");
        assert_eq!(config.bridge.redirect_policy, RedirectPolicy::Preserve);
        assert_eq!(config.bridge.max_body_bytes, 4096);
        assert_eq!(config.storage.acquire_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = AdapterConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AdapterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.provider.public_base_url, parsed.provider.public_base_url);
        assert_eq!(config.storage.acquire_timeout, parsed.storage.acquire_timeout);
    }
}
