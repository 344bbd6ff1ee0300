//! # Configuration
//!
//! Controller settings, layered in three steps:
//!
//! 1. built-in defaults (see [`crate::constants`])
//! 2. the YAML config file (missing file is fine, a broken one is not)
//! 3. environment variable overrides
//!
//! The resulting [`Config`] is passed by value/reference into every
//! component constructor. There is no process-wide config singleton.

mod env;

use crate::constants::{
    DEFAULT_HTTP_ADDR, DEFAULT_INTERVAL_SECS, DEFAULT_LOG_FORMAT, DEFAULT_LOG_LEVEL,
    DEFAULT_SECRET_NAME_PREFIX, DEFAULT_TOKEN_PATH, DEFAULT_VAULT_MOUNT_PATH, DEFAULT_VAULT_PORT,
    DEFAULT_VAULT_REFRESH_MULTIPLIER, DEFAULT_VAULT_ROLE, DEFAULT_VAULT_SCHEMA,
    DEFAULT_VAULT_SECRET_PATH, DEFAULT_VAULT_SERVER, DEFAULT_VAULT_TIMEOUT_SECS,
};
use serde::{Deserialize, Serialize, Serializer};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use env::EnvSource;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A string that never shows up in logs.
///
/// Serialises as `"XXX"` when set and `""` when empty, so the config dump
/// logged at startup stays safe to ship.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Password {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str("XXX")
        }
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0.is_empty() { "\"\"" } else { "\"XXX\"" })
    }
}

/// Vault connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    #[serde(alias = "vaultSchema")]
    pub schema: String,
    #[serde(alias = "vaultPort")]
    pub port: u16,
    #[serde(alias = "vaultRole")]
    pub role: String,
    #[serde(alias = "vaultServer")]
    pub server: String,
    pub mount_path: String,
    pub secret_path: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// The credential cache is refreshed every `interval * refresh_multiplier` seconds
    pub refresh_multiplier: u64,
    /// PEM bundle trusted in addition to the built-in roots; empty means none
    pub ca_cert: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            schema: DEFAULT_VAULT_SCHEMA.to_string(),
            port: DEFAULT_VAULT_PORT,
            role: DEFAULT_VAULT_ROLE.to_string(),
            server: DEFAULT_VAULT_SERVER.to_string(),
            mount_path: DEFAULT_VAULT_MOUNT_PATH.to_string(),
            secret_path: DEFAULT_VAULT_SECRET_PATH.to_string(),
            timeout_secs: DEFAULT_VAULT_TIMEOUT_SECS,
            refresh_multiplier: DEFAULT_VAULT_REFRESH_MULTIPLIER,
            ca_cert: String::new(),
        }
    }
}

impl VaultConfig {
    /// Base address, e.g. `https://vault-active:8200`
    pub fn address(&self) -> String {
        format!("{}://{}:{}", self.schema, self.server, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP probe server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    #[serde(alias = "ADDR")]
    pub addr: String,
    pub route_prefix: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_HTTP_ADDR.to_string(),
            route_prefix: String::new(),
        }
    }
}

impl HttpConfig {
    /// Resolve `addr` into a bindable socket address.
    ///
    /// A bare `:port` listens on all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        };
        addr.parse()
            .map_err(|e| ConfigError::Invalid(format!("http.addr {:?}: {e}", self.addr)))
    }
}

/// Top-level controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub log_level: String,
    pub log_format: String,
    pub in_cluster: bool,
    pub token_path: PathBuf,
    /// Vault login JWT used when running outside the cluster
    pub token: Password,
    /// Explicit kubeconfig path; empty means kube's default discovery
    pub kubeconfig: String,
    /// Reconciliation interval (seconds)
    pub interval: u64,
    pub secret_name_prefix: String,
    pub vault: VaultConfig,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            in_cluster: true,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            token: Password::default(),
            kubeconfig: String::new(),
            interval: DEFAULT_INTERVAL_SECS,
            secret_name_prefix: DEFAULT_SECRET_NAME_PREFIX.to_string(),
            vault: VaultConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path` and the process environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &env::ProcessEnv)
    }

    /// Load configuration from `path`, taking overrides from `source`
    pub fn load_with_env(path: &Path, source: &dyn EnvSource) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the YAML file, if it exists
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, source: &dyn EnvSource) -> Result<(), ConfigError> {
        env::override_string(source, "LOG_LEVEL", &mut self.log_level);
        env::override_string(source, "LOG_FORMAT", &mut self.log_format);
        env::override_parsed(source, "IN_CLUSTER", &mut self.in_cluster)?;
        if let Some(path) = source.get("TOKEN_PATH") {
            self.token_path = PathBuf::from(path);
        }
        if let Some(token) = source.get("TOKEN") {
            self.token = Password::new(token);
        }
        env::override_string(source, "KUBECONFIG", &mut self.kubeconfig);
        env::override_parsed(source, "INTERVAL", &mut self.interval)?;
        env::override_string(source, "SECRET_NAME_PREFIX", &mut self.secret_name_prefix);

        env::override_string(source, "VAULT_SCHEMA", &mut self.vault.schema);
        env::override_parsed(source, "VAULT_PORT", &mut self.vault.port)?;
        env::override_string(source, "VAULT_ROLE", &mut self.vault.role);
        env::override_string(source, "VAULT_ACTIVE_SERVICE", &mut self.vault.server);
        env::override_string(source, "VAULT_MOUNT_PATH", &mut self.vault.mount_path);
        env::override_string(source, "VAULT_SECRET_PATH", &mut self.vault.secret_path);
        env::override_parsed(source, "VAULT_TIMEOUT_SECS", &mut self.vault.timeout_secs)?;
        env::override_parsed(
            source,
            "VAULT_REFRESH_MULTIPLIER",
            &mut self.vault.refresh_multiplier,
        )?;
        env::override_string(source, "VAULT_CACERT", &mut self.vault.ca_cert);

        env::override_string(source, "HTTP_ADDR", &mut self.http.addr);
        env::override_string(source, "HTTP_ROUTE_PREFIX", &mut self.http.route_prefix);
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::Invalid("interval must be greater than 0".into()));
        }
        if self.vault.refresh_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "vault.refreshMultiplier must be greater than 0".into(),
            ));
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logFormat must be \"text\" or \"json\", got {:?}",
                self.log_format
            )));
        }
        self.http.socket_addr()?;
        Ok(())
    }

    /// Delay between reconciliation cycles
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Delay between credential cache refreshes
    pub fn vault_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_mul(self.vault.refresh_multiplier))
    }

    /// JSON dump safe for logging (credentials redacted)
    pub fn redacted_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable config: {e}>"))
    }
}
