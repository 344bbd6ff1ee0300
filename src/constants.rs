//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Defaults mirror the values the controller is normally deployed with and
//! can be overridden via the config file or environment variables.

/// Annotation (and label) key that opts a ServiceAccount into syncing
pub const SYNC_ANNOTATION: &str = "vault-sa-patcher/sync";

/// Only this value of [`SYNC_ANNOTATION`] opts an account in
pub const SYNC_ANNOTATION_VALUE: &str = "true";

/// Data key of a `kubernetes.io/dockerconfigjson` secret
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Secret type written for every managed pull secret
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Default config file path (relative to the working directory)
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "debug";

/// Default log format (`text` or `json`)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default projected service account token path
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Default reconciliation interval (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Default prefix for managed secret names
pub const DEFAULT_SECRET_NAME_PREFIX: &str = "image-poll-secret-from-vault-";

/// Default Vault URL scheme
pub const DEFAULT_VAULT_SCHEMA: &str = "https";

/// Default Vault port
pub const DEFAULT_VAULT_PORT: u16 = 8200;

/// Default Vault Kubernetes auth role
pub const DEFAULT_VAULT_ROLE: &str = "image_pool_secret";

/// Default Vault service host
pub const DEFAULT_VAULT_SERVER: &str = "vault-active";

/// Default KV v2 mount path
pub const DEFAULT_VAULT_MOUNT_PATH: &str = "projects";

/// Default KV v2 secret path holding the registry credentials
pub const DEFAULT_VAULT_SECRET_PATH: &str = "share/docker/registries";

/// Default per-request Vault timeout (seconds)
pub const DEFAULT_VAULT_TIMEOUT_SECS: u64 = 60;

/// Store refresh runs every `interval * multiplier` seconds
pub const DEFAULT_VAULT_REFRESH_MULTIPLIER: u64 = 12;

/// Default HTTP listen address (`:port` binds all interfaces)
pub const DEFAULT_HTTP_ADDR: &str = ":8080";

/// How long shutdown waits for background tasks before exiting
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
