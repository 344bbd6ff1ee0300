//! Config file and environment layering

use std::collections::HashMap;
use std::io::Write as _;
use vault_sa_patcher::config::{Config, ConfigError};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn no_env() -> HashMap<&'static str, &'static str> {
    HashMap::new()
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_with_env(&dir.path().join("absent.yaml"), &no_env()).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_file_overrides_defaults() {
    let file = write_config(
        r"
logLevel: info
inCluster: false
interval: 60
secretNamePrefix: pull-
vault:
  server: vault.vault.svc
  port: 8201
  mountPath: kv
  secretPath: registries
http:
  addr: 127.0.0.1:9090
  routePrefix: /patcher
",
    );

    let config = Config::load_with_env(file.path(), &no_env()).unwrap();

    assert_eq!(config.log_level, "info");
    assert!(!config.in_cluster);
    assert_eq!(config.interval, 60);
    assert_eq!(config.secret_name_prefix, "pull-");
    assert_eq!(config.vault.address(), "https://vault.vault.svc:8201");
    assert_eq!(config.vault.mount_path, "kv");
    assert_eq!(config.vault.role, "image_pool_secret");
    assert_eq!(config.http.route_prefix, "/patcher");
}

#[test]
fn test_legacy_vault_keys_are_accepted() {
    let file = write_config(
        r"
vault:
  vaultSchema: http
  vaultServer: vault-standby
  vaultPort: 8300
  vaultRole: puller
",
    );

    let config = Config::load_with_env(file.path(), &no_env()).unwrap();

    assert_eq!(config.vault.address(), "http://vault-standby:8300");
    assert_eq!(config.vault.role, "puller");
}

#[test]
fn test_env_wins_over_file() {
    let file = write_config("interval: 60\nsecretNamePrefix: from-file-\n");
    let env: HashMap<&str, &str> = [("INTERVAL", "15"), ("VAULT_ACTIVE_SERVICE", "vault-env")]
        .into_iter()
        .collect();

    let config = Config::load_with_env(file.path(), &env).unwrap();

    assert_eq!(config.interval, 15);
    assert_eq!(config.secret_name_prefix, "from-file-");
    assert_eq!(config.vault.server, "vault-env");
}

#[test]
fn test_broken_yaml_is_an_error() {
    let file = write_config("interval: [not, a, number\n");
    let err = Config::load_with_env(file.path(), &no_env()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_invalid_log_format_is_rejected() {
    let file = write_config("logFormat: xml\n");
    let err = Config::load_with_env(file.path(), &no_env()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_invalid_http_addr_is_rejected() {
    let env: HashMap<&str, &str> = [("HTTP_ADDR", "not-an-address")].into_iter().collect();
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_with_env(&dir.path().join("none.yaml"), &env).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_refresh_interval_scales_with_multiplier() {
    let file = write_config("interval: 10\nvault:\n  refreshMultiplier: 3\n");
    let config = Config::load_with_env(file.path(), &no_env()).unwrap();
    assert_eq!(config.vault_refresh_interval().as_secs(), 30);
}
