//! # Registry Credentials
//!
//! Turns the flat KV dataset stored in Vault into per-registry credentials
//! and renders each one as a Docker config JSON payload.
//!
//! The KV secret is laid out as `"<registryKey>/<field>": "<value>"` where
//! `field` is one of `host`, `username` or `password`:
//!
//! ```text
//! harbor/host      = harbor.example.com
//! harbor/username  = robot$ci
//! harbor/password  = ...
//! ```

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One registry credential, keyed by `registry_key`
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub registry_key: String,
    pub host: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("registry_key", &self.registry_key)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Serialize)]
struct DockerConfig<'a> {
    auths: BTreeMap<&'a str, DockerAuth>,
}

#[derive(Serialize)]
struct DockerAuth {
    auth: String,
}

impl Credential {
    pub fn new(
        registry_key: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            registry_key: registry_key.into(),
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// `.dockerconfigjson` payload: `{"auths":{"<host>":{"auth":"<base64(user:pass)>"}}}`
    ///
    /// Serialisation is deterministic so payloads can be compared byte for byte.
    pub fn payload(&self) -> Vec<u8> {
        let mut pair = format!("{}:{}", self.username, self.password);
        let auth = general_purpose::STANDARD.encode(pair.as_bytes());
        pair.zeroize();

        let config = DockerConfig {
            auths: BTreeMap::from([(self.host.as_str(), DockerAuth { auth })]),
        };
        // A map of plain strings cannot fail to serialise
        serde_json::to_vec(&config).unwrap_or_default()
    }

    /// Log-safe summary: `key(username/p***@host)`
    pub fn masked(&self) -> String {
        let first = self.password.chars().next().map(String::from).unwrap_or_default();
        format!(
            "{}({}/{}***@{})",
            self.registry_key, self.username, first, self.host
        )
    }

    fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Group the flat `"<registryKey>/<field>"` map into credentials.
///
/// Keys without a `/`, unknown fields and non-string values are skipped.
/// The result is ordered by registry key.
pub fn parse_registry_entries(data: &Map<String, Value>) -> BTreeMap<String, Credential> {
    let mut credentials: BTreeMap<String, Credential> = BTreeMap::new();

    for (key, value) in data {
        let Some((registry_key, field)) = key.split_once('/') else {
            warn!(key = %key, "Skipping Vault entry without '<registry>/<field>' layout");
            continue;
        };
        let Some(value) = value.as_str() else {
            warn!(key = %key, "Skipping Vault entry with non-string value");
            continue;
        };

        let credential = credentials
            .entry(registry_key.to_string())
            .or_insert_with(|| Credential::new(registry_key, "", "", ""));

        match field {
            "host" => credential.host = value.to_string(),
            "username" => credential.username = value.to_string(),
            "password" => credential.password = value.to_string(),
            other => warn!(registry = %registry_key, field = %other, "Skipping unknown Vault field"),
        }
    }

    for credential in credentials.values().filter(|c| !c.is_complete()) {
        warn!(
            registry = %credential.registry_key,
            "Registry credential is missing host, username or password"
        );
    }

    credentials
}
