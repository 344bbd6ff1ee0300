//! Vault REST Client
//!
//! Minimal client for the two Vault endpoints the controller needs:
//!
//! - `POST /v1/auth/kubernetes/login` exchanges a service account JWT for a client token
//! - `GET /v1/{mount}/data/{path}` reads a KV v2 secret
//!
//! Every credential read performs a fresh login, so no token renewal is needed.
//!
//! References:
//! - [Kubernetes auth method](https://developer.hashicorp.com/vault/api-docs/auth/kubernetes)
//! - [KV secrets engine v2](https://developer.hashicorp.com/vault/api-docs/secret/kv/kv-v2)

use super::credential::{parse_registry_entries, Credential};
use super::CredentialSource;
use crate::config::{Config, Password};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("failed to build Vault HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to read Vault CA certificate {path}: {source}")]
    CaCertRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid Vault CA certificate {path}: {source}")]
    CaCertParse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read service account token {path}: {source}")]
    TokenRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no Vault login token configured (set `token` when running outside the cluster)")]
    MissingToken,
    #[error("Vault request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Vault returned HTTP {status} for {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },
    #[error("Vault login response for role {role} carried no client token")]
    MissingAuth { role: String },
    #[error("Vault secret {path} has no data")]
    MissingData { path: String },
}

/// Where the JWT presented to Vault's Kubernetes auth method comes from
#[derive(Clone)]
pub enum JwtSource {
    /// Projected service account token, re-read on every login so rotation is picked up
    File(PathBuf),
    /// Fixed token, for running outside the cluster
    Static(Password),
}

impl JwtSource {
    pub fn from_config(config: &Config) -> Self {
        if config.in_cluster {
            Self::File(config.token_path.clone())
        } else {
            Self::Static(config.token.clone())
        }
    }

    async fn read(&self) -> Result<Password, VaultError> {
        match self {
            Self::File(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|source| {
                    VaultError::TokenRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok(Password::new(raw.trim()))
            }
            Self::Static(token) if token.is_empty() => Err(VaultError::MissingToken),
            Self::Static(token) => Ok(token.clone()),
        }
    }
}

impl std::fmt::Debug for JwtSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Static(token) => f.debug_tuple("Static").field(token).finish(),
        }
    }
}

// ============================================================================
// Vault API Request/Response Structures
// ============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    role: &'a str,
    jwt: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

impl std::fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAuth").finish_non_exhaustive()
    }
}

/// `GET /v1/{mount}/data/{path}` wraps the secret twice: `data.data`
#[derive(Debug, Deserialize)]
struct KvReadResponse {
    data: Option<KvData>,
}

#[derive(Debug, Deserialize)]
struct KvData {
    data: Option<Map<String, Value>>,
}

/// Vault error body: `{"errors": ["..."]}`
#[derive(Debug, Deserialize)]
struct VaultErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Vault REST client
pub struct VaultClient {
    http_client: Client,
    base_url: String,
    role: String,
    mount_path: String,
    secret_path: String,
    jwt: JwtSource,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .field("role", &self.role)
            .field("mount_path", &self.mount_path)
            .field("secret_path", &self.secret_path)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Build a client from the controller configuration
    pub fn from_config(config: &Config) -> Result<Self, VaultError> {
        let mut builder = Client::builder().timeout(config.vault.timeout());

        if !config.vault.ca_cert.is_empty() {
            let pem = std::fs::read(&config.vault.ca_cert).map_err(|source| {
                VaultError::CaCertRead {
                    path: config.vault.ca_cert.clone(),
                    source,
                }
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|source| {
                VaultError::CaCertParse {
                    path: config.vault.ca_cert.clone(),
                    source,
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http_client = builder.build().map_err(VaultError::Client)?;

        Ok(Self {
            http_client,
            base_url: config.vault.address(),
            role: config.vault.role.clone(),
            mount_path: config.vault.mount_path.clone(),
            secret_path: config.vault.secret_path.clone(),
            jwt: JwtSource::from_config(config),
        })
    }

    /// Client against an explicit base URL (e.g. a mock server)
    pub fn new(
        base_url: impl Into<String>,
        role: impl Into<String>,
        mount_path: impl Into<String>,
        secret_path: impl Into<String>,
        jwt: JwtSource,
        timeout: Duration,
    ) -> Result<Self, VaultError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(VaultError::Client)?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            role: role.into(),
            mount_path: mount_path.into(),
            secret_path: secret_path.into(),
            jwt,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exchange the service account JWT for a Vault client token
    pub async fn login(&self) -> Result<Password, VaultError> {
        let jwt = self.jwt.read().await?;
        let url = self.url("auth/kubernetes/login");
        let span = info_span!("vault.login", role = %self.role);

        async {
            let response = self
                .http_client
                .post(&url)
                .json(&LoginRequest {
                    role: &self.role,
                    jwt: jwt.expose(),
                })
                .send()
                .await
                .map_err(|source| VaultError::Transport {
                    url: url.clone(),
                    source,
                })?;

            let response = Self::check_status(response, &url).await?;
            let body: LoginResponse =
                response
                    .json()
                    .await
                    .map_err(|source| VaultError::Transport {
                        url: url.clone(),
                        source,
                    })?;

            let auth = body.auth.ok_or_else(|| VaultError::MissingAuth {
                role: self.role.clone(),
            })?;
            if auth.client_token.is_empty() {
                return Err(VaultError::MissingAuth {
                    role: self.role.clone(),
                });
            }
            debug!("Vault login succeeded");
            Ok(Password::new(auth.client_token))
        }
        .instrument(span)
        .await
    }

    /// Read the configured KV v2 secret and return its flat data map
    pub async fn read_kv2(&self, token: &Password) -> Result<Map<String, Value>, VaultError> {
        let secret = format!("{}/data/{}", self.mount_path, self.secret_path);
        let url = self.url(&secret);
        let span = info_span!("vault.read", path = %secret);

        async {
            let response = self
                .http_client
                .get(&url)
                .header("X-Vault-Token", token.expose())
                .send()
                .await
                .map_err(|source| VaultError::Transport {
                    url: url.clone(),
                    source,
                })?;

            let response = Self::check_status(response, &url).await?;
            let body: KvReadResponse =
                response
                    .json()
                    .await
                    .map_err(|source| VaultError::Transport {
                        url: url.clone(),
                        source,
                    })?;

            let data = body
                .data
                .and_then(|d| d.data)
                .ok_or_else(|| VaultError::MissingData {
                    path: secret.clone(),
                })?;
            debug!(entries = data.len(), "Read Vault KV secret");
            Ok(data)
        }
        .instrument(span)
        .await
    }

    /// Turn a non-2xx response into [`VaultError::Status`]
    async fn check_status(
        response: reqwest::Response,
        url: &str,
    ) -> Result<reqwest::Response, VaultError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(VaultError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message: error_message(status, &text),
        })
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<VaultErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl CredentialSource for VaultClient {
    async fn read_credentials(&self) -> Result<BTreeMap<String, Credential>, VaultError> {
        let token = self.login().await?;
        let data = self.read_kv2(&token).await?;
        Ok(parse_registry_entries(&data))
    }
}
