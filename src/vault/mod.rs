//! # Vault
//!
//! Registry credentials live in a single Vault KV v2 secret. This module logs
//! in with the Kubernetes auth method, reads that secret, and keeps the parsed
//! credentials cached for the reconciliation loop.

mod client;
mod credential;
mod store;

pub use client::{JwtSource, VaultClient, VaultError};
pub use credential::{parse_registry_entries, Credential};
pub use store::{run_refresh, CredentialSnapshot, SecretStore, VaultSecretStore};

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Anything that can produce the full set of registry credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn read_credentials(&self) -> Result<BTreeMap<String, Credential>, VaultError>;
}
