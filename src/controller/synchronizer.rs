//! # Secret Synchronizer
//!
//! Makes one namespace's managed pull secrets match the credential snapshot.

use crate::k8s::{ClusterGateway, PullSecretRecord};
use crate::observability::metrics;
use crate::vault::CredentialSnapshot;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct SecretSynchronizer {
    gateway: Arc<dyn ClusterGateway>,
    prefix: String,
}

impl std::fmt::Debug for SecretSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSynchronizer")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl SecretSynchronizer {
    pub fn new(gateway: Arc<dyn ClusterGateway>, prefix: impl Into<String>) -> Self {
        Self {
            gateway,
            prefix: prefix.into(),
        }
    }

    /// Managed secret name for a registry key
    pub fn secret_name(&self, registry_key: &str) -> String {
        format!("{}{}", self.prefix, registry_key)
    }

    /// Create or update one secret per credential in `namespace`.
    ///
    /// Returns the secret names in registry-key order. A name is included even
    /// when its write failed, so the next cycle can retry while accounts keep
    /// referencing it. Secrets whose credential disappeared are left alone.
    pub async fn sync(&self, namespace: &str, credentials: &CredentialSnapshot) -> Vec<String> {
        if credentials.is_empty() {
            warn!("No registry credentials cached, nothing to sync into {}", namespace);
        }

        let mut names = Vec::with_capacity(credentials.len());
        for (registry_key, payload) in credentials {
            let name = self.secret_name(registry_key);
            self.sync_one(namespace, &name, payload).await;
            names.push(name);
        }
        names
    }

    async fn sync_one(&self, namespace: &str, name: &str, payload: &[u8]) {
        let existing = match self.gateway.get_secret(name, namespace).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Failed to read secret {}/{}, trying to create it: {}", namespace, name, e);
                None
            }
        };

        match existing {
            Some(record) if record.docker_config_json == payload => {
                debug!("Secret {}/{} is up to date", namespace, name);
            }
            Some(mut record) => {
                record.docker_config_json = payload.to_vec();
                match self.gateway.update_secret(&record).await {
                    Ok(_) => {
                        metrics::increment_secret_writes("update");
                        info!("Updated secret {}/{}", namespace, name);
                    }
                    Err(e) => {
                        metrics::increment_secret_write_errors("update");
                        error!("Failed to update secret {}/{}: {}", namespace, name, e);
                    }
                }
            }
            None => {
                let record = PullSecretRecord::managed(name, namespace, payload.to_vec());
                match self.gateway.create_secret(&record).await {
                    Ok(_) => {
                        metrics::increment_secret_writes("create");
                        info!("Created secret {}/{}", namespace, name);
                    }
                    Err(e) => {
                        metrics::increment_secret_write_errors("create");
                        error!("Failed to create secret {}/{}: {}", namespace, name, e);
                    }
                }
            }
        }
    }
}
