//! # Secret Store
//!
//! In-memory cache of rendered registry payloads, refreshed from Vault.
//!
//! A fetch replaces the whole cache at once. A failed fetch logs and keeps
//! whatever was cached before, so a Vault outage never empties the cluster's
//! pull secrets.

use super::credential::Credential;
use super::{CredentialSource, VaultError};
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Registry key -> `.dockerconfigjson` payload, ordered by key
pub type CredentialSnapshot = BTreeMap<String, Vec<u8>>;

/// Read side used by the reconciliation loop, write side used by the refresher
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Refresh the cache. Never fails: errors are logged and the old cache kept.
    async fn fetch(&self);

    /// Copy of the current cache
    fn snapshot(&self) -> CredentialSnapshot;
}

/// [`SecretStore`] backed by a [`CredentialSource`] (normally Vault)
pub struct VaultSecretStore<S> {
    source: S,
    cache: Mutex<BTreeMap<String, Credential>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for VaultSecretStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretStore")
            .field("source", &self.source)
            .field("cached", &self.len())
            .finish()
    }
}

impl<S> VaultSecretStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: CredentialSource> VaultSecretStore<S> {
    /// Fetch from the source and swap the cache, returning the new entry count
    pub async fn try_fetch(&self) -> Result<usize, VaultError> {
        metrics::increment_vault_fetches();
        let credentials = self.source.read_credentials().await?;

        for credential in credentials.values() {
            debug!(credential = %credential.masked(), "Loaded registry credential");
        }

        let count = credentials.len();
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = credentials;
        metrics::set_credentials_cached(count);
        Ok(count)
    }
}

#[async_trait]
impl<S: CredentialSource> SecretStore for VaultSecretStore<S> {
    async fn fetch(&self) {
        match self.try_fetch().await {
            Ok(0) => warn!("Vault returned no registry credentials"),
            Ok(count) => info!(count, "Refreshed registry credentials from Vault"),
            Err(e) => {
                metrics::increment_vault_fetch_errors();
                error!(error = %e, cached = self.len(), "Vault fetch failed, keeping cached credentials");
            }
        }
    }

    fn snapshot(&self) -> CredentialSnapshot {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, credential)| (key.clone(), credential.payload()))
            .collect()
    }
}

/// Refresh `store` every `period` until `cancel` fires.
///
/// The first refresh happens one full period after start; the caller is
/// expected to have done the initial fetch already.
pub async fn run_refresh(
    store: Arc<dyn SecretStore>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "Vault refresh task started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Vault refresh task stopped");
                return;
            }
            _ = ticker.tick() => store.fetch().await,
        }
    }
}
