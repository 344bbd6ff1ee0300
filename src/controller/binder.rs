//! # Service Account Binder
//!
//! Points an opted-in ServiceAccount's `imagePullSecrets` at the managed secrets.

use crate::k8s::{ClusterGateway, ServiceAccountBinding};
use crate::observability::metrics;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What [`ServiceAccountBinder::bind`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Unchanged,
    Updated,
    Failed,
}

pub struct ServiceAccountBinder {
    gateway: Arc<dyn ClusterGateway>,
}

impl std::fmt::Debug for ServiceAccountBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountBinder").finish_non_exhaustive()
    }
}

impl ServiceAccountBinder {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    /// Replace the account's pull secret list with exactly `secret_names`.
    ///
    /// The comparison is order-sensitive, so a reordered list is rewritten.
    /// References the account had before (managed or not) are dropped.
    pub async fn bind(&self, account: &ServiceAccountBinding, secret_names: &[String]) -> BindOutcome {
        if account.pull_secret_names == secret_names {
            debug!(
                "ServiceAccount {}/{} already references the managed secrets",
                account.namespace, account.name
            );
            return BindOutcome::Unchanged;
        }

        let mut updated = account.clone();
        updated.pull_secret_names = secret_names.to_vec();

        match self.gateway.update_service_account(&updated).await {
            Ok(_) => {
                metrics::increment_service_account_updates();
                info!(
                    "Updated ServiceAccount {}/{} imagePullSecrets: {:?}",
                    account.namespace, account.name, secret_names
                );
                BindOutcome::Updated
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    "ServiceAccount {}/{} changed while updating, retrying next cycle: {}",
                    account.namespace, account.name, e
                );
                BindOutcome::Failed
            }
            Err(e) => {
                error!(
                    "Failed to update ServiceAccount {}/{}: {}",
                    account.namespace, account.name, e
                );
                BindOutcome::Failed
            }
        }
    }
}
