//! # Reconciliation Loop
//!
//! Periodic sweep over every namespace:
//!
//! 1. list ServiceAccounts carrying the sync label
//! 2. keep those whose sync annotation is exactly `"true"`
//! 3. sync the managed pull secrets into the namespace
//! 4. point each opted-in account at them
//!
//! A cycle only fails as a whole when namespaces cannot be listed. Every
//! other error is logged, counted in the [`CycleReport`], and retried on the
//! next cycle.

use super::binder::{BindOutcome, ServiceAccountBinder};
use super::synchronizer::SecretSynchronizer;
use crate::config::Config;
use crate::k8s::{sync_label_selector, ClusterGateway, GatewayError};
use crate::observability::metrics;
use crate::vault::SecretStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list namespaces: {0}")]
    ListNamespaces(#[source] GatewayError),
}

/// Summary of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub namespaces_seen: usize,
    /// Namespaces with at least one opted-in account
    pub namespaces_synced: usize,
    /// Namespaces whose ServiceAccounts could not be listed
    pub failed_namespaces: Vec<String>,
    pub accounts_updated: usize,
    pub accounts_unchanged: usize,
    pub accounts_failed: usize,
}

pub struct ReconciliationLoop {
    gateway: Arc<dyn ClusterGateway>,
    store: Arc<dyn SecretStore>,
    synchronizer: SecretSynchronizer,
    binder: ServiceAccountBinder,
    interval: Duration,
    label_selector: String,
}

impl std::fmt::Debug for ReconciliationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationLoop")
            .field("synchronizer", &self.synchronizer)
            .field("interval", &self.interval)
            .field("label_selector", &self.label_selector)
            .finish_non_exhaustive()
    }
}

impl ReconciliationLoop {
    pub fn new(
        config: &Config,
        gateway: Arc<dyn ClusterGateway>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        Self::with_settings(
            gateway,
            store,
            config.secret_name_prefix.clone(),
            config.interval_duration(),
        )
    }

    pub fn with_settings(
        gateway: Arc<dyn ClusterGateway>,
        store: Arc<dyn SecretStore>,
        secret_name_prefix: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            synchronizer: SecretSynchronizer::new(Arc::clone(&gateway), secret_name_prefix),
            binder: ServiceAccountBinder::new(Arc::clone(&gateway)),
            gateway,
            store,
            interval,
            label_selector: sync_label_selector(),
        }
    }

    /// Run cycles until `cancel` fires.
    ///
    /// The first cycle starts immediately. A cycle in progress is never
    /// interrupted; cancellation is observed between cycles.
    pub async fn start(&self, cancel: CancellationToken) {
        info!(
            "Reconciliation loop started (interval: {}s)",
            self.interval.as_secs()
        );

        let mut ticker = interval_at(tokio::time::Instant::now(), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Reconciliation loop stopped");
                    return;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        let started = Instant::now();
        metrics::increment_cycles();

        match self.run_cycle().instrument(info_span!("reconcile.cycle")).await {
            Ok(report) => {
                info!(
                    namespaces = report.namespaces_seen,
                    synced = report.namespaces_synced,
                    failed_namespaces = report.failed_namespaces.len(),
                    accounts_updated = report.accounts_updated,
                    accounts_unchanged = report.accounts_unchanged,
                    accounts_failed = report.accounts_failed,
                    "Reconciliation cycle finished"
                );
            }
            Err(e) => {
                metrics::increment_cycle_errors();
                error!("Reconciliation cycle failed: {}", e);
            }
        }

        let elapsed = started.elapsed();
        metrics::observe_cycle_duration(elapsed.as_secs_f64());
        let next = chrono::Utc::now()
            + chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
        debug!(
            "Cycle took {}ms, next cycle at {}",
            elapsed.as_millis(),
            next.to_rfc3339()
        );
    }

    /// One full pass over all namespaces
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let namespaces = self
            .gateway
            .list_namespaces()
            .await
            .map_err(ReconcileError::ListNamespaces)?;

        let mut report = CycleReport {
            namespaces_seen: namespaces.len(),
            ..CycleReport::default()
        };

        for namespace in namespaces {
            let accounts = match self
                .gateway
                .list_service_accounts(&namespace, &self.label_selector)
                .await
            {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!("Skipping namespace {}: {}", namespace, e);
                    report.failed_namespaces.push(namespace);
                    continue;
                }
            };

            let opted_in: Vec<_> = accounts
                .into_iter()
                .filter(|account| {
                    let opted_in = account.is_opted_in();
                    if !opted_in {
                        debug!(
                            "Skipping ServiceAccount {}/{} without sync annotation",
                            namespace, account.name
                        );
                    }
                    opted_in
                })
                .collect();

            if opted_in.is_empty() {
                debug!("No opted-in ServiceAccounts in namespace {}", namespace);
                continue;
            }

            let credentials = self.store.snapshot();
            let secret_names = self.synchronizer.sync(&namespace, &credentials).await;

            for account in &opted_in {
                match self.binder.bind(account, &secret_names).await {
                    BindOutcome::Updated => report.accounts_updated += 1,
                    BindOutcome::Unchanged => report.accounts_unchanged += 1,
                    BindOutcome::Failed => report.accounts_failed += 1,
                }
            }
            report.namespaces_synced += 1;
        }

        Ok(report)
    }
}
