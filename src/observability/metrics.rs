//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `vault_sa_patcher_cycles_total` - Total number of reconciliation cycles
//! - `vault_sa_patcher_cycle_errors_total` - Cycles that ended with an error
//! - `vault_sa_patcher_cycle_duration_seconds` - Duration of reconciliation cycles
//! - `vault_sa_patcher_secret_writes_total` - Pull secret writes by operation (create/update)
//! - `vault_sa_patcher_secret_write_errors_total` - Failed pull secret writes by operation
//! - `vault_sa_patcher_service_account_updates_total` - ServiceAccount imagePullSecrets rewrites
//! - `vault_sa_patcher_vault_fetches_total` - Vault fetch attempts
//! - `vault_sa_patcher_vault_fetch_errors_total` - Failed Vault fetches
//! - `vault_sa_patcher_credentials_cached` - Registry credentials in the cache

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static CYCLES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sa_patcher_cycles_total",
        "Total number of reconciliation cycles",
    )
    .expect("Failed to create CYCLES_TOTAL metric - this should never happen")
});

static CYCLE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sa_patcher_cycle_errors_total",
        "Total number of reconciliation cycles that ended with an error",
    )
    .expect("Failed to create CYCLE_ERRORS_TOTAL metric - this should never happen")
});

static CYCLE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "vault_sa_patcher_cycle_duration_seconds",
            "Duration of reconciliation cycles in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create CYCLE_DURATION metric - this should never happen")
});

static SECRET_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sa_patcher_secret_writes_total",
            "Total number of pull secret writes by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create SECRET_WRITES_TOTAL metric - this should never happen")
});

static SECRET_WRITE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sa_patcher_secret_write_errors_total",
            "Total number of failed pull secret writes by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create SECRET_WRITE_ERRORS_TOTAL metric - this should never happen")
});

static SERVICE_ACCOUNT_UPDATES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sa_patcher_service_account_updates_total",
        "Total number of ServiceAccount imagePullSecrets updates",
    )
    .expect("Failed to create SERVICE_ACCOUNT_UPDATES_TOTAL metric - this should never happen")
});

static VAULT_FETCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sa_patcher_vault_fetches_total",
        "Total number of Vault credential fetches",
    )
    .expect("Failed to create VAULT_FETCHES_TOTAL metric - this should never happen")
});

static VAULT_FETCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sa_patcher_vault_fetch_errors_total",
        "Total number of failed Vault credential fetches",
    )
    .expect("Failed to create VAULT_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static CREDENTIALS_CACHED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "vault_sa_patcher_credentials_cached",
        "Number of registry credentials currently cached",
    )
    .expect("Failed to create CREDENTIALS_CACHED metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails on duplicate names"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CYCLE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CYCLE_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRET_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_WRITE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SERVICE_ACCOUNT_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VAULT_FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VAULT_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CREDENTIALS_CACHED.clone()))?;

    Ok(())
}

/// Gather everything registered for the `/metrics` endpoint
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_cycles() {
    CYCLES_TOTAL.inc();
}

pub fn increment_cycle_errors() {
    CYCLE_ERRORS_TOTAL.inc();
}

pub fn observe_cycle_duration(duration: f64) {
    CYCLE_DURATION.observe(duration);
}

/// `operation` is `create` or `update`
pub fn increment_secret_writes(operation: &str) {
    SECRET_WRITES_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_secret_write_errors(operation: &str) {
    SECRET_WRITE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_service_account_updates() {
    SERVICE_ACCOUNT_UPDATES_TOTAL.inc();
}

pub fn increment_vault_fetches() {
    VAULT_FETCHES_TOTAL.inc();
}

pub fn increment_vault_fetch_errors() {
    VAULT_FETCH_ERRORS_TOTAL.inc();
}

pub fn set_credentials_cached(count: usize) {
    CREDENTIALS_CACHED.set(i64::try_from(count).unwrap_or(i64::MAX));
}
