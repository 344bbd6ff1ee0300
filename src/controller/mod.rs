//! # Controller
//!
//! Reconciliation logic, written against [`crate::k8s::ClusterGateway`] and
//! [`crate::vault::SecretStore`] so it runs the same against a live cluster
//! or in-memory fakes.

mod binder;
mod reconciler;
mod synchronizer;

pub use binder::{BindOutcome, ServiceAccountBinder};
pub use reconciler::{CycleReport, ReconcileError, ReconciliationLoop};
pub use synchronizer::SecretSynchronizer;
