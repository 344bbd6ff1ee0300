//! # vault-sa-patcher
//!
//! Kubernetes controller that copies container registry credentials from a
//! HashiCorp Vault KV secret into every namespace as
//! `kubernetes.io/dockerconfigjson` secrets, and points opted-in
//! ServiceAccounts at them through `imagePullSecrets`.
//!
//! A ServiceAccount opts in with the annotation (and label)
//! `vault-sa-patcher/sync: "true"`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod k8s;
pub mod observability;
pub mod runtime;
pub mod server;
pub mod vault;
