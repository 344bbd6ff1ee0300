//! # Kube Gateway
//!
//! [`ClusterGateway`] over a live API server.
//!
//! All calls go through one async mutex so the controller never has more
//! than one request in flight against the API server.

use super::{ClusterGateway, GatewayError, PullSecretRecord, ServiceAccountBinding};
use crate::config::Config;
use crate::constants::DOCKER_CONFIG_JSON_KEY;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct KubeGateway {
    client: Client,
    lock: Mutex<()>,
}

impl std::fmt::Debug for KubeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeGateway")
            .field("default_namespace", &self.client.default_namespace())
            .finish_non_exhaustive()
    }
}

impl KubeGateway {
    /// Connect using in-cluster credentials, an explicit kubeconfig, or kube's
    /// default discovery, depending on `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the selected configuration source cannot be loaded
    /// (missing service account mount, unreadable kubeconfig, nothing to
    /// infer from) or the client cannot be built from it.
    pub async fn connect(config: &Config) -> Result<Self> {
        let kube_config = if config.in_cluster {
            info!("Using in-cluster Kubernetes configuration");
            kube::Config::incluster().context("Failed to load in-cluster Kubernetes config")?
        } else if !config.kubeconfig.is_empty() {
            info!("Using kubeconfig {}", config.kubeconfig);
            let kubeconfig = Kubeconfig::read_from(&config.kubeconfig)
                .with_context(|| format!("Failed to read kubeconfig {}", config.kubeconfig))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to build Kubernetes config from kubeconfig")?
        } else {
            info!("Inferring Kubernetes configuration");
            kube::Config::infer()
                .await
                .context("Failed to infer Kubernetes config")?
        };

        let client = Client::try_from(kube_config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    pub fn new(client: Client) -> Self {
        Self {
            client,
            lock: Mutex::new(()),
        }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn service_accounts(&self, namespace: &str) -> Api<ServiceAccount> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Metadata fragment for a merge patch; `resourceVersion` makes the patch conditional
fn patch_metadata(resource_version: Option<&str>) -> Value {
    match resource_version {
        Some(version) => json!({ "resourceVersion": version }),
        None => json!({}),
    }
}

fn secret_patch(record: &PullSecretRecord) -> Value {
    json!({
        "metadata": patch_metadata(record.resource_version.as_deref()),
        "data": {
            DOCKER_CONFIG_JSON_KEY: general_purpose::STANDARD.encode(&record.docker_config_json),
        },
    })
}

fn service_account_patch(binding: &ServiceAccountBinding) -> Value {
    let references: Vec<Value> = binding
        .pull_secret_names
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();

    json!({
        "metadata": patch_metadata(binding.resource_version.as_deref()),
        "imagePullSecrets": references,
    })
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_namespaces(&self) -> Result<Vec<String>, GatewayError> {
        let _guard = self.lock.lock().await;
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| GatewayError::kube("list namespaces", "*", e))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn list_service_accounts(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ServiceAccountBinding>, GatewayError> {
        let _guard = self.lock.lock().await;
        let list = self
            .service_accounts(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| GatewayError::kube("list serviceaccounts", namespace, e))?;

        Ok(list.items.into_iter().map(ServiceAccountBinding::from).collect())
    }

    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PullSecretRecord>, GatewayError> {
        let _guard = self.lock.lock().await;
        match self.secrets(namespace).get(name).await {
            Ok(secret) => Ok(Some(PullSecretRecord::from(secret))),
            Err(e) => {
                let err = GatewayError::kube("get secret", format!("{namespace}/{name}"), e);
                if err.is_not_found() {
                    debug!("Secret {}/{} not found", namespace, name);
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn create_secret(
        &self,
        record: &PullSecretRecord,
    ) -> Result<PullSecretRecord, GatewayError> {
        let _guard = self.lock.lock().await;
        let created = self
            .secrets(&record.namespace)
            .create(&PostParams::default(), &record.to_secret())
            .await
            .map_err(|e| {
                GatewayError::kube(
                    "create secret",
                    format!("{}/{}", record.namespace, record.name),
                    e,
                )
            })?;

        Ok(PullSecretRecord::from(created))
    }

    async fn update_secret(
        &self,
        record: &PullSecretRecord,
    ) -> Result<PullSecretRecord, GatewayError> {
        let _guard = self.lock.lock().await;
        let patched = self
            .secrets(&record.namespace)
            .patch(
                &record.name,
                &PatchParams::default(),
                &Patch::Merge(secret_patch(record)),
            )
            .await
            .map_err(|e| {
                GatewayError::kube(
                    "update secret",
                    format!("{}/{}", record.namespace, record.name),
                    e,
                )
            })?;

        Ok(PullSecretRecord::from(patched))
    }

    async fn update_service_account(
        &self,
        binding: &ServiceAccountBinding,
    ) -> Result<ServiceAccountBinding, GatewayError> {
        let _guard = self.lock.lock().await;
        let patched = self
            .service_accounts(&binding.namespace)
            .patch(
                &binding.name,
                &PatchParams::default(),
                &Patch::Merge(service_account_patch(binding)),
            )
            .await
            .map_err(|e| {
                GatewayError::kube(
                    "update serviceaccount",
                    format!("{}/{}", binding.namespace, binding.name),
                    e,
                )
            })?;

        Ok(ServiceAccountBinding::from(patched))
    }
}
