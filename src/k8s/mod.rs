//! # Kubernetes
//!
//! Plain records for the two resource kinds the controller touches, and the
//! [`ClusterGateway`] trait the reconciliation logic talks to. The real
//! implementation is [`KubeGateway`]; tests swap in an in-memory one.

mod gateway;

pub use gateway::KubeGateway;

use crate::constants::{
    DOCKER_CONFIG_JSON_KEY, DOCKER_CONFIG_JSON_TYPE, SYNC_ANNOTATION, SYNC_ANNOTATION_VALUE,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use thiserror::Error;

/// Label selector used when listing ServiceAccounts
pub fn sync_label_selector() -> String {
    format!("{SYNC_ANNOTATION}={SYNC_ANNOTATION_VALUE}")
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Kubernetes API error during {operation} {target}: {source}")]
    Kube {
        operation: &'static str,
        target: String,
        #[source]
        source: kube::Error,
    },
}

impl GatewayError {
    pub fn kube(
        operation: &'static str,
        target: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        Self::Kube {
            operation,
            target: target.into(),
            source,
        }
    }

    /// HTTP status reported by the API server, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Kube {
                source: kube::Error::Api(response),
                ..
            } => Some(response.code),
            Self::Kube { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Optimistic concurrency failure (stale `resourceVersion`)
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }
}

/// A `kubernetes.io/dockerconfigjson` secret owned by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSecretRecord {
    pub name: String,
    pub namespace: String,
    pub docker_config_json: Vec<u8>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// `None` for records not yet persisted
    pub resource_version: Option<String>,
}

impl PullSecretRecord {
    /// New record carrying the controller's sync label and annotation
    pub fn managed(
        name: impl Into<String>,
        namespace: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        let marker = BTreeMap::from([(
            SYNC_ANNOTATION.to_string(),
            SYNC_ANNOTATION_VALUE.to_string(),
        )]);
        Self {
            name: name.into(),
            namespace: namespace.into(),
            docker_config_json: payload,
            labels: marker.clone(),
            annotations: marker,
            resource_version: None,
        }
    }

    pub fn to_secret(&self) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels.clone()),
                annotations: Some(self.annotations.clone()),
                resource_version: self.resource_version.clone(),
                ..ObjectMeta::default()
            },
            type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
            data: Some(BTreeMap::from([(
                DOCKER_CONFIG_JSON_KEY.to_string(),
                ByteString(self.docker_config_json.clone()),
            )])),
            ..Secret::default()
        }
    }
}

impl From<Secret> for PullSecretRecord {
    fn from(secret: Secret) -> Self {
        let docker_config_json = secret
            .data
            .and_then(|mut data| data.remove(DOCKER_CONFIG_JSON_KEY))
            .map(|bytes| bytes.0)
            .unwrap_or_default();

        Self {
            name: secret.metadata.name.unwrap_or_default(),
            namespace: secret.metadata.namespace.unwrap_or_default(),
            docker_config_json,
            labels: secret.metadata.labels.unwrap_or_default(),
            annotations: secret.metadata.annotations.unwrap_or_default(),
            resource_version: secret.metadata.resource_version,
        }
    }
}

/// The parts of a ServiceAccount the controller reads and rewrites
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccountBinding {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
    /// `imagePullSecrets` names, in order, blank entries included
    pub pull_secret_names: Vec<String>,
    pub resource_version: Option<String>,
}

impl ServiceAccountBinding {
    /// Only an annotation value of exactly `"true"` opts an account in
    pub fn is_opted_in(&self) -> bool {
        self.annotations.get(SYNC_ANNOTATION).map(String::as_str) == Some(SYNC_ANNOTATION_VALUE)
    }
}

impl From<ServiceAccount> for ServiceAccountBinding {
    fn from(account: ServiceAccount) -> Self {
        let pull_secret_names = account
            .image_pull_secrets
            .unwrap_or_default()
            .into_iter()
            .map(|reference| reference.name)
            .collect();

        Self {
            name: account.metadata.name.unwrap_or_default(),
            namespace: account.metadata.namespace.unwrap_or_default(),
            annotations: account.metadata.annotations.unwrap_or_default(),
            pull_secret_names,
            resource_version: account.metadata.resource_version,
        }
    }
}

/// Everything the reconciliation logic needs from the cluster
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<String>, GatewayError>;

    /// Accounts in `namespace` matching `label_selector`
    async fn list_service_accounts(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ServiceAccountBinding>, GatewayError>;

    /// `Ok(None)` when the secret does not exist
    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PullSecretRecord>, GatewayError>;

    async fn create_secret(
        &self,
        record: &PullSecretRecord,
    ) -> Result<PullSecretRecord, GatewayError>;

    /// Replace the payload, guarded by `record.resource_version`
    async fn update_secret(
        &self,
        record: &PullSecretRecord,
    ) -> Result<PullSecretRecord, GatewayError>;

    /// Replace `imagePullSecrets`, guarded by `binding.resource_version`
    async fn update_service_account(
        &self,
        binding: &ServiceAccountBinding,
    ) -> Result<ServiceAccountBinding, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::LocalObjectReference;

    #[test]
    fn test_managed_record_carries_sync_marker() {
        let record = PullSecretRecord::managed("pull-reg", "team-a", b"{}".to_vec());
        assert_eq!(record.labels.get(SYNC_ANNOTATION).map(String::as_str), Some("true"));
        assert_eq!(record.annotations.get(SYNC_ANNOTATION).map(String::as_str), Some("true"));
        assert!(record.resource_version.is_none());
    }

    #[test]
    fn test_secret_conversion_keeps_payload_and_type() {
        let mut record = PullSecretRecord::managed("pull-reg", "team-a", b"{\"auths\":{}}".to_vec());
        record.resource_version = Some("17".into());

        let secret = record.to_secret();
        assert_eq!(secret.type_.as_deref(), Some(DOCKER_CONFIG_JSON_TYPE));
        assert_eq!(PullSecretRecord::from(secret), record);
    }

    #[test]
    fn test_secret_without_payload_converts_to_empty() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("other".into()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        assert!(PullSecretRecord::from(secret).docker_config_json.is_empty());
    }

    #[test]
    fn test_opt_in_requires_exact_true() {
        let mut binding = ServiceAccountBinding::default();
        assert!(!binding.is_opted_in());

        binding.annotations.insert(SYNC_ANNOTATION.into(), "True".into());
        assert!(!binding.is_opted_in());

        binding.annotations.insert(SYNC_ANNOTATION.into(), "true".into());
        assert!(binding.is_opted_in());
    }

    #[test]
    fn test_service_account_conversion_keeps_pull_secret_order() {
        let account = ServiceAccount {
            metadata: ObjectMeta {
                name: Some("builder".into()),
                namespace: Some("ci".into()),
                resource_version: Some("3".into()),
                ..ObjectMeta::default()
            },
            image_pull_secrets: Some(vec![
                LocalObjectReference { name: "zeta".into() },
                LocalObjectReference { name: "alpha".into() },
            ]),
            ..ServiceAccount::default()
        };

        let binding = ServiceAccountBinding::from(account);
        assert_eq!(binding.pull_secret_names, vec!["zeta", "alpha"]);
        assert_eq!(binding.resource_version.as_deref(), Some("3"));
    }

    #[test]
    fn test_service_account_conversion_keeps_blank_references() {
        let account = ServiceAccount {
            image_pull_secrets: Some(vec![
                LocalObjectReference { name: String::new() },
                LocalObjectReference { name: "x".into() },
            ]),
            ..ServiceAccount::default()
        };

        let binding = ServiceAccountBinding::from(account);
        assert_eq!(binding.pull_secret_names, vec!["", "x"]);
        assert_ne!(binding.pull_secret_names, vec!["x".to_string()]);
    }

    fn api_error(code: u16, reason: &str) -> GatewayError {
        GatewayError::kube(
            "get secret",
            "ns/name",
            kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: reason.to_string(),
                reason: reason.to_string(),
                code,
            }),
        )
    }

    #[test]
    fn test_gateway_error_classifies_status() {
        let not_found = api_error(404, "NotFound");
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = api_error(409, "Conflict");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_not_found());

        assert_eq!(api_error(500, "InternalError").status_code(), Some(500));
    }

    #[test]
    fn test_selector_matches_annotation_key() {
        assert_eq!(sync_label_selector(), "vault-sa-patcher/sync=true");
    }
}
