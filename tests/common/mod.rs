//! Common test utilities
//!
//! rustls setup for the Pact tests, plus in-memory stand-ins for the cluster
//! and the credential store used by the reconciliation tests.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, Once};
use vault_sa_patcher::constants::{SYNC_ANNOTATION, SYNC_ANNOTATION_VALUE};
use vault_sa_patcher::k8s::{ClusterGateway, GatewayError, PullSecretRecord, ServiceAccountBinding};
use vault_sa_patcher::vault::{Credential, CredentialSnapshot, SecretStore};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // Another test in the same binary may have won the race already
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// `kube::Error` carrying an API status, as the API server would return it
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    })
}

fn gateway_error(operation: &'static str, target: &str, code: u16, reason: &str) -> GatewayError {
    GatewayError::kube(operation, target, api_error(code, reason))
}

/// Snapshot with one rendered payload per `(registry_key, host, username, password)`
pub fn snapshot(entries: &[(&str, &str, &str, &str)]) -> CredentialSnapshot {
    entries
        .iter()
        .map(|(key, host, username, password)| {
            (
                (*key).to_string(),
                Credential::new(*key, *host, *username, *password).payload(),
            )
        })
        .collect()
}

/// Every write the fake cluster accepted, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateSecret { namespace: String, name: String },
    UpdateSecret { namespace: String, name: String },
    UpdateServiceAccount { namespace: String, name: String, pull_secret_names: Vec<String> },
}

#[derive(Debug, Default)]
struct ClusterState {
    namespaces: Vec<String>,
    /// `(namespace, name)` -> account and its labels
    accounts: BTreeMap<(String, String), (ServiceAccountBinding, BTreeMap<String, String>)>,
    secrets: BTreeMap<(String, String), PullSecretRecord>,
    writes: Vec<Write>,
    /// Every `(namespace, name)` handed out by `list_service_accounts`
    accounts_read: Vec<(String, String)>,
    next_version: u64,
    fail_list_namespaces: bool,
    fail_list_accounts: BTreeSet<String>,
    fail_get_secret: BTreeSet<(String, String)>,
    fail_writes: BTreeSet<(String, String)>,
}

impl ClusterState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory [`ClusterGateway`] honouring `key=value` label selectors and
/// `resourceVersion` preconditions
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.state.lock().unwrap().namespaces.push(namespace.to_string());
    }

    /// Account labelled for selection, annotated with `annotation` when given
    pub fn add_service_account(
        &self,
        namespace: &str,
        name: &str,
        annotation: Option<&str>,
        pull_secret_names: &[&str],
    ) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump_version();
        let mut annotations = BTreeMap::new();
        if let Some(value) = annotation {
            annotations.insert(SYNC_ANNOTATION.to_string(), value.to_string());
        }
        let labels = BTreeMap::from([(SYNC_ANNOTATION.to_string(), SYNC_ANNOTATION_VALUE.to_string())]);
        let binding = ServiceAccountBinding {
            name: name.to_string(),
            namespace: namespace.to_string(),
            annotations,
            pull_secret_names: pull_secret_names.iter().map(|s| (*s).to_string()).collect(),
            resource_version: Some(version),
        };
        state
            .accounts
            .insert((namespace.to_string(), name.to_string()), (binding, labels));
    }

    /// Account without the sync label; a label selector never returns it
    pub fn add_unlabelled_service_account(&self, namespace: &str, name: &str, pull_secret_names: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump_version();
        let binding = ServiceAccountBinding {
            name: name.to_string(),
            namespace: namespace.to_string(),
            pull_secret_names: pull_secret_names.iter().map(|s| (*s).to_string()).collect(),
            resource_version: Some(version),
            ..ServiceAccountBinding::default()
        };
        state
            .accounts
            .insert((namespace.to_string(), name.to_string()), (binding, BTreeMap::new()));
    }

    pub fn put_secret(&self, namespace: &str, name: &str, payload: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        let mut record = PullSecretRecord::managed(name, namespace, payload);
        record.resource_version = Some(state.bump_version());
        state
            .secrets
            .insert((namespace.to_string(), name.to_string()), record);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<PullSecretRecord> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn secret_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn service_account(&self, namespace: &str, name: &str) -> ServiceAccountBinding {
        self.state.lock().unwrap().accounts[&(namespace.to_string(), name.to_string())]
            .0
            .clone()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn accounts_read(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().accounts_read.clone()
    }

    pub fn fail_list_namespaces(&self) {
        self.state.lock().unwrap().fail_list_namespaces = true;
    }

    pub fn recover_list_namespaces(&self) {
        self.state.lock().unwrap().fail_list_namespaces = false;
    }

    pub fn fail_list_accounts(&self, namespace: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_list_accounts
            .insert(namespace.to_string());
    }

    pub fn fail_get_secret(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_get_secret
            .insert((namespace.to_string(), name.to_string()));
    }

    /// Make every write to `namespace/name` fail with a 500
    pub fn fail_writes(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_writes
            .insert((namespace.to_string(), name.to_string()));
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.fail_list_namespaces {
            return Err(gateway_error("list namespaces", "*", 503, "ServiceUnavailable"));
        }
        Ok(state.namespaces.clone())
    }

    async fn list_service_accounts(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ServiceAccountBinding>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_list_accounts.contains(namespace) {
            return Err(gateway_error("list serviceaccounts", namespace, 403, "Forbidden"));
        }

        let selected: Vec<ServiceAccountBinding> = state
            .accounts
            .iter()
            .filter(|((ns, _), (_, labels))| ns == namespace && matches_selector(labels, label_selector))
            .map(|(_, (binding, _))| binding.clone())
            .collect();
        for binding in &selected {
            state
                .accounts_read
                .push((binding.namespace.clone(), binding.name.clone()));
        }
        Ok(selected)
    }

    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PullSecretRecord>, GatewayError> {
        let state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        if state.fail_get_secret.contains(&key) {
            return Err(gateway_error("get secret", name, 500, "InternalError"));
        }
        Ok(state.secrets.get(&key).cloned())
    }

    async fn create_secret(&self, record: &PullSecretRecord) -> Result<PullSecretRecord, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (record.namespace.clone(), record.name.clone());
        if state.fail_writes.contains(&key) {
            return Err(gateway_error("create secret", &record.name, 500, "InternalError"));
        }
        if state.secrets.contains_key(&key) {
            return Err(gateway_error("create secret", &record.name, 409, "AlreadyExists"));
        }

        let mut stored = record.clone();
        stored.resource_version = Some(state.bump_version());
        state.secrets.insert(key, stored.clone());
        state.writes.push(Write::CreateSecret {
            namespace: record.namespace.clone(),
            name: record.name.clone(),
        });
        Ok(stored)
    }

    async fn update_secret(&self, record: &PullSecretRecord) -> Result<PullSecretRecord, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (record.namespace.clone(), record.name.clone());
        if state.fail_writes.contains(&key) {
            return Err(gateway_error("update secret", &record.name, 500, "InternalError"));
        }
        let current_version = match state.secrets.get(&key) {
            Some(current) => current.resource_version.clone(),
            None => return Err(gateway_error("update secret", &record.name, 404, "NotFound")),
        };
        if record.resource_version.is_some() && record.resource_version != current_version {
            return Err(gateway_error("update secret", &record.name, 409, "Conflict"));
        }

        let version = state.bump_version();
        let stored = state.secrets.get_mut(&key).map(|current| {
            current.docker_config_json = record.docker_config_json.clone();
            current.resource_version = Some(version);
            current.clone()
        });
        state.writes.push(Write::UpdateSecret {
            namespace: record.namespace.clone(),
            name: record.name.clone(),
        });
        Ok(stored.unwrap())
    }

    async fn update_service_account(
        &self,
        binding: &ServiceAccountBinding,
    ) -> Result<ServiceAccountBinding, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (binding.namespace.clone(), binding.name.clone());
        if state.fail_writes.contains(&key) {
            return Err(gateway_error("update serviceaccount", &binding.name, 500, "InternalError"));
        }
        let current_version = match state.accounts.get(&key) {
            Some((current, _)) => current.resource_version.clone(),
            None => return Err(gateway_error("update serviceaccount", &binding.name, 404, "NotFound")),
        };
        if binding.resource_version.is_some() && binding.resource_version != current_version {
            return Err(gateway_error("update serviceaccount", &binding.name, 409, "Conflict"));
        }

        let version = state.bump_version();
        let stored = state.accounts.get_mut(&key).map(|(current, _)| {
            current.pull_secret_names = binding.pull_secret_names.clone();
            current.resource_version = Some(version);
            current.clone()
        });
        state.writes.push(Write::UpdateServiceAccount {
            namespace: binding.namespace.clone(),
            name: binding.name.clone(),
            pull_secret_names: binding.pull_secret_names.clone(),
        });
        Ok(stored.unwrap())
    }
}

/// [`SecretStore`] whose contents the test sets directly
#[derive(Debug, Default)]
pub struct FakeStore {
    snapshot: Mutex<CredentialSnapshot>,
}

impl FakeStore {
    pub fn with(snapshot: CredentialSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: CredentialSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

#[async_trait]
impl SecretStore for FakeStore {
    async fn fetch(&self) {}

    fn snapshot(&self) -> CredentialSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}
