//! # Initialization
//!
//! Startup sequence: rustls, logging, metrics, HTTP server, Kubernetes
//! client and the initial Vault fetch.

use crate::config::Config;
use crate::k8s::KubeGateway;
use crate::observability;
use crate::server;
use crate::vault::{SecretStore, VaultClient, VaultSecretStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Components produced by [`initialize`]
pub struct InitializationResult {
    pub gateway: Arc<KubeGateway>,
    pub store: Arc<dyn SecretStore>,
    pub server_handle: JoinHandle<()>,
    /// Fired on shutdown; every background task watches it
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("gateway", &self.gateway)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Bring up everything the reconciliation loop depends on.
///
/// Failing to bind the HTTP listener or to build the Kubernetes client is
/// fatal. A failed initial Vault fetch is not: the store starts empty and the
/// refresh task retries.
pub async fn initialize(config: &Config) -> Result<InitializationResult> {
    observability::logging::init_logging(&config.log_level, &config.log_format)
        .context("Failed to initialize logging")?;

    info!("Starting vault-sa-patcher v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    debug!("Configuration: {}", config.redacted_json());

    // Required for rustls 0.23+ before the first TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let cancel = CancellationToken::new();

    let addr = config.http.socket_addr()?;
    let listener = server::bind(addr).await?;
    let route_prefix = config.http.route_prefix.clone();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::start_server(listener, route_prefix, server_cancel).await {
            error!("HTTP server error: {}", e);
        }
    });

    let gateway = Arc::new(
        KubeGateway::connect(config)
            .await
            .context("Failed to create Kubernetes client")?,
    );
    info!("Kubernetes client ready");

    let vault_client = VaultClient::from_config(config).context("Failed to create Vault client")?;
    info!(
        "Vault client ready: {} (role: {}, secret: {}/{})",
        config.vault.address(),
        config.vault.role,
        config.vault.mount_path,
        config.vault.secret_path
    );

    let store: Arc<dyn SecretStore> = Arc::new(VaultSecretStore::new(vault_client));
    store.fetch().await;

    Ok(InitializationResult {
        gateway,
        store,
        server_handle,
        cancel,
    })
}
