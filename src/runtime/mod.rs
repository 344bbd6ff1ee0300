//! # Runtime
//!
//! Process lifecycle: initialize, run the background tasks, and shut them
//! down cleanly on SIGINT/SIGTERM.

pub mod initialization;

use crate::config::Config;
use crate::constants::DEFAULT_SHUTDOWN_GRACE_SECS;
use crate::controller::ReconciliationLoop;
use crate::k8s::ClusterGateway;
use crate::vault::run_refresh;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the controller until a shutdown signal arrives
pub async fn run(config: Config) -> Result<()> {
    let init = initialization::initialize(&config).await?;

    let refresh_handle = tokio::spawn(run_refresh(
        Arc::clone(&init.store),
        config.vault_refresh_interval(),
        init.cancel.clone(),
    ));

    let gateway: Arc<dyn ClusterGateway> = init.gateway;
    let reconciler = ReconciliationLoop::new(&config, gateway, init.store);
    let loop_cancel = init.cancel.clone();
    let loop_handle = tokio::spawn(async move { reconciler.start(loop_cancel).await });

    shutdown_signal().await;
    info!("Shutdown signal received, stopping background tasks");
    init.cancel.cancel();

    let grace = Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS);
    let join_all = async {
        for (name, handle) in [
            ("reconciliation loop", loop_handle),
            ("vault refresh", refresh_handle),
            ("http server", init.server_handle),
        ] {
            if let Err(e) = handle.await {
                warn!("{} task ended abnormally: {}", name, e);
            }
        }
    };

    if tokio::time::timeout(grace, join_all).await.is_err() {
        warn!(
            "Background tasks did not stop within {}s, exiting anyway",
            grace.as_secs()
        );
    }

    info!("vault-sa-patcher stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
