//! # Logging
//!
//! Installs the global `tracing` subscriber.
//!
//! `RUST_LOG` wins when set; otherwise the configured `logLevel` applies to
//! this crate only, keeping kube/hyper chatter at `warn`. The HTTP access log
//! (`tower_http` target) stays at `info`.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter used when `RUST_LOG` is not set
pub fn default_filter(log_level: &str) -> String {
    format!(
        "warn,tower_http=info,vault_sa_patcher={}",
        log_level.to_lowercase()
    )
}

/// Initialize the tracing subscriber
///
/// `format` is `json` for structured output, anything else means text.
pub fn init_logging(log_level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(log_level)))
        .context("Failed to build log filter")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
