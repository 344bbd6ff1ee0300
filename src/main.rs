//! # vault-sa-patcher
//!
//! Syncs image pull secrets from HashiCorp Vault into annotated ServiceAccounts.
//!
//! ## Usage
//!
//! ```text
//! vault-sa-patcher --config /etc/vault-sa-patcher/config.yaml
//! ```
//!
//! Every setting can also be overridden through environment variables, see
//! [`vault_sa_patcher::config`].

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use vault_sa_patcher::config::Config;
use vault_sa_patcher::constants::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(name = "vault-sa-patcher", version, about)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    vault_sa_patcher::runtime::run(config).await
}
