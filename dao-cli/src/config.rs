use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dao_core::{mask_credentials, DatabaseConfig};

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective config with credentials masked
    Show,
    /// Show config file path
    Path,
    /// Check the config without connecting
    Validate,
}

pub fn run_config(dir: &Path, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => run_show(dir),
        ConfigCommands::Path => run_path(dir),
        ConfigCommands::Validate => run_validate(dir),
    }
}

fn load(dir: &Path) -> Result<DatabaseConfig> {
    let config = DatabaseConfig::load(dir)
        .with_context(|| format!("Failed to load config from {}", dir.display()))?;
    Ok(config.with_env_overrides())
}

fn run_show(dir: &Path) -> Result<()> {
    let mut config = load(dir)?;
    config.data_source = mask_credentials(&config.data_source);
    print!("{}", config.to_toml()?);
    Ok(())
}

fn run_path(dir: &Path) -> Result<()> {
    println!("{}", DatabaseConfig::config_path(dir)?.display());
    Ok(())
}

fn run_validate(dir: &Path) -> Result<()> {
    let config = load(dir)?;
    config.validate()?;
    if config.tls.enabled {
        let profile = dao_core::TlsProfile::from_config(&config.tls).context("TLS profile")?;
        println!(
            "✓ TLS profile built (client certificate: {})",
            if profile.has_client_identity() { "yes" } else { "no" }
        );
    }
    println!("✓ config is valid ({} driver)", config.driver);
    Ok(())
}
