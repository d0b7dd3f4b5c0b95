use anyhow::{Context, Result};
use cardsmith_core::config::AppConfig;

use super::bootstrap::BootstrapOptions;

pub fn path(options: &BootstrapOptions) -> Result<()> {
    let service = options.config_service()?;
    println!("{}", service.path().display());
    Ok(())
}

pub fn show(options: &BootstrapOptions) -> Result<()> {
    let config = options.load_config()?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("{rendered}");
    Ok(())
}

pub fn init(options: &BootstrapOptions) -> Result<()> {
    let service = options.config_service()?;
    if service.path().exists() {
        println!("ℹ️  Config already exists at {}", service.path().display());
        return Ok(());
    }
    service
        .save(&AppConfig::default())
        .with_context(|| format!("Failed to write {}", service.path().display()))?;
    println!("✅ Wrote default config to {}", service.path().display());
    Ok(())
}
