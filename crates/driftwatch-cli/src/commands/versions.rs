//! List stored versions

use anyhow::Result;

use driftwatch_runtime::store;

/// Run the versions command
pub async fn run(config_path: &str) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let store = store::open(&config)?;
    let versions = store.versions(&config.project.suite).await?;

    if versions.is_empty() {
        tracing::info!("No stored versions for {}", config.project.suite);
    }
    for version in versions {
        println!("{}", version);
    }
    Ok(0)
}
