//! Submit stored versions to the remote store

use anyhow::{Context, Result};

use driftwatch_core::Version;
use driftwatch_runtime::{RemoteStore, store, transfer};

/// Run the submit command; no versions means every stored version
pub async fn run(config_path: &str, versions: &[Version]) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let target = config.submit_target()?;
    let remote = RemoteStore::new(target)?;
    let local = store::open(&config)?;
    let suite = config.project.suite.as_str();

    let versions = if versions.is_empty() {
        local.versions(suite).await?
    } else {
        versions.to_vec()
    };
    if versions.is_empty() {
        println!("Nothing to submit for {}", suite);
        return Ok(0);
    }

    tracing::info!("Submitting {} version(s) to {}", versions.len(), target.url);
    let summary = transfer(local.as_ref(), &remote, suite, &versions)
        .await
        .context("Submission failed")?;

    for version in &summary.submitted {
        println!("submitted {}", version);
    }
    for version in &summary.skipped {
        println!("skipped {} (already submitted)", version);
    }
    Ok(0)
}
