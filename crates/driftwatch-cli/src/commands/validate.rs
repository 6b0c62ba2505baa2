//! Validate configuration command

use anyhow::Result;

use driftwatch_core::StoreConfig;

/// Run the validate command
pub async fn run(config_path: &str) -> Result<u8> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = super::load_config(config_path)?;
    let project = &config.project;

    tracing::info!("✓ Suite: {}", project.suite);
    tracing::info!("✓ Cases: {}", project.cases.describe());
    match &project.store {
        StoreConfig::Local { path } => tracing::info!("✓ Store: local {}", path.display()),
        StoreConfig::Remote(remote) => tracing::info!("✓ Store: remote {}", remote.url),
    }
    tracing::info!(
        "✓ Concurrency: {}, case timeout: {}s",
        project.concurrency,
        project.case_timeout
    );
    if !project.tolerance.is_empty() {
        tracing::info!("✓ Tolerances: {} key(s)", project.tolerance.len());
    }
    match &project.workflow {
        Some(workflow) => tracing::info!("✓ Workflow: {}", workflow.command.join(" ")),
        None => tracing::info!("No workflow configured; `run` is unavailable"),
    }

    println!("Configuration for suite {} is valid", project.suite);
    Ok(0)
}
