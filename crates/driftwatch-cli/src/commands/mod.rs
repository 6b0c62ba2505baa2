//! CLI command implementations
//!
//! Each command returns the process exit code on success; failures bubble
//! up as errors and are mapped to an exit code in `main`.

use anyhow::{Context, Result};
use std::path::Path;

use driftwatch_core::{Config, SuiteReport, render_human};

pub mod cases;
pub mod compare;
pub mod run;
pub mod submit;
pub mod validate;
pub mod versions;

/// Load and validate the configuration at `config_path`
pub fn load_config(config_path: &str) -> Result<Config> {
    tracing::debug!("Loading configuration from {}", config_path);
    Config::load(config_path).context("Failed to load configuration")
}

/// Print the human summary and write the JSON report when asked to
pub fn emit_report(report: &SuiteReport, report_path: Option<&Path>) -> Result<u8> {
    print!("{}", render_human(report));

    if let Some(path) = report_path {
        let json = report.to_json().context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Wrote report to {}", path.display());
    }

    Ok(report.exit_status().code())
}
