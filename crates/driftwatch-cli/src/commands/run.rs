//! Run the suite and compare against a baseline

use anyhow::{Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use driftwatch_core::Version;
use driftwatch_runtime::{CommandWorkflow, Harness, Registry, RunOptions};

/// Options of `driftwatch run`
#[derive(Debug, Default)]
pub struct RunArgs {
    /// Version to store this run under
    pub version: Option<Version>,
    /// Version to compare against instead of the latest
    pub compare_to: Option<Version>,
    /// Only run cases whose id matches
    pub filter: Option<Regex>,
    /// Override `concurrency`
    pub concurrency: Option<usize>,
    /// Override `case_timeout` (seconds)
    pub timeout: Option<u64>,
    /// Where to write the JSON report
    pub report: Option<PathBuf>,
}

/// Run the run command
pub async fn run(config_path: &str, args: RunArgs, cancel: CancellationToken) -> Result<u8> {
    let mut config = super::load_config(config_path)?;
    if let Some(concurrency) = args.concurrency {
        config.project.concurrency = concurrency;
    }
    if let Some(timeout) = args.timeout {
        config.project.case_timeout = timeout;
    }
    config.validate().context("Invalid command-line override")?;

    let workflow = config.project.workflow.as_ref().ok_or_else(|| {
        driftwatch_core::Error::ConfigInvalid {
            message: "no `workflow` section: `driftwatch run` needs a command to execute"
                .to_string(),
        }
    })?;
    let workflow = CommandWorkflow::from_config(workflow, &config.base_path);

    let suite = config.project.suite.clone();
    let cases = Registry::new()
        .list_cases(&suite, &config.project.cases, args.filter.as_ref())
        .await
        .context("Failed to resolve test cases")?;

    let harness = Harness::from_config(&config, cancel)?;
    let outcome = harness
        .run(
            &cases,
            Arc::new(workflow),
            RunOptions {
                version: args.version,
                compare_to: args.compare_to,
            },
        )
        .await?;

    if outcome.stored {
        tracing::info!("Stored {} as version {}", suite, outcome.baseline.version);
    }
    super::emit_report(&outcome.report, args.report.as_deref())
}
