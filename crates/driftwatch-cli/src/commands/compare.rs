//! Compare two stored versions

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use driftwatch_core::Version;
use driftwatch_runtime::Harness;

/// Run the compare command; `baseline` is the reference version
pub async fn run(
    config_path: &str,
    baseline: &Version,
    current: &Version,
    report: Option<&Path>,
) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let harness = Harness::from_config(&config, CancellationToken::new())?;

    tracing::info!(
        "Comparing {} version {} against {}",
        harness.suite(),
        current,
        baseline
    );
    let report_data = harness.compare_versions(baseline, current).await?;
    super::emit_report(&report_data, report)
}
