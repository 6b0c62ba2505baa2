//! List resolved test cases

use anyhow::{Context, Result};
use regex::Regex;

use driftwatch_runtime::Registry;

/// Run the cases command
pub async fn run(config_path: &str, filter: Option<&Regex>) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let cases = Registry::new()
        .list_cases(&config.project.suite, &config.project.cases, filter)
        .await
        .context("Failed to resolve test cases")?;

    for case in &cases {
        let params: Vec<String> = case
            .parameters
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        if params.is_empty() {
            println!("{}", case.id);
        } else {
            println!("{}\t{}", case.id, params.join(" "));
        }
    }
    Ok(0)
}
