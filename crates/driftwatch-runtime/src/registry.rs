//! Test case registry
//!
//! Resolves a [`CaseSource`] into the ordered list of cases to run. The list
//! is resolved completely before anything is scheduled: a source that cannot
//! be read aborts the run instead of running a partial list.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use driftwatch_core::{CaseSource, RemoteConfig, TestCase};

use crate::error::RegistryError;

/// Parameter holding the file path of a directory-sourced case
pub const PATH_PARAMETER: &str = "path";

/// Resolves case lists from any supported source
#[derive(Debug, Clone, Default)]
pub struct Registry {
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RemoteCase {
    Id(String),
    Case(TestCase),
}

impl Registry {
    /// Registry with a default HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the cases of `suite`, keeping those whose id matches `filter`
    pub async fn list_cases(
        &self,
        suite: &str,
        source: &CaseSource,
        filter: Option<&Regex>,
    ) -> Result<Vec<TestCase>, RegistryError> {
        let cases = match source {
            CaseSource::Explicit { ids } => ids.iter().map(TestCase::new).collect(),
            CaseSource::File { path } => read_case_file(path)?,
            CaseSource::Directory { path, extension } => {
                scan_directory(path, extension.as_deref())?
            }
            CaseSource::Remote(remote) => self.fetch_remote(suite, remote).await?,
        };
        check_cases(&cases)?;

        let resolved = cases.len();
        let cases: Vec<TestCase> = match filter {
            Some(filter) => cases.into_iter().filter(|c| filter.is_match(&c.id)).collect(),
            None => cases,
        };
        if cases.is_empty() {
            return Err(RegistryError::Invalid {
                message: format!("filter matched none of the {} cases", resolved),
            });
        }

        tracing::info!(
            source = %source.describe(),
            resolved,
            selected = cases.len(),
            "Resolved test cases"
        );
        Ok(cases)
    }

    async fn fetch_remote(
        &self,
        suite: &str,
        remote: &RemoteConfig,
    ) -> Result<Vec<TestCase>, RegistryError> {
        let url = format!("{}/suites/{}/cases", remote.url.trim_end_matches('/'), suite);
        let unavailable = |message: String| RegistryError::Unavailable {
            source_name: url.clone(),
            message,
        };

        let mut request = self.client.get(&url);
        if let Some(key) = &remote.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("server responded {}", status)));
        }

        let body = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;
        let listed: Vec<RemoteCase> =
            serde_json::from_slice(&body).map_err(|e| RegistryError::Invalid {
                message: format!("{} returned an unexpected case list: {}", url, e),
            })?;

        Ok(listed
            .into_iter()
            .map(|case| match case {
                RemoteCase::Id(id) => TestCase::new(id),
                RemoteCase::Case(case) => case,
            })
            .collect())
    }
}

/// Parse a case list file
///
/// One case per line: the id, optionally followed by whitespace-separated
/// `name=value` parameters. Blank lines and `#` comments are skipped.
fn read_case_file(path: &Path) -> Result<Vec<TestCase>, RegistryError> {
    let contents = std::fs::read_to_string(path).map_err(|e| RegistryError::Unavailable {
        source_name: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_case_list(&contents)
}

fn parse_case_list(contents: &str) -> Result<Vec<TestCase>, RegistryError> {
    let mut cases = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(id) = fields.next() else {
            continue;
        };
        let mut case = TestCase::new(id);
        for field in fields {
            let (name, value) = field.split_once('=').ok_or_else(|| RegistryError::Invalid {
                message: format!(
                    "line {}: expected name=value parameter, found '{}'",
                    number + 1,
                    field
                ),
            })?;
            case = case.with_parameter(name, value);
        }
        cases.push(case);
    }
    Ok(cases)
}

fn scan_directory(dir: &Path, extension: Option<&str>) -> Result<Vec<TestCase>, RegistryError> {
    let unavailable = |message: String| RegistryError::Unavailable {
        source_name: dir.display().to_string(),
        message,
    };
    if !dir.is_dir() {
        return Err(unavailable("not a directory".to_string()));
    }

    let mut cases = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| unavailable(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(wanted) = extension {
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted.trim_start_matches('.')));
            if !matches {
                continue;
            }
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "Skipping file with non UTF-8 name");
            continue;
        };
        cases.push(
            TestCase::new(stem).with_parameter(PATH_PARAMETER, path.display().to_string()),
        );
    }
    Ok(cases)
}

fn check_cases(cases: &[TestCase]) -> Result<(), RegistryError> {
    if cases.is_empty() {
        return Err(RegistryError::Invalid {
            message: "the case source lists no cases".to_string(),
        });
    }
    let mut seen = HashSet::new();
    for case in cases {
        if case.id.is_empty() {
            return Err(RegistryError::Invalid {
                message: "case ids must not be empty".to_string(),
            });
        }
        if !seen.insert(case.id.as_str()) {
            return Err(RegistryError::Invalid {
                message: format!("duplicate case id '{}'", case.id),
            });
        }
    }
    Ok(())
}
