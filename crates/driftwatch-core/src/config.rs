//! Configuration parsing and validation
//!
//! This module loads `driftwatch.yaml`, the single file describing a suite:
//! which cases to run, how to run them, where baselines live and how numeric
//! results may deviate.
//!
//! Relative paths in the file resolve against the directory containing it.
//! The API key for remote endpoints may come from the file or from the
//! `DRIFTWATCH_API_KEY` environment variable, which takes precedence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::baseline::validate_name;
use crate::compare::ToleranceSpec;
use crate::error::{Error, Result};

/// Default configuration file name inside a project directory
pub const CONFIG_FILE: &str = "driftwatch.yaml";

/// Environment variable overriding every configured API key
pub const API_KEY_ENV: &str = "DRIFTWATCH_API_KEY";

/// Suite configuration as written in `driftwatch.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Suite name
    pub suite: String,

    /// Maximum number of cases executing at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-case deadline in seconds
    #[serde(default = "default_case_timeout")]
    pub case_timeout: u64,

    /// Numeric tolerances per result key; empty means exact comparison
    #[serde(default)]
    pub tolerance: BTreeMap<String, ToleranceSpec>,

    /// Where the case list comes from
    pub cases: CaseSource,

    /// Baseline store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Target of `driftwatch submit`
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Command executed once per case by `driftwatch run`
    #[serde(default)]
    pub workflow: Option<WorkflowConfig>,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_case_timeout() -> u64 {
    60
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".driftwatch/store")
}

/// Source of the ordered case list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CaseSource {
    /// Ids listed inline
    Explicit {
        /// Case ids in run order
        ids: Vec<String>,
    },

    /// Text file with one case per line
    File {
        /// Path to the case list
        path: PathBuf,
    },

    /// One case per file in a directory, named after the file stem
    Directory {
        /// Directory to scan
        path: PathBuf,
        /// Only files with this extension are cases
        #[serde(default)]
        extension: Option<String>,
    },

    /// Case list served by a remote endpoint
    Remote(RemoteConfig),
}

impl CaseSource {
    /// Short label used in logs and errors
    pub fn describe(&self) -> String {
        match self {
            CaseSource::Explicit { ids } => format!("explicit list of {} ids", ids.len()),
            CaseSource::File { path } => format!("file {}", path.display()),
            CaseSource::Directory { path, .. } => format!("directory {}", path.display()),
            CaseSource::Remote(remote) => format!("remote {}", remote.url),
        }
    }
}

/// Baseline store backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Filesystem store
    Local {
        /// Store root directory
        #[serde(default = "default_store_path")]
        path: PathBuf,
    },

    /// HTTP store
    Remote(RemoteConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            path: default_store_path(),
        }
    }
}

/// A remote HTTP endpoint and its credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://driftwatch.example.com/api`
    pub url: String,

    /// Bearer token; overridden by `DRIFTWATCH_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// External command run once per case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Program and arguments; `{case}` and `{param:<name>}` are substituted
    pub command: Vec<String>,

    /// Files produced per case, captured as artifacts
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Parsed configuration file
    pub project: ProjectConfig,

    /// Directory relative paths resolve against
    pub base_path: PathBuf,
}

impl Config {
    /// Load, resolve and validate configuration
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or the configuration file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./flowers")?;
    /// println!("Suite: {}", config.project.suite);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let env_key = std::env::var(API_KEY_ENV).ok();
        let config = Self::parse(&contents, base_path)?.with_api_key_override(env_key);
        config.validate()?;

        tracing::debug!(
            path = %config_path.display(),
            suite = %config.project.suite,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration text and resolve its relative paths
    ///
    /// Does not consult the environment and does not validate.
    pub fn parse(contents: &str, base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let mut project: ProjectConfig = serde_yaml::from_str(contents)?;

        match &mut project.cases {
            CaseSource::File { path } | CaseSource::Directory { path, .. } => {
                *path = base_path.join(&*path);
            }
            CaseSource::Explicit { .. } | CaseSource::Remote(_) => {}
        }
        if let StoreConfig::Local { path } = &mut project.store {
            *path = base_path.join(&*path);
        }

        Ok(Self { project, base_path })
    }

    /// Replace every configured API key with `key`, when one is given
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            return self;
        };
        for remote in self.remotes_mut() {
            remote.api_key = Some(key.clone());
        }
        self
    }

    fn remotes_mut(&mut self) -> impl Iterator<Item = &mut RemoteConfig> {
        let project = &mut self.project;
        let cases = match &mut project.cases {
            CaseSource::Remote(remote) => Some(remote),
            _ => None,
        };
        let store = match &mut project.store {
            StoreConfig::Remote(remote) => Some(remote),
            StoreConfig::Local { .. } => None,
        };
        cases.into_iter().chain(store).chain(project.remote.as_mut())
    }

    /// Check values that parse but cannot be used
    pub fn validate(&self) -> Result<()> {
        let project = &self.project;
        validate_name("suite", &project.suite)?;

        if project.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }
        if project.case_timeout == 0 {
            return Err(invalid("case_timeout must be at least 1 second"));
        }
        for (key, spec) in &project.tolerance {
            let bound = spec.bound();
            if !bound.is_finite() || bound < 0.0 {
                return Err(invalid(format!(
                    "tolerance for '{}' must be a finite, non-negative number",
                    key
                )));
            }
        }

        match &project.cases {
            CaseSource::Explicit { ids } if ids.is_empty() => {
                return Err(invalid("cases: explicit source lists no ids"));
            }
            CaseSource::Remote(remote) => check_remote("case source", remote)?,
            _ => {}
        }
        if let StoreConfig::Remote(remote) = &project.store {
            check_remote("baseline store", remote)?;
        }
        if let Some(remote) = &project.remote {
            check_remote("submit target", remote)?;
        }

        if let Some(workflow) = &project.workflow
            && workflow.command.first().is_none_or(|program| program.is_empty())
        {
            return Err(invalid("workflow.command must name a program"));
        }

        Ok(())
    }

    /// Per-case deadline
    pub fn case_timeout(&self) -> Duration {
        Duration::from_secs(self.project.case_timeout)
    }

    /// The submit target, which must be configured
    pub fn submit_target(&self) -> Result<&RemoteConfig> {
        self.project
            .remote
            .as_ref()
            .ok_or_else(|| invalid("no `remote` section configured to submit to"))
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigInvalid {
        message: message.into(),
    }
}

fn check_remote(what: &str, remote: &RemoteConfig) -> Result<()> {
    if !(remote.url.starts_with("http://") || remote.url.starts_with("https://")) {
        return Err(invalid(format!(
            "{} url '{}' must start with http:// or https://",
            what, remote.url
        )));
    }
    if remote.api_key.as_deref().is_none_or(str::is_empty) {
        return Err(Error::MissingCredentials {
            what: what.to_string(),
            env_var: API_KEY_ENV.to_string(),
        });
    }
    Ok(())
}
