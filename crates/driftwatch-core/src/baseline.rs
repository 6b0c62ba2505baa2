//! Versions and stored baselines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::case::CaseResult;
use crate::error::{Error, Result};

/// Check that `name` can identify a suite or version on any backend.
///
/// Names end up as path components and URL segments, so separators,
/// leading dots, whitespace and control characters are rejected.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let invalid = |message: &str| Error::InvalidName {
        kind,
        name: name.to_string(),
        message: message.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name.len() > 128 {
        return Err(invalid("must be at most 128 characters"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+')))
    {
        return Err(invalid(&format!("contains unsupported character {:?}", c)));
    }
    Ok(())
}

/// Identifier of one full run of a suite
///
/// Versions are opaque strings ordered naturally: runs of digits compare as
/// numbers, so `v2 < v10` and timestamps of equal width sort chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Validate and wrap a version string
    pub fn new(version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        validate_name("version", &version)?;
        Ok(Self(version))
    }

    /// Version named after the current UTC time (`YYYYMMDDHHMMSS`)
    pub fn timestamp() -> Self {
        Self(Utc::now().format("%Y%m%d%H%M%S").to_string())
    }

    /// The version string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.is_numeric, r.is_numeric) {
                    (true, true) => {
                        let l = l.text.trim_start_matches('0');
                        let r = r.text.trim_start_matches('0');
                        l.len().cmp(&r.len()).then_with(|| l.cmp(r))
                    }
                    _ => l.text.cmp(r.text),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

struct Chunk<'a> {
    text: &'a str,
    is_numeric: bool,
}

fn chunks(s: &str) -> impl Iterator<Item = Chunk<'_>> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let is_numeric = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != is_numeric)
            .unwrap_or(rest.len());
        let (text, tail) = rest.split_at(end);
        rest = tail;
        Some(Chunk { text, is_numeric })
    })
}

/// Frozen results of one suite run
///
/// A baseline is written once per `(suite, version)` and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Suite name
    pub suite: String,

    /// Version tagging this run
    pub version: Version,

    /// When the run was recorded
    pub created_at: DateTime<Utc>,

    /// Case results in case order
    pub results: Vec<CaseResult>,
}

impl Baseline {
    /// Build a baseline stamped with the current time
    pub fn new(suite: impl Into<String>, version: Version, results: Vec<CaseResult>) -> Self {
        Self {
            suite: suite.into(),
            version,
            created_at: Utc::now(),
            results,
        }
    }

    /// Result for a test case
    pub fn get(&self, testcase_id: &str) -> Option<&CaseResult> {
        self.results.iter().find(|r| r.testcase_id == testcase_id)
    }
}
