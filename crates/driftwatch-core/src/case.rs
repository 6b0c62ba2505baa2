//! Test cases and their captured results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::value::Value;

/// One named scenario of a suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Identifier, unique within a suite run
    pub id: String,

    /// Optional inputs handed to the workflow
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl TestCase {
    /// Create a test case without parameters
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// How a test case execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    /// The workflow returned normally and every capture succeeded
    Success,
    /// The workflow failed, panicked, timed out or misused capture
    Failure(String),
}

impl Outcome {
    /// Shorthand for building a failure
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(message.into())
    }

    /// Whether this is `Success`
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Representation used for the synthetic `outcome` diff
    pub fn as_value(&self) -> Value {
        match self {
            Outcome::Success => Value::String("success".to_string()),
            Outcome::Failure(message) => Value::String(format!("failure: {}", message)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure(message) => write!(f, "failure: {}", message),
        }
    }
}

/// Role of a captured entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Output of the code under test
    #[default]
    Result,
    /// Precondition the workflow checked on its inputs
    Assertion,
}

impl EntryKind {
    fn is_result(&self) -> bool {
        *self == EntryKind::Result
    }
}

/// One captured key/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Key, unique within its case
    pub key: String,
    /// Captured value
    pub value: Value,
    /// Result or assertion; omitted from JSON for plain results
    #[serde(default, skip_serializing_if = "EntryKind::is_result")]
    pub kind: EntryKind,
}

impl ResultEntry {
    /// Plain result entry
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            kind: EntryKind::Result,
        }
    }
}

/// Frozen result of one test case execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Test case this result belongs to
    pub testcase_id: String,

    /// Captured entries by key
    #[serde(default)]
    pub entries: BTreeMap<String, ResultEntry>,

    /// How the execution ended
    pub outcome: Outcome,

    /// Workflow-recorded timings (reported, never compared)
    #[serde(default)]
    pub metrics: BTreeMap<String, Duration>,

    /// Wall time of the whole execution unit
    #[serde(default)]
    pub duration: Duration,

    /// Artifact bytes attached during capture, keyed by SHA-256 hash
    ///
    /// Held in memory only until the store persists them content-addressed.
    #[serde(skip)]
    pub artifacts: BTreeMap<String, Vec<u8>>,
}

impl CaseResult {
    /// An empty result with the given outcome
    pub fn new(testcase_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            testcase_id: testcase_id.into(),
            entries: BTreeMap::new(),
            outcome,
            metrics: BTreeMap::new(),
            duration: Duration::ZERO,
            artifacts: BTreeMap::new(),
        }
    }

    /// Look up a captured value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert an entry directly, bypassing capture rules.
    ///
    /// Meant for building expected results in tests and tooling; workflows
    /// go through [`crate::CaseContext`].
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        self.entries.insert(key.clone(), ResultEntry::new(key, value));
        self
    }
}
