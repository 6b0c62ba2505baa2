//! Per-execution result capture
//!
//! A [`CaseContext`] is created for every test case execution and handed to
//! the workflow. Captured entries are buffered inside the context and only
//! become a [`CaseResult`] when the scheduler calls [`CaseContext::finish`].
//! After that point every clone of the context rejects further captures, so
//! work abandoned after a timeout can never alter a frozen result.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::case::{CaseResult, EntryKind, Outcome, ResultEntry, TestCase};
use crate::value::{BlobDescriptor, IntoValue, Value};

/// Key reserved for the comparator's synthetic outcome diff
pub const RESERVED_OUTCOME_KEY: &str = "outcome";

/// Errors raised by capture calls
///
/// Except for `InvalidState`, the first capture error of a case is remembered
/// and fails the case when it finishes, even if the workflow ignored it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The test case execution already finished
    #[error("test case '{testcase}' is no longer active; cannot capture '{key}'")]
    InvalidState {
        /// Test case id
        testcase: String,
        /// Key of the rejected capture
        key: String,
    },

    /// Empty key
    #[error("test case '{testcase}': result key must not be empty")]
    EmptyKey {
        /// Test case id
        testcase: String,
    },

    /// Key reserved by the engine
    #[error("test case '{testcase}': key '{key}' is reserved")]
    ReservedKey {
        /// Test case id
        testcase: String,
        /// The reserved key
        key: String,
    },

    /// Key captured more than once
    #[error("test case '{testcase}': key '{key}' was already captured")]
    DuplicateKey {
        /// Test case id
        testcase: String,
        /// The duplicated key
        key: String,
    },

    /// Value cannot be stored faithfully
    #[error("test case '{testcase}': invalid value for '{key}': {message}")]
    InvalidValue {
        /// Test case id
        testcase: String,
        /// Key of the rejected value
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// `stop_timer` without a matching `start_timer`
    #[error("test case '{testcase}': timer '{key}' was never started")]
    TimerNotStarted {
        /// Test case id
        testcase: String,
        /// Timer key
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accumulator {
    HitCount,
    Array,
}

#[derive(Debug, Default)]
struct Scope {
    finished: bool,
    entries: BTreeMap<String, ResultEntry>,
    accumulators: HashMap<String, Accumulator>,
    metrics: BTreeMap<String, Duration>,
    timers: HashMap<String, Instant>,
    artifacts: BTreeMap<String, Vec<u8>>,
    first_error: Option<CaptureError>,
}

/// Capture handle for one test case execution
///
/// Cloning is cheap; all clones share the same buffered result.
#[derive(Debug, Clone)]
pub struct CaseContext {
    testcase: Arc<TestCase>,
    scope: Arc<Mutex<Scope>>,
    cancel: CancellationToken,
}

impl CaseContext {
    /// Open a capture scope for `testcase`
    pub fn new(testcase: TestCase, cancel: CancellationToken) -> Self {
        Self {
            testcase: Arc::new(testcase),
            scope: Arc::new(Mutex::new(Scope::default())),
            cancel,
        }
    }

    /// Id of the test case being executed
    pub fn id(&self) -> &str {
        &self.testcase.id
    }

    /// The test case being executed
    pub fn testcase(&self) -> &TestCase {
        &self.testcase
    }

    /// Look up a test case parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.testcase.parameters.get(name).map(String::as_str)
    }

    /// Whether cancellation was requested for this execution
    ///
    /// Cancellation is cooperative: the engine cannot stop a running
    /// workflow, so long-running workflows should poll this.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancellation token for this execution
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record `value` under `key`
    pub fn capture(&self, key: &str, value: impl IntoValue) -> Result<(), CaptureError> {
        self.insert(key, value.into_value(), EntryKind::Result)
    }

    /// Record an assertion about the case's inputs under `key`
    ///
    /// Assertions share the key space of results and are compared the same
    /// way; they are stored flagged so readers can tell them apart.
    pub fn add_assertion(&self, key: &str, value: impl IntoValue) -> Result<(), CaptureError> {
        self.insert(key, value.into_value(), EntryKind::Assertion)
    }

    fn insert(&self, key: &str, value: Value, kind: EntryKind) -> Result<(), CaptureError> {
        let mut scope = self.lock();
        let result = self.check_new_key(&scope, key, &value).map(|()| {
            let entry = ResultEntry {
                kind,
                ..ResultEntry::new(key, value)
            };
            scope.entries.insert(key.to_string(), entry);
        });
        self.record(&mut scope, result)
    }

    /// Increment the integer counter stored under `key`, creating it at 1
    pub fn add_hit_count(&self, key: &str) -> Result<(), CaptureError> {
        let mut scope = self.lock();
        let result = self
            .accumulate(&mut scope, key, Accumulator::HitCount, Value::Int(1))
            .map(|entry| {
                if let Some(entry) = entry
                    && let Value::Int(count) = &mut entry.value
                {
                    *count = count.saturating_add(1);
                }
            });
        self.record(&mut scope, result)
    }

    /// Append `value` to the sequence stored under `key`, creating it on first use
    pub fn add_array_element(&self, key: &str, value: impl IntoValue) -> Result<(), CaptureError> {
        let value = value.into_value();
        let mut scope = self.lock();
        let result = match value.validate() {
            Err(message) => Err(CaptureError::InvalidValue {
                testcase: self.id().to_string(),
                key: key.to_string(),
                message,
            }),
            Ok(()) => self
                .accumulate(
                    &mut scope,
                    key,
                    Accumulator::Array,
                    Value::Sequence(vec![value.clone()]),
                )
                .map(|entry| {
                    if let Some(entry) = entry
                        && let Value::Sequence(items) = &mut entry.value
                    {
                        items.push(value);
                    }
                }),
        };
        self.record(&mut scope, result)
    }

    /// Capture `bytes` as an artifact under `key`
    ///
    /// The bytes are hashed with SHA-256, a [`BlobDescriptor`] is captured
    /// as the value, and the bytes are kept with the result so the baseline
    /// store can persist them content-addressed.
    pub fn capture_artifact(
        &self,
        key: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<BlobDescriptor, CaptureError> {
        let bytes = bytes.into();
        let blob = BlobDescriptor::of(&bytes);
        let value = Value::Blob(blob.clone());
        let mut scope = self.lock();
        let result = self.check_new_key(&scope, key, &value).map(|()| {
            scope.entries.insert(key.to_string(), ResultEntry::new(key, value));
            scope.artifacts.insert(blob.hash.clone(), bytes);
        });
        self.record(&mut scope, result).map(|()| blob)
    }

    /// Start (or restart) the timer `key`
    pub fn start_timer(&self, key: &str) -> Result<(), CaptureError> {
        let mut scope = self.lock();
        let result = self.check_metric_key(&scope, key).map(|()| {
            scope.timers.insert(key.to_string(), Instant::now());
        });
        self.record(&mut scope, result)
    }

    /// Stop the timer `key` and record its elapsed time as a metric
    pub fn stop_timer(&self, key: &str) -> Result<(), CaptureError> {
        let mut scope = self.lock();
        let result = self.check_metric_key(&scope, key).and_then(|()| {
            let started = scope
                .timers
                .remove(key)
                .ok_or_else(|| CaptureError::TimerNotStarted {
                    testcase: self.id().to_string(),
                    key: key.to_string(),
                })?;
            scope.metrics.insert(key.to_string(), started.elapsed());
            Ok(())
        });
        self.record(&mut scope, result)
    }

    /// Start the timer `key` and stop it when the returned guard is dropped
    pub fn scoped_timer(&self, key: &str) -> Result<ScopedTimer, CaptureError> {
        self.start_timer(key)?;
        Ok(ScopedTimer {
            ctx: self.clone(),
            key: key.to_string(),
        })
    }

    /// Record a duration measured elsewhere
    pub fn add_metric(&self, key: &str, duration: Duration) -> Result<(), CaptureError> {
        let mut scope = self.lock();
        let result = self.check_metric_key(&scope, key).map(|()| {
            scope.metrics.insert(key.to_string(), duration);
        });
        self.record(&mut scope, result)
    }

    /// Freeze the scope and produce the case result
    ///
    /// Called once by the scheduler when the execution unit ends. A capture
    /// error recorded during the execution downgrades a `Success` outcome to
    /// a failure. Entries are kept regardless of the outcome.
    pub fn finish(&self, outcome: Outcome) -> Result<CaseResult, CaptureError> {
        let mut scope = self.lock();
        if scope.finished {
            return Err(CaptureError::InvalidState {
                testcase: self.id().to_string(),
                key: RESERVED_OUTCOME_KEY.to_string(),
            });
        }
        scope.finished = true;

        let outcome = match (outcome, scope.first_error.take()) {
            (Outcome::Success, Some(err)) => Outcome::Failure(err.to_string()),
            (outcome, _) => outcome,
        };

        Ok(CaseResult {
            testcase_id: self.id().to_string(),
            entries: std::mem::take(&mut scope.entries),
            outcome,
            metrics: std::mem::take(&mut scope.metrics),
            duration: Duration::ZERO,
            artifacts: std::mem::take(&mut scope.artifacts),
        })
    }

    // A panicking workflow must not poison the scope for the scheduler.
    fn lock(&self) -> MutexGuard<'_, Scope> {
        self.scope.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_key(&self, scope: &Scope, key: &str) -> Result<(), CaptureError> {
        if scope.finished {
            return Err(CaptureError::InvalidState {
                testcase: self.id().to_string(),
                key: key.to_string(),
            });
        }
        if key.is_empty() {
            return Err(CaptureError::EmptyKey {
                testcase: self.id().to_string(),
            });
        }
        if key == RESERVED_OUTCOME_KEY {
            return Err(CaptureError::ReservedKey {
                testcase: self.id().to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn check_new_key(&self, scope: &Scope, key: &str, value: &Value) -> Result<(), CaptureError> {
        self.check_key(scope, key)?;
        if scope.entries.contains_key(key) {
            return Err(CaptureError::DuplicateKey {
                testcase: self.id().to_string(),
                key: key.to_string(),
            });
        }
        value.validate().map_err(|message| CaptureError::InvalidValue {
            testcase: self.id().to_string(),
            key: key.to_string(),
            message,
        })
    }

    fn check_metric_key(&self, scope: &Scope, key: &str) -> Result<(), CaptureError> {
        if scope.finished {
            return Err(CaptureError::InvalidState {
                testcase: self.id().to_string(),
                key: key.to_string(),
            });
        }
        if key.is_empty() {
            return Err(CaptureError::EmptyKey {
                testcase: self.id().to_string(),
            });
        }
        Ok(())
    }

    /// Returns the existing entry to update, or `None` after inserting `initial`.
    fn accumulate<'a>(
        &self,
        scope: &'a mut Scope,
        key: &str,
        kind: Accumulator,
        initial: Value,
    ) -> Result<Option<&'a mut ResultEntry>, CaptureError> {
        self.check_key(scope, key)?;
        match scope.accumulators.get(key).copied() {
            Some(existing) if existing == kind => Ok(scope.entries.get_mut(key)),
            Some(_) => Err(CaptureError::DuplicateKey {
                testcase: self.id().to_string(),
                key: key.to_string(),
            }),
            None if scope.entries.contains_key(key) => Err(CaptureError::DuplicateKey {
                testcase: self.id().to_string(),
                key: key.to_string(),
            }),
            None => {
                scope.accumulators.insert(key.to_string(), kind);
                scope.entries.insert(
                    key.to_string(),
                    ResultEntry::new(key, initial),
                );
                Ok(None)
            }
        }
    }

    fn record(
        &self,
        scope: &mut Scope,
        result: Result<(), CaptureError>,
    ) -> Result<(), CaptureError> {
        if let Err(err) = &result
            && !matches!(err, CaptureError::InvalidState { .. })
            && scope.first_error.is_none()
        {
            tracing::warn!(testcase = %self.id(), "{}", err);
            scope.first_error = Some(err.clone());
        }
        result
    }
}

/// Guard returned by [`CaseContext::scoped_timer`]
#[derive(Debug)]
pub struct ScopedTimer {
    ctx: CaseContext,
    key: String,
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        // The scope may have been frozen by a timeout in the meantime.
        let _ = self.ctx.stop_timer(&self.key);
    }
}
