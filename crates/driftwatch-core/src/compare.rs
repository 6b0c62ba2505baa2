//! Structural comparison of captured results
//!
//! The comparator walks two [`CaseResult`]s key by key and reports the
//! deepest paths at which their values differ. Keys are visited in sorted
//! order, so the same pair of inputs always yields the same report.
//!
//! # Paths
//!
//! Nested mapping entries are addressed as `key.child`, sequence elements as
//! `key[3]`. Tolerances are declared per top-level key and apply only to a
//! numeric value stored directly under that key.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::baseline::Baseline;
use crate::capture::RESERVED_OUTCOME_KEY;
use crate::case::CaseResult;
use crate::value::Value;

/// Allowed numeric deviation for a key
///
/// Written in configuration as `{ absolute: 0.5 }` or `{ relative: 0.01 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ToleranceRepr", into = "ToleranceRepr")]
pub enum ToleranceSpec {
    /// `|baseline - current| <= tolerance`
    Absolute(f64),
    /// `|baseline - current| <= tolerance * max(|baseline|, |current|)`
    Relative(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToleranceRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    absolute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relative: Option<f64>,
}

impl TryFrom<ToleranceRepr> for ToleranceSpec {
    type Error = String;

    fn try_from(repr: ToleranceRepr) -> Result<Self, Self::Error> {
        match (repr.absolute, repr.relative) {
            (Some(t), None) => Ok(ToleranceSpec::Absolute(t)),
            (None, Some(t)) => Ok(ToleranceSpec::Relative(t)),
            _ => Err("tolerance must declare exactly one of `absolute` or `relative`".to_string()),
        }
    }
}

impl From<ToleranceSpec> for ToleranceRepr {
    fn from(spec: ToleranceSpec) -> Self {
        match spec {
            ToleranceSpec::Absolute(t) => Self {
                absolute: Some(t),
                relative: None,
            },
            ToleranceSpec::Relative(t) => Self {
                absolute: None,
                relative: Some(t),
            },
        }
    }
}

impl ToleranceSpec {
    /// The declared bound
    pub fn bound(&self) -> f64 {
        match self {
            ToleranceSpec::Absolute(t) | ToleranceSpec::Relative(t) => *t,
        }
    }

    fn accepts(&self, baseline: f64, current: f64) -> bool {
        if baseline == current {
            return true;
        }
        let delta = (baseline - current).abs();
        match self {
            ToleranceSpec::Absolute(t) => delta <= *t,
            ToleranceSpec::Relative(t) => delta <= *t * baseline.abs().max(current.abs()),
        }
    }
}

/// Classification of one test case across two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    /// Same outcome (success) and no differences
    Match,
    /// At least one difference, or a failed execution on either side
    Mismatch,
    /// Case ran now but has no baseline result
    MissingInBaseline,
    /// Case has a baseline result but did not run now
    MissingInCurrent,
}

/// What kind of difference a [`FieldDiff`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Present on both sides with different values
    Changed,
    /// Only present in the current results
    MissingInBaseline,
    /// Only present in the baseline results
    MissingInCurrent,
}

impl DiffKind {
    fn swapped(self) -> Self {
        match self {
            DiffKind::Changed => DiffKind::Changed,
            DiffKind::MissingInBaseline => DiffKind::MissingInCurrent,
            DiffKind::MissingInCurrent => DiffKind::MissingInBaseline,
        }
    }
}

/// A single difference at one path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Path of the differing value
    pub key: String,
    /// Kind of difference
    pub kind: DiffKind,
    /// Value in the baseline, if present
    pub baseline_value: Option<Value>,
    /// Value in the current results, if present
    pub current_value: Option<Value>,
}

impl FieldDiff {
    fn changed(key: String, baseline: &Value, current: &Value) -> Self {
        Self {
            key,
            kind: DiffKind::Changed,
            baseline_value: Some(baseline.clone()),
            current_value: Some(current.clone()),
        }
    }

    fn only_in_current(key: String, current: &Value) -> Self {
        Self {
            key,
            kind: DiffKind::MissingInBaseline,
            baseline_value: None,
            current_value: Some(current.clone()),
        }
    }

    fn only_in_baseline(key: String, baseline: &Value) -> Self {
        Self {
            key,
            kind: DiffKind::MissingInCurrent,
            baseline_value: Some(baseline.clone()),
            current_value: None,
        }
    }

    /// The same difference seen from the other side
    pub fn swapped(&self) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind.swapped(),
            baseline_value: self.current_value.clone(),
            current_value: self.baseline_value.clone(),
        }
    }
}

/// Comparison result for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Test case id
    pub testcase_id: String,
    /// Classification
    pub status: ComparisonStatus,
    /// Differences, ordered by path
    pub differences: Vec<FieldDiff>,
}

impl ComparisonReport {
    /// Whether the case matched its baseline
    pub fn is_match(&self) -> bool {
        self.status == ComparisonStatus::Match
    }
}

/// Compares case results, honoring per-key numeric tolerances
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    tolerances: BTreeMap<String, ToleranceSpec>,
}

impl Comparator {
    /// Comparator with the given top-level tolerances
    pub fn new(tolerances: BTreeMap<String, ToleranceSpec>) -> Self {
        Self { tolerances }
    }

    /// Compare a baseline result with a current result of the same case
    pub fn compare(&self, baseline: &CaseResult, current: &CaseResult) -> ComparisonReport {
        let mut differences = Vec::new();

        if !baseline.outcome.is_success() || !current.outcome.is_success() {
            differences.push(FieldDiff::changed(
                RESERVED_OUTCOME_KEY.to_string(),
                &baseline.outcome.as_value(),
                &current.outcome.as_value(),
            ));
        }

        for key in union_keys(&baseline.entries, &current.entries) {
            match (baseline.get(key), current.get(key)) {
                (Some(b), Some(c)) => {
                    diff_values(key.to_string(), b, c, self.tolerances.get(key), &mut differences)
                }
                (Some(b), None) => differences.push(FieldDiff::only_in_baseline(key.to_string(), b)),
                (None, Some(c)) => differences.push(FieldDiff::only_in_current(key.to_string(), c)),
                (None, None) => {}
            }
        }

        let status = if differences.is_empty() {
            ComparisonStatus::Match
        } else {
            ComparisonStatus::Mismatch
        };

        ComparisonReport {
            testcase_id: current.testcase_id.clone(),
            status,
            differences,
        }
    }

    /// Report for a case that has no baseline result
    ///
    /// A failed case leads with an `outcome` diff so the failure stays visible.
    pub fn missing_in_baseline(current: &CaseResult) -> ComparisonReport {
        let failure = (!current.outcome.is_success()).then(|| {
            FieldDiff::only_in_current(RESERVED_OUTCOME_KEY.to_string(), &current.outcome.as_value())
        });
        ComparisonReport {
            testcase_id: current.testcase_id.clone(),
            status: ComparisonStatus::MissingInBaseline,
            differences: failure
                .into_iter()
                .chain(
                    current
                        .entries
                        .values()
                        .map(|e| FieldDiff::only_in_current(e.key.clone(), &e.value)),
                )
                .collect(),
        }
    }

    /// Report for a baseline case that did not run
    pub fn missing_in_current(baseline: &CaseResult) -> ComparisonReport {
        let failure = (!baseline.outcome.is_success()).then(|| {
            FieldDiff::only_in_baseline(RESERVED_OUTCOME_KEY.to_string(), &baseline.outcome.as_value())
        });
        ComparisonReport {
            testcase_id: baseline.testcase_id.clone(),
            status: ComparisonStatus::MissingInCurrent,
            differences: failure
                .into_iter()
                .chain(
                    baseline
                        .entries
                        .values()
                        .map(|e| FieldDiff::only_in_baseline(e.key.clone(), &e.value)),
                )
                .collect(),
        }
    }

    /// Compare a whole run against a stored baseline
    ///
    /// Reports follow the current case order; baseline cases that did not
    /// run are appended in baseline order. Without a baseline every current
    /// case is `MissingInBaseline`.
    pub fn compare_suites(
        &self,
        baseline: Option<&Baseline>,
        current: &[CaseResult],
    ) -> Vec<ComparisonReport> {
        let Some(baseline) = baseline else {
            return current.iter().map(Self::missing_in_baseline).collect();
        };

        let mut reports: Vec<ComparisonReport> = current
            .iter()
            .map(|cur| match baseline.get(&cur.testcase_id) {
                Some(base) => self.compare(base, cur),
                None => Self::missing_in_baseline(cur),
            })
            .collect();

        let ran: HashSet<&str> = current.iter().map(|r| r.testcase_id.as_str()).collect();
        reports.extend(
            baseline
                .results
                .iter()
                .filter(|base| !ran.contains(base.testcase_id.as_str()))
                .map(Self::missing_in_current),
        );
        reports
    }
}

fn union_keys<'a, V>(a: &'a BTreeMap<String, V>, b: &'a BTreeMap<String, V>) -> BTreeSet<&'a str> {
    a.keys().chain(b.keys()).map(String::as_str).collect()
}

fn diff_values(
    path: String,
    baseline: &Value,
    current: &Value,
    tolerance: Option<&ToleranceSpec>,
    out: &mut Vec<FieldDiff>,
) {
    if let Some(tolerance) = tolerance
        && let (Some(b), Some(c)) = (baseline.as_f64(), current.as_f64())
    {
        if !tolerance.accepts(b, c) {
            out.push(FieldDiff::changed(path, baseline, current));
        }
        return;
    }

    match (baseline, current) {
        (Value::Sequence(b), Value::Sequence(c)) => {
            for i in 0..b.len().max(c.len()) {
                let child = format!("{}[{}]", path, i);
                match (b.get(i), c.get(i)) {
                    (Some(bv), Some(cv)) => diff_values(child, bv, cv, None, out),
                    (Some(bv), None) => out.push(FieldDiff::only_in_baseline(child, bv)),
                    (None, Some(cv)) => out.push(FieldDiff::only_in_current(child, cv)),
                    (None, None) => {}
                }
            }
        }
        (Value::Mapping(b), Value::Mapping(c)) => {
            for key in union_keys(b, c) {
                let child = format!("{}.{}", path, key);
                match (b.get(key), c.get(key)) {
                    (Some(bv), Some(cv)) => diff_values(child, bv, cv, None, out),
                    (Some(bv), None) => out.push(FieldDiff::only_in_baseline(child, bv)),
                    (None, Some(cv)) => out.push(FieldDiff::only_in_current(child, cv)),
                    (None, None) => {}
                }
            }
        }
        // Blobs compare on hash and size together; either mismatch is drift.
        (b, c) => {
            if b != c {
                out.push(FieldDiff::changed(path, b, c));
            }
        }
    }
}
