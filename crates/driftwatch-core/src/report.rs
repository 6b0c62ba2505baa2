//! Suite-level reporting
//!
//! Aggregates per-case [`ComparisonReport`]s into a [`SuiteReport`] with a
//! summary and an exit status. The report serializes to JSON for downstream
//! automation and renders as text for people.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::baseline::Version;
use crate::capture::RESERVED_OUTCOME_KEY;
use crate::compare::{ComparisonReport, ComparisonStatus, DiffKind, FieldDiff};

/// Counts per comparison status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of compared cases
    pub total: usize,
    /// Cases that matched
    pub matched: usize,
    /// Cases with differences or failures
    pub mismatched: usize,
    /// Cases without a baseline result
    pub missing_in_baseline: usize,
    /// Baseline cases that did not run
    pub missing_in_current: usize,
    /// `missing_in_baseline + missing_in_current`
    pub missing: usize,
}

impl Summary {
    /// Exit status implied by these counts
    pub fn exit_status(&self) -> ExitStatus {
        if self.matched == self.total {
            ExitStatus::AllMatch
        } else {
            ExitStatus::Drift
        }
    }
}

/// Process exit status derived from a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Every case matched
    AllMatch,
    /// At least one case mismatched or was missing on one side
    Drift,
}

impl ExitStatus {
    /// Numeric process exit code
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::AllMatch => 0,
            ExitStatus::Drift => 1,
        }
    }
}

/// Count statuses in `reports`
pub fn summarize(reports: &[ComparisonReport]) -> Summary {
    let mut summary = Summary {
        total: reports.len(),
        ..Summary::default()
    };
    for report in reports {
        match report.status {
            ComparisonStatus::Match => summary.matched += 1,
            ComparisonStatus::Mismatch => summary.mismatched += 1,
            ComparisonStatus::MissingInBaseline => summary.missing_in_baseline += 1,
            ComparisonStatus::MissingInCurrent => summary.missing_in_current += 1,
        }
    }
    summary.missing = summary.missing_in_baseline + summary.missing_in_current;
    summary
}

/// Machine-readable report of one comparison between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Suite name
    pub suite: String,
    /// Version used as the reference, if any existed
    pub baseline_version: Option<Version>,
    /// Version under test
    pub current_version: Version,
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Status counts
    pub summary: Summary,
    /// Every per-case report, verbatim
    pub reports: Vec<ComparisonReport>,
}

impl SuiteReport {
    /// Build a report and its summary
    pub fn new(
        suite: impl Into<String>,
        baseline_version: Option<Version>,
        current_version: Version,
        reports: Vec<ComparisonReport>,
    ) -> Self {
        Self {
            suite: suite.into(),
            baseline_version,
            current_version,
            generated_at: Utc::now(),
            summary: summarize(&reports),
            reports,
        }
    }

    /// Exit status implied by the summary
    pub fn exit_status(&self) -> ExitStatus {
        self.summary.exit_status()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Render a report for terminal output
pub fn render_human(report: &SuiteReport) -> String {
    let mut out = String::new();

    match &report.baseline_version {
        Some(baseline) => {
            let _ = writeln!(
                out,
                "Suite {}: comparing {} against baseline {}",
                report.suite, report.current_version, baseline
            );
        }
        None => {
            let _ = writeln!(
                out,
                "Suite {}: no baseline to compare {} against",
                report.suite, report.current_version
            );
        }
    }

    for case in &report.reports {
        let (mark, label) = match case.status {
            ComparisonStatus::Match => ("✓", String::new()),
            ComparisonStatus::Mismatch => (
                "✗",
                format!(" ({} difference{})", case.differences.len(), plural(case.differences.len())),
            ),
            ComparisonStatus::MissingInBaseline => ("?", " (new: missing in baseline)".to_string()),
            ComparisonStatus::MissingInCurrent => ("?", " (missing in current run)".to_string()),
        };
        let _ = writeln!(out, "  {} {}{}", mark, case.testcase_id, label);
        let shown = case.differences.iter().filter(|diff| {
            case.status == ComparisonStatus::Mismatch || diff.key == RESERVED_OUTCOME_KEY
        });
        for diff in shown {
            let _ = writeln!(out, "      {}", render_diff(diff));
        }
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "{} cases: {} matched, {} mismatched, {} missing",
        s.total, s.matched, s.mismatched, s.missing
    );
    out
}

fn render_diff(diff: &FieldDiff) -> String {
    let show = |v: &Option<crate::value::Value>| match v {
        Some(v) => v.to_string(),
        None => "<absent>".to_string(),
    };
    match diff.kind {
        DiffKind::Changed => format!(
            "{}: {} → {}",
            diff.key,
            show(&diff.baseline_value),
            show(&diff.current_value)
        ),
        DiffKind::MissingInBaseline => {
            format!("{}: added {}", diff.key, show(&diff.current_value))
        }
        DiffKind::MissingInCurrent => {
            format!("{}: removed {}", diff.key, show(&diff.baseline_value))
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
