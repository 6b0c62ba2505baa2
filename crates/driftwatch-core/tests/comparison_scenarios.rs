//! End-to-end comparison scenarios over the public core API
//!
//! Results are captured through `CaseContext` exactly as a workflow would,
//! frozen into baselines, and compared across versions.

use std::collections::BTreeMap;

use driftwatch_core::{
    Baseline, CaptureError, CaseContext, CaseResult, Comparator, ComparisonStatus, DiffKind,
    ExitStatus, Outcome, SuiteReport, TestCase, ToleranceSpec, Value, Version, render_human,
};
use tokio_util::sync::CancellationToken;

/// Run `body` inside a fresh capture scope and freeze the result
fn capture(id: &str, body: impl FnOnce(&CaseContext) -> Result<(), CaptureError>) -> CaseResult {
    let ctx = CaseContext::new(TestCase::new(id), CancellationToken::new());
    let outcome = match body(&ctx) {
        Ok(()) => Outcome::Success,
        Err(err) => Outcome::failure(err.to_string()),
    };
    ctx.finish(outcome).unwrap()
}

fn version(v: &str) -> Version {
    Version::new(v).unwrap()
}

#[test]
fn test_rose_identical_hash_matches() {
    let v1 = capture("rose", |ctx| ctx.capture("hash", "abc123"));
    let v2 = capture("rose", |ctx| ctx.capture("hash", "abc123"));

    let report = Comparator::default().compare(&v1, &v2);
    assert_eq!(report.status, ComparisonStatus::Match);
    assert!(report.differences.is_empty());
}

#[test]
fn test_tulip_changed_hash_mismatches() {
    let v1 = capture("tulip", |ctx| ctx.capture("hash", "abc123"));
    let v2 = capture("tulip", |ctx| ctx.capture("hash", "def456"));

    let report = Comparator::default().compare(&v1, &v2);
    assert_eq!(report.status, ComparisonStatus::Mismatch);
    assert_eq!(report.differences.len(), 1);
    let diff = &report.differences[0];
    assert_eq!(diff.key, "hash");
    assert_eq!(diff.kind, DiffKind::Changed);
    assert_eq!(diff.baseline_value, Some(Value::String("abc123".to_string())));
    assert_eq!(diff.current_value, Some(Value::String("def456".to_string())));
}

#[test]
fn test_lily_missing_from_current_run() {
    let v1 = Baseline::new(
        "flowers",
        version("1"),
        vec![
            capture("rose", |ctx| ctx.capture("hash", "abc123")),
            capture("lily", |ctx| ctx.capture("hash", "aaa111")),
        ],
    );
    let v2 = vec![capture("rose", |ctx| ctx.capture("hash", "abc123"))];

    let reports = Comparator::default().compare_suites(Some(&v1), &v2);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].testcase_id, "lily");
    assert_eq!(reports[1].status, ComparisonStatus::MissingInCurrent);

    let suite = SuiteReport::new("flowers", Some(version("1")), version("2"), reports);
    assert_eq!(suite.summary.missing_in_current, 1);
    assert_eq!(suite.exit_status(), ExitStatus::Drift);
    assert_eq!(suite.exit_status().code(), 1);
}

#[test]
fn test_orchid_duplicate_capture_fails_only_orchid() {
    let orchid = capture("orchid", |ctx| {
        ctx.capture("a", 1)?;
        // The workflow ignores the duplicate-key error; the case still fails.
        let _ = ctx.capture("a", 2);
        Ok(())
    });
    let rose = capture("rose", |ctx| ctx.capture("hash", "abc123"));

    assert!(!orchid.outcome.is_success());
    assert!(orchid.outcome.to_string().contains("already captured"));
    assert_eq!(orchid.get("a"), Some(&Value::Int(1)));
    assert!(rose.outcome.is_success());

    let baseline = Baseline::new("flowers", version("1"), vec![rose.clone(), orchid.clone()]);
    let reports = Comparator::default().compare_suites(Some(&baseline), &[rose, orchid]);
    assert_eq!(reports[0].status, ComparisonStatus::Match);
    // Identical failures still never match.
    assert_eq!(reports[1].status, ComparisonStatus::Mismatch);
    assert_eq!(reports[1].differences[0].key, "outcome");
}

#[test]
fn test_comparison_symmetry() {
    let baseline = Baseline::new(
        "flowers",
        version("1"),
        vec![
            capture("rose", |ctx| ctx.capture("hash", "abc123")),
            capture("lily", |ctx| ctx.capture("hash", "aaa111")),
        ],
    );
    let current = Baseline::new(
        "flowers",
        version("2"),
        vec![
            capture("rose", |ctx| ctx.capture("hash", "abc123")),
            capture("iris", |ctx| ctx.capture("hash", "bbb222")),
        ],
    );
    let comparator = Comparator::default();

    let forward = comparator.compare_suites(Some(&baseline), &current.results);
    let backward = comparator.compare_suites(Some(&current), &baseline.results);

    let status_of = |reports: &[driftwatch_core::ComparisonReport], id: &str| {
        reports
            .iter()
            .find(|r| r.testcase_id == id)
            .map(|r| r.status)
    };
    assert_eq!(status_of(&forward, "iris"), Some(ComparisonStatus::MissingInBaseline));
    assert_eq!(status_of(&backward, "iris"), Some(ComparisonStatus::MissingInCurrent));
    assert_eq!(status_of(&forward, "lily"), Some(ComparisonStatus::MissingInCurrent));
    assert_eq!(status_of(&backward, "lily"), Some(ComparisonStatus::MissingInBaseline));
    assert_eq!(status_of(&forward, "rose"), Some(ComparisonStatus::Match));
    assert_eq!(status_of(&backward, "rose"), Some(ComparisonStatus::Match));
}

#[test]
fn test_tolerance_accepts_small_drift() {
    let v1 = capture("rose", |ctx| {
        ctx.capture("psnr", 31.2)?;
        ctx.capture("width", 640)
    });
    let v2 = capture("rose", |ctx| {
        ctx.capture("psnr", 31.5)?;
        ctx.capture("width", 640)
    });

    let exact = Comparator::default().compare(&v1, &v2);
    assert_eq!(exact.status, ComparisonStatus::Mismatch);

    let tolerant = Comparator::new(BTreeMap::from([(
        "psnr".to_string(),
        ToleranceSpec::Absolute(0.5),
    )]))
    .compare(&v1, &v2);
    assert_eq!(tolerant.status, ComparisonStatus::Match);
}

#[test]
fn test_baseline_survives_serialization() {
    let baseline = Baseline::new(
        "flowers",
        version("20240101120000"),
        vec![capture("rose", |ctx| {
            ctx.capture("hash", "abc123")?;
            ctx.add_hit_count("petals")?;
            ctx.add_hit_count("petals")?;
            ctx.add_array_element("colors", "red")?;
            ctx.capture_artifact("thumbnail", b"\x89PNG".to_vec())?;
            Ok(())
        })],
    );

    let json = serde_json::to_string(&baseline).unwrap();
    let restored: Baseline = serde_json::from_str(&json).unwrap();

    let reports = Comparator::default().compare_suites(Some(&restored), &baseline.results);
    assert!(reports.iter().all(|r| r.is_match()));
    assert_eq!(restored.results[0].get("petals"), Some(&Value::Int(2)));

    let text = render_human(&SuiteReport::new(
        "flowers",
        Some(restored.version.clone()),
        version("20240101120001"),
        reports,
    ));
    assert!(text.contains("1 cases: 1 matched"));
}
