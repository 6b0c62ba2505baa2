//! Integration tests for the runtime pipeline
//!
//! Local tests use temporary store directories. Remote tests run an
//! in-process HTTP server implementing the store API so the real client,
//! status mapping and artifact upload paths are exercised.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use driftwatch_core::{
    Baseline, CaseContext, CaseSource, ComparisonStatus, ExitStatus, Outcome, RemoteConfig,
    TestCase, Value, Version,
};
use driftwatch_runtime::{
    BaselineStore, Harness, LocalStore, Registry, RemoteStore, RunOptions, StoreError, Workflow,
    transfer,
};

const API_KEY: &str = "secret";

// =============================================================================
// Fake remote store
// =============================================================================

#[derive(Default)]
struct FakeServer {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    baselines: Mutex<BTreeMap<(String, String), serde_json::Value>>,
}

type Shared = Arc<FakeServer>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", API_KEY))
}

async fn put_blob(
    State(server): State<Shared>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    server.blobs.lock().unwrap().insert(hash, body.to_vec());
    StatusCode::CREATED
}

async fn get_blob(
    State(server): State<Shared>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Result<Vec<u8>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    server
        .blobs
        .lock()
        .unwrap()
        .get(&hash)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn put_version(
    State(server): State<Shared>,
    Path((suite, version)): Path<(String, String)>,
    headers: HeaderMap,
    Json(baseline): Json<serde_json::Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut baselines = server.baselines.lock().unwrap();
    if baselines.contains_key(&(suite.clone(), version.clone())) {
        return StatusCode::CONFLICT;
    }
    baselines.insert((suite, version), baseline);
    StatusCode::CREATED
}

async fn get_version(
    State(server): State<Shared>,
    Path((suite, version)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    server
        .baselines
        .lock()
        .unwrap()
        .get(&(suite, version))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn stored_versions(server: &FakeServer, suite: &str) -> Vec<String> {
    server
        .baselines
        .lock()
        .unwrap()
        .keys()
        .filter(|(s, _)| s == suite)
        .map(|(_, v)| v.clone())
        .collect()
}

async fn list_versions(
    State(server): State<Shared>,
    Path(suite): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(stored_versions(&server, &suite)))
}

async fn latest(
    State(server): State<Shared>,
    Path(suite): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    stored_versions(&server, &suite)
        .into_iter()
        .filter_map(|v| Version::new(v).ok())
        .max()
        .map(|v| Json(serde_json::json!({ "version": v })))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn list_cases(
    Path(suite): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if suite != "flowers" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!([
        "rose",
        { "id": "tulip", "parameters": { "size": "64" } },
        "lily"
    ])))
}

/// Start the fake server and return its base URL
async fn spawn_server() -> (String, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/api/blobs/:hash", get(get_blob).put(put_blob))
        .route(
            "/api/suites/:suite/versions/:version",
            get(get_version).put(put_version),
        )
        .route("/api/suites/:suite/versions", get(list_versions))
        .route("/api/suites/:suite/latest", get(latest))
        .route("/api/suites/:suite/cases", get(list_cases))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api", addr), state)
}

fn remote(url: &str, key: &str) -> RemoteConfig {
    RemoteConfig {
        url: url.to_string(),
        api_key: Some(key.to_string()),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn v(s: &str) -> Version {
    Version::new(s).unwrap()
}

/// Workflow "processing" an image whose content depends on `generation`
fn image_workflow(generation: u32) -> Arc<dyn Workflow> {
    Arc::new(move |ctx: &CaseContext| -> anyhow::Result<()> {
        let id = ctx.id();
        let bytes = if id == "tulip" {
            format!("{}-pixels-{}", id, generation)
        } else {
            format!("{}-pixels", id)
        };
        ctx.capture_artifact("image", bytes.into_bytes())?;
        ctx.capture("width", 640)?;
        ctx.add_hit_count("passes")?;
        {
            let _timer = ctx.scoped_timer("resize")?;
        }
        match id {
            "orchid" => {
                ctx.capture("a", 1)?;
                ctx.capture("a", 2)?;
            }
            "thorn" => panic!("unsupported format"),
            _ => {}
        }
        Ok(())
    })
}

fn flower_cases() -> Vec<TestCase> {
    ["rose", "tulip", "orchid", "thorn", "lily"]
        .into_iter()
        .map(TestCase::new)
        .collect()
}

// =============================================================================
// Local pipeline
// =============================================================================

#[tokio::test]
async fn test_local_pipeline_detects_drift_and_isolates_failures() {
    let dir = tempfile::TempDir::new().unwrap();
    let harness = Harness::new("flowers", Arc::new(LocalStore::new(dir.path()))).unwrap();
    let cases = flower_cases();

    let first = harness
        .run(&cases, image_workflow(1), RunOptions { version: Some(v("1")), compare_to: None })
        .await
        .unwrap();
    assert!(first.stored);
    assert_eq!(first.report.summary.missing_in_baseline, 5);
    assert_eq!(first.report.exit_status(), ExitStatus::Drift);

    let results = &first.baseline.results;
    assert_eq!(
        results.iter().map(|r| r.testcase_id.as_str()).collect::<Vec<_>>(),
        vec!["rose", "tulip", "orchid", "thorn", "lily"]
    );
    assert!(results[0].outcome.is_success());
    assert!(results[0].metrics.contains_key("resize"));
    assert!(matches!(&results[2].outcome, Outcome::Failure(m) if m.contains("already captured")));
    assert!(matches!(&results[3].outcome, Outcome::Failure(m) if m.contains("unsupported format")));
    assert!(results[4].outcome.is_success());

    let second = harness
        .run(&cases, image_workflow(2), RunOptions { version: Some(v("2")), compare_to: None })
        .await
        .unwrap();
    let statuses: Vec<ComparisonStatus> =
        second.report.reports.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ComparisonStatus::Match,
            ComparisonStatus::Mismatch,
            ComparisonStatus::Mismatch,
            ComparisonStatus::Mismatch,
            ComparisonStatus::Match,
        ]
    );
    let tulip = &second.report.reports[1];
    assert_eq!(tulip.differences.len(), 1);
    assert_eq!(tulip.differences[0].key, "image");
    assert_eq!(second.report.summary.mismatched, 3);
    assert_eq!(second.report.exit_status().code(), 1);

    // Comparing against an explicit older version works the same way
    let pinned = harness
        .run(&cases, image_workflow(1), RunOptions { version: Some(v("3")), compare_to: Some(v("1")) })
        .await
        .unwrap();
    assert_eq!(pinned.report.baseline_version, Some(v("1")));
    assert_eq!(pinned.report.reports[1].status, ComparisonStatus::Match);
}

// =============================================================================
// Remote store
// =============================================================================

#[tokio::test]
async fn test_remote_store_round_trip() {
    let (url, server) = spawn_server().await;
    let store = RemoteStore::new(&remote(&url, API_KEY)).unwrap();

    assert!(store.versions("flowers").await.unwrap().is_empty());
    assert!(matches!(
        store.latest_version("flowers").await,
        Err(StoreError::NotFound { .. })
    ));

    let ctx = CaseContext::new(TestCase::new("rose"), Default::default());
    ctx.capture("hash", "abc123").unwrap();
    let blob = ctx.capture_artifact("image", b"rose pixels".to_vec()).unwrap();
    let rose = ctx.finish(Outcome::Success).unwrap();

    for version in ["9", "10"] {
        store
            .put(&Baseline::new("flowers", v(version), vec![rose.clone()]))
            .await
            .unwrap();
    }
    assert!(server.blobs.lock().unwrap().contains_key(&blob.hash));

    assert_eq!(store.versions("flowers").await.unwrap(), vec![v("9"), v("10")]);
    assert_eq!(store.latest_version("flowers").await.unwrap(), v("10"));

    let mut loaded = store.get("flowers", &v("10")).await.unwrap();
    assert_eq!(loaded.results[0].entries, rose.entries);
    store.load_artifacts(&mut loaded.results[0]).await.unwrap();
    assert_eq!(loaded.results[0].artifacts, rose.artifacts);

    let conflict = store
        .put(&Baseline::new("flowers", v("10"), vec![rose]))
        .await
        .unwrap_err();
    assert!(matches!(conflict, StoreError::VersionConflict { .. }));

    assert!(matches!(
        store.get("flowers", &v("11")).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_remote_store_rejects_bad_key() {
    let (url, _server) = spawn_server().await;
    let store = RemoteStore::new(&remote(&url, "wrong")).unwrap();

    let err = store.versions("flowers").await.unwrap_err();
    assert!(matches!(err, StoreError::AuthFailure { .. }));

    let harness = Harness::new("flowers", Arc::new(store)).unwrap();
    let err = harness
        .run(&flower_cases(), image_workflow(1), RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.category().exit_code(), 3);
}

#[tokio::test]
async fn test_submit_transfers_local_versions_once() {
    let (url, server) = spawn_server().await;
    let dir = tempfile::TempDir::new().unwrap();
    let local = Harness::new("flowers", Arc::new(LocalStore::new(dir.path()))).unwrap();
    for version in ["1", "2"] {
        local
            .run(&flower_cases(), image_workflow(1), RunOptions { version: Some(v(version)), compare_to: None })
            .await
            .unwrap();
    }

    let remote_store = RemoteStore::new(&remote(&url, API_KEY)).unwrap();
    let versions = local.store().versions("flowers").await.unwrap();

    let first = transfer(local.store().as_ref(), &remote_store, "flowers", &versions)
        .await
        .unwrap();
    assert_eq!(first.submitted, vec![v("1"), v("2")]);
    assert!(first.skipped.is_empty());
    // Artifact bytes were re-hydrated from the local object store and uploaded
    let expected = driftwatch_core::value::sha256_hex(b"rose-pixels");
    assert!(server.blobs.lock().unwrap().contains_key(&expected));

    let again = transfer(local.store().as_ref(), &remote_store, "flowers", &versions)
        .await
        .unwrap();
    assert!(again.submitted.is_empty());
    assert_eq!(again.skipped, vec![v("1"), v("2")]);

    // The remote copy compares equal to the local one
    let remote_harness = Harness::new("flowers", Arc::new(remote_store)).unwrap();
    let report = remote_harness.compare_versions(&v("1"), &v("2")).await.unwrap();
    assert_eq!(report.summary.matched, 3);
    assert_eq!(report.summary.mismatched, 2);
}

// =============================================================================
// Remote case listing
// =============================================================================

#[tokio::test]
async fn test_remote_case_listing() {
    let (url, _server) = spawn_server().await;
    let source = CaseSource::Remote(remote(&url, API_KEY));

    let cases = Registry::new().list_cases("flowers", &source, None).await.unwrap();
    assert_eq!(
        cases.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        vec!["rose", "tulip", "lily"]
    );
    assert_eq!(cases[1].parameters.get("size").map(String::as_str), Some("64"));

    let unknown = Registry::new().list_cases("weeds", &source, None).await;
    assert!(unknown.is_err());
}

#[tokio::test]
async fn test_blob_values_round_trip_through_remote() {
    let (url, _server) = spawn_server().await;
    let store = RemoteStore::new(&remote(&url, API_KEY)).unwrap();

    let ctx = CaseContext::new(TestCase::new("lily"), Default::default());
    ctx.add_array_element("petals", 1.5).unwrap();
    ctx.add_array_element("petals", "white").unwrap();
    let lily = ctx.finish(Outcome::Success).unwrap();

    store
        .put(&Baseline::new("flowers", v("1"), vec![lily]))
        .await
        .unwrap();
    let loaded = store.get("flowers", &v("1")).await.unwrap();
    assert_eq!(
        loaded.results[0].get("petals"),
        Some(&Value::Sequence(vec![
            Value::Float(1.5),
            Value::String("white".to_string())
        ]))
    );
}
