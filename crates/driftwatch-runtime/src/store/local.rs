//! Filesystem baseline store
//!
//! Layout under the store root:
//!
//! ```text
//! suites/<suite>/<version>.json     serialized Baseline, one per version
//! objects/sha256/<ab>/<hash>        artifact bytes, content-addressed
//! tmp/                              staging area for atomic writes
//! ```
//!
//! Records are staged in `tmp/` and linked into place, so a reader never sees
//! a partial file and an existing version is never replaced.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use driftwatch_core::baseline::validate_name;
use driftwatch_core::value::sha256_hex;
use driftwatch_core::{Baseline, CaseResult, Version};

use super::{BaselineStore, StoreResult, blob_hashes, is_sha256_hex};
use crate::error::StoreError;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Baseline store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Store rooted at `root`; directories are created on first write
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn suite_dir(&self, suite: &str) -> StoreResult<PathBuf> {
        validate_name("suite", suite)?;
        Ok(self.root.join("suites").join(suite))
    }

    fn record_path(&self, suite: &str, version: &Version) -> StoreResult<PathBuf> {
        Ok(self
            .suite_dir(suite)?
            .join(format!("{}.json", version.as_str())))
    }

    /// Path of the object holding the bytes with digest `hash`
    pub fn object_path(&self, hash: &str) -> PathBuf {
        let (prefix, _) = hash.split_at(2.min(hash.len()));
        self.root
            .join("objects")
            .join("sha256")
            .join(prefix)
            .join(hash)
    }

    async fn stage(&self, data: &[u8]) -> StoreResult<PathBuf> {
        let tmp_dir = self.root.join("tmp");
        fs::create_dir_all(&tmp_dir).await?;
        let name = format!(
            "{}-{}.tmp",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = tmp_dir.join(name);
        fs::write(&path, data).await?;
        Ok(path)
    }

    /// Store artifact bytes, returning their digest
    pub async fn put_object(&self, data: &[u8]) -> StoreResult<String> {
        let hash = sha256_hex(data);
        let path = self.object_path(&hash);
        if fs::try_exists(&path).await? {
            tracing::debug!(hash = %hash, "Object already stored");
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staged = self.stage(data).await?;
        fs::rename(&staged, &path).await?;
        tracing::debug!(hash = %hash, size = data.len(), "Stored object");
        Ok(hash)
    }

    /// Read artifact bytes, verifying their digest
    pub async fn get_object(&self, hash: &str) -> StoreResult<Vec<u8>> {
        if !is_sha256_hex(hash) {
            return Err(StoreError::Corrupt {
                location: self.root.display().to_string(),
                message: format!("'{}' is not a sha256 digest", hash),
            });
        }

        let path = self.object_path(hash);
        let data = fs::read(&path).await?;
        let actual = sha256_hex(&data);
        if actual != hash {
            return Err(StoreError::Corrupt {
                location: path.display().to_string(),
                message: format!("content hash is {}", actual),
            });
        }
        Ok(data)
    }
}

#[async_trait]
impl BaselineStore for LocalStore {
    async fn put(&self, baseline: &Baseline) -> StoreResult<()> {
        let path = self.record_path(&baseline.suite, &baseline.version)?;
        let conflict = || StoreError::VersionConflict {
            suite: baseline.suite.clone(),
            version: baseline.version.to_string(),
        };
        if fs::try_exists(&path).await? {
            return Err(conflict());
        }

        let mut objects = 0;
        for result in &baseline.results {
            for data in result.artifacts.values() {
                self.put_object(data).await?;
                objects += 1;
            }
        }

        let json = serde_json::to_vec_pretty(baseline).map_err(|e| StoreError::Corrupt {
            location: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staged = self.stage(&json).await?;
        let linked = fs::hard_link(&staged, &path).await;
        fs::remove_file(&staged).await?;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(conflict()),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            suite = %baseline.suite,
            version = %baseline.version,
            cases = baseline.results.len(),
            objects,
            path = %path.display(),
            "Stored baseline"
        );
        Ok(())
    }

    async fn get(&self, suite: &str, version: &Version) -> StoreResult<Baseline> {
        let path = self.record_path(suite, version)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    suite: suite.to_string(),
                    version: version.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |message: String| StoreError::Corrupt {
            location: path.display().to_string(),
            message,
        };
        let baseline: Baseline =
            serde_json::from_slice(&data).map_err(|e| corrupt(e.to_string()))?;
        if baseline.suite != suite || &baseline.version != version {
            return Err(corrupt(format!(
                "record is for suite '{}' version '{}'",
                baseline.suite, baseline.version
            )));
        }
        Ok(baseline)
    }

    async fn latest_version(&self, suite: &str) -> StoreResult<Version> {
        self.versions(suite)
            .await?
            .pop()
            .ok_or_else(|| StoreError::NotFound {
                suite: suite.to_string(),
                version: "latest".to_string(),
            })
    }

    async fn versions(&self, suite: &str) -> StoreResult<Vec<Version>> {
        let dir = self.suite_dir(suite)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Version::new(stem) {
                Ok(version) => versions.push(version),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring stray file"),
            }
        }
        versions.sort();
        Ok(versions)
    }

    async fn load_artifacts(&self, result: &mut CaseResult) -> StoreResult<()> {
        let hashes: Vec<String> = blob_hashes(result).map(str::to_string).collect();
        for hash in hashes {
            if result.artifacts.contains_key(&hash) {
                continue;
            }
            match self.get_object(&hash).await {
                Ok(data) => {
                    result.artifacts.insert(hash, data);
                }
                // Descriptors built from precomputed hashes have no stored bytes.
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(hash = %hash, "No stored bytes for blob");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::{CaseContext, Comparator, ComparisonStatus, Outcome, TestCase, Value};
    use tokio_util::sync::CancellationToken;

    fn v(s: &str) -> Version {
        Version::new(s).unwrap()
    }

    fn rose(hash: &str) -> CaseResult {
        let ctx = CaseContext::new(TestCase::new("rose"), CancellationToken::new());
        ctx.capture("hash", hash).unwrap();
        ctx.capture_artifact("image", b"rose pixels".to_vec()).unwrap();
        ctx.finish(Outcome::Success).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let baseline = Baseline::new("flowers", v("1"), vec![rose("abc123")]);

        store.put(&baseline).await.unwrap();
        let loaded = store.get("flowers", &v("1")).await.unwrap();

        assert_eq!(loaded.results[0].entries, baseline.results[0].entries);
        assert!(loaded.results[0].artifacts.is_empty());
        assert!(dir.path().join("suites/flowers/1.json").exists());
        assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stored_floats_compare_exactly() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let measured = |id: &str| {
            let ctx = CaseContext::new(TestCase::new(id), CancellationToken::new());
            ctx.capture("psnr", 989.8597941207809_f64).unwrap();
            ctx.capture("ratio", 0.1_f64 + 0.2_f64).unwrap();
            ctx.finish(Outcome::Success).unwrap()
        };
        store
            .put(&Baseline::new("flowers", v("1"), vec![measured("rose")]))
            .await
            .unwrap();

        let stored = store.get("flowers", &v("1")).await.unwrap();
        assert_eq!(stored.results[0].get("psnr"), Some(&Value::Float(989.8597941207809)));

        let report = Comparator::default().compare(&stored.results[0], &measured("rose"));
        assert_eq!(report.status, ComparisonStatus::Match);
    }

    #[tokio::test]
    async fn test_existing_version_is_never_overwritten() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store
            .put(&Baseline::new("flowers", v("1"), vec![rose("abc123")]))
            .await
            .unwrap();

        let err = store
            .put(&Baseline::new("flowers", v("1"), vec![rose("def456")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let kept = store.get("flowers", &v("1")).await.unwrap();
        assert_eq!(
            kept.results[0].get("hash"),
            Some(&Value::String("abc123".to_string()))
        );
    }

    #[tokio::test]
    async fn test_versions_and_latest() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(store.versions("flowers").await.unwrap().is_empty());
        assert!(matches!(
            store.latest_version("flowers").await,
            Err(StoreError::NotFound { .. })
        ));

        for version in ["9", "10", "2"] {
            store
                .put(&Baseline::new("flowers", v(version), vec![rose("abc123")]))
                .await
                .unwrap();
        }
        assert_eq!(
            store.versions("flowers").await.unwrap(),
            vec![v("2"), v("9"), v("10")]
        );
        assert_eq!(store.latest_version("flowers").await.unwrap(), v("10"));
    }

    #[tokio::test]
    async fn test_unsafe_suite_name_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let err = store.versions("../flowers").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
        assert_eq!(err.category(), crate::error::ErrorCategory::Config);
    }

    #[tokio::test]
    async fn test_missing_version_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.get("flowers", &v("7")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_artifacts_are_deduplicated_and_rehydrated() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store
            .put(&Baseline::new("flowers", v("1"), vec![rose("abc123")]))
            .await
            .unwrap();
        store
            .put(&Baseline::new("flowers", v("2"), vec![rose("abc123")]))
            .await
            .unwrap();

        let hash = sha256_hex(b"rose pixels");
        assert!(store.object_path(&hash).exists());

        let mut result = store.get("flowers", &v("2")).await.unwrap().results.remove(0);
        store.load_artifacts(&mut result).await.unwrap();
        assert_eq!(result.artifacts.get(&hash).map(Vec::as_slice), Some(&b"rose pixels"[..]));
    }

    #[tokio::test]
    async fn test_tampered_object_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let hash = store.put_object(b"original").await.unwrap();
        std::fs::write(store.object_path(&hash), b"tampered").unwrap();

        assert!(matches!(
            store.get_object(&hash).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreadable_record_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("suites/flowers")).unwrap();
        std::fs::write(dir.path().join("suites/flowers/3.json"), b"{not json").unwrap();

        assert!(matches!(
            store.get("flowers", &v("3")).await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
