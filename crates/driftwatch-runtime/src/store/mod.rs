//! Baseline stores
//!
//! A store persists one immutable [`Baseline`] per `(suite, version)` and the
//! artifact bytes its blobs refer to. Two backends ship with the runtime:
//!
//! - [`LocalStore`]: a directory on disk with a content-addressed object area
//! - [`RemoteStore`]: an HTTP service authenticated with an API key

use async_trait::async_trait;
use std::sync::Arc;

use driftwatch_core::{Baseline, CaseResult, Config, StoreConfig, Value, Version};

use crate::error::{Error, StoreError};

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Versioned persistence for suite baselines
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Persist `baseline` and the artifacts carried by its results
    ///
    /// Fails with [`StoreError::VersionConflict`] if the version exists; an
    /// existing record is never overwritten.
    async fn put(&self, baseline: &Baseline) -> StoreResult<()>;

    /// Read one stored version
    async fn get(&self, suite: &str, version: &Version) -> StoreResult<Baseline>;

    /// Highest stored version of `suite`
    async fn latest_version(&self, suite: &str) -> StoreResult<Version>;

    /// All stored versions of `suite`, ascending; empty for an unknown suite
    async fn versions(&self, suite: &str) -> StoreResult<Vec<Version>>;

    /// Fetch the bytes of every top-level blob in `result` into its artifacts
    async fn load_artifacts(&self, result: &mut CaseResult) -> StoreResult<()>;
}

/// Build the store described by the configuration
pub fn open(config: &Config) -> Result<Arc<dyn BaselineStore>, Error> {
    match &config.project.store {
        StoreConfig::Local { path } => Ok(Arc::new(LocalStore::new(path))),
        StoreConfig::Remote(remote) => Ok(Arc::new(RemoteStore::new(remote)?)),
    }
}

/// Outcome of a [`transfer`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Versions written to the destination
    pub submitted: Vec<Version>,
    /// Versions the destination already had
    pub skipped: Vec<Version>,
}

/// Copy `versions` of `suite` from one store to another, artifacts included
///
/// A version the destination already holds is skipped, not overwritten.
pub async fn transfer(
    from: &dyn BaselineStore,
    to: &dyn BaselineStore,
    suite: &str,
    versions: &[Version],
) -> StoreResult<TransferSummary> {
    let mut summary = TransferSummary::default();

    for version in versions {
        let mut baseline = from.get(suite, version).await?;
        for result in &mut baseline.results {
            from.load_artifacts(result).await?;
        }

        match to.put(&baseline).await {
            Ok(()) => {
                tracing::info!(suite, version = %version, "Submitted baseline");
                summary.submitted.push(version.clone());
            }
            Err(StoreError::VersionConflict { .. }) => {
                tracing::info!(suite, version = %version, "Already submitted, skipping");
                summary.skipped.push(version.clone());
            }
            Err(err) => return Err(err),
        }
    }

    Ok(summary)
}

/// Top-level blob hashes referenced by a result
pub(crate) fn blob_hashes(result: &CaseResult) -> impl Iterator<Item = &str> {
    result.entries.values().filter_map(|entry| match &entry.value {
        Value::Blob(blob) => Some(blob.hash.as_str()),
        _ => None,
    })
}

/// Whether `hash` is a lowercase hex SHA-256 digest
pub(crate) fn is_sha256_hex(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
