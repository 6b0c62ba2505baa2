//! Suite orchestration
//!
//! [`Harness`] ties the pieces together for one suite:
//!
//! ```text
//! prior baseline ──┐
//!  (read once)     ▼
//! cases ──▶ Scheduler ──▶ results ──▶ store.put ──▶ Comparator ──▶ SuiteReport
//! ```
//!
//! The prior baseline is read before any case is scheduled and the new one
//! is written in one piece after every case has finished.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use driftwatch_core::baseline::validate_name;
use driftwatch_core::{Baseline, Comparator, Config, SuiteReport, TestCase, Version};

use crate::error::{Result, StoreError};
use crate::scheduler::Scheduler;
use crate::store::{self, BaselineStore};
use crate::workflow::Workflow;

/// Per-run choices
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Version to store the results under; defaults to a UTC timestamp
    pub version: Option<Version>,
    /// Baseline to compare against; defaults to the latest stored version
    pub compare_to: Option<Version>,
}

/// Result of [`Harness::run`]
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Results of this run
    pub baseline: Baseline,
    /// Whether `baseline` was written to the store
    pub stored: bool,
    /// Comparison against the prior baseline
    pub report: SuiteReport,
}

/// Runs a suite end to end against a baseline store
#[derive(Clone)]
pub struct Harness {
    suite: String,
    store: Arc<dyn BaselineStore>,
    scheduler: Scheduler,
    comparator: Comparator,
}

impl Harness {
    /// Harness for `suite` with default scheduling and exact comparison
    pub fn new(suite: impl Into<String>, store: Arc<dyn BaselineStore>) -> Result<Self> {
        let suite = suite.into();
        validate_name("suite", &suite)?;
        Ok(Self {
            suite,
            store,
            scheduler: Scheduler::default(),
            comparator: Comparator::default(),
        })
    }

    /// Harness configured from `driftwatch.yaml`
    pub fn from_config(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let project = &config.project;
        let store = store::open(config)?;
        Ok(Self::new(project.suite.clone(), store)?
            .with_scheduler(
                Scheduler::new(project.concurrency)
                    .with_case_timeout(config.case_timeout())
                    .with_cancellation(cancel),
            )
            .with_comparator(Comparator::new(project.tolerance.clone())))
    }

    /// Replace the scheduler
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replace the comparator
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Suite name
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Baseline store
    pub fn store(&self) -> &Arc<dyn BaselineStore> {
        &self.store
    }

    /// Run `workflow` over `cases`, store the results and compare them
    ///
    /// A cancelled run is still compared and reported, but its partial
    /// results are not stored as a baseline.
    pub async fn run(
        &self,
        cases: &[TestCase],
        workflow: Arc<dyn Workflow>,
        options: RunOptions,
    ) -> Result<RunOutcome> {
        let version = options.version.unwrap_or_else(Version::timestamp);
        if self.store.versions(&self.suite).await?.contains(&version) {
            return Err(StoreError::VersionConflict {
                suite: self.suite.clone(),
                version: version.to_string(),
            }
            .into());
        }

        let prior = self.prior_baseline(options.compare_to.as_ref()).await?;
        match &prior {
            Some(prior) => tracing::info!(
                suite = %self.suite,
                baseline = %prior.version,
                "Comparing against stored baseline"
            ),
            None => tracing::info!(suite = %self.suite, "No stored baseline; recording first version"),
        }

        let results = self.scheduler.run(cases, workflow).await;
        let baseline = Baseline::new(self.suite.clone(), version, results);

        let stored = if self.scheduler.cancellation().is_cancelled() {
            tracing::warn!(
                version = %baseline.version,
                "Run was cancelled; results are not stored"
            );
            false
        } else {
            self.store.put(&baseline).await?;
            true
        };

        let reports = self
            .comparator
            .compare_suites(prior.as_ref(), &baseline.results);
        let report = SuiteReport::new(
            self.suite.clone(),
            prior.map(|p| p.version),
            baseline.version.clone(),
            reports,
        );

        Ok(RunOutcome {
            baseline,
            stored,
            report,
        })
    }

    async fn prior_baseline(&self, compare_to: Option<&Version>) -> Result<Option<Baseline>> {
        let version = match compare_to {
            Some(version) => version.clone(),
            None => match self.store.latest_version(&self.suite).await {
                Ok(version) => version,
                Err(StoreError::NotFound { .. }) => return Ok(None),
                Err(err) => return Err(err.into()),
            },
        };
        Ok(Some(self.store.get(&self.suite, &version).await?))
    }

    /// Compare two stored versions; `baseline` is the reference
    pub async fn compare_versions(
        &self,
        baseline: &Version,
        current: &Version,
    ) -> Result<SuiteReport> {
        let reference = self.store.get(&self.suite, baseline).await?;
        let candidate = self.store.get(&self.suite, current).await?;
        let reports = self
            .comparator
            .compare_suites(Some(&reference), &candidate.results);
        Ok(SuiteReport::new(
            self.suite.clone(),
            Some(reference.version),
            candidate.version,
            reports,
        ))
    }
}
