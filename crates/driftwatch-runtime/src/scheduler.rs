//! Execution scheduler
//!
//! Runs a workflow once per test case on a bounded pool of blocking workers.
//!
//! # Guarantees
//!
//! - At most `concurrency` workflows execute at once.
//! - Results come back in input order, whatever order cases finish in.
//! - An error, panic or timeout in one case becomes that case's `Failure`
//!   and never affects the others.
//! - Cancelling the suite token stops cases that have not started; cases
//!   already running continue up to their deadline.
//!
//! A timed-out workflow is abandoned, not killed: its cancellation token is
//! triggered, but a workflow that never checks it keeps its worker thread
//! busy until it returns on its own. The worker holds its concurrency permit
//! until then, so abandoned workflows still count against the limit.

use futures::future::join_all;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use driftwatch_core::{CaseContext, CaseResult, Outcome, TestCase};

use crate::workflow::Workflow;

/// Failure message for cases skipped by cancellation
pub const CANCELLED_BEFORE_START: &str = "cancelled before start";

/// Failure message for cases that exceeded their deadline
pub const TIMEOUT: &str = "timeout";

/// Default per-case deadline
pub const DEFAULT_CASE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded, order-preserving executor of per-case workflows
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
    case_timeout: Duration,
    cancel: CancellationToken,
}

impl Default for Scheduler {
    fn default() -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(concurrency)
    }
}

impl Scheduler {
    /// Scheduler running up to `concurrency` cases at once
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            case_timeout: DEFAULT_CASE_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the per-case deadline
    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    /// Use `token` as the suite cancellation signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Suite cancellation token
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `workflow` for every case and return results in case order
    pub async fn run(&self, cases: &[TestCase], workflow: Arc<dyn Workflow>) -> Vec<CaseResult> {
        tracing::info!(
            cases = cases.len(),
            concurrency = self.concurrency,
            timeout_secs = self.case_timeout.as_secs_f64(),
            "Scheduling test cases"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let units = cases.iter().cloned().map(|testcase| {
            let span = tracing::info_span!("case", id = %testcase.id);
            self.run_case(testcase, Arc::clone(&workflow), Arc::clone(&permits))
                .instrument(span)
        });
        let results = join_all(units).await;

        let failed = results.iter().filter(|r| !r.outcome.is_success()).count();
        tracing::info!(total = results.len(), failed, "All test cases finished");
        results
    }

    async fn run_case(
        &self,
        testcase: TestCase,
        workflow: Arc<dyn Workflow>,
        permits: Arc<Semaphore>,
    ) -> CaseResult {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            tracing::warn!("Cancelled before start");
            return CaseResult::new(testcase.id, Outcome::failure(CANCELLED_BEFORE_START));
        };

        let id = testcase.id.clone();
        let ctx = CaseContext::new(testcase, self.cancel.child_token());
        let worker_ctx = ctx.clone();
        let started = Instant::now();
        tracing::debug!("Case started");

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            workflow.execute(&worker_ctx)
        });
        let outcome = match tokio::time::timeout(self.case_timeout, handle).await {
            Ok(Ok(Ok(()))) => Outcome::Success,
            Ok(Ok(Err(err))) => Outcome::failure(format!("{:#}", err)),
            Ok(Err(join_err)) => Outcome::failure(join_failure(join_err)),
            Err(_) => {
                ctx.cancellation().cancel();
                tracing::warn!(
                    timeout_secs = self.case_timeout.as_secs_f64(),
                    "Case exceeded its deadline"
                );
                Outcome::failure(TIMEOUT)
            }
        };

        let mut result = ctx
            .finish(outcome)
            .unwrap_or_else(|err| CaseResult::new(id, Outcome::failure(err.to_string())));
        result.duration = started.elapsed();

        match &result.outcome {
            Outcome::Success => tracing::info!(
                entries = result.entries.len(),
                duration_ms = result.duration.as_millis() as u64,
                "Case finished"
            ),
            Outcome::Failure(message) => tracing::warn!(
                error = %message,
                duration_ms = result.duration.as_millis() as u64,
                "Case failed"
            ),
        }
        result
    }
}

fn join_failure(err: JoinError) -> String {
    if err.is_panic() {
        format!("panicked: {}", panic_message(err.into_panic()))
    } else {
        "execution was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
