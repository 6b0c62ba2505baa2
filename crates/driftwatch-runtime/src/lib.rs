//! Driftwatch Runtime
//!
//! This crate provides everything that performs I/O or runs user code:
//!
//! # Features
//!
//! - Bounded, order-preserving execution of workflows per test case
//! - Case resolution from inline lists, files, directories or a remote service
//! - Baseline stores on the local filesystem or behind an HTTP API
//! - The [`Harness`] running a suite end to end
//!
//! # Usage
//!
//! ```rust,ignore
//! use driftwatch_runtime::{Harness, RunOptions, store::LocalStore};
//!
//! let harness = Harness::new("flowers", Arc::new(LocalStore::new(".driftwatch/store")))?;
//! let workflow = |ctx: &CaseContext| -> anyhow::Result<()> {
//!     ctx.capture("hash", hash_image(ctx.id())?)?;
//!     Ok(())
//! };
//! let outcome = harness.run(&cases, Arc::new(workflow), RunOptions::default()).await?;
//! std::process::exit(outcome.report.exit_status().code().into());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod harness;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod workflow;

pub use error::{Error, ErrorCategory, RegistryError, Result, StoreError};
pub use harness::{Harness, RunOptions, RunOutcome};
pub use registry::Registry;
pub use scheduler::Scheduler;
pub use store::{BaselineStore, LocalStore, RemoteStore, TransferSummary, transfer};
pub use workflow::{CommandWorkflow, Workflow};
