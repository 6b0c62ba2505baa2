//! Driftwatch Core Library
//!
//! This crate provides the data model and pure logic of Driftwatch:
//! - Typed result values and per-case capture scopes
//! - Versions and stored baselines
//! - Structural comparison with numeric tolerances
//! - Suite reports and exit status
//! - Configuration parsing and validation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CaseContext │────▶│ CaseResult  │────▶│ Comparator  │────▶│ SuiteReport │
//! │  (capture)  │     │  (frozen)   │     │ vs Baseline │     │ exit status │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! Scheduling, case resolution and baseline storage live in
//! `driftwatch-runtime`.
//!
//! # Example
//!
//! ```rust,ignore
//! use driftwatch_core::{CaseContext, Comparator, Outcome, TestCase};
//!
//! let ctx = CaseContext::new(TestCase::new("rose"), Default::default());
//! ctx.capture("hash", "abc123")?;
//! let current = ctx.finish(Outcome::Success)?;
//! let report = Comparator::default().compare(&baseline, &current);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
pub mod capture;
pub mod case;
pub mod compare;
pub mod config;
pub mod error;
pub mod report;
pub mod value;

pub use baseline::{Baseline, Version};
pub use capture::{CaptureError, CaseContext, ScopedTimer};
pub use case::{CaseResult, EntryKind, Outcome, ResultEntry, TestCase};
pub use compare::{
    Comparator, ComparisonReport, ComparisonStatus, DiffKind, FieldDiff, ToleranceSpec,
};
pub use config::{CaseSource, Config, ProjectConfig, RemoteConfig, StoreConfig, WorkflowConfig};
pub use error::{Error, Result};
pub use report::{ExitStatus, Summary, SuiteReport, render_human, summarize};
pub use value::{BlobDescriptor, IntoValue, Value};
