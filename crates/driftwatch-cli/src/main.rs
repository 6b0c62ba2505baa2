//! Driftwatch CLI
//!
//! Runs regression suites, compares stored versions and submits baselines.
//!
//! Exit codes: `0` every case matched, `1` drift detected, `2` configuration
//! or case registry error, `3` baseline store error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use driftwatch_core::Version;
use driftwatch_runtime::{ErrorCategory, RegistryError, StoreError};

mod commands;

/// Driftwatch - detect behavioral drift between versions of your code
#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file or project directory
    #[arg(short, long, default_value = "driftwatch.yaml", env = "DRIFTWATCH_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the suite, store a new version and compare it with a baseline
    Run {
        /// Version to store the results under (default: UTC timestamp)
        #[arg(long)]
        version: Option<Version>,

        /// Version to compare against (default: latest stored version)
        #[arg(long)]
        compare_to: Option<Version>,

        /// Only run cases whose id matches this regular expression
        #[arg(short, long)]
        filter: Option<Regex>,

        /// Maximum number of cases running at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-case timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Compare two stored versions
    Compare {
        /// Reference version
        baseline: Version,

        /// Version to check against the reference
        current: Version,

        /// Write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Push stored versions to the remote store
    Submit {
        /// Versions to submit (default: all stored versions)
        #[arg(long = "version")]
        versions: Vec<Version>,
    },

    /// List the test cases the suite would run
    Cases {
        /// Only list cases whose id matches this regular expression
        #[arg(short, long)]
        filter: Option<Regex>,
    },

    /// List stored versions
    Versions,

    /// Validate configuration without running
    Validate,
}

/// How long shutdown waits for workflows abandoned after their deadline
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")
        .and_then(|runtime| {
            let result = runtime.block_on(dispatch(cli));
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            result
        });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let category = categorize(&err);
            eprintln!("error[{}]: {:#}", category, err);
            ExitCode::from(category.exit_code())
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let config = cli.config.as_str();
    match cli.command {
        Commands::Run {
            version,
            compare_to,
            filter,
            concurrency,
            timeout,
            report,
        } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; letting running cases finish");
                    on_interrupt.cancel();
                }
            });

            let args = commands::run::RunArgs {
                version,
                compare_to,
                filter,
                concurrency,
                timeout,
                report,
            };
            commands::run::run(config, args, cancel).await
        }
        Commands::Compare {
            baseline,
            current,
            report,
        } => commands::compare::run(config, &baseline, &current, report.as_deref()).await,
        Commands::Submit { versions } => commands::submit::run(config, &versions).await,
        Commands::Cases { filter } => commands::cases::run(config, filter.as_ref()).await,
        Commands::Versions => commands::versions::run(config).await,
        Commands::Validate => commands::validate::run(config).await,
    }
}

/// Pick the exit category from the first recognized error in the chain
fn categorize(err: &anyhow::Error) -> ErrorCategory {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<driftwatch_runtime::Error>() {
            return err.category();
        }
        if let Some(err) = cause.downcast_ref::<StoreError>() {
            return err.category();
        }
        if cause.is::<RegistryError>() {
            return ErrorCategory::Registry;
        }
        if cause.is::<driftwatch_core::Error>() {
            return ErrorCategory::Config;
        }
    }
    ErrorCategory::Config
}
