//! Runtime error types
//!
//! Suite-level failures abort a run and map to a process exit code through
//! [`ErrorCategory`]. Per-case failures never appear here: the scheduler
//! turns them into a failed [`driftwatch_core::Outcome`].

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to resolve the list of cases to run
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The case source could not be read or reached
    #[error("case source {source_name} is unavailable: {message}")]
    Unavailable {
        /// Description of the source
        source_name: String,
        /// Underlying cause
        message: String,
    },

    /// The source was read but its contents are unusable
    #[error("invalid case list: {message}")]
    Invalid {
        /// What is wrong with the list
        message: String,
    },
}

/// Baseline store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record for the requested suite/version
    #[error("no baseline for suite '{suite}' version '{version}'")]
    NotFound {
        /// Suite name
        suite: String,
        /// Requested version, or "latest"
        version: String,
    },

    /// Local filesystem failure
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure talking to a remote store
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote store rejected the credentials
    #[error("store rejected credentials: {message}")]
    AuthFailure {
        /// Server response or status
        message: String,
    },

    /// A record for this suite/version already exists
    #[error("suite '{suite}' already has a baseline version '{version}'")]
    VersionConflict {
        /// Suite name
        suite: String,
        /// Conflicting version
        version: String,
    },

    /// The request named a suite the store cannot hold
    #[error(transparent)]
    InvalidName(#[from] driftwatch_core::Error),

    /// Stored data could not be decoded or failed verification
    #[error("corrupt store data at {location}: {message}")]
    Corrupt {
        /// File path or URL
        location: String,
        /// What failed
        message: String,
    },
}

/// Errors that abort a suite run
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] driftwatch_core::Error),

    /// Case list could not be resolved
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Baseline store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification of a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration problem
    Config,
    /// Case registry problem
    Registry,
    /// Baseline store unavailable or rejecting
    Storage,
}

impl ErrorCategory {
    /// Process exit code for this category
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCategory::Config | ErrorCategory::Registry => 2,
            ErrorCategory::Storage => 3,
        }
    }

    /// Lowercase label for messages
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Config => "config",
            ErrorCategory::Registry => "registry",
            ErrorCategory::Storage => "store",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StoreError {
    /// Category deciding the exit code; a bad name is the caller's mistake
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::InvalidName(_) => ErrorCategory::Config,
            _ => ErrorCategory::Storage,
        }
    }
}

impl Error {
    /// Category deciding the exit code
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::Registry(_) => ErrorCategory::Registry,
            Error::Store(err) => err.category(),
        }
    }
}
