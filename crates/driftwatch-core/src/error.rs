//! Error types for driftwatch-core

use thiserror::Error;

/// Result type alias for driftwatch-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in driftwatch-core
///
/// Every variant is a configuration-class failure: it is detected before a
/// suite starts running and aborts the run.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// A remote backend is configured but no API key was supplied
    #[error("missing credentials for {what}: set {env_var} or `api_key` in the configuration")]
    MissingCredentials {
        /// What needed the credentials (store, case source, submit target)
        what: String,
        /// Environment variable that was consulted
        env_var: String,
    },

    /// A suite or version name that cannot be used as an identifier
    #[error("invalid {kind} name '{name}': {message}")]
    InvalidName {
        /// "suite" or "version"
        kind: &'static str,
        /// The rejected name
        name: String,
        /// Why it was rejected
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
