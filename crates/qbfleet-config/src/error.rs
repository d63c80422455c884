//! Error types for loading startup configuration.

use thiserror::Error;

/// Failure loading a [`qbfleet_core::ProxyConfig`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set and had no file fallback.
    #[error("missing required configuration value `{key}`")]
    Missing {
        /// Environment variable or config-file key that was absent.
        key: &'static str,
    },
    /// A value was present but could not be parsed into its target type.
    #[error("configuration value `{key}` is invalid: {reason}")]
    InvalidValue {
        /// Environment variable or config-file key that failed to parse.
        key: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// The optional config file path was set but the file could not be read.
    #[error("failed to read configuration file {path}")]
    FileUnreadable {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The optional config file's contents were not valid JSON.
    #[error("failed to parse configuration file {path}")]
    FileMalformed {
        /// Path that was attempted.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The assembled configuration failed its own invariant checks.
    #[error(transparent)]
    Invalid(#[from] qbfleet_core::ConfigError),
}
