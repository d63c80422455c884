//! Top-level error type for the application bootstrap sequence.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be assembled from the environment.
    #[error("configuration failed to load")]
    Config {
        /// Source configuration error.
        #[source]
        source: qbfleet_config::ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("telemetry failed to initialize")]
    Telemetry {
        /// Source telemetry error.
        #[source]
        source: qbfleet_telemetry::TelemetryError,
    },
    /// Establishing or migrating the database connection pool failed.
    #[error("database connection failed")]
    Database {
        /// Source sqlx error.
        #[source]
        source: sqlx::Error,
    },
    /// The instance store could not be constructed.
    #[error("instance store failed to initialize")]
    InstanceStore {
        /// Source data-layer error.
        #[source]
        source: qbfleet_data::DataError,
    },
    /// Core component construction failed.
    #[error("core failed to initialize")]
    Core {
        /// Source core configuration error.
        #[source]
        source: qbfleet_core::ConfigError,
    },
    /// The API server failed to bind or serve.
    #[error("api server failed")]
    ApiServer {
        /// Source API server error.
        #[source]
        source: qbfleet_api::ApiServerError,
    },
    /// The configured listen address is not a valid socket address.
    #[error("invalid listen address `{value}`")]
    InvalidListenAddress {
        /// The offending configuration value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_listen_address_reports_the_value() {
        let err = AppError::InvalidListenAddress { value: "not-an-addr".to_string() };
        assert_eq!(err.to_string(), "invalid listen address `not-an-addr`");
    }
}
