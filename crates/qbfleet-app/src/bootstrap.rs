//! Assembles configuration, the Postgres-backed instance store, the core
//! composition root, and the HTTP server, then serves until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use qbfleet_core::Core;
use qbfleet_data::PgInstanceStore;
use qbfleet_events::EventBus;
use qbfleet_telemetry::{LogFormat, LoggingConfig, Metrics};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Entry point for the fleet proxy application boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, the database, or the core components
/// cannot be constructed, or if the API server fails to bind or serve.
pub async fn run_app() -> AppResult<()> {
    let config = qbfleet_config::load().map_err(|source| AppError::Config { source })?;

    let logging = LoggingConfig { level: "info", format: log_format(&config.log_format), build_sha: qbfleet_telemetry::build_sha() };
    qbfleet_telemetry::init_logging(&logging).map_err(|source| AppError::Telemetry { source })?;

    info!("fleet proxy application bootstrap starting");

    let pool = PgPoolOptions::new()
        .connect(&config.database_url)
        .await
        .map_err(|source| AppError::Database { source })?;
    let instance_store = Arc::new(
        PgInstanceStore::new(pool)
            .await
            .map_err(|source| AppError::InstanceStore { source })?,
    );

    let events = EventBus::new();
    let telemetry = Metrics::new().map_err(|source| AppError::Telemetry { source })?;

    let core = Core::new(&config, instance_store).map_err(|source| AppError::Core { source })?;
    let api = qbfleet_api::ApiServer::new(Arc::new(core), events, telemetry);

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .map_err(|_| AppError::InvalidListenAddress { value: config.listen_address.clone() })?;

    info!(%addr, "launching API listener");
    api.serve(addr).await.map_err(|source| AppError::ApiServer { source })?;
    info!("API server shutdown complete");
    Ok(())
}

fn log_format(raw: &str) -> LogFormat {
    match raw {
        "json" => LogFormat::Json,
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::infer(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_maps_known_strings() {
        assert!(matches!(log_format("json"), LogFormat::Json));
        assert!(matches!(log_format("pretty"), LogFormat::Pretty));
    }

    #[test]
    fn log_format_falls_back_to_inferred_default_for_unknown() {
        let inferred = log_format("bogus");
        let expected = LogFormat::infer();
        assert_eq!(format!("{inferred:?}"), format!("{expected:?}"));
    }
}
