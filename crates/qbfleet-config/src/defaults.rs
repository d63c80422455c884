//! Environment variable names and fallback defaults for `ProxyConfig`.

use std::time::Duration;

pub(crate) const ENV_DATABASE_URL: &str = "QBFLEET_DATABASE_URL";
pub(crate) const ENV_ENCRYPTION_KEY: &str = "QBFLEET_ENCRYPTION_KEY";
pub(crate) const ENV_LISTEN_ADDRESS: &str = "QBFLEET_LISTEN_ADDRESS";
pub(crate) const ENV_LOG_FORMAT: &str = "QBFLEET_LOG_FORMAT";
pub(crate) const ENV_UI_CLIENT_TIMEOUT_SECS: &str = "QBFLEET_UI_CLIENT_TIMEOUT_SECS";
pub(crate) const ENV_PER_INSTANCE_TIMEOUT_SECS: &str = "QBFLEET_PER_INSTANCE_TIMEOUT_SECS";
pub(crate) const ENV_BULK_ACTION_TIMEOUT_SECS: &str = "QBFLEET_BULK_ACTION_TIMEOUT_SECS";
pub(crate) const ENV_SSE_HEARTBEAT_SECS: &str = "QBFLEET_SSE_HEARTBEAT_SECS";
pub(crate) const ENV_CONFIG_FILE: &str = "QBFLEET_CONFIG_FILE";

pub(crate) const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";
pub(crate) const DEFAULT_LOG_FORMAT: &str = "json";
pub(crate) const DEFAULT_UI_CLIENT_TIMEOUT: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_PER_INSTANCE_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_BULK_ACTION_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_SSE_HEARTBEAT: Duration = Duration::from_secs(15);
