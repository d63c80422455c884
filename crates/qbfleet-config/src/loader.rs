//! Assembles a [`qbfleet_core::ProxyConfig`] from environment variables, with
//! an optional JSON file providing lower-precedence fallback values.

use std::collections::HashMap;
use std::time::Duration;

use qbfleet_core::{FreshnessTtls, ProxyConfig};
use serde::Deserialize;
use tracing::info;

use crate::defaults::{
    DEFAULT_BULK_ACTION_TIMEOUT, DEFAULT_LISTEN_ADDRESS, DEFAULT_LOG_FORMAT,
    DEFAULT_PER_INSTANCE_TIMEOUT, DEFAULT_SSE_HEARTBEAT, DEFAULT_UI_CLIENT_TIMEOUT,
    ENV_BULK_ACTION_TIMEOUT_SECS, ENV_CONFIG_FILE, ENV_DATABASE_URL, ENV_ENCRYPTION_KEY,
    ENV_LISTEN_ADDRESS, ENV_LOG_FORMAT, ENV_PER_INSTANCE_TIMEOUT_SECS,
    ENV_SSE_HEARTBEAT_SECS, ENV_UI_CLIENT_TIMEOUT_SECS,
};
use crate::error::ConfigError;

/// Lower-precedence values read from an optional JSON config file. Any field
/// also set by an environment variable is overridden by that variable.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    database_url: Option<String>,
    encryption_key: Option<String>,
    listen_address: Option<String>,
    log_format: Option<String>,
    ui_client_timeout_secs: Option<u64>,
    per_instance_timeout_secs: Option<u64>,
    bulk_action_timeout_secs: Option<u64>,
    sse_heartbeat_secs: Option<u64>,
}

/// Load a [`ProxyConfig`] from the process environment, honoring
/// `QBFLEET_CONFIG_FILE` as an optional lower-precedence JSON overlay.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if a required value has neither an
/// environment variable nor a file entry, [`ConfigError::InvalidValue`] if a
/// value is present but malformed, [`ConfigError::FileUnreadable`] /
/// [`ConfigError::FileMalformed`] if `QBFLEET_CONFIG_FILE` points at a file
/// that can't be read or parsed, and [`ConfigError::Invalid`] if the
/// assembled configuration fails [`ProxyConfig::validate`].
pub fn load() -> Result<ProxyConfig, ConfigError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_from(&env)
}

fn load_from(env: &HashMap<String, String>) -> Result<ProxyConfig, ConfigError> {
    let overlay = match env.get(ENV_CONFIG_FILE) {
        Some(path) => read_overlay(path)?,
        None => FileOverlay::default(),
    };

    let database_url = required_string(env, &overlay, ENV_DATABASE_URL, |o| o.database_url.clone())?;
    let encryption_key_b64 =
        required_string(env, &overlay, ENV_ENCRYPTION_KEY, |o| o.encryption_key.clone())?;
    let encryption_key = decode_encryption_key(&encryption_key_b64)?;

    let listen_address = string_with_default(
        env,
        &overlay,
        ENV_LISTEN_ADDRESS,
        |o| o.listen_address.clone(),
        DEFAULT_LISTEN_ADDRESS,
    );
    let log_format = string_with_default(
        env,
        &overlay,
        ENV_LOG_FORMAT,
        |o| o.log_format.clone(),
        DEFAULT_LOG_FORMAT,
    );

    let ui_client_timeout = duration_with_default(
        env,
        ENV_UI_CLIENT_TIMEOUT_SECS,
        overlay.ui_client_timeout_secs,
        DEFAULT_UI_CLIENT_TIMEOUT,
    )?;
    let per_instance_timeout = duration_with_default(
        env,
        ENV_PER_INSTANCE_TIMEOUT_SECS,
        overlay.per_instance_timeout_secs,
        DEFAULT_PER_INSTANCE_TIMEOUT,
    )?;
    let bulk_action_timeout = duration_with_default(
        env,
        ENV_BULK_ACTION_TIMEOUT_SECS,
        overlay.bulk_action_timeout_secs,
        DEFAULT_BULK_ACTION_TIMEOUT,
    )?;
    let sse_heartbeat_interval = duration_with_default(
        env,
        ENV_SSE_HEARTBEAT_SECS,
        overlay.sse_heartbeat_secs,
        DEFAULT_SSE_HEARTBEAT,
    )?;

    let config = ProxyConfig {
        database_url,
        encryption_key,
        freshness: FreshnessTtls::default(),
        ui_client_timeout,
        per_instance_timeout,
        bulk_action_timeout,
        sse_heartbeat_interval,
        listen_address,
        log_format,
    };

    config.validate()?;
    info!(listen_address = %config.listen_address, "configuration loaded");
    Ok(config)
}

fn read_overlay(path: &str) -> Result<FileOverlay, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileUnreadable {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::FileMalformed {
        path: path.to_string(),
        source,
    })
}

fn required_string(
    env: &HashMap<String, String>,
    overlay: &FileOverlay,
    key: &'static str,
    from_overlay: impl FnOnce(&FileOverlay) -> Option<String>,
) -> Result<String, ConfigError> {
    env.get(key)
        .cloned()
        .or_else(|| from_overlay(overlay))
        .ok_or(ConfigError::Missing { key })
}

fn string_with_default(
    env: &HashMap<String, String>,
    overlay: &FileOverlay,
    key: &'static str,
    from_overlay: impl FnOnce(&FileOverlay) -> Option<String>,
    default: &str,
) -> String {
    env.get(key)
        .cloned()
        .or_else(|| from_overlay(overlay))
        .unwrap_or_else(|| default.to_string())
}

fn duration_with_default(
    env: &HashMap<String, String>,
    key: &'static str,
    overlay_secs: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs = match env.get(key) {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            key,
            reason: format!("`{raw}` is not a non-negative integer number of seconds"),
        })?),
        None => overlay_secs,
    };
    Ok(secs.map_or(default, Duration::from_secs))
}

fn decode_encryption_key(encoded: &str) -> Result<[u8; 32], ConfigError> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| ConfigError::InvalidValue {
            key: ENV_ENCRYPTION_KEY,
            reason: format!("not valid base64: {err}"),
        })?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::InvalidValue {
        key: ENV_ENCRYPTION_KEY,
        reason: format!("decoded to {} bytes, expected 32", bytes.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> HashMap<String, String> {
        HashMap::from([
            (ENV_DATABASE_URL.to_string(), "postgres://localhost/fleetqb".to_string()),
            (
                ENV_ENCRYPTION_KEY.to_string(),
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0_u8; 32]),
            ),
        ])
    }

    #[test]
    fn loads_required_fields_and_applies_defaults() {
        let config = load_from(&base_env()).expect("should load");
        assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
        assert_eq!(config.log_format, DEFAULT_LOG_FORMAT);
        assert_eq!(config.ui_client_timeout, DEFAULT_UI_CLIENT_TIMEOUT);
    }

    #[test]
    fn rejects_missing_database_url() {
        let mut env = base_env();
        env.remove(ENV_DATABASE_URL);
        let err = load_from(&env).expect_err("should fail");
        assert!(matches!(err, ConfigError::Missing { key } if key == ENV_DATABASE_URL));
    }

    #[test]
    fn rejects_malformed_encryption_key() {
        let mut env = base_env();
        env.insert(ENV_ENCRYPTION_KEY.to_string(), "not-base64!!".to_string());
        let err = load_from(&env).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_ENCRYPTION_KEY));
    }

    #[test]
    fn rejects_wrong_length_encryption_key() {
        let mut env = base_env();
        env.insert(
            ENV_ENCRYPTION_KEY.to_string(),
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0_u8; 16]),
        );
        let err = load_from(&env).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_ENCRYPTION_KEY));
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let mut env = base_env();
        env.insert(ENV_UI_CLIENT_TIMEOUT_SECS.to_string(), "soon".to_string());
        let err = load_from(&env).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_UI_CLIENT_TIMEOUT_SECS));
    }

    #[test]
    fn custom_timeout_overrides_default() {
        let mut env = base_env();
        env.insert(ENV_BULK_ACTION_TIMEOUT_SECS.to_string(), "45".to_string());
        let config = load_from(&env).expect("should load");
        assert_eq!(config.bulk_action_timeout, Duration::from_secs(45));
    }
}
