//! Validated startup configuration consumed by [`crate::core::Core::new`].

use std::time::Duration;

use thiserror::Error;

/// Per-kind TTL overrides for the Sync Manager's cached entries.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessTtls {
    /// TTL for `getTorrents`/`getAllTorrents`.
    pub torrents: Duration,
    /// TTL for `getTorrentCounts`.
    pub counts: Duration,
    /// TTL for `getInstanceSpeeds`.
    pub speeds: Duration,
    /// TTL for `getAppPreferences`.
    pub preferences: Duration,
    /// TTL for `getRSSItems`.
    pub rss: Duration,
    /// TTL for the tag/category indices.
    pub tags_categories: Duration,
}

impl Default for FreshnessTtls {
    fn default() -> Self {
        Self {
            torrents: Duration::from_secs(2),
            counts: Duration::from_secs(2),
            speeds: Duration::from_secs(1),
            preferences: Duration::from_secs(30),
            rss: Duration::from_secs(5),
            tags_categories: Duration::from_secs(30),
        }
    }
}

/// Typed, eagerly-validated configuration for the whole proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Postgres connection string for the `InstanceStore`.
    pub database_url: String,
    /// 32-byte AES-256-GCM key used to decrypt stored instance credentials.
    pub encryption_key: [u8; 32],
    /// Per-kind cache TTLs.
    pub freshness: FreshnessTtls,
    /// Timeout applied to `getClient` calls from UI-facing paths.
    pub ui_client_timeout: Duration,
    /// Timeout applied to each per-instance fan-out in the Aggregator.
    pub per_instance_timeout: Duration,
    /// Timeout applied to one bulk-action dispatch.
    pub bulk_action_timeout: Duration,
    /// Interval between SSE heartbeat comments.
    pub sse_heartbeat_interval: Duration,
    /// Address the HTTP layer binds to.
    pub listen_address: String,
    /// `"json"` or `"pretty"`, passed through to `qbfleet-telemetry`.
    pub log_format: String,
}

/// Failure validating a [`ProxyConfig`] at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was empty or otherwise malformed.
    #[error("invalid configuration field `{field}`: {why}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        why: String,
    },
}

impl ProxyConfig {
    /// Validate invariants that are cheap to check eagerly rather than
    /// discovered as a runtime surprise the first time they matter.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `database_url` or `listen_address`
    /// is empty, or if any timeout/interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "database_url",
                why: "must not be empty".into(),
            });
        }
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "listen_address",
                why: "must not be empty".into(),
            });
        }
        for (field, duration) in [
            ("ui_client_timeout", self.ui_client_timeout),
            ("per_instance_timeout", self.per_instance_timeout),
            ("bulk_action_timeout", self.bulk_action_timeout),
            ("sse_heartbeat_interval", self.sse_heartbeat_interval),
        ] {
            if duration.is_zero() {
                return Err(ConfigError::Invalid {
                    field,
                    why: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ProxyConfig {
        ProxyConfig {
            database_url: "postgres://localhost/fleetqb".into(),
            encryption_key: [0_u8; 32],
            freshness: FreshnessTtls::default(),
            ui_client_timeout: Duration::from_secs(3),
            per_instance_timeout: Duration::from_secs(10),
            bulk_action_timeout: Duration::from_secs(30),
            sse_heartbeat_interval: Duration::from_secs(15),
            listen_address: "0.0.0.0:8080".into(),
            log_format: "json".into(),
        }
    }

    #[test]
    fn rejects_empty_database_url() {
        let mut cfg = valid_config();
        cfg.database_url.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "database_url", .. })));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = valid_config();
        cfg.bulk_action_timeout = Duration::ZERO;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "bulk_action_timeout", .. })));
    }

    #[test]
    fn accepts_well_formed_config() {
        assert!(valid_config().validate().is_ok());
    }
}
