//! Event payload types carried across the platform.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Minimal torrent projection carried on the wire inside a delta event.
///
/// Deliberately decoupled from `qbfleet-core`'s `TorrentView` so this crate has
/// no dependency on the core crate; callers convert at the boundary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct TorrentSummary {
    /// Canonical lowercase infohash.
    pub infohash: String,
    /// Display name.
    pub name: String,
    /// Upstream state key (e.g. `downloading`).
    pub state: String,
    /// Fractional completion in `[0.0, 1.0]`.
    pub progress: f64,
}

/// One record appended to a main or peer log tail.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct LogRecordPayload {
    /// Time the upstream recorded the entry.
    pub timestamp: DateTime<Utc>,
    /// Severity label, free-form (upstream-defined).
    pub level: String,
    /// Human-readable message.
    pub message: String,
}

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An instance's ephemeral connection status flipped.
    ConnectionChanged {
        /// Instance the status belongs to.
        instance_id: i64,
        /// Whether the instance is currently reachable.
        connected: bool,
        /// Last observed error, if disconnected.
        last_error: Option<String>,
    },
    /// Compact torrent-list delta for one instance.
    TorrentsDelta {
        /// Instance the delta belongs to.
        instance_id: i64,
        /// Torrents newly present since the last emission.
        added: Vec<TorrentSummary>,
        /// Infohashes no longer present.
        removed: Vec<String>,
        /// Torrents whose tracked fields changed.
        updated: Vec<TorrentSummary>,
    },
    /// Full-replacement RSS tree update for one instance.
    FeedsUpdate {
        /// Instance the feed tree belongs to.
        instance_id: i64,
        /// Opaque, upstream-shaped RSS tree document.
        tree: serde_json::Value,
    },
    /// New main or peer log records for one instance.
    LogsAppend {
        /// Instance the log belongs to.
        instance_id: i64,
        /// Newly observed records, oldest first.
        records: Vec<LogRecordPayload>,
    },
    /// System health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
    /// An instance's credentials could not be decrypted.
    DecryptionErrorRaised {
        /// Instance whose credentials failed to decrypt.
        instance_id: i64,
    },
    /// An instance's decryption error was cleared (client pool entry removed).
    DecryptionErrorCleared {
        /// Instance whose decryption error was cleared.
        instance_id: i64,
    },
}

impl Event {
    /// Machine-friendly discriminator, also used as the SSE `event:` line for
    /// the three Live-Update channel kinds.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::TorrentsDelta { .. } => "torrents_delta",
            Self::FeedsUpdate { .. } => "feeds_update",
            Self::LogsAppend { .. } => "logs_append",
            Self::HealthChanged { .. } => "health_changed",
            Self::DecryptionErrorRaised { .. } => "decryption_error_raised",
            Self::DecryptionErrorCleared { .. } => "decryption_error_cleared",
        }
    }

    /// Instance id this event pertains to, if any (system-wide events have none).
    #[must_use]
    pub const fn instance_id(&self) -> Option<i64> {
        match self {
            Self::ConnectionChanged { instance_id, .. }
            | Self::TorrentsDelta { instance_id, .. }
            | Self::FeedsUpdate { instance_id, .. }
            | Self::LogsAppend { instance_id, .. }
            | Self::DecryptionErrorRaised { instance_id }
            | Self::DecryptionErrorCleared { instance_id } => Some(*instance_id),
            Self::HealthChanged { .. } => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_matches_variant() {
        let cases = [
            (
                Event::ConnectionChanged {
                    instance_id: 1,
                    connected: true,
                    last_error: None,
                },
                "connection_changed",
            ),
            (
                Event::TorrentsDelta {
                    instance_id: 1,
                    added: vec![],
                    removed: vec![],
                    updated: vec![],
                },
                "torrents_delta",
            ),
            (
                Event::HealthChanged {
                    degraded: vec!["pool".into()],
                },
                "health_changed",
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(event.kind(), expected);
        }
    }

    #[test]
    fn instance_id_is_none_for_system_wide_events() {
        let event = Event::HealthChanged {
            degraded: vec![],
        };
        assert_eq!(event.instance_id(), None);
        let event = Event::ConnectionChanged {
            instance_id: 7,
            connected: false,
            last_error: Some("timeout".into()),
        };
        assert_eq!(event.instance_id(), Some(7));
    }

    #[test]
    fn envelope_carries_fields() {
        let event = Event::HealthChanged {
            degraded: vec!["pool".into()],
        };
        let envelope = EventEnvelope {
            id: 42,
            timestamp: Utc::now(),
            event: event.clone(),
        };
        assert_eq!(envelope.id, 42);
        assert_eq!(envelope.event, event);
    }
}
