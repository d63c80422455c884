//! Core domain types: instances, torrent projections, filters, and the cached
//! per-instance view the Sync Manager serves reads from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable integer identifier for one configured remote endpoint.
pub type InstanceId = i64;

/// Identity of one remote torrent-client endpoint managed by the Proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Stable integer id.
    pub id: InstanceId,
    /// Display name shown to operators.
    pub name: String,
    /// Base URL of the upstream Web API, e.g. `http://10.0.0.5:8080`.
    pub base_url: String,
    /// Username for the primary qBittorrent Web API login.
    pub username: String,
    /// AES-256-GCM-encrypted password, base64-encoded.
    pub encrypted_password: String,
    /// Nonce used to encrypt `encrypted_password`, base64-encoded.
    pub password_nonce: String,
    /// Optional HTTP basic-auth username, if the endpoint sits behind a reverse proxy.
    pub basic_username: Option<String>,
    /// Optional encrypted basic-auth password.
    pub encrypted_basic_password: Option<String>,
    /// Optional nonce for the basic-auth password.
    pub basic_password_nonce: Option<String>,
    /// Whether the instance currently participates in reads/writes.
    pub is_active: bool,
    /// Whether the Proxy host has local filesystem access to this instance's download directory.
    pub has_local_filesystem_access: bool,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Row last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Ephemeral, short-TTL connection status for one instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatus {
    /// Whether the most recent probe succeeded.
    pub connected: bool,
    /// Error observed on the most recent failed probe, if any.
    pub last_error: Option<String>,
}

/// Feature flags negotiated from the upstream API version string on first
/// healthy login. Re-probed on every fresh session; never carried across a
/// session drop (see SPEC_FULL.md §9 Open Question resolution).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    /// Whether the endpoint supports admitting new torrents (not exercised by
    /// any core operation; retained purely as an advertised capability).
    pub torrent_creation: bool,
    /// Whether `setTags` (as opposed to only add/remove) is supported.
    pub set_tags: bool,
    /// Whether torrents can be renamed.
    pub rename_torrent: bool,
    /// Whether individual files can be renamed.
    pub rename_file: bool,
    /// Whether folders can be renamed.
    pub rename_folder: bool,
    /// Upstream-reported API version string.
    pub api_version: String,
}

/// Enumerated upstream torrent states (base states only).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Actively downloading payload data.
    Downloading,
    /// Actively uploading to peers after completion.
    Uploading,
    /// Paused while still downloading.
    PausedDl,
    /// Paused after completion.
    PausedUp,
    /// Stalled (no peers) while downloading.
    StalledDl,
    /// Stalled (no peers) while seeding.
    StalledUp,
    /// Hash-checking while downloading.
    CheckingDl,
    /// Hash-checking while seeding.
    CheckingUp,
    /// Queued, waiting to download.
    QueuedDl,
    /// Queued, waiting to seed.
    QueuedUp,
    /// In an unrecoverable error state.
    Error,
    /// Being moved on disk.
    Moving,
    /// Missing files on disk.
    MissingFiles,
    /// Allocating disk space.
    Allocating,
}

impl TorrentState {
    /// Parse the upstream qBittorrent state string into a `TorrentState`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "downloading" => Self::Downloading,
            "uploading" => Self::Uploading,
            "pausedDL" => Self::PausedDl,
            "pausedUP" => Self::PausedUp,
            "stalledDL" => Self::StalledDl,
            "stalledUP" => Self::StalledUp,
            "checkingDL" => Self::CheckingDl,
            "checkingUP" => Self::CheckingUp,
            "queuedDL" => Self::QueuedDl,
            "queuedUP" => Self::QueuedUp,
            "error" | "unknown" => Self::Error,
            "moving" => Self::Moving,
            "missingFiles" => Self::MissingFiles,
            "allocating" | "metaDL" | "forcedMetaDL" => Self::Allocating,
            "forcedDL" => Self::Downloading,
            "forcedUP" => Self::Uploading,
            "checkingResumeData" => Self::CheckingDl,
            _ => return None,
        })
    }

    /// The wire-format status key used in filters and JSON responses.
    #[must_use]
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Uploading => "uploading",
            Self::PausedDl => "paused_dl",
            Self::PausedUp => "paused_up",
            Self::StalledDl => "stalled_dl",
            Self::StalledUp => "stalled_up",
            Self::CheckingDl => "checking_dl",
            Self::CheckingUp => "checking_up",
            Self::QueuedDl => "queued_dl",
            Self::QueuedUp => "queued_up",
            Self::Error => "error",
            Self::Moving => "moving",
            Self::MissingFiles => "missing_files",
            Self::Allocating => "allocating",
        }
    }
}

/// Projection of one upstream torrent exposed by the core.
///
/// Identity is `(instanceId, infohash)`; `infohash` is stored canonical
/// lowercase so comparisons are case-insensitive by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentView {
    /// Canonical lowercase infohash.
    pub infohash: String,
    /// Display name.
    pub name: String,
    /// Total size in bytes.
    pub size: u64,
    /// Fractional completion in `[0.0, 1.0]`.
    pub progress: f64,
    /// Current upstream state.
    pub state: TorrentState,
    /// Share ratio (uploaded/downloaded).
    pub ratio: f64,
    /// Number of connected seeds.
    pub seeds: i64,
    /// Number of connected leechers.
    pub leechers: i64,
    /// Time the torrent was added to the upstream.
    pub added_on: DateTime<Utc>,
    /// Time the torrent completed, if it has.
    pub completed_on: Option<DateTime<Utc>>,
    /// Time of the last observed activity.
    pub last_activity: DateTime<Utc>,
    /// Category assigned on the upstream, if any.
    pub category: String,
    /// Ordered tag list.
    pub tags: Vec<String>,
    /// Hostname of the first tracker, if any.
    pub tracker_host: String,
    /// Save path on the upstream host.
    pub save_path: String,
    /// Content path (save path plus the torrent's root, if a folder).
    pub content_path: String,
    /// Estimated time to completion in seconds, if known.
    pub eta_seconds: Option<u64>,
    /// Current download speed in bytes per second.
    pub download_speed: u64,
    /// Current upload speed in bytes per second.
    pub upload_speed: u64,
    /// Total bytes downloaded so far.
    pub total_downloaded: u64,
    /// Total bytes uploaded so far.
    pub total_uploaded: u64,
    /// Piece availability (0.0 to roughly the swarm's redundancy factor).
    pub availability: f64,
    /// Whether the torrent is marked private.
    pub private: bool,
    /// Free-form labels beyond `tags` (upstream-specific).
    pub labels: Vec<String>,
}

/// `TorrentView` tagged with the instance it came from; returned only by the
/// Cross-Instance Aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossInstanceTorrentView {
    /// Instance the torrent belongs to.
    pub instance_id: InstanceId,
    /// The projected torrent.
    #[serde(flatten)]
    pub view: TorrentView,
}

/// Aggregate up/down speeds for one instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct InstanceSpeeds {
    /// Aggregate download speed in bytes per second.
    pub download: u64,
    /// Aggregate upload speed in bytes per second.
    pub upload: u64,
}

/// Descriptor for one upstream-defined category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CategoryDescriptor {
    /// Default save path associated with the category, if any.
    pub save_path: String,
}

/// Tracker host plus the number of torrents currently using it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerCount {
    /// Tracker hostname.
    pub host: String,
    /// Number of torrents whose first tracker is this host.
    pub count: usize,
}

/// Snapshot of one instance's torrent catalog, owned by the Sync Manager.
///
/// Invariants: `total == torrents.len()`; summing `counts_by_status` over any
/// exhaustive status partition equals `total`; `fetched_at` is monotone per
/// instance (enforced by the Sync Manager, never by this type alone).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedTorrentList {
    /// All torrents currently known for the instance, source order.
    pub torrents: Vec<TorrentView>,
    /// Count of torrents per base status key.
    pub counts_by_status: BTreeMap<&'static str, usize>,
    /// Total torrent count; always `torrents.len()`.
    pub total: usize,
    /// Known categories, keyed by name.
    pub categories: BTreeMap<String, CategoryDescriptor>,
    /// Known tags, in upstream order with duplicates removed.
    pub tags: Vec<String>,
    /// Tracker hosts observed, with per-host torrent counts.
    pub trackers: Vec<TrackerCount>,
    /// Aggregate instance speeds as of this snapshot.
    pub instance_speeds: InstanceSpeeds,
    /// Time this snapshot was fetched from the upstream.
    pub fetched_at: DateTime<Utc>,
    /// Monotonically increasing revision, bumped on every mutation or refresh.
    pub source_revision: u64,
}

impl CachedTorrentList {
    /// Build a snapshot from a flat torrent list, computing derived indices.
    #[must_use]
    pub fn from_torrents(torrents: Vec<TorrentView>, revision: u64, fetched_at: DateTime<Utc>) -> Self {
        let mut counts_by_status = BTreeMap::new();
        let mut categories: BTreeMap<String, CategoryDescriptor> = BTreeMap::new();
        let mut tags_seen = Vec::new();
        let mut tracker_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut instance_speeds = InstanceSpeeds::default();

        for torrent in &torrents {
            *counts_by_status.entry(torrent.state.as_key()).or_insert(0) += 1;
            categories
                .entry(torrent.category.clone())
                .or_insert_with(|| CategoryDescriptor {
                    save_path: torrent.save_path.clone(),
                });
            for tag in &torrent.tags {
                if !tags_seen.contains(tag) {
                    tags_seen.push(tag.clone());
                }
            }
            if !torrent.tracker_host.is_empty() {
                *tracker_counts.entry(torrent.tracker_host.clone()).or_insert(0) += 1;
            }
            instance_speeds.download += torrent.download_speed;
            instance_speeds.upload += torrent.upload_speed;
        }
        categories.remove("");

        let trackers = tracker_counts
            .into_iter()
            .map(|(host, count)| TrackerCount { host, count })
            .collect();

        let total = torrents.len();
        Self {
            torrents,
            counts_by_status,
            total,
            categories,
            tags: tags_seen,
            trackers,
            instance_speeds,
            fetched_at,
            source_revision: revision,
        }
    }
}

/// Derived status groups layered over the base `TorrentState` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKey {
    /// Exact base state.
    Base(TorrentState),
    /// `downloading = {downloading, stalled_dl, queued_dl, checking_dl, allocating}`.
    Downloading,
    /// `seeding = {uploading, stalled_up, queued_up, checking_up}`.
    Seeding,
    /// `paused = {paused_dl, paused_up}`.
    Paused,
    /// `errored = {error, missing_files}`.
    Errored,
    /// `completed`: `progress == 1.0`.
    Completed,
    /// `active`: `upspeed > 0 or dlspeed > 0`.
    Active,
    /// `inactive`: `upspeed == 0 and dlspeed == 0`.
    Inactive,
    /// `running`: not in `paused`.
    Running,
    /// `resumed`: alias of `running`.
    Resumed,
}

impl StatusKey {
    /// Parse a status filter key from its wire string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(state) = TorrentState::parse_key(raw) {
            return Some(Self::Base(state));
        }
        Some(match raw {
            "downloading" => Self::Downloading,
            "seeding" => Self::Seeding,
            "paused" => Self::Paused,
            "errored" => Self::Errored,
            "completed" => Self::Completed,
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            "running" => Self::Running,
            "resumed" => Self::Resumed,
            _ => return None,
        })
    }

    /// Whether `torrent` matches this status key.
    #[must_use]
    pub fn matches(self, torrent: &TorrentView) -> bool {
        match self {
            Self::Base(state) => torrent.state == state,
            Self::Downloading => matches!(
                torrent.state,
                TorrentState::Downloading
                    | TorrentState::StalledDl
                    | TorrentState::QueuedDl
                    | TorrentState::CheckingDl
                    | TorrentState::Allocating
            ),
            Self::Seeding => matches!(
                torrent.state,
                TorrentState::Uploading
                    | TorrentState::StalledUp
                    | TorrentState::QueuedUp
                    | TorrentState::CheckingUp
            ),
            Self::Paused => matches!(torrent.state, TorrentState::PausedDl | TorrentState::PausedUp),
            Self::Errored => matches!(torrent.state, TorrentState::Error | TorrentState::MissingFiles),
            Self::Completed => (torrent.progress - 1.0).abs() < f64::EPSILON,
            Self::Active => torrent.upload_speed > 0 || torrent.download_speed > 0,
            Self::Inactive => torrent.upload_speed == 0 && torrent.download_speed == 0,
            Self::Running | Self::Resumed => {
                !matches!(torrent.state, TorrentState::PausedDl | TorrentState::PausedUp)
            }
        }
    }
}

impl TorrentState {
    fn parse_key(raw: &str) -> Option<Self> {
        Some(match raw {
            "downloading" | "uploading" | "error" | "moving" | "allocating" => return None,
            "paused_dl" => Self::PausedDl,
            "paused_up" => Self::PausedUp,
            "stalled_dl" => Self::StalledDl,
            "stalled_up" => Self::StalledUp,
            "checking_dl" => Self::CheckingDl,
            "checking_up" => Self::CheckingUp,
            "queued_dl" => Self::QueuedDl,
            "queued_up" => Self::QueuedUp,
            "missing_files" => Self::MissingFiles,
            _ => return None,
        })
    }
}

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Sortable `TorrentView` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Sort by display name.
    Name,
    /// Sort by total size.
    Size,
    /// Sort by completion fraction.
    Progress,
    /// Sort by current state key.
    State,
    /// Sort by share ratio.
    Ratio,
    /// Sort by time added.
    AddedOn,
    /// Sort by download speed.
    DownloadSpeed,
    /// Sort by upload speed.
    UploadSpeed,
}

/// One entry in a multi-field sort specification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortKey {
    /// Field to compare on.
    pub field: SortField,
    /// Direction to apply.
    pub direction: SortDirection,
}

/// Input to a Sync Manager / Aggregator torrent query.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterSpec {
    /// Case-insensitive substring match over name/category/tags/save-path/tracker host.
    pub search: Option<String>,
    /// Inclusion: status keys, OR'd together.
    #[serde(default)]
    pub status: Vec<String>,
    /// Inclusion: categories, OR'd together.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Inclusion: tags, OR'd together.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusion: tracker hosts, OR'd together.
    #[serde(default)]
    pub trackers: Vec<String>,
    /// Exclusion: status keys, applied AND-NOT after inclusion.
    #[serde(default)]
    pub exclude_status: Vec<String>,
    /// Exclusion: categories.
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    /// Exclusion: tags.
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    /// Exclusion: tracker hosts.
    #[serde(default)]
    pub exclude_trackers: Vec<String>,
}

/// A persisted, named `FilterSpec` bound to one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDefinedView {
    /// Display name for the saved view.
    pub name: String,
    /// Instance the view is bound to.
    pub instance_id: InstanceId,
    /// The saved filter.
    pub filter: FilterSpec,
}

/// Download priority for one file within a torrent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    /// Do not download.
    Skip,
    /// Download after normal-priority files.
    Low,
    /// Default priority.
    Normal,
    /// Download before normal-priority files.
    High,
}

/// Severity of a main-log record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Informational, routine.
    Normal,
    /// Informational, notable.
    Info,
    /// Potential problem.
    Warning,
    /// Serious problem.
    Critical,
}

/// One main-log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    /// Time the upstream recorded the entry.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
}

/// One peer-log (banned/blocked peer) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerLogRecord {
    /// Time the upstream recorded the entry.
    pub timestamp: DateTime<Utc>,
    /// Peer IP address.
    pub ip: String,
    /// Reason the peer was blocked.
    pub reason: String,
    /// Whether the peer is currently blocked.
    pub blocked: bool,
}

/// Global application preferences, as a loosely-typed map (upstream-defined
/// keys vary across qBittorrent versions; the core passes them through).
pub type AppPreferences = serde_json::Map<String, serde_json::Value>;

/// Global + alternative speed limit state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SpeedLimits {
    /// Global download limit in bytes/sec, `0` meaning unlimited.
    pub download_limit: u64,
    /// Global upload limit in bytes/sec, `0` meaning unlimited.
    pub upload_limit: u64,
    /// Whether the alternative (scheduled) limits are currently active.
    pub alternative_mode_enabled: bool,
}

/// Bulk action vocabulary (spec.md §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BulkAction {
    /// Pause the target torrents.
    Pause,
    /// Resume the target torrents.
    Resume,
    /// Delete the target torrents.
    Delete,
    /// Force a hash recheck.
    Recheck,
    /// Force a tracker reannounce.
    Reannounce,
    /// Reassign category.
    SetCategory,
    /// Add tags.
    AddTags,
    /// Remove tags.
    RemoveTags,
    /// Replace the tag set entirely.
    SetTags,
    /// Change the save location.
    SetLocation,
    /// Set a per-torrent download limit.
    SetDownloadLimit,
    /// Set a per-torrent upload limit.
    SetUploadLimit,
    /// Set per-torrent share limits.
    SetShareLimits,
    /// Toggle force-start.
    SetForceStart,
    /// Toggle super-seeding.
    SetSuperSeeding,
    /// Move to the top of the queue.
    QueueTop,
    /// Move to the bottom of the queue.
    QueueBottom,
    /// Move up one position in the queue.
    QueueUp,
    /// Move down one position in the queue.
    QueueDown,
    /// Add trackers.
    AddTrackers,
    /// Replace a tracker URL.
    EditTrackers,
    /// Remove trackers.
    RemoveTrackers,
    /// Toggle the alternative speed limits mode (instance-wide, ignores targets).
    ToggleAlternativeSpeedLimits,
}

/// Free-form action parameters; validated per-action by the Bulk Action
/// Coordinator (SPEC_FULL.md §4.6).
pub type ActionParams = serde_json::Map<String, serde_json::Value>;

/// An explicit `(instanceId, infohash)` pair a bulk action will act upon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Target {
    /// Instance the torrent lives on.
    pub instance_id: InstanceId,
    /// Canonical lowercase infohash.
    pub infohash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_torrent(state: TorrentState, progress: f64, up: u64, down: u64) -> TorrentView {
        TorrentView {
            infohash: "abc".into(),
            name: "demo".into(),
            size: 100,
            progress,
            state,
            ratio: 0.0,
            seeds: 0,
            leechers: 0,
            added_on: Utc::now(),
            completed_on: None,
            last_activity: Utc::now(),
            category: "movies".into(),
            tags: vec!["a".into(), "b".into()],
            tracker_host: "tracker.example".into(),
            save_path: "/data".into(),
            content_path: "/data/demo".into(),
            eta_seconds: None,
            download_speed: down,
            upload_speed: up,
            total_downloaded: 0,
            total_uploaded: 0,
            availability: 1.0,
            private: false,
            labels: vec![],
        }
    }

    #[test]
    fn cached_torrent_list_invariants_hold() {
        let torrents = vec![
            sample_torrent(TorrentState::Downloading, 0.4, 0, 10),
            sample_torrent(TorrentState::Uploading, 1.0, 5, 0),
            sample_torrent(TorrentState::PausedDl, 0.2, 0, 0),
        ];
        let list = CachedTorrentList::from_torrents(torrents, 1, Utc::now());
        assert_eq!(list.total, list.torrents.len());
        let sum: usize = list.counts_by_status.values().sum();
        assert_eq!(sum, list.total);
    }

    #[test]
    fn status_key_derived_groups_match_spec() {
        let downloading = sample_torrent(TorrentState::StalledDl, 0.1, 0, 0);
        assert!(StatusKey::Downloading.matches(&downloading));
        assert!(!StatusKey::Seeding.matches(&downloading));

        let paused = sample_torrent(TorrentState::PausedUp, 1.0, 0, 0);
        assert!(StatusKey::Paused.matches(&paused));
        assert!(!StatusKey::Running.matches(&paused));

        let completed = sample_torrent(TorrentState::Uploading, 1.0, 0, 0);
        assert!(StatusKey::Completed.matches(&completed));

        let active = sample_torrent(TorrentState::Downloading, 0.5, 0, 42);
        assert!(StatusKey::Active.matches(&active));
        assert!(!StatusKey::Inactive.matches(&active));
    }

    #[test]
    fn status_key_parses_wire_strings() {
        assert_eq!(StatusKey::parse("downloading"), Some(StatusKey::Downloading));
        assert_eq!(
            StatusKey::parse("paused_dl"),
            Some(StatusKey::Base(TorrentState::PausedDl))
        );
        assert_eq!(StatusKey::parse("bogus"), None);
    }
}
