//! The Upstream Client: one authenticated session to one remote endpoint.

mod qbittorrent;
mod stub;

pub use qbittorrent::QbittorrentClient;
pub use stub::StubUpstreamClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};
use crate::model::{
    AppPreferences, CapabilitySet, FilePriority, LogLevel, LogRecord, PeerLogRecord, SpeedLimits,
    TorrentView,
};

/// Filter forwarded verbatim to the upstream `torrents/info` call. Kept
/// minimal; richer filtering happens in-memory against the cached list
/// (SPEC_FULL.md §4.3.3), so the client only needs the upstream's own
/// coarse `category`/`tag` narrowing to limit what crosses the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamListFilter {
    /// Upstream category filter, if any.
    pub category: Option<String>,
    /// Upstream tag filter, if any.
    pub tag: Option<String>,
}

/// Parameters for `setLocation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLocation {
    /// New save path.
    pub location: String,
}

/// Parameters for `setShareLimits`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShareLimits {
    /// Ratio limit, `-1` meaning no limit / use global.
    pub ratio_limit: f64,
    /// Seeding time limit in minutes, `-1` meaning no limit / use global.
    pub seeding_time_limit: i64,
}

/// Parameters for `editTracker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditTracker {
    /// Existing tracker URL.
    pub original_url: String,
    /// Replacement tracker URL.
    pub new_url: String,
}

/// Parameters for a single `setFilePriority` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetFilePriority {
    /// File indices to update.
    pub file_indices: Vec<u32>,
    /// Priority to apply.
    pub priority: FilePriority,
}

/// One file entry within a torrent's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    /// File index.
    pub index: u32,
    /// Relative path within the torrent.
    pub name: String,
    /// Total size in bytes.
    pub size: u64,
    /// Fractional completion.
    pub progress: f64,
    /// Current priority.
    pub priority: FilePriority,
}

/// One tracker entry reported for a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEntry {
    /// Tracker URL.
    pub url: String,
    /// Upstream-reported tracker status string.
    pub status: String,
    /// Number of peers the tracker reported.
    pub num_peers: i64,
}

/// One peer entry reported for a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Peer IP:port.
    pub address: String,
    /// Client identifier string reported by the peer.
    pub client: String,
    /// Fractional progress the peer has made.
    pub progress: f64,
    /// Download speed from this peer in bytes/sec.
    pub download_speed: u64,
    /// Upload speed to this peer in bytes/sec.
    pub upload_speed: u64,
}

/// Per-instance handle to one remote torrent-client Web API.
///
/// Object-safe so the Client Pool can hold `Arc<dyn UpstreamClient>`. Every
/// method that talks to the network returns `ProxyError::Unreachable` on
/// transport failure and `ProxyError::SessionLost` when a re-login attempt
/// also fails; callers never see a raw transport error.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Confirm the session is live with a cheap request.
    async fn health_check(&self) -> ProxyResult<()>;

    /// Fetch the full torrent listing, optionally narrowed by the upstream.
    async fn list_torrents(&self, filter: &UpstreamListFilter) -> ProxyResult<Vec<TorrentView>>;

    /// Fetch per-file detail for one torrent.
    async fn get_torrent_files(&self, infohash: &str) -> ProxyResult<Vec<TorrentFileEntry>>;

    /// Fetch tracker detail for one torrent.
    async fn get_torrent_trackers(&self, infohash: &str) -> ProxyResult<Vec<TrackerEntry>>;

    /// Fetch connected-peer detail for one torrent.
    async fn get_torrent_peers(&self, infohash: &str) -> ProxyResult<Vec<PeerEntry>>;

    /// Pause the given torrents.
    async fn pause(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Resume the given torrents.
    async fn resume(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Delete the given torrents, optionally removing on-disk data.
    async fn delete(&self, infohashes: &[String], with_files: bool) -> ProxyResult<()>;

    /// Force a hash recheck of the given torrents.
    async fn recheck(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Force a tracker reannounce for the given torrents.
    async fn reannounce(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Reassign the category of the given torrents.
    async fn set_category(&self, infohashes: &[String], category: &str) -> ProxyResult<()>;

    /// Add tags to the given torrents.
    async fn add_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()>;

    /// Remove tags from the given torrents.
    async fn remove_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()>;

    /// Replace the tag set of the given torrents; requires `setTags` capability.
    async fn set_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        let _ = (infohashes, tags);
        Err(ProxyError::ValidationError {
            field: "capability",
            why: "upstream does not support setTags".into(),
        })
    }

    /// Move the save location of the given torrents.
    async fn set_location(&self, infohashes: &[String], location: &SetLocation) -> ProxyResult<()>;

    /// Set a per-torrent download limit in bytes/sec.
    async fn set_download_limit(&self, infohashes: &[String], bytes_per_sec: u64) -> ProxyResult<()>;

    /// Set a per-torrent upload limit in bytes/sec.
    async fn set_upload_limit(&self, infohashes: &[String], bytes_per_sec: u64) -> ProxyResult<()>;

    /// Set per-torrent share limits.
    async fn set_share_limits(&self, infohashes: &[String], limits: &ShareLimits) -> ProxyResult<()>;

    /// Toggle force-start for the given torrents.
    async fn set_force_start(&self, infohashes: &[String], enabled: bool) -> ProxyResult<()>;

    /// Toggle super-seeding for the given torrents.
    async fn set_super_seeding(&self, infohashes: &[String], enabled: bool) -> ProxyResult<()>;

    /// Move the given torrents to the top of the queue.
    async fn queue_top(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Move the given torrents to the bottom of the queue.
    async fn queue_bottom(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Move the given torrents up one position in the queue.
    async fn queue_up(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Move the given torrents down one position in the queue.
    async fn queue_down(&self, infohashes: &[String]) -> ProxyResult<()>;

    /// Add trackers to one torrent.
    async fn add_trackers(&self, infohash: &str, urls: &[String]) -> ProxyResult<()>;

    /// Replace one tracker URL on one torrent; requires no special capability.
    async fn edit_tracker(&self, infohash: &str, edit: &EditTracker) -> ProxyResult<()>;

    /// Remove trackers from one torrent.
    async fn remove_trackers(&self, infohash: &str, urls: &[String]) -> ProxyResult<()>;

    /// Rename one torrent; requires `renameTorrent` capability.
    async fn rename_torrent(&self, infohash: &str, name: &str) -> ProxyResult<()> {
        let _ = (infohash, name);
        Err(ProxyError::ValidationError {
            field: "capability",
            why: "upstream does not support renaming torrents".into(),
        })
    }

    /// Rename one file within a torrent; requires `renameFile` capability.
    async fn rename_file(&self, infohash: &str, old_path: &str, new_path: &str) -> ProxyResult<()> {
        let _ = (infohash, old_path, new_path);
        Err(ProxyError::ValidationError {
            field: "capability",
            why: "upstream does not support renaming files".into(),
        })
    }

    /// Rename a folder within a torrent; requires `renameFolder` capability.
    async fn rename_folder(&self, infohash: &str, old_path: &str, new_path: &str) -> ProxyResult<()> {
        let _ = (infohash, old_path, new_path);
        Err(ProxyError::ValidationError {
            field: "capability",
            why: "upstream does not support renaming folders".into(),
        })
    }

    /// Set file priority for one torrent.
    async fn set_file_priority(&self, infohash: &str, update: &SetFilePriority) -> ProxyResult<()>;

    /// Fetch global application preferences.
    async fn get_app_preferences(&self) -> ProxyResult<AppPreferences>;

    /// Apply a partial update to global application preferences.
    async fn set_app_preferences(&self, partial: &AppPreferences) -> ProxyResult<()>;

    /// Fetch current global speed limits and alternative-mode state.
    async fn get_speed_limits(&self) -> ProxyResult<SpeedLimits>;

    /// Set the global download limit in bytes/sec, `0` meaning unlimited.
    async fn set_global_download_limit(&self, bytes_per_sec: u64) -> ProxyResult<()>;

    /// Set the global upload limit in bytes/sec, `0` meaning unlimited.
    async fn set_global_upload_limit(&self, bytes_per_sec: u64) -> ProxyResult<()>;

    /// Toggle the alternative (scheduled) speed limits mode.
    async fn toggle_alternative_speed_limits(&self) -> ProxyResult<()>;

    /// Fetch the RSS feed/rule tree as an opaque, upstream-shaped JSON value.
    async fn get_rss_items(&self, refresh: bool) -> ProxyResult<serde_json::Value>;

    /// Fetch a page of main-log records.
    async fn get_main_logs(&self, levels: &[LogLevel]) -> ProxyResult<Vec<LogRecord>>;

    /// Fetch a page of peer-log (banned peer) records.
    async fn get_peer_logs(&self) -> ProxyResult<Vec<PeerLogRecord>>;

    /// The capability set negotiated on the most recent successful login.
    fn capabilities(&self) -> CapabilitySet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_methods_report_missing_capability() {
        let client = stub::StubUpstreamClient::new();
        let err = client
            .set_tags(&["abc".into()], &["x".into()])
            .await
            .expect_err("set_tags should be unsupported by default");
        assert!(matches!(err, ProxyError::ValidationError { field: "capability", .. }));

        let err = client
            .rename_torrent("abc", "new-name")
            .await
            .expect_err("rename_torrent should be unsupported by default");
        assert!(matches!(err, ProxyError::ValidationError { field: "capability", .. }));
    }
}
