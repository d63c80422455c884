//! In-memory `UpstreamClient` test double used across the Sync Manager,
//! Aggregator, and Bulk Coordinator test suites.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::client::{
    EditTracker, PeerEntry, SetFilePriority, SetLocation, ShareLimits, TorrentFileEntry,
    TrackerEntry, UpstreamClient, UpstreamListFilter,
};
use crate::error::{ProxyError, ProxyResult};
use crate::model::{AppPreferences, CapabilitySet, LogLevel, LogRecord, PeerLogRecord, SpeedLimits, TorrentView};

/// Programmable in-memory upstream used in tests.
///
/// Construct with [`StubUpstreamClient::new`], seed state with
/// [`StubUpstreamClient::seed_torrents`], and optionally force the next call
/// to fail with [`StubUpstreamClient::fail_next`]. [`StubUpstreamClient::calls`]
/// exposes a call-count map keyed by method name for assertions.
pub struct StubUpstreamClient {
    state: Mutex<StubState>,
}

struct StubState {
    torrents: Vec<TorrentView>,
    preferences: AppPreferences,
    speed_limits: SpeedLimits,
    capabilities: CapabilitySet,
    calls: HashMap<&'static str, usize>,
    fail_next: Option<ProxyError>,
}

impl StubUpstreamClient {
    /// Construct an empty stub with default capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                torrents: Vec::new(),
                preferences: AppPreferences::new(),
                speed_limits: SpeedLimits::default(),
                capabilities: CapabilitySet {
                    api_version: "2.9.3".into(),
                    ..CapabilitySet::default()
                },
                calls: HashMap::new(),
                fail_next: None,
            }),
        }
    }

    /// Replace the torrent catalog returned by `list_torrents`.
    pub fn seed_torrents(&self, torrents: Vec<TorrentView>) {
        self.lock().torrents = torrents;
    }

    /// Force the next call to any method to fail with `err`.
    pub fn fail_next(&self, err: ProxyError) {
        self.lock().fail_next = Some(err);
    }

    /// Number of times `method` was invoked.
    #[must_use]
    pub fn call_count(&self, method: &'static str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Set the capability flags returned by `capabilities()`.
    pub fn set_capabilities(&self, capabilities: CapabilitySet) {
        self.lock().capabilities = capabilities;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, method: &'static str) -> ProxyResult<()> {
        let mut state = self.lock();
        *state.calls.entry(method).or_insert(0) += 1;
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        Ok(())
    }

    fn apply_to_matching(&self, infohashes: &[String], f: impl Fn(&mut TorrentView)) {
        let mut state = self.lock();
        for torrent in &mut state.torrents {
            if infohashes.contains(&torrent.infohash) {
                f(torrent);
            }
        }
    }
}

impl Default for StubUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamClient for StubUpstreamClient {
    async fn health_check(&self) -> ProxyResult<()> {
        self.record("health_check")
    }

    async fn list_torrents(&self, _filter: &UpstreamListFilter) -> ProxyResult<Vec<TorrentView>> {
        self.record("list_torrents")?;
        Ok(self.lock().torrents.clone())
    }

    async fn get_torrent_files(&self, _infohash: &str) -> ProxyResult<Vec<TorrentFileEntry>> {
        self.record("get_torrent_files")?;
        Ok(Vec::new())
    }

    async fn get_torrent_trackers(&self, _infohash: &str) -> ProxyResult<Vec<TrackerEntry>> {
        self.record("get_torrent_trackers")?;
        Ok(Vec::new())
    }

    async fn get_torrent_peers(&self, _infohash: &str) -> ProxyResult<Vec<PeerEntry>> {
        self.record("get_torrent_peers")?;
        Ok(Vec::new())
    }

    async fn pause(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("pause")?;
        self.apply_to_matching(infohashes, |t| t.state = crate::model::TorrentState::PausedDl);
        Ok(())
    }

    async fn resume(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("resume")?;
        self.apply_to_matching(infohashes, |t| t.state = crate::model::TorrentState::Downloading);
        Ok(())
    }

    async fn delete(&self, infohashes: &[String], _with_files: bool) -> ProxyResult<()> {
        self.record("delete")?;
        self.lock().torrents.retain(|t| !infohashes.contains(&t.infohash));
        Ok(())
    }

    async fn recheck(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("recheck")?;
        self.apply_to_matching(infohashes, |t| t.state = crate::model::TorrentState::CheckingDl);
        Ok(())
    }

    async fn reannounce(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("reannounce")?;
        let _ = infohashes;
        Ok(())
    }

    async fn set_category(&self, infohashes: &[String], category: &str) -> ProxyResult<()> {
        self.record("set_category")?;
        let category = category.to_string();
        self.apply_to_matching(infohashes, |t| t.category = category.clone());
        Ok(())
    }

    async fn add_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        self.record("add_tags")?;
        self.apply_to_matching(infohashes, |t| {
            for tag in tags {
                if !t.tags.contains(tag) {
                    t.tags.push(tag.clone());
                }
            }
        });
        Ok(())
    }

    async fn remove_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        self.record("remove_tags")?;
        self.apply_to_matching(infohashes, |t| t.tags.retain(|tag| !tags.contains(tag)));
        Ok(())
    }

    async fn set_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        self.record("set_tags")?;
        if !self.lock().capabilities.set_tags {
            return Err(ProxyError::ValidationError {
                field: "capability",
                why: "upstream does not support setTags".into(),
            });
        }
        let tags = tags.to_vec();
        self.apply_to_matching(infohashes, |t| t.tags = tags.clone());
        Ok(())
    }

    async fn set_location(&self, infohashes: &[String], location: &SetLocation) -> ProxyResult<()> {
        self.record("set_location")?;
        let path = location.location.clone();
        self.apply_to_matching(infohashes, |t| t.save_path = path.clone());
        Ok(())
    }

    async fn set_download_limit(&self, infohashes: &[String], _bytes_per_sec: u64) -> ProxyResult<()> {
        self.record("set_download_limit")?;
        let _ = infohashes;
        Ok(())
    }

    async fn set_upload_limit(&self, infohashes: &[String], _bytes_per_sec: u64) -> ProxyResult<()> {
        self.record("set_upload_limit")?;
        let _ = infohashes;
        Ok(())
    }

    async fn set_share_limits(&self, infohashes: &[String], _limits: &ShareLimits) -> ProxyResult<()> {
        self.record("set_share_limits")?;
        let _ = infohashes;
        Ok(())
    }

    async fn set_force_start(&self, infohashes: &[String], _enabled: bool) -> ProxyResult<()> {
        self.record("set_force_start")?;
        let _ = infohashes;
        Ok(())
    }

    async fn set_super_seeding(&self, infohashes: &[String], _enabled: bool) -> ProxyResult<()> {
        self.record("set_super_seeding")?;
        let _ = infohashes;
        Ok(())
    }

    async fn queue_top(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("queue_top")?;
        let _ = infohashes;
        Ok(())
    }

    async fn queue_bottom(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("queue_bottom")?;
        let _ = infohashes;
        Ok(())
    }

    async fn queue_up(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("queue_up")?;
        let _ = infohashes;
        Ok(())
    }

    async fn queue_down(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.record("queue_down")?;
        let _ = infohashes;
        Ok(())
    }

    async fn add_trackers(&self, infohash: &str, urls: &[String]) -> ProxyResult<()> {
        self.record("add_trackers")?;
        let _ = (infohash, urls);
        Ok(())
    }

    async fn edit_tracker(&self, infohash: &str, edit: &EditTracker) -> ProxyResult<()> {
        self.record("edit_tracker")?;
        let _ = (infohash, edit);
        Ok(())
    }

    async fn remove_trackers(&self, infohash: &str, urls: &[String]) -> ProxyResult<()> {
        self.record("remove_trackers")?;
        let _ = (infohash, urls);
        Ok(())
    }

    async fn set_file_priority(&self, infohash: &str, update: &SetFilePriority) -> ProxyResult<()> {
        self.record("set_file_priority")?;
        let _ = (infohash, update);
        Ok(())
    }

    async fn get_app_preferences(&self) -> ProxyResult<AppPreferences> {
        self.record("get_app_preferences")?;
        Ok(self.lock().preferences.clone())
    }

    async fn set_app_preferences(&self, partial: &AppPreferences) -> ProxyResult<()> {
        self.record("set_app_preferences")?;
        let mut state = self.lock();
        for (key, value) in partial {
            state.preferences.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_speed_limits(&self) -> ProxyResult<SpeedLimits> {
        self.record("get_speed_limits")?;
        Ok(self.lock().speed_limits)
    }

    async fn set_global_download_limit(&self, bytes_per_sec: u64) -> ProxyResult<()> {
        self.record("set_global_download_limit")?;
        self.lock().speed_limits.download_limit = bytes_per_sec;
        Ok(())
    }

    async fn set_global_upload_limit(&self, bytes_per_sec: u64) -> ProxyResult<()> {
        self.record("set_global_upload_limit")?;
        self.lock().speed_limits.upload_limit = bytes_per_sec;
        Ok(())
    }

    async fn toggle_alternative_speed_limits(&self) -> ProxyResult<()> {
        self.record("toggle_alternative_speed_limits")?;
        let mut state = self.lock();
        state.speed_limits.alternative_mode_enabled = !state.speed_limits.alternative_mode_enabled;
        Ok(())
    }

    async fn get_rss_items(&self, _refresh: bool) -> ProxyResult<serde_json::Value> {
        self.record("get_rss_items")?;
        Ok(json!({}))
    }

    async fn get_main_logs(&self, _levels: &[LogLevel]) -> ProxyResult<Vec<LogRecord>> {
        self.record("get_main_logs")?;
        Ok(Vec::new())
    }

    async fn get_peer_logs(&self) -> ProxyResult<Vec<PeerLogRecord>> {
        self.record("get_peer_logs")?;
        Ok(Vec::new())
    }

    fn capabilities(&self) -> CapabilitySet {
        self.lock().capabilities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn torrent(infohash: &str) -> TorrentView {
        TorrentView {
            infohash: infohash.into(),
            name: "demo".into(),
            size: 0,
            progress: 0.0,
            state: crate::model::TorrentState::Downloading,
            ratio: 0.0,
            seeds: 0,
            leechers: 0,
            added_on: Utc::now(),
            completed_on: None,
            last_activity: Utc::now(),
            category: String::new(),
            tags: vec![],
            tracker_host: String::new(),
            save_path: String::new(),
            content_path: String::new(),
            eta_seconds: None,
            download_speed: 0,
            upload_speed: 0,
            total_downloaded: 0,
            total_uploaded: 0,
            availability: 0.0,
            private: false,
            labels: vec![],
        }
    }

    #[tokio::test]
    async fn pause_mutates_state_and_tracks_calls() {
        let stub = StubUpstreamClient::new();
        stub.seed_torrents(vec![torrent("abc")]);

        stub.pause(&["abc".into()]).await.expect("pause succeeds");
        assert_eq!(stub.call_count("pause"), 1);

        let listed = stub
            .list_torrents(&UpstreamListFilter::default())
            .await
            .expect("list succeeds");
        assert_eq!(listed[0].state, crate::model::TorrentState::PausedDl);
    }

    #[tokio::test]
    async fn fail_next_injects_a_single_error() {
        let stub = StubUpstreamClient::new();
        stub.fail_next(ProxyError::SessionLost { instance_id: 1 });

        let first = stub.health_check().await;
        assert!(matches!(first, Err(ProxyError::SessionLost { .. })));

        let second = stub.health_check().await;
        assert!(second.is_ok());
    }
}
