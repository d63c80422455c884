//! Real `UpstreamClient` implementation speaking the qBittorrent Web API.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::client::{
    EditTracker, PeerEntry, SetFilePriority, SetLocation, ShareLimits, TorrentFileEntry,
    TrackerEntry, UpstreamClient, UpstreamListFilter,
};
use crate::error::{ProxyError, ProxyResult};
use crate::model::{
    AppPreferences, CapabilitySet, InstanceId, LogLevel, LogRecord, PeerLogRecord, SpeedLimits,
    TorrentState, TorrentView,
};

/// Thin `reqwest`-based client for one qBittorrent Web API endpoint.
///
/// Holds its own cookie-enabled [`reqwest::Client`] so the `SID` session
/// cookie issued by `/api/v2/auth/login` is tracked automatically.
pub struct QbittorrentClient {
    instance_id: InstanceId,
    base_url: Url,
    username: String,
    password: String,
    http: reqwest::Client,
    capabilities: Mutex<CapabilitySet>,
}

impl QbittorrentClient {
    /// Build a client for `base_url`; does not log in until the first call.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `base_url` cannot be parsed.
    pub fn new(
        instance_id: InstanceId,
        base_url: &str,
        username: String,
        password: String,
    ) -> ProxyResult<Self> {
        let base_url = Url::parse(base_url).map_err(|source| ProxyError::ValidationError {
            field: "base_url",
            why: source.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|source| ProxyError::Unreachable { instance_id, source })?;
        Ok(Self {
            instance_id,
            base_url,
            username,
            password,
            http,
            capabilities: Mutex::new(CapabilitySet::default()),
        })
    }

    /// Log in and probe the capability set from the reported API version.
    pub async fn login(&self) -> ProxyResult<()> {
        let url = self.url("api/v2/auth/login");
        let resp = self
            .http
            .post(url)
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|source| ProxyError::Unreachable {
                instance_id: self.instance_id,
                source,
            })?;
        if !resp.status().is_success() {
            return Err(ProxyError::UpstreamError {
                instance_id: self.instance_id,
                code: resp.status().as_u16(),
                message: "login request failed".into(),
            });
        }
        let body = resp.text().await.unwrap_or_default();
        if body.trim() != "Ok." {
            return Err(ProxyError::SessionLost {
                instance_id: self.instance_id,
            });
        }
        self.probe_capabilities().await
    }

    async fn probe_capabilities(&self) -> ProxyResult<()> {
        let url = self.url("api/v2/app/webapiVersion");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ProxyError::Unreachable {
                instance_id: self.instance_id,
                source,
            })?;
        let api_version = resp.text().await.unwrap_or_default().trim().to_string();
        let (major, minor) = parse_version(&api_version);
        let mut capabilities = self.capabilities.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *capabilities = CapabilitySet {
            torrent_creation: true,
            set_tags: (major, minor) >= (2, 11),
            rename_torrent: (major, minor) >= (2, 9),
            rename_file: (major, minor) >= (2, 4),
            rename_folder: (major, minor) >= (2, 4),
            api_version,
        };
        Ok(())
    }

    fn url(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap_or_else(|_| self.base_url.clone())
    }

    async fn send(&self, method: Method, path: &str, form: &[(&str, &str)]) -> ProxyResult<reqwest::Response> {
        let url = self.url(path);
        let mut builder = self.http.request(method, url);
        if !form.is_empty() {
            builder = builder.form(form);
        }
        let resp = builder.send().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })?;
        if resp.status() == StatusCode::FORBIDDEN {
            return Err(ProxyError::SessionLost {
                instance_id: self.instance_id,
            });
        }
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProxyError::UpstreamError {
                instance_id: self.instance_id,
                code,
                message,
            });
        }
        Ok(resp)
    }

    /// Re-login once and retry once on session loss, per SPEC_FULL.md §4.1.
    async fn send_with_reauth(&self, method: Method, path: &str, form: &[(&str, &str)]) -> ProxyResult<reqwest::Response> {
        match self.send(method.clone(), path, form).await {
            Err(ProxyError::SessionLost { .. }) => {
                self.login().await?;
                self.send(method, path, form).await
            }
            other => other,
        }
    }

    async fn post_hashes(&self, path: &str, infohashes: &[String], extra: &[(&str, &str)]) -> ProxyResult<()> {
        let joined = infohashes.join("|");
        let mut form: Vec<(&str, &str)> = vec![("hashes", joined.as_str())];
        form.extend_from_slice(extra);
        self.send_with_reauth(Method::POST, path, &form).await?;
        Ok(())
    }
}

fn parse_version(raw: &str) -> (u32, u32) {
    let mut parts = raw.trim_start_matches('v').split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (major, minor)
}

#[derive(Debug, Deserialize)]
struct RawTorrent {
    hash: String,
    name: String,
    size: u64,
    progress: f64,
    state: String,
    ratio: f64,
    num_seeds: i64,
    num_leechs: i64,
    added_on: i64,
    completion_on: i64,
    last_activity: i64,
    category: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    tracker: String,
    save_path: String,
    #[serde(default)]
    content_path: String,
    eta: i64,
    dlspeed: u64,
    upspeed: u64,
    downloaded: u64,
    uploaded: u64,
    #[serde(default)]
    availability: f64,
}

fn tracker_host(tracker: &str) -> String {
    Url::parse(tracker)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_default()
}

impl From<RawTorrent> for TorrentView {
    fn from(raw: RawTorrent) -> Self {
        let state = TorrentState::parse(&raw.state).unwrap_or(TorrentState::Error);
        Self {
            infohash: raw.hash.to_lowercase(),
            name: raw.name,
            size: raw.size,
            progress: raw.progress,
            state,
            ratio: raw.ratio,
            seeds: raw.num_seeds,
            leechers: raw.num_leechs,
            added_on: Utc.timestamp_opt(raw.added_on, 0).single().unwrap_or_else(Utc::now),
            completed_on: (raw.completion_on > 0)
                .then(|| Utc.timestamp_opt(raw.completion_on, 0).single())
                .flatten(),
            last_activity: Utc.timestamp_opt(raw.last_activity, 0).single().unwrap_or_else(Utc::now),
            category: raw.category,
            tags: raw.tags.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from).collect(),
            tracker_host: tracker_host(&raw.tracker),
            save_path: raw.save_path,
            content_path: raw.content_path,
            eta_seconds: (raw.eta >= 0 && raw.eta < 8_640_000).then_some(raw.eta as u64),
            download_speed: raw.dlspeed,
            upload_speed: raw.upspeed,
            total_downloaded: raw.downloaded,
            total_uploaded: raw.uploaded,
            availability: raw.availability,
            private: false,
            labels: Vec::new(),
        }
    }
}

#[async_trait]
impl UpstreamClient for QbittorrentClient {
    async fn health_check(&self) -> ProxyResult<()> {
        self.send_with_reauth(Method::GET, "api/v2/app/version", &[]).await?;
        Ok(())
    }

    async fn list_torrents(&self, filter: &UpstreamListFilter) -> ProxyResult<Vec<TorrentView>> {
        let mut path = "api/v2/torrents/info".to_string();
        let mut query = Vec::new();
        if let Some(category) = &filter.category {
            query.push(format!("category={category}"));
        }
        if let Some(tag) = &filter.tag {
            query.push(format!("tag={tag}"));
        }
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }
        let resp = self.send_with_reauth(Method::GET, &path, &[]).await?;
        let raw: Vec<RawTorrent> = resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })?;
        Ok(raw.into_iter().map(TorrentView::from).collect())
    }

    async fn get_torrent_files(&self, infohash: &str) -> ProxyResult<Vec<TorrentFileEntry>> {
        let path = format!("api/v2/torrents/files?hash={infohash}");
        let resp = self.send_with_reauth(Method::GET, &path, &[]).await?;
        resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })
    }

    async fn get_torrent_trackers(&self, infohash: &str) -> ProxyResult<Vec<TrackerEntry>> {
        let path = format!("api/v2/torrents/trackers?hash={infohash}");
        let resp = self.send_with_reauth(Method::GET, &path, &[]).await?;
        resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })
    }

    async fn get_torrent_peers(&self, infohash: &str) -> ProxyResult<Vec<PeerEntry>> {
        let path = format!("api/v2/torrents/peers?hash={infohash}");
        let resp = self.send_with_reauth(Method::GET, &path, &[]).await?;
        resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })
    }

    async fn pause(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/pause", infohashes, &[]).await
    }

    async fn resume(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/resume", infohashes, &[]).await
    }

    async fn delete(&self, infohashes: &[String], with_files: bool) -> ProxyResult<()> {
        let flag = if with_files { "true" } else { "false" };
        self.post_hashes("api/v2/torrents/delete", infohashes, &[("deleteFiles", flag)]).await
    }

    async fn recheck(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/recheck", infohashes, &[]).await
    }

    async fn reannounce(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/reannounce", infohashes, &[]).await
    }

    async fn set_category(&self, infohashes: &[String], category: &str) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/setCategory", infohashes, &[("category", category)]).await
    }

    async fn add_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        let joined = tags.join(",");
        self.post_hashes("api/v2/torrents/addTags", infohashes, &[("tags", joined.as_str())]).await
    }

    async fn remove_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        let joined = tags.join(",");
        self.post_hashes("api/v2/torrents/removeTags", infohashes, &[("tags", joined.as_str())]).await
    }

    async fn set_tags(&self, infohashes: &[String], tags: &[String]) -> ProxyResult<()> {
        if !self.capabilities().set_tags {
            return Err(ProxyError::ValidationError {
                field: "capability",
                why: "upstream does not support setTags".into(),
            });
        }
        let joined = tags.join(",");
        self.post_hashes("api/v2/torrents/setTags", infohashes, &[("tags", joined.as_str())]).await
    }

    async fn set_location(&self, infohashes: &[String], location: &SetLocation) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/setLocation", infohashes, &[("location", location.location.as_str())]).await
    }

    async fn set_download_limit(&self, infohashes: &[String], bytes_per_sec: u64) -> ProxyResult<()> {
        let limit = bytes_per_sec.to_string();
        self.post_hashes("api/v2/torrents/setDownloadLimit", infohashes, &[("limit", limit.as_str())]).await
    }

    async fn set_upload_limit(&self, infohashes: &[String], bytes_per_sec: u64) -> ProxyResult<()> {
        let limit = bytes_per_sec.to_string();
        self.post_hashes("api/v2/torrents/setUploadLimit", infohashes, &[("limit", limit.as_str())]).await
    }

    async fn set_share_limits(&self, infohashes: &[String], limits: &ShareLimits) -> ProxyResult<()> {
        let ratio = limits.ratio_limit.to_string();
        let seeding = limits.seeding_time_limit.to_string();
        self.post_hashes(
            "api/v2/torrents/setShareLimits",
            infohashes,
            &[("ratioLimit", ratio.as_str()), ("seedingTimeLimit", seeding.as_str())],
        )
        .await
    }

    async fn set_force_start(&self, infohashes: &[String], enabled: bool) -> ProxyResult<()> {
        let value = if enabled { "true" } else { "false" };
        self.post_hashes("api/v2/torrents/setForceStart", infohashes, &[("value", value)]).await
    }

    async fn set_super_seeding(&self, infohashes: &[String], enabled: bool) -> ProxyResult<()> {
        let value = if enabled { "true" } else { "false" };
        self.post_hashes("api/v2/torrents/setSuperSeeding", infohashes, &[("value", value)]).await
    }

    async fn queue_top(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/topPrio", infohashes, &[]).await
    }

    async fn queue_bottom(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/bottomPrio", infohashes, &[]).await
    }

    async fn queue_up(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/increasePrio", infohashes, &[]).await
    }

    async fn queue_down(&self, infohashes: &[String]) -> ProxyResult<()> {
        self.post_hashes("api/v2/torrents/decreasePrio", infohashes, &[]).await
    }

    async fn add_trackers(&self, infohash: &str, urls: &[String]) -> ProxyResult<()> {
        let joined = urls.join("\n");
        self.send_with_reauth(
            Method::POST,
            "api/v2/torrents/addTrackers",
            &[("hash", infohash), ("urls", joined.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn edit_tracker(&self, infohash: &str, edit: &EditTracker) -> ProxyResult<()> {
        self.send_with_reauth(
            Method::POST,
            "api/v2/torrents/editTracker",
            &[("hash", infohash), ("origUrl", edit.original_url.as_str()), ("newUrl", edit.new_url.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn remove_trackers(&self, infohash: &str, urls: &[String]) -> ProxyResult<()> {
        let joined = urls.join("|");
        self.send_with_reauth(
            Method::POST,
            "api/v2/torrents/removeTrackers",
            &[("hash", infohash), ("urls", joined.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn rename_torrent(&self, infohash: &str, name: &str) -> ProxyResult<()> {
        if !self.capabilities().rename_torrent {
            return Err(ProxyError::ValidationError {
                field: "capability",
                why: "upstream does not support renaming torrents".into(),
            });
        }
        self.send_with_reauth(Method::POST, "api/v2/torrents/rename", &[("hash", infohash), ("name", name)]).await?;
        Ok(())
    }

    async fn rename_file(&self, infohash: &str, old_path: &str, new_path: &str) -> ProxyResult<()> {
        if !self.capabilities().rename_file {
            return Err(ProxyError::ValidationError {
                field: "capability",
                why: "upstream does not support renaming files".into(),
            });
        }
        self.send_with_reauth(
            Method::POST,
            "api/v2/torrents/renameFile",
            &[("hash", infohash), ("oldPath", old_path), ("newPath", new_path)],
        )
        .await?;
        Ok(())
    }

    async fn rename_folder(&self, infohash: &str, old_path: &str, new_path: &str) -> ProxyResult<()> {
        if !self.capabilities().rename_folder {
            return Err(ProxyError::ValidationError {
                field: "capability",
                why: "upstream does not support renaming folders".into(),
            });
        }
        self.send_with_reauth(
            Method::POST,
            "api/v2/torrents/renameFolder",
            &[("hash", infohash), ("oldPath", old_path), ("newPath", new_path)],
        )
        .await?;
        Ok(())
    }

    async fn set_file_priority(&self, infohash: &str, update: &SetFilePriority) -> ProxyResult<()> {
        let ids = update
            .file_indices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        let priority = match update.priority {
            crate::model::FilePriority::Skip => "0",
            crate::model::FilePriority::Low => "1",
            crate::model::FilePriority::Normal => "6",
            crate::model::FilePriority::High => "7",
        };
        self.send_with_reauth(
            Method::POST,
            "api/v2/torrents/filePrio",
            &[("hash", infohash), ("id", ids.as_str()), ("priority", priority)],
        )
        .await?;
        Ok(())
    }

    async fn get_app_preferences(&self) -> ProxyResult<AppPreferences> {
        let resp = self.send_with_reauth(Method::GET, "api/v2/app/preferences", &[]).await?;
        resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })
    }

    async fn set_app_preferences(&self, partial: &AppPreferences) -> ProxyResult<()> {
        let json = serde_json::Value::Object(partial.clone()).to_string();
        self.send_with_reauth(Method::POST, "api/v2/app/setPreferences", &[("json", json.as_str())]).await?;
        Ok(())
    }

    async fn get_speed_limits(&self) -> ProxyResult<SpeedLimits> {
        let download = self.send_with_reauth(Method::GET, "api/v2/transfer/downloadLimit", &[]).await?;
        let download_limit: u64 = download.text().await.unwrap_or_default().trim().parse().unwrap_or(0);
        let upload = self.send_with_reauth(Method::GET, "api/v2/transfer/uploadLimit", &[]).await?;
        let upload_limit: u64 = upload.text().await.unwrap_or_default().trim().parse().unwrap_or(0);
        let mode = self.send_with_reauth(Method::GET, "api/v2/transfer/speedLimitsMode", &[]).await?;
        let alternative_mode_enabled = mode.text().await.unwrap_or_default().trim() == "1";
        Ok(SpeedLimits {
            download_limit,
            upload_limit,
            alternative_mode_enabled,
        })
    }

    async fn set_global_download_limit(&self, bytes_per_sec: u64) -> ProxyResult<()> {
        let limit = bytes_per_sec.to_string();
        self.send_with_reauth(Method::POST, "api/v2/transfer/setDownloadLimit", &[("limit", limit.as_str())]).await?;
        Ok(())
    }

    async fn set_global_upload_limit(&self, bytes_per_sec: u64) -> ProxyResult<()> {
        let limit = bytes_per_sec.to_string();
        self.send_with_reauth(Method::POST, "api/v2/transfer/setUploadLimit", &[("limit", limit.as_str())]).await?;
        Ok(())
    }

    async fn toggle_alternative_speed_limits(&self) -> ProxyResult<()> {
        self.send_with_reauth(Method::POST, "api/v2/transfer/toggleSpeedLimitsMode", &[]).await?;
        Ok(())
    }

    async fn get_rss_items(&self, refresh: bool) -> ProxyResult<serde_json::Value> {
        let path = format!("api/v2/rss/items?withData={refresh}");
        let resp = self.send_with_reauth(Method::GET, &path, &[]).await?;
        resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })
    }

    async fn get_main_logs(&self, levels: &[LogLevel]) -> ProxyResult<Vec<LogRecord>> {
        let _ = levels;
        let resp = self.send_with_reauth(Method::GET, "api/v2/log/main", &[]).await?;
        #[derive(Deserialize)]
        struct RawLog {
            timestamp: i64,
            #[serde(rename = "type")]
            kind: i64,
            message: String,
        }
        let raw: Vec<RawLog> = resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })?;
        Ok(raw
            .into_iter()
            .map(|r| LogRecord {
                timestamp: Utc.timestamp_opt(r.timestamp, 0).single().unwrap_or_else(Utc::now),
                level: match r.kind {
                    1 => LogLevel::Info,
                    2 => LogLevel::Warning,
                    4 => LogLevel::Critical,
                    _ => LogLevel::Normal,
                },
                message: r.message,
            })
            .collect())
    }

    async fn get_peer_logs(&self) -> ProxyResult<Vec<PeerLogRecord>> {
        let resp = self.send_with_reauth(Method::GET, "api/v2/log/peers", &[]).await?;
        #[derive(Deserialize)]
        struct RawPeerLog {
            timestamp: i64,
            ip: String,
            reason: String,
            blocked: bool,
        }
        let raw: Vec<RawPeerLog> = resp.json().await.map_err(|source| ProxyError::Unreachable {
            instance_id: self.instance_id,
            source,
        })?;
        Ok(raw
            .into_iter()
            .map(|r| PeerLogRecord {
                timestamp: Utc.timestamp_opt(r.timestamp, 0).single().unwrap_or_else(Utc::now),
                ip: r.ip,
                reason: r.reason,
                blocked: r.blocked,
            })
            .collect())
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_handles_common_formats() {
        assert_eq!(parse_version("2.9.3"), (2, 9));
        assert_eq!(parse_version("v2.11.0"), (2, 11));
        assert_eq!(parse_version("garbage"), (0, 0));
    }

    #[test]
    fn tracker_host_extracts_hostname() {
        assert_eq!(tracker_host("udp://tracker.example:6969/announce"), "tracker.example");
        assert_eq!(tracker_host(""), "");
    }

    #[test]
    fn raw_torrent_conversion_normalizes_hash_case() {
        let raw = RawTorrent {
            hash: "ABCDEF".into(),
            name: "demo".into(),
            size: 10,
            progress: 0.5,
            state: "downloading".into(),
            ratio: 0.0,
            num_seeds: 1,
            num_leechs: 2,
            added_on: 0,
            completion_on: -1,
            last_activity: 0,
            category: String::new(),
            tags: "a, b".into(),
            tracker: String::new(),
            save_path: "/data".into(),
            content_path: "/data/demo".into(),
            eta: 8_640_000,
            dlspeed: 0,
            upspeed: 0,
            downloaded: 0,
            uploaded: 0,
            availability: 0.0,
        };
        let view = TorrentView::from(raw);
        assert_eq!(view.infohash, "abcdef");
        assert_eq!(view.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(view.eta_seconds, None);
    }
}
