//! The Cross-Instance Aggregator: fan out one read across every active
//! instance, tolerating partial failure (SPEC_FULL.md §4.4).

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::ProxyResult;
use crate::instance_store::InstanceStore;
use crate::model::{CrossInstanceTorrentView, FilterSpec, InstanceId, InstanceSpeeds, SortKey};
use crate::sync::{SyncManager, apply_filter, apply_sort, paginate};

/// Per-instance outcome of a fanned-out read, surfaced alongside any rows so
/// a partial fleet outage degrades the result instead of failing it wholly.
#[derive(Debug, Clone)]
pub struct InstanceFailure {
    /// The instance that failed to answer in time.
    pub instance_id: InstanceId,
    /// Human-readable reason.
    pub reason: String,
}

/// A filtered, sorted, paginated read spanning every active instance.
#[derive(Debug, Clone)]
pub struct AggregatedPage {
    /// The windowed rows, each tagged with its source instance.
    pub rows: Vec<CrossInstanceTorrentView>,
    /// Total matching rows across all instances that answered.
    pub total: usize,
    /// Whether more rows follow this window.
    pub has_more: bool,
    /// Instances that failed or timed out during this fan-out.
    pub failures: Vec<InstanceFailure>,
}

/// Fans a read out across every active instance's Sync Manager cache.
pub struct CrossInstanceAggregator {
    instance_store: Arc<dyn InstanceStore>,
    sync_manager: Arc<SyncManager>,
    per_instance_timeout: Duration,
}

impl CrossInstanceAggregator {
    /// Build an aggregator reading active instances from `instance_store` and
    /// torrents from `sync_manager`, bounding each per-instance fetch by
    /// `per_instance_timeout`.
    #[must_use]
    pub fn new(instance_store: Arc<dyn InstanceStore>, sync_manager: Arc<SyncManager>, per_instance_timeout: Duration) -> Self {
        Self {
            instance_store,
            sync_manager,
            per_instance_timeout,
        }
    }

    /// Read torrents from every active instance, filter/sort/paginate the
    /// merged set, and report which instances (if any) failed to answer.
    ///
    /// # Errors
    ///
    /// Returns an error only if the instance list itself could not be read;
    /// individual instance failures are reported in `AggregatedPage::failures`.
    pub async fn get_all_torrents(
        &self,
        filter: &FilterSpec,
        sort: &[SortKey],
        offset: usize,
        page_size: usize,
    ) -> ProxyResult<AggregatedPage> {
        let ids = self
            .instance_store
            .active_instance_ids()
            .await
            .map_err(|source| crate::error::ProxyError::ValidationError {
                field: "instance_store",
                why: source.to_string(),
            })?;

        self.get_torrents_for_instances(&ids, filter, sort, offset, page_size).await
    }

    /// Same fan-out as [`Self::get_all_torrents`], scoped to a caller-supplied
    /// instance set rather than every active instance. Used by bulk-action
    /// target expansion (SPEC_FULL.md §4.6: "expand via Aggregator").
    ///
    /// # Errors
    ///
    /// Never returns an error itself; individual instance failures are
    /// reported in `AggregatedPage::failures`. The `Result` return keeps the
    /// signature aligned with `get_all_torrents`.
    pub async fn get_torrents_for_instances(
        &self,
        ids: &[InstanceId],
        filter: &FilterSpec,
        sort: &[SortKey],
        offset: usize,
        page_size: usize,
    ) -> ProxyResult<AggregatedPage> {
        let fetches = ids.iter().map(|&id| async move {
            let outcome = tokio::time::timeout(self.per_instance_timeout, self.sync_manager.get_all_torrents(id)).await;
            (id, outcome)
        });
        let fetched = futures_util::future::join_all(fetches).await;

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (id, outcome) in fetched {
            match outcome {
                Ok(Ok(torrents)) => merged.extend(torrents.into_iter().map(|view| CrossInstanceTorrentView { instance_id: id, view })),
                Ok(Err(err)) => {
                    warn!(instance_id = id, error = %err, "instance excluded from aggregated read");
                    failures.push(InstanceFailure {
                        instance_id: id,
                        reason: err.to_string(),
                    });
                }
                Err(_elapsed) => {
                    warn!(instance_id = id, "instance timed out during aggregated read");
                    failures.push(InstanceFailure {
                        instance_id: id,
                        reason: "timed out".into(),
                    });
                }
            }
        }

        let plain: Vec<_> = merged.iter().map(|row| row.view.clone()).collect();
        let filtered_indices: Vec<usize> = apply_filter(&plain, filter).into_iter().map(|view| index_of(&plain, view)).collect();
        let filtered_merged: Vec<_> = filtered_indices.iter().map(|&i| merged[i].clone()).collect();

        let sort_plain: Vec<_> = filtered_merged.iter().map(|row| row.view.clone()).collect();
        let mut sort_refs: Vec<&_> = sort_plain.iter().collect();
        apply_sort(&mut sort_refs, sort);
        let sorted_merged: Vec<_> = sort_refs.iter().map(|view| index_of(&sort_plain, view)).map(|i| filtered_merged[i].clone()).collect();

        let page = paginate(sorted_merged.iter().collect(), offset, page_size);
        let rows = page.rows.into_iter().cloned().collect();

        Ok(AggregatedPage {
            rows,
            total: page.total,
            has_more: page.has_more,
            failures,
        })
    }

    /// Sum `InstanceSpeeds` across every active instance, per §4.4.
    pub async fn get_fleet_speeds(&self) -> ProxyResult<(InstanceSpeeds, Vec<InstanceFailure>)> {
        let ids = self
            .instance_store
            .active_instance_ids()
            .await
            .map_err(|source| crate::error::ProxyError::ValidationError {
                field: "instance_store",
                why: source.to_string(),
            })?;

        let fetches = ids.iter().map(|&id| async move {
            let outcome = tokio::time::timeout(self.per_instance_timeout, self.sync_manager.get_instance_speeds(id)).await;
            (id, outcome)
        });
        let fetched = futures_util::future::join_all(fetches).await;

        let mut total = InstanceSpeeds::default();
        let mut failures = Vec::new();
        for (id, outcome) in fetched {
            match outcome {
                Ok(Ok(speeds)) => {
                    total.download += speeds.download;
                    total.upload += speeds.upload;
                }
                Ok(Err(err)) => failures.push(InstanceFailure {
                    instance_id: id,
                    reason: err.to_string(),
                }),
                Err(_elapsed) => failures.push(InstanceFailure {
                    instance_id: id,
                    reason: "timed out".into(),
                }),
            }
        }
        Ok((total, failures))
    }
}

/// Locate `needle`'s position within `haystack` by address, since `apply_sort`
/// and `apply_filter` return references borrowed from a contiguous slice.
fn index_of(haystack: &[crate::model::TorrentView], needle: &crate::model::TorrentView) -> usize {
    haystack.iter().position(|candidate| std::ptr::eq(candidate, needle)).unwrap_or(0)
}
