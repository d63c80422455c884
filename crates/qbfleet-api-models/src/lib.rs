#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::multiple_crate_versions)]

//! Shared HTTP DTOs for the fleet proxy's public API.
//!
//! These types sit between `qbfleet-core`'s domain model and the wire: most
//! are thin wrappers that re-use core types directly (they already derive
//! `Serialize`/`Deserialize`), plus the handful of response envelopes and
//! redacted views the HTTP layer needs that the core has no reason to know
//! about (pagination windows, bulk-action outcomes, instance summaries with
//! credential fields stripped).

use std::collections::BTreeMap;

use qbfleet_core::{
    AggregatedPage, ActionParams, BulkAction, CategoryDescriptor, ConnectionStatus,
    CrossInstanceTorrentView, Instance, InstanceActionResult, InstanceFailure, InstanceId,
    InstanceSpeeds, LogRecord, PeerLogRecord, Target, TorrentView, TorrentsPage, TrackerCount,
};
use serde::{Deserialize, Serialize};

/// Default page size applied when a list endpoint's `limit` query parameter is absent.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Upper bound on `limit`, regardless of what a caller requests.
pub const MAX_PAGE_SIZE: usize = 200;

/// RFC 9457 problem document surfaced on every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message, when available.
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Parameters that failed validation, if applicable.
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
}

/// One invalid parameter pointer surfaced alongside a [`ProblemDetails`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemInvalidParam {
    /// JSON Pointer to the offending field.
    pub pointer: String,
    /// Human-readable description of the validation failure.
    pub message: String,
}

/// Instance identity and status, with credential fields stripped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSummary {
    /// Stable integer id.
    pub id: InstanceId,
    /// Display name shown to operators.
    pub name: String,
    /// Base URL of the upstream Web API.
    pub base_url: String,
    /// Whether the instance currently participates in reads/writes.
    pub is_active: bool,
    /// Whether the Proxy host has local filesystem access to this instance.
    pub has_local_filesystem_access: bool,
    /// Most recently observed connection status.
    pub connection: ConnectionStatus,
}

impl InstanceSummary {
    /// Build a redacted summary from a core `Instance` row and its current
    /// connection status.
    #[must_use]
    pub fn new(instance: &Instance, connection: ConnectionStatus) -> Self {
        Self {
            id: instance.id,
            name: instance.name.clone(),
            base_url: instance.base_url.clone(),
            is_active: instance.is_active,
            has_local_filesystem_access: instance.has_local_filesystem_access,
            connection,
        }
    }
}

/// `GET /api/instances/{id}/stats` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceStats {
    /// Count of torrents per base status key.
    pub counts_by_status: BTreeMap<&'static str, usize>,
    /// Aggregate instance speeds.
    pub speeds: InstanceSpeeds,
    /// Total torrent count.
    pub total: usize,
}

/// A filtered, sorted, paginated window over one instance's torrent catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentsPageResponse {
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
    /// Whether this read was served from a stale (past-TTL) cache entry.
    pub stale: bool,
}

impl From<TorrentsPage> for TorrentsPageResponse {
    fn from(page: TorrentsPage) -> Self {
        Self {
            rows: page.rows,
            total: page.total,
            counts_by_status: page.counts_by_status,
            categories: page.categories,
            tags: page.tags,
            trackers: page.trackers,
            speeds: page.speeds,
            has_more: page.has_more,
            stale: page.stale,
        }
    }
}

/// A filtered, sorted, paginated window spanning every active instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedTorrentsPageResponse {
    /// The windowed rows, each tagged with its source instance.
    pub rows: Vec<CrossInstanceTorrentView>,
    /// Total matching rows across all instances that answered.
    pub total: usize,
    /// Whether more rows follow this window.
    pub has_more: bool,
    /// Instances that failed or timed out during this fan-out.
    pub failures: Vec<InstanceFailureView>,
}

/// One instance's failure to answer an aggregated read, surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceFailureView {
    /// The instance that failed to answer in time.
    pub instance_id: InstanceId,
    /// Human-readable reason.
    pub reason: String,
}

impl From<InstanceFailure> for InstanceFailureView {
    fn from(failure: InstanceFailure) -> Self {
        Self {
            instance_id: failure.instance_id,
            reason: failure.reason,
        }
    }
}

impl From<AggregatedPage> for AggregatedTorrentsPageResponse {
    fn from(page: AggregatedPage) -> Self {
        Self {
            rows: page.rows,
            total: page.total,
            has_more: page.has_more,
            failures: page.failures.into_iter().map(InstanceFailureView::from).collect(),
        }
    }
}

/// `POST /api/instances/{id}/torrents/action` request body: a single
/// instance's worth of infohashes, implicitly targeting the path's
/// `{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceActionRequest {
    /// Action to dispatch.
    pub action: BulkAction,
    /// Infohashes to target on the path instance.
    pub hashes: Vec<String>,
    /// Free-form per-action parameters.
    #[serde(default, rename = "actionParams")]
    pub action_params: ActionParams,
}

/// `POST /api/torrents/bulk-action` request body. Targets may be supplied
/// as an explicit `(instanceId, infohash)` list, as `hashes` paired with
/// `instanceIDs` (cartesian expansion), or as a `filter` paired with
/// `instanceIDs` (expanded per instance against that instance's cached
/// torrent list). `excludeHashes`/`excludeTargets` subtract afterward.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BulkActionRequest {
    /// Action to dispatch.
    pub action: Option<BulkAction>,
    /// Explicit `(instanceId, infohash)` targets.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Infohashes to pair with `instance_ids` (cartesian expansion).
    #[serde(default)]
    pub hashes: Vec<String>,
    /// Filter spec to expand, paired with `instance_ids`.
    #[serde(default, rename = "filter")]
    pub filter: Option<qbfleet_core::FilterSpec>,
    /// Instances `hashes` or `filter` expand against.
    #[serde(default, rename = "instanceIDs")]
    pub instance_ids: Vec<InstanceId>,
    /// Infohashes to drop from the resolved target set, regardless of instance.
    #[serde(default, rename = "excludeHashes")]
    pub exclude_hashes: Vec<String>,
    /// Explicit `(instanceId, infohash)` targets to drop from the resolved set.
    #[serde(default, rename = "excludeTargets")]
    pub exclude_targets: Vec<Target>,
    /// Free-form per-action parameters.
    #[serde(default, rename = "actionParams")]
    pub action_params: ActionParams,
}

/// Response body for a dispatched bulk action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkActionResponse {
    /// Per-instance outcome of the dispatch.
    pub results: Vec<InstanceActionResultView>,
}

/// One instance's outcome within a [`BulkActionResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceActionResultView {
    /// Instance the targets belonged to.
    pub instance_id: InstanceId,
    /// Number of infohashes this instance's dispatch covered.
    pub target_count: usize,
    /// Whether the dispatch succeeded on this instance.
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Failure reason, present only when `ok` is `false`.
    pub error: Option<String>,
}

impl From<InstanceActionResult> for InstanceActionResultView {
    fn from(result: InstanceActionResult) -> Self {
        let error = result.outcome.err();
        Self {
            instance_id: result.instance_id,
            target_count: result.target_count,
            ok: error.is_none(),
            error,
        }
    }
}

impl From<Vec<InstanceActionResult>> for BulkActionResponse {
    fn from(results: Vec<InstanceActionResult>) -> Self {
        Self {
            results: results.into_iter().map(InstanceActionResultView::from).collect(),
        }
    }
}

/// `PATCH /api/instances/{id}/preferences` request body: a partial update
/// applied on top of the upstream's current preferences.
pub type PreferencesPatch = qbfleet_core::AppPreferences;

/// `POST /api/instances/{id}/speed-limits/toggle` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeedLimitsToggleResponse {
    /// Whether the alternative (scheduled) speed limits are now active.
    pub alternative_mode_enabled: bool,
}

/// A page of main-log records, with the total count before pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MainLogsPageResponse {
    /// The windowed records.
    pub rows: Vec<LogRecord>,
    /// Total matching records before pagination.
    pub total: usize,
    /// Zero-based page index this window corresponds to.
    pub page: usize,
    /// Page size applied.
    pub limit: usize,
}

/// A page of peer-log records, with the total count before pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerLogsPageResponse {
    /// The windowed records.
    pub rows: Vec<PeerLogRecord>,
    /// Total matching records before pagination.
    pub total: usize,
    /// Zero-based page index this window corresponds to.
    pub page: usize,
    /// Page size applied.
    pub limit: usize,
}

/// Clamp a caller-supplied page size into `1..=MAX_PAGE_SIZE`, falling back
/// to [`DEFAULT_PAGE_SIZE`] when `requested` is `None` or zero.
#[must_use]
pub fn clamp_page_size(requested: Option<usize>) -> usize {
    match requested {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(n) => n.min(MAX_PAGE_SIZE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbfleet_core::TorrentState;

    #[test]
    fn instance_summary_strips_credential_fields() {
        let instance = Instance {
            id: 1,
            name: "demo".into(),
            base_url: "http://10.0.0.5:8080".into(),
            username: "admin".into(),
            encrypted_password: "secret-ciphertext".into(),
            password_nonce: "nonce".into(),
            basic_username: None,
            encrypted_basic_password: None,
            basic_password_nonce: None,
            is_active: true,
            has_local_filesystem_access: false,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let summary = InstanceSummary::new(
            &instance,
            ConnectionStatus {
                connected: true,
                last_error: None,
            },
        );
        let json = serde_json::to_string(&summary).expect("serialize");
        assert!(!json.contains("secret-ciphertext"));
        assert!(!json.contains("nonce"));
        assert_eq!(summary.id, 1);
    }

    #[test]
    fn bulk_action_result_maps_failure_to_error_field() {
        let failure = InstanceActionResult {
            instance_id: 2,
            target_count: 3,
            outcome: Err("unreachable".into()),
        };
        let view = InstanceActionResultView::from(failure);
        assert!(!view.ok);
        assert_eq!(view.error.as_deref(), Some("unreachable"));
    }

    #[test]
    fn clamp_page_size_applies_default_and_ceiling() {
        assert_eq!(clamp_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(1_000)), MAX_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(10)), 10);
    }

    #[test]
    fn torrent_state_round_trips_through_serde() {
        let json = serde_json::to_string(&TorrentState::StalledDl).expect("serialize");
        assert_eq!(json, "\"stalled_dl\"");
    }
}
