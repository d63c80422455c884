//! Torrent listing, single-instance actions, and cross-instance bulk actions.

use std::collections::BTreeSet;

use axum::Json;
use axum::extract::{Path, Query, State};
use qbfleet_api_models::{
    BulkActionRequest, BulkActionResponse, InstanceActionRequest, TorrentsPageResponse,
    clamp_page_size,
};
use qbfleet_core::{FilterSpec, InstanceId, SortKey, Target};
use serde::Deserialize;

use crate::http::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct TorrentsQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default, rename = "pageSize")]
    page_size: Option<usize>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    filters: Option<String>,
}

fn parse_filter(raw: Option<&str>) -> Result<FilterSpec, ApiError> {
    match raw {
        None => Ok(FilterSpec::default()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| ApiError::bad_request(format!("invalid filters: {err}"))),
    }
}

fn parse_sort(raw: Option<&str>) -> Result<Vec<SortKey>, ApiError> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| ApiError::bad_request(format!("invalid sort: {err}"))),
    }
}

/// `GET /api/instances/{id}/torrents?page&pageSize&sort&filters=<url-encoded JSON>`.
pub(crate) async fn list_torrents(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
    Query(query): Query<TorrentsQuery>,
) -> Result<Json<TorrentsPageResponse>, ApiError> {
    let filter = parse_filter(query.filters.as_deref())?;
    let sort = parse_sort(query.sort.as_deref())?;
    let page = query.page.unwrap_or(0);
    let page_size = clamp_page_size(query.page_size);

    let result = state
        .core
        .sync_manager
        .get_torrents(id, &filter, &sort, page * page_size, page_size)
        .await?;
    Ok(Json(result.into()))
}

/// `POST /api/instances/{id}/torrents/action` — single-instance bulk action.
pub(crate) async fn instance_action(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
    Json(request): Json<InstanceActionRequest>,
) -> Result<Json<BulkActionResponse>, ApiError> {
    if request.hashes.is_empty() {
        return Err(ApiError::bad_request("hashes must not be empty"));
    }
    let targets: Vec<Target> = request
        .hashes
        .iter()
        .map(|hash| Target { instance_id: id, infohash: hash.to_lowercase() })
        .collect();
    let results = state.core.bulk_coordinator.dispatch(request.action, &targets, &request.action_params).await?;
    Ok(Json(results.into()))
}

/// Resolve a [`BulkActionRequest`]'s target description into a deduplicated,
/// exclusion-applied set of `(instanceId, infohash)` targets, per the
/// coordinator's normative resolution order (explicit targets, then
/// hashes × instances, then filter expansion via the Cross-Instance
/// Aggregator).
async fn resolve_targets(state: &AppState, request: &BulkActionRequest) -> Result<Vec<Target>, ApiError> {
    let mut resolved: BTreeSet<Target> = request
        .targets
        .iter()
        .map(|target| Target { instance_id: target.instance_id, infohash: target.infohash.to_lowercase() })
        .collect();

    if !request.hashes.is_empty() {
        for &instance_id in &request.instance_ids {
            for hash in &request.hashes {
                resolved.insert(Target { instance_id, infohash: hash.to_lowercase() });
            }
        }
    }

    if let Some(filter) = &request.filter {
        let page = state
            .core
            .aggregator
            .get_torrents_for_instances(&request.instance_ids, filter, &[], 0, usize::MAX)
            .await?;
        for row in page.rows {
            resolved.insert(Target { instance_id: row.instance_id, infohash: row.view.infohash });
        }
    }

    let exclude_hashes: BTreeSet<String> = request.exclude_hashes.iter().map(|h| h.to_lowercase()).collect();
    let exclude_targets: BTreeSet<Target> = request
        .exclude_targets
        .iter()
        .map(|target| Target { instance_id: target.instance_id, infohash: target.infohash.to_lowercase() })
        .collect();

    resolved.retain(|target| !exclude_hashes.contains(&target.infohash) && !exclude_targets.contains(target));
    Ok(resolved.into_iter().collect())
}

/// `POST /api/torrents/bulk-action` — cross-instance bulk action.
pub(crate) async fn bulk_action(
    State(state): State<AppState>,
    Json(request): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>, ApiError> {
    let action = request.action.ok_or_else(|| ApiError::bad_request("action is required"))?;
    let targets = resolve_targets(&state, &request).await?;
    if targets.is_empty() {
        return Err(ApiError::bad_request("no targets resolved from request"));
    }
    let results = state.core.bulk_coordinator.dispatch(action, &targets, &request.action_params).await?;
    Ok(Json(results.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_filter_defaults_when_absent() {
        assert!(parse_filter(None).is_ok());
    }

    #[test]
    fn parse_filter_rejects_malformed_json() {
        let err = parse_filter(Some("not json")).unwrap_err();
        let _ = err;
    }

    #[test]
    fn parse_sort_defaults_to_empty() {
        assert!(parse_sort(None).unwrap().is_empty());
    }
}
