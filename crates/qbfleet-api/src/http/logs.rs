//! Log pagination endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use qbfleet_api_models::{MainLogsPageResponse, PeerLogsPageResponse, clamp_page_size};
use qbfleet_core::{InstanceId, LogLevel};
use serde::Deserialize;

use crate::http::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct LogsQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    levels: Option<String>,
}

fn parse_levels(raw: Option<&str>) -> Vec<LogLevel> {
    let Some(raw) = raw else { return Vec::new() };
    raw.split(',')
        .filter_map(|token| match token.trim() {
            "normal" => Some(LogLevel::Normal),
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "critical" => Some(LogLevel::Critical),
            _ => None,
        })
        .collect()
}

/// `GET /api/instances/{id}/logs/main?page&limit&search&levels=a,b`.
pub(crate) async fn main_logs(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<MainLogsPageResponse>, ApiError> {
    let page = query.page.unwrap_or(0);
    let limit = clamp_page_size(query.limit);
    let levels = parse_levels(query.levels.as_deref());
    let (rows, total) = state
        .core
        .sync_manager
        .get_main_logs(id, page, limit, query.search.as_deref(), &levels)
        .await?;
    Ok(Json(MainLogsPageResponse { rows, total, page, limit }))
}

/// `GET /api/instances/{id}/logs/peers?page&limit&search`.
pub(crate) async fn peer_logs(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<PeerLogsPageResponse>, ApiError> {
    let page = query.page.unwrap_or(0);
    let limit = clamp_page_size(query.limit);
    let (rows, total) = state
        .core
        .sync_manager
        .get_peer_logs(id, page, limit, query.search.as_deref())
        .await?;
    Ok(Json(PeerLogsPageResponse { rows, total, page, limit }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels_ignores_unknown_tokens() {
        let levels = parse_levels(Some("info,bogus,critical"));
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Critical]);
    }

    #[test]
    fn parse_levels_empty_when_absent() {
        assert!(parse_levels(None).is_empty());
    }
}
