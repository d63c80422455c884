//! Instance listing, stats, preferences, speed limits, capabilities.

use axum::{Json, extract::Path, extract::State};
use qbfleet_api_models::{InstanceStats, InstanceSummary, PreferencesPatch, SpeedLimitsToggleResponse};
use qbfleet_core::{CapabilitySet, ConnectionStatus, InstanceId, SpeedLimits};

use crate::http::errors::ApiError;
use crate::state::AppState;

async fn connection_status(state: &AppState, id: InstanceId) -> ConnectionStatus {
    state
        .core
        .client_pool
        .cache()
        .get(&id.to_string())
        .await
        .unwrap_or(ConnectionStatus { connected: false, last_error: None })
}

/// `GET /api/instances` — every configured instance with its last-known
/// connection status.
pub(crate) async fn list_instances(State(state): State<AppState>) -> Result<Json<Vec<InstanceSummary>>, ApiError> {
    let ids = state
        .core
        .instance_store
        .active_instance_ids()
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let mut summaries = Vec::with_capacity(ids.len());
    for id in ids {
        let instance = state
            .core
            .instance_store
            .instance(id)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        let connection = connection_status(&state, id).await;
        summaries.push(InstanceSummary::new(&instance, connection));
    }
    Ok(Json(summaries))
}

/// `GET /api/instances/{id}/stats` — torrent counts and aggregate speeds.
pub(crate) async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
) -> Result<Json<InstanceStats>, ApiError> {
    let counts_by_status = state.core.sync_manager.get_torrent_counts(id).await?;
    let speeds = state.core.sync_manager.get_instance_speeds(id).await?;
    let total = counts_by_status.values().sum();
    Ok(Json(InstanceStats { counts_by_status, speeds, total }))
}

/// `GET /api/instances/{id}/preferences`.
pub(crate) async fn get_preferences(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
) -> Result<Json<PreferencesPatch>, ApiError> {
    let prefs = state.core.sync_manager.get_app_preferences(id).await?;
    Ok(Json(prefs))
}

/// `PATCH /api/instances/{id}/preferences`.
pub(crate) async fn patch_preferences(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
    Json(patch): Json<PreferencesPatch>,
) -> Result<(), ApiError> {
    state.core.sync_manager.set_app_preferences(id, &patch).await?;
    Ok(())
}

/// `GET /api/instances/{id}/speed-limits`.
pub(crate) async fn get_speed_limits(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
) -> Result<Json<SpeedLimits>, ApiError> {
    let client = state.core.sync_manager.get_client(id).await?;
    let limits = client.get_speed_limits().await?;
    Ok(Json(limits))
}

/// `PUT /api/instances/{id}/speed-limits`.
pub(crate) async fn put_speed_limits(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
    Json(limits): Json<SpeedLimits>,
) -> Result<(), ApiError> {
    let client = state.core.sync_manager.get_client(id).await?;
    client.set_global_download_limit(limits.download_limit).await?;
    client.set_global_upload_limit(limits.upload_limit).await?;
    Ok(())
}

/// `POST /api/instances/{id}/speed-limits/toggle`.
pub(crate) async fn toggle_speed_limits(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
) -> Result<Json<SpeedLimitsToggleResponse>, ApiError> {
    let client = state.core.sync_manager.get_client(id).await?;
    client.toggle_alternative_speed_limits().await?;
    let limits = client.get_speed_limits().await?;
    Ok(Json(SpeedLimitsToggleResponse { alternative_mode_enabled: limits.alternative_mode_enabled }))
}

/// `GET /api/instances/{id}/capabilities`.
pub(crate) async fn get_capabilities(
    State(state): State<AppState>,
    Path(id): Path<InstanceId>,
) -> Result<Json<CapabilitySet>, ApiError> {
    let client = state.core.sync_manager.get_client(id).await?;
    Ok(Json(client.capabilities()))
}
