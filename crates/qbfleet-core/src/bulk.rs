//! The Bulk Action Coordinator: normalizes a target list, validates
//! per-action parameters, and dispatches across however many instances the
//! targets span (SPEC_FULL.md §4.6).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::client::{EditTracker, SetLocation, ShareLimits};
use crate::error::{ProxyError, ProxyResult};
use crate::model::{ActionParams, BulkAction, Target};
use crate::sync::SyncManager;

/// Outcome of dispatching one bulk action against one instance's share of
/// the target set.
#[derive(Debug, Clone)]
pub struct InstanceActionResult {
    /// Instance the targets belonged to.
    pub instance_id: i64,
    /// Number of infohashes this instance's dispatch covered.
    pub target_count: usize,
    /// `Ok(())` on success, the error otherwise.
    pub outcome: Result<(), String>,
}

/// Dispatches one `BulkAction` across however many instances a target set spans.
pub struct BulkActionCoordinator {
    sync_manager: Arc<SyncManager>,
}

impl BulkActionCoordinator {
    /// Build a coordinator dispatching mutations through `sync_manager`.
    #[must_use]
    pub fn new(sync_manager: Arc<SyncManager>) -> Self {
        Self { sync_manager }
    }

    /// Validate `params` against `action`'s required shape before any
    /// upstream call is made.
    ///
    /// # Errors
    ///
    /// `ProxyError::ValidationError` naming the first missing/malformed field.
    pub fn validate_params(action: BulkAction, params: &ActionParams) -> ProxyResult<()> {
        let require_string = |field: &'static str| -> ProxyResult<&str> {
            params
                .get(field)
                .and_then(Value::as_str)
                .ok_or(ProxyError::ValidationError {
                    field,
                    why: "required string field missing".into(),
                })
        };
        let require_array = |field: &'static str| -> ProxyResult<&Vec<Value>> {
            params
                .get(field)
                .and_then(Value::as_array)
                .ok_or(ProxyError::ValidationError {
                    field,
                    why: "required array field missing".into(),
                })
        };
        let require_u64 = |field: &'static str| -> ProxyResult<u64> {
            params
                .get(field)
                .and_then(Value::as_u64)
                .ok_or(ProxyError::ValidationError {
                    field,
                    why: "required integer field missing".into(),
                })
        };

        match action {
            BulkAction::Pause
            | BulkAction::Resume
            | BulkAction::Delete
            | BulkAction::Recheck
            | BulkAction::Reannounce
            | BulkAction::SetForceStart
            | BulkAction::SetSuperSeeding
            | BulkAction::QueueTop
            | BulkAction::QueueBottom
            | BulkAction::QueueUp
            | BulkAction::QueueDown
            | BulkAction::ToggleAlternativeSpeedLimits => Ok(()),
            BulkAction::SetCategory => require_string("category").map(|_| ()),
            BulkAction::AddTags | BulkAction::RemoveTags | BulkAction::SetTags => require_array("tags").map(|_| ()),
            BulkAction::SetLocation => require_string("location").map(|_| ()),
            BulkAction::SetDownloadLimit | BulkAction::SetUploadLimit => require_u64("bytesPerSec").map(|_| ()),
            BulkAction::SetShareLimits => {
                params
                    .get("ratioLimit")
                    .and_then(Value::as_f64)
                    .ok_or(ProxyError::ValidationError {
                        field: "ratioLimit",
                        why: "required number field missing".into(),
                    })?;
                params
                    .get("seedingTimeLimit")
                    .and_then(Value::as_i64)
                    .ok_or(ProxyError::ValidationError {
                        field: "seedingTimeLimit",
                        why: "required integer field missing".into(),
                    })?;
                Ok(())
            }
            BulkAction::AddTrackers | BulkAction::RemoveTrackers => require_array("urls").map(|_| ()),
            BulkAction::EditTrackers => {
                require_string("originalUrl")?;
                require_string("newUrl")?;
                Ok(())
            }
        }
    }

    /// Group `targets` by instance and dispatch `action` against each group
    /// concurrently, continuing past per-instance failures so a partial
    /// fleet outage does not abort work on healthy instances.
    ///
    /// # Errors
    ///
    /// Returns an error only if `params` fail [`Self::validate_params`];
    /// per-instance dispatch failures are reported in the returned vector.
    pub async fn dispatch(&self, action: BulkAction, targets: &[Target], params: &ActionParams) -> ProxyResult<Vec<InstanceActionResult>> {
        Self::validate_params(action, params)?;

        let mut by_instance: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for target in targets {
            by_instance.entry(target.instance_id).or_default().push(target.infohash.clone());
        }

        let dispatches = by_instance.into_iter().map(|(instance_id, infohashes)| async move {
            let target_count = infohashes.len();
            let outcome = self.dispatch_one(instance_id, &infohashes, action, params).await;
            InstanceActionResult {
                instance_id,
                target_count,
                outcome: outcome.map_err(|err| err.to_string()),
            }
        });
        Ok(futures_util::future::join_all(dispatches).await)
    }

    async fn dispatch_one(&self, instance_id: i64, infohashes: &[String], action: BulkAction, params: &ActionParams) -> ProxyResult<()> {
        let manager = Arc::clone(&self.sync_manager);
        let hashes = infohashes.to_vec();
        match action {
            BulkAction::Pause => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.pause(&hashes).await }, set_state_paused)
                    .await
            }
            BulkAction::Resume => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.resume(&hashes).await }, set_state_resumed)
                    .await
            }
            BulkAction::Delete => {
                let with_files = params.get("deleteFiles").and_then(Value::as_bool).unwrap_or(false);
                manager.invalidate(instance_id).await;
                self.sync_manager
                    .mutate(
                        instance_id,
                        infohashes,
                        move |client| async move { client.delete(&hashes, with_files).await },
                        |_torrent| {},
                    )
                    .await
            }
            BulkAction::Recheck => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.recheck(&hashes).await }, |_| {})
                    .await
            }
            BulkAction::Reannounce => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.reannounce(&hashes).await }, |_| {})
                    .await
            }
            BulkAction::SetCategory => {
                let category = params.get("category").and_then(Value::as_str).unwrap_or_default().to_string();
                let apply_category = category.clone();
                manager
                    .mutate(
                        instance_id,
                        infohashes,
                        move |client| async move { client.set_category(&hashes, &category).await },
                        move |torrent| torrent.category = apply_category.clone(),
                    )
                    .await
            }
            BulkAction::AddTags => {
                let tags = string_array(params, "tags");
                let apply_tags = tags.clone();
                manager
                    .mutate(
                        instance_id,
                        infohashes,
                        move |client| async move { client.add_tags(&hashes, &tags).await },
                        move |torrent| {
                            for tag in &apply_tags {
                                if !torrent.tags.contains(tag) {
                                    torrent.tags.push(tag.clone());
                                }
                            }
                        },
                    )
                    .await
            }
            BulkAction::RemoveTags => {
                let tags = string_array(params, "tags");
                let apply_tags = tags.clone();
                manager
                    .mutate(
                        instance_id,
                        infohashes,
                        move |client| async move { client.remove_tags(&hashes, &tags).await },
                        move |torrent| torrent.tags.retain(|t| !apply_tags.contains(t)),
                    )
                    .await
            }
            BulkAction::SetTags => {
                let tags = string_array(params, "tags");
                let apply_tags = tags.clone();
                manager
                    .mutate(
                        instance_id,
                        infohashes,
                        move |client| async move { client.set_tags(&hashes, &tags).await },
                        move |torrent| torrent.tags = apply_tags.clone(),
                    )
                    .await
            }
            BulkAction::SetLocation => {
                let location = params.get("location").and_then(Value::as_str).unwrap_or_default().to_string();
                let request = SetLocation { location: location.clone() };
                manager
                    .mutate(
                        instance_id,
                        infohashes,
                        move |client| async move { client.set_location(&hashes, &request).await },
                        move |torrent| torrent.save_path = location.clone(),
                    )
                    .await
            }
            BulkAction::SetDownloadLimit => {
                let bytes = params.get("bytesPerSec").and_then(Value::as_u64).unwrap_or(0);
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.set_download_limit(&hashes, bytes).await }, |_| {})
                    .await
            }
            BulkAction::SetUploadLimit => {
                let bytes = params.get("bytesPerSec").and_then(Value::as_u64).unwrap_or(0);
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.set_upload_limit(&hashes, bytes).await }, |_| {})
                    .await
            }
            BulkAction::SetShareLimits => {
                let limits = ShareLimits {
                    ratio_limit: params.get("ratioLimit").and_then(Value::as_f64).unwrap_or(-1.0),
                    seeding_time_limit: params.get("seedingTimeLimit").and_then(Value::as_i64).unwrap_or(-1),
                };
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.set_share_limits(&hashes, &limits).await }, |_| {})
                    .await
            }
            BulkAction::SetForceStart => {
                let enabled = params.get("enabled").and_then(Value::as_bool).unwrap_or(true);
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.set_force_start(&hashes, enabled).await }, |_| {})
                    .await
            }
            BulkAction::SetSuperSeeding => {
                let enabled = params.get("enabled").and_then(Value::as_bool).unwrap_or(true);
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.set_super_seeding(&hashes, enabled).await }, |_| {})
                    .await
            }
            BulkAction::QueueTop => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.queue_top(&hashes).await }, |_| {})
                    .await
            }
            BulkAction::QueueBottom => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.queue_bottom(&hashes).await }, |_| {})
                    .await
            }
            BulkAction::QueueUp => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.queue_up(&hashes).await }, |_| {})
                    .await
            }
            BulkAction::QueueDown => {
                manager
                    .mutate(instance_id, infohashes, move |client| async move { client.queue_down(&hashes).await }, |_| {})
                    .await
            }
            BulkAction::AddTrackers => {
                let urls = string_array(params, "urls");
                for infohash in &hashes {
                    let filter_key = [infohash.clone()];
                    let infohash = infohash.clone();
                    let urls = urls.clone();
                    manager
                        .mutate(
                            instance_id,
                            &filter_key,
                            move |client| async move { client.add_trackers(&infohash, &urls).await },
                            |_| {},
                        )
                        .await?;
                }
                Ok(())
            }
            BulkAction::RemoveTrackers => {
                let urls = string_array(params, "urls");
                for infohash in &hashes {
                    let filter_key = [infohash.clone()];
                    let infohash = infohash.clone();
                    let urls = urls.clone();
                    manager
                        .mutate(
                            instance_id,
                            &filter_key,
                            move |client| async move { client.remove_trackers(&infohash, &urls).await },
                            |_| {},
                        )
                        .await?;
                }
                Ok(())
            }
            BulkAction::EditTrackers => {
                let original_url = params.get("originalUrl").and_then(Value::as_str).unwrap_or_default().to_string();
                let new_url = params.get("newUrl").and_then(Value::as_str).unwrap_or_default().to_string();
                for infohash in &hashes {
                    let filter_key = [infohash.clone()];
                    let edit = EditTracker {
                        original_url: original_url.clone(),
                        new_url: new_url.clone(),
                    };
                    let infohash = infohash.clone();
                    manager
                        .mutate(
                            instance_id,
                            &filter_key,
                            move |client| async move { client.edit_tracker(&infohash, &edit).await },
                            |_| {},
                        )
                        .await?;
                }
                Ok(())
            }
            BulkAction::ToggleAlternativeSpeedLimits => {
                let client = self.sync_manager.get_client(instance_id).await?;
                let result = client.toggle_alternative_speed_limits().await;
                if let Err(err) = &result {
                    self.sync_manager.handle_session_loss(instance_id, err);
                }
                result
            }
        }
    }
}

fn set_state_paused(torrent: &mut crate::model::TorrentView) {
    torrent.state = crate::model::TorrentState::PausedDl;
}

fn set_state_resumed(torrent: &mut crate::model::TorrentView) {
    torrent.state = crate::model::TorrentState::Downloading;
}

fn string_array(params: &ActionParams, field: &str) -> Vec<String> {
    params
        .get(field)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
