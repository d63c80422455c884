//! The Live-Update Streamer: one poller per (instance, channel), fanned out
//! to however many viewers are currently subscribed (SPEC_FULL.md §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProxyResult;
use crate::model::InstanceId;
use crate::sync::SyncManager;

/// Per-viewer bounded queue depth; a full queue drops the event rather than
/// disconnecting the viewer (SPEC_FULL.md §4.5 rule 4).
const VIEWER_QUEUE_DEPTH: usize = 16;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// One of the three push channels a viewer may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Torrent-list updates for one instance.
    Torrents,
    /// RSS tree updates for one instance.
    Rss,
    /// Main-log tail for one instance.
    Logs,
}

impl ChannelKind {
    const fn poll_interval(self) -> Duration {
        match self {
            Self::Torrents => Duration::from_secs(2),
            Self::Rss => Duration::from_secs(5),
            Self::Logs => Duration::from_secs(1),
        }
    }

    const fn sse_event_name(self) -> &'static str {
        match self {
            Self::Torrents => "torrents",
            Self::Rss => "rss",
            Self::Logs => "logs",
        }
    }
}

/// One message delivered to a subscribed viewer.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A full or diffed payload for the channel.
    Payload {
        /// SSE `event:` line value.
        event: &'static str,
        /// SSE `data:` line value, already serialized.
        data: String,
    },
    /// A keepalive comment line, sent regardless of payload changes.
    Heartbeat,
}

struct Viewer {
    id: u64,
    sender: mpsc::Sender<StreamEvent>,
}

struct Poller {
    cancel: CancellationToken,
    viewers: Vec<Viewer>,
}

/// Push-update fan-out: one background poller per (instance, channel-kind)
/// regardless of subscriber count, reference-counted by viewer.
pub struct LiveUpdateStreamer {
    sync_manager: Arc<SyncManager>,
    pollers: Mutex<HashMap<(InstanceId, ChannelKind), Poller>>,
    next_viewer_id: AtomicU64,
    shutdown: CancellationToken,
}

impl LiveUpdateStreamer {
    /// Build a streamer polling through `sync_manager`'s cache.
    #[must_use]
    pub fn new(sync_manager: Arc<SyncManager>) -> Arc<Self> {
        Arc::new(Self {
            sync_manager,
            pollers: Mutex::new(HashMap::new()),
            next_viewer_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe one viewer to `(instance_id, kind)`. Performs a synchronous
    /// initial probe through the Sync Manager first (rule 2): if that fetch
    /// fails, no stream is opened and the error is returned to the caller.
    pub async fn subscribe(self: &Arc<Self>, instance_id: InstanceId, kind: ChannelKind) -> ProxyResult<Subscription> {
        self.fetch_payload(instance_id, kind).await?;

        let (sender, receiver) = mpsc::channel(VIEWER_QUEUE_DEPTH);
        let viewer_id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);

        let (cancel, should_spawn) = {
            let mut pollers = self.pollers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let key = (instance_id, kind);
            let entry = pollers.entry(key).or_insert_with(|| Poller {
                cancel: self.shutdown.child_token(),
                viewers: Vec::new(),
            });
            let should_spawn = entry.viewers.is_empty();
            entry.viewers.push(Viewer { id: viewer_id, sender });
            (entry.cancel.clone(), should_spawn)
        };

        if should_spawn {
            let streamer = Arc::clone(self);
            tokio::spawn(async move { streamer.run_poller(instance_id, kind, cancel).await });
        }

        Ok(Subscription {
            streamer: Arc::clone(self),
            instance_id,
            kind,
            viewer_id,
            receiver: Some(receiver),
        })
    }

    /// Cancel every poller; viewer channels close as their polling task exits.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn unsubscribe(&self, instance_id: InstanceId, kind: ChannelKind, viewer_id: u64) {
        let mut pollers = self.pollers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (instance_id, kind);
        let Some(poller) = pollers.get_mut(&key) else { return };
        poller.viewers.retain(|viewer| viewer.id != viewer_id);
        if poller.viewers.is_empty() {
            poller.cancel.cancel();
            pollers.remove(&key);
        }
    }

    async fn run_poller(self: Arc<Self>, instance_id: InstanceId, kind: ChannelKind, cancel: CancellationToken) {
        let mut poll_tick = tokio::time::interval(kind.poll_interval());
        let mut heartbeat_tick = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut last_payload: Option<String> = None;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(instance_id, kind = ?kind, "poller cancelled");
                    return;
                }
                _ = poll_tick.tick() => {
                    match self.fetch_payload(instance_id, kind).await {
                        Ok(payload) => {
                            if last_payload.as_deref() != Some(payload.as_str()) {
                                self.broadcast(instance_id, kind, StreamEvent::Payload {
                                    event: kind.sse_event_name(),
                                    data: payload.clone(),
                                });
                                last_payload = Some(payload);
                            }
                        }
                        Err(err) => warn!(instance_id, kind = ?kind, error = %err, "poller fetch failed"),
                    }
                }
                _ = heartbeat_tick.tick() => {
                    self.broadcast(instance_id, kind, StreamEvent::Heartbeat);
                }
            }
        }
    }

    fn broadcast(&self, instance_id: InstanceId, kind: ChannelKind, event: StreamEvent) {
        let pollers = self.pollers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(poller) = pollers.get(&(instance_id, kind)) else { return };
        for viewer in &poller.viewers {
            if viewer.sender.try_send(event.clone()).is_err() {
                debug!(instance_id, kind = ?kind, viewer_id = viewer.id, "viewer queue full, event dropped");
            }
        }
    }

    async fn fetch_payload(&self, instance_id: InstanceId, kind: ChannelKind) -> ProxyResult<String> {
        Ok(match kind {
            ChannelKind::Torrents => {
                let torrents = self.sync_manager.get_all_torrents(instance_id).await?;
                to_json(&torrents)
            }
            ChannelKind::Rss => {
                let tree = self.sync_manager.get_rss_items(instance_id, false).await?;
                to_json(&tree)
            }
            ChannelKind::Logs => {
                let (records, _total) = self.sync_manager.get_main_logs(instance_id, 0, 200, None, &[]).await?;
                to_json(&records)
            }
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// An active viewer subscription; dropping it unsubscribes and, if it was
/// the last viewer on its (instance, channel), stops the poller.
pub struct Subscription {
    streamer: Arc<LiveUpdateStreamer>,
    instance_id: InstanceId,
    kind: ChannelKind,
    viewer_id: u64,
    receiver: Option<mpsc::Receiver<StreamEvent>>,
}

impl Subscription {
    /// Receive the next event for this viewer.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.as_mut()?.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.streamer.unsubscribe(self.instance_id, self.kind, self.viewer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FreshnessTtls;
    use crate::instance_store::{InstanceStore, InstanceStoreError};
    use crate::model::Instance;
    use crate::pool::ClientPool;
    use async_trait::async_trait;

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

    #[tokio::test]
    async fn subscribe_fails_fast_when_initial_probe_errors() {
        let pool = Arc::new(ClientPool::new(Arc::new(NoopStore), [0_u8; 32]));
        let manager = Arc::new(SyncManager::new(pool, FreshnessTtls::default()));
        let streamer = LiveUpdateStreamer::new(manager);
        let result = streamer.subscribe(1, ChannelKind::Torrents).await;
        assert!(result.is_err());
    }

    #[test]
    fn poll_intervals_match_spec() {
        assert_eq!(ChannelKind::Torrents.poll_interval(), Duration::from_secs(2));
        assert_eq!(ChannelKind::Rss.poll_interval(), Duration::from_secs(5));
        assert_eq!(ChannelKind::Logs.poll_interval(), Duration::from_secs(1));
    }
}
