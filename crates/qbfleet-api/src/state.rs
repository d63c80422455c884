//! Application state shared across every HTTP handler.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use qbfleet_core::Core;
use qbfleet_events::{Event, EventBus};
use qbfleet_telemetry::Metrics;

/// How often the degradation reconciler polls the Client Pool's failure sets.
const DEGRADATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state handed to every Axum handler via `State<AppState>`.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) core: Arc<Core>,
    pub(crate) telemetry: Metrics,
    pub(crate) events: EventBus,
    degraded: Arc<Mutex<Vec<String>>>,
}

impl AppState {
    pub(crate) fn new(core: Arc<Core>, telemetry: Metrics, events: EventBus) -> Self {
        Self { core, telemetry, events, degraded: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Mark `component` degraded. Returns `true` if this was a real
    /// transition (not already marked), in which case an
    /// `Event::HealthChanged` is published with the updated, deduplicated,
    /// sorted component list.
    pub(crate) fn mark_degraded(&self, component: &str) -> bool {
        let mut guard = Self::lock(&self.degraded);
        if guard.iter().any(|existing| existing == component) {
            return false;
        }
        guard.push(component.to_string());
        guard.sort();
        let degraded = guard.clone();
        drop(guard);
        self.publish_health_changed(degraded);
        true
    }

    /// Clear `component`'s degraded marker. Returns `true` if this was a
    /// real transition.
    pub(crate) fn clear_degraded(&self, component: &str) -> bool {
        let mut guard = Self::lock(&self.degraded);
        let before = guard.len();
        guard.retain(|existing| existing != component);
        if guard.len() == before {
            return false;
        }
        let degraded = guard.clone();
        drop(guard);
        self.publish_health_changed(degraded);
        true
    }

    pub(crate) fn degraded_components(&self) -> Vec<String> {
        Self::lock(&self.degraded).clone()
    }

    /// Spawn a task that periodically diffs the Client Pool's decryption-
    /// and health-failure sets against the degraded component list, so
    /// `GET /health/full` and `Event::HealthChanged` reflect real instance
    /// state instead of staying empty forever.
    pub(crate) fn spawn_degradation_reconciler(&self) {
        let state = self.clone();
        tokio::spawn(async move {
            loop {
                state.reconcile_degradation();
                tokio::time::sleep(DEGRADATION_POLL_INTERVAL).await;
            }
        });
    }

    fn reconcile_degradation(&self) {
        for id in self.core.client_pool.instances_with_decryption_errors() {
            self.mark_degraded(&format!("instance:{id}:decryption"));
        }
        for id in self.core.client_pool.instances_with_health_failures() {
            self.mark_degraded(&format!("instance:{id}:health"));
        }
        let stale: Vec<String> = self
            .degraded_components()
            .into_iter()
            .filter(|component| !self.still_degraded(component))
            .collect();
        for component in stale {
            self.clear_degraded(&component);
        }
    }

    fn still_degraded(&self, component: &str) -> bool {
        if let Some(rest) = component.strip_prefix("instance:") {
            if let Some((id, kind)) = rest.split_once(':') {
                let Ok(id) = id.parse::<qbfleet_core::InstanceId>() else {
                    return false;
                };
                return match kind {
                    "decryption" => self.core.client_pool.instances_with_decryption_errors().contains(&id),
                    "health" => self.core.client_pool.instances_with_health_failures().contains(&id),
                    _ => false,
                };
            }
        }
        false
    }

    fn publish_health_changed(&self, degraded: Vec<String>) {
        if let Err(error) = self.events.publish(Event::HealthChanged { degraded }) {
            tracing::warn!(
                event_id = error.event_id(),
                event_kind = error.event_kind(),
                error = %error,
                "failed to publish event"
            );
        }
    }

    fn lock(mutex: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
        mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qbfleet_core::{Instance, InstanceId, InstanceStore, InstanceStoreError, ProxyConfig};

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

    fn sample_state() -> AppState {
        let config = ProxyConfig {
            database_url: "postgres://localhost/fleetqb".to_string(),
            encryption_key: [0_u8; 32],
            freshness: Default::default(),
            ui_client_timeout: std::time::Duration::from_secs(5),
            per_instance_timeout: std::time::Duration::from_secs(5),
            bulk_action_timeout: std::time::Duration::from_secs(5),
            sse_heartbeat_interval: std::time::Duration::from_secs(15),
            listen_address: "127.0.0.1:0".to_string(),
            log_format: "json".to_string(),
        };
        let core = Core::new(&config, Arc::new(NoopStore)).expect("valid config");
        AppState::new(Arc::new(core), Metrics::new().expect("metrics"), EventBus::new())
    }

    #[test]
    fn mark_and_clear_degraded_reports_transitions() {
        let state = sample_state();
        assert!(state.mark_degraded("client_pool"));
        assert!(!state.mark_degraded("client_pool"));
        assert_eq!(state.degraded_components(), vec!["client_pool".to_string()]);

        assert!(state.clear_degraded("client_pool"));
        assert!(!state.clear_degraded("client_pool"));
        assert!(state.degraded_components().is_empty());
    }
}
