//! The composition root: owns the Client Pool, the Sync Manager, the
//! Cross-Instance Aggregator, the Bulk Action Coordinator, and the
//! Live-Update Streamer (SPEC_FULL.md §9).

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::aggregator::CrossInstanceAggregator;
use crate::bulk::BulkActionCoordinator;
use crate::cache::SmallObjectCache;
use crate::config::ProxyConfig;
use crate::instance_store::InstanceStore;
use crate::model::ConnectionStatus;
use crate::pool::ClientPool;
use crate::streamer::LiveUpdateStreamer;
use crate::sync::SyncManager;

/// Everything the HTTP layer needs to serve one instance's worth of Proxy
/// traffic, held behind a single `Arc` in the API's application state.
pub struct Core {
    /// Read access to configured instance rows, for listing endpoints that
    /// need every instance rather than one already resolved by id.
    pub instance_store: Arc<dyn InstanceStore>,
    /// Process-wide registry of memoized Upstream Clients.
    pub client_pool: Arc<ClientPool>,
    /// Per-instance torrent/RSS/log/preferences cache.
    pub sync_manager: Arc<SyncManager>,
    /// Cross-instance fan-out reader.
    pub aggregator: Arc<CrossInstanceAggregator>,
    /// Bulk mutation dispatcher.
    pub bulk_coordinator: Arc<BulkActionCoordinator>,
    /// Push-update fan-out.
    pub streamer: Arc<LiveUpdateStreamer>,
    /// Shared small-object TTL cache (also reachable via `client_pool.cache()`).
    pub shared_cache: Arc<SmallObjectCache<String, ConnectionStatus>>,
    /// Timeout applied to UI-facing `getClient` calls.
    pub ui_client_timeout: Duration,
}

impl Core {
    /// Construct every core component from a validated `ProxyConfig`.
    ///
    /// # Errors
    ///
    /// Returns whatever `cfg.validate()` returns if `cfg` is malformed.
    pub fn new(cfg: &ProxyConfig, instance_store: Arc<dyn InstanceStore>) -> Result<Self, crate::config::ConfigError> {
        cfg.validate()?;

        let client_pool = Arc::new(ClientPool::new(Arc::clone(&instance_store), cfg.encryption_key));
        let sync_manager = Arc::new(SyncManager::new(Arc::clone(&client_pool), cfg.freshness));
        let aggregator = Arc::new(CrossInstanceAggregator::new(
            Arc::clone(&instance_store),
            Arc::clone(&sync_manager),
            cfg.per_instance_timeout,
        ));
        let bulk_coordinator = Arc::new(BulkActionCoordinator::new(Arc::clone(&sync_manager)));
        let streamer = LiveUpdateStreamer::new(Arc::clone(&sync_manager));
        let shared_cache = client_pool.cache();

        info!(listen_address = %cfg.listen_address, "core initialized");

        Ok(Self {
            instance_store,
            client_pool,
            sync_manager,
            aggregator,
            bulk_coordinator,
            streamer,
            shared_cache,
            ui_client_timeout: cfg.ui_client_timeout,
        })
    }

    /// Stop every Live-Update poller. Safe to call more than once.
    pub fn shutdown(&self) {
        self.streamer.shutdown();
        info!("core shut down");
    }
}
