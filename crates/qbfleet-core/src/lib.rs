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
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Instance access and synchronization subsystem for the fleet proxy: the
//! Client Pool, the per-instance Sync Manager, the Cross-Instance
//! Aggregator, the Bulk Action Coordinator, and the Live-Update Streamer.

mod aggregator;
mod bulk;
mod cache;
mod client;
mod config;
mod core;
mod error;
mod instance_store;
mod model;
mod pool;
mod streamer;
mod sync;

pub use aggregator::{AggregatedPage, CrossInstanceAggregator, InstanceFailure};
pub use bulk::{BulkActionCoordinator, InstanceActionResult};
pub use cache::{SharedCache, SmallObjectCache};
pub use client::{
    EditTracker, PeerEntry, QbittorrentClient, SetFilePriority, SetLocation, ShareLimits,
    StubUpstreamClient, TorrentFileEntry, TrackerEntry, UpstreamClient, UpstreamListFilter,
};
pub use config::{ConfigError, FreshnessTtls, ProxyConfig};
pub use core::Core;
pub use error::{ProxyError, ProxyResult};
pub use instance_store::{InstanceStore, InstanceStoreError};
pub use model::{
    ActionParams, AppPreferences, BulkAction, CachedTorrentList, CapabilitySet,
    CategoryDescriptor, ConnectionStatus, CrossInstanceTorrentView, FilePriority, FilterSpec,
    Instance, InstanceId, InstanceSpeeds, LogLevel, LogRecord, PeerLogRecord, SortDirection,
    SortField, SortKey, SpeedLimits, StatusKey, Target, TorrentState, TorrentView, TrackerCount,
    UserDefinedView,
};
pub use pool::ClientPool;
pub use streamer::{ChannelKind, LiveUpdateStreamer, StreamEvent, Subscription};
pub use sync::{Page, SyncManager, TorrentsPage};
