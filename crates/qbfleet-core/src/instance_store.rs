//! Narrow read contract the Client Pool uses to resolve `Instance` rows,
//! implemented outside this crate by `qbfleet-data`'s Postgres-backed store.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Instance, InstanceId};

/// Failure reading instance rows from the backing store.
#[derive(Debug, Error)]
pub enum InstanceStoreError {
    /// No row exists for the requested id.
    #[error("instance {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: InstanceId,
    },
    /// The underlying query failed.
    #[error("instance store query failed")]
    QueryFailed {
        /// Underlying failure, boxed so this crate need not depend on the
        /// storage crate's error type.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Read access to configured `Instance` rows.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Fetch one instance by id.
    async fn instance(&self, id: InstanceId) -> Result<Instance, InstanceStoreError>;

    /// List the ids of all active instances.
    async fn active_instance_ids(&self) -> Result<Vec<InstanceId>, InstanceStoreError>;
}
