//! Error types returned at the core boundary.

use thiserror::Error;

use crate::model::InstanceId;

/// Primary error type surfaced by the Client Pool, Sync Manager, Aggregator,
/// and Bulk Action Coordinator.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No instance is configured with the given id.
    #[error("instance {instance_id} not found")]
    InstanceNotFound {
        /// The id that was looked up.
        instance_id: InstanceId,
    },
    /// The instance exists but is administratively disabled.
    #[error("instance {instance_id} is disabled")]
    InstanceDisabled {
        /// The disabled instance.
        instance_id: InstanceId,
    },
    /// Stored credentials could not be decrypted.
    #[error("credentials for instance {instance_id} could not be decrypted")]
    DecryptionError {
        /// The instance whose credentials failed to decrypt.
        instance_id: InstanceId,
    },
    /// The upstream endpoint could not be reached at the transport level.
    #[error("instance {instance_id} is unreachable")]
    Unreachable {
        /// The instance that could not be reached.
        instance_id: InstanceId,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// A previously-established upstream session is no longer valid.
    #[error("session for instance {instance_id} was lost")]
    SessionLost {
        /// The instance whose session was lost.
        instance_id: InstanceId,
    },
    /// The upstream responded with a non-success status.
    #[error("instance {instance_id} rejected the request: {code} {message}")]
    UpstreamError {
        /// The instance that rejected the request.
        instance_id: InstanceId,
        /// HTTP status code reported by the upstream.
        code: u16,
        /// Upstream-provided error message, if any.
        message: String,
    },
    /// A request parameter failed validation before any upstream call was made.
    #[error("validation failed for {field}: {why}")]
    ValidationError {
        /// Field that failed validation.
        field: &'static str,
        /// Human-readable reason.
        why: String,
    },
    /// The operation was cancelled or exceeded its deadline.
    #[error("operation was cancelled or exceeded its deadline")]
    Cancelled,
    /// `getClientWithTimeout` timed out waiting for construction/login to
    /// finish. Unlike the other variants this does not poison the pool entry
    /// for `instance_id`; a later call may still succeed.
    #[error("instance {instance_id} did not become available in time")]
    Unavailable {
        /// The instance whose client could not be fetched in time.
        instance_id: InstanceId,
    },
}

/// Convenience alias for core operation results.
pub type ProxyResult<T> = Result<T, ProxyError>;
