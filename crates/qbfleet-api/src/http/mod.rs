//! HTTP surface modules (routers, handlers).

/// Shared constants and header names for HTTP surfaces.
pub(crate) mod constants;
/// Problem response helpers and error types.
pub(crate) mod errors;
/// Health and diagnostics endpoints.
pub(crate) mod health;
/// Instance listing, stats, preferences, speed limits, capabilities.
pub(crate) mod instances;
/// Log pagination endpoints.
pub(crate) mod logs;
/// Router construction and server host.
pub(crate) mod router;
/// Server-sent events streaming endpoints.
pub(crate) mod sse;
/// Metrics middleware for HTTP requests.
pub(crate) mod telemetry;
/// Torrent listing and bulk-action endpoints.
pub(crate) mod torrents;
