//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the set of counters/gauges the fleet proxy's own components
//!   (client pool, small-object cache, aggregator, bulk coordinator, SSE
//!   streamer) surface about themselves.

use std::convert::TryFrom;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    upstream_requests_total: IntCounterVec,
    cache_entries: IntGauge,
    client_pool_size: IntGauge,
    active_instances: IntGauge,
    bulk_action_failures_total: IntCounter,
    sse_subscribers: IntGauge,
    sse_events_dropped_total: IntCounter,
    upstream_latency_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current number of entries held in the small-object TTL cache.
    pub cache_entries: i64,
    /// Current number of instances with a memoized upstream client.
    pub client_pool_size: i64,
    /// Current number of instances flagged active in the instance store.
    pub active_instances: i64,
    /// Total bulk-action-per-instance failures observed.
    pub bulk_action_failures_total: u64,
    /// Current number of live SSE subscribers across all instances.
    pub sse_subscribers: i64,
    /// Total SSE events dropped because a viewer's queue was full.
    pub sse_events_dropped_total: u64,
    /// Latency (ms) of the most recently completed upstream request.
    pub upstream_latency_ms: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )?;
        let upstream_requests_total = IntCounterVec::new(
            Opts::new(
                "upstream_requests_total",
                "Total requests proxied to an upstream qBittorrent instance",
            ),
            &["instance", "outcome"],
        )?;
        let cache_entries = IntGauge::with_opts(Opts::new(
            "cache_entries",
            "Entries currently held in the small-object TTL cache",
        ))?;
        let client_pool_size = IntGauge::with_opts(Opts::new(
            "client_pool_size",
            "Instances with a currently memoized upstream client",
        ))?;
        let active_instances = IntGauge::with_opts(Opts::new(
            "active_instances",
            "Instances flagged active in the instance store",
        ))?;
        let bulk_action_failures_total = IntCounter::with_opts(Opts::new(
            "bulk_action_failures_total",
            "Per-instance failures observed while fanning out a bulk action",
        ))?;
        let sse_subscribers = IntGauge::with_opts(Opts::new(
            "sse_subscribers",
            "Live SSE subscribers across all instances",
        ))?;
        let sse_events_dropped_total = IntCounter::with_opts(Opts::new(
            "sse_events_dropped_total",
            "SSE events dropped because a viewer's bounded queue was full",
        ))?;
        let upstream_latency_ms = IntGauge::with_opts(Opts::new(
            "upstream_latency_ms",
            "Latency of the most recently completed upstream request, in milliseconds",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(upstream_requests_total.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(client_pool_size.clone()))?;
        registry.register(Box::new(active_instances.clone()))?;
        registry.register(Box::new(bulk_action_failures_total.clone()))?;
        registry.register(Box::new(sse_subscribers.clone()))?;
        registry.register(Box::new(sse_events_dropped_total.clone()))?;
        registry.register(Box::new(upstream_latency_ms.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                http_requests_total,
                upstream_requests_total,
                cache_entries,
                client_pool_size,
                active_instances,
                bulk_action_failures_total,
                sse_subscribers,
                sse_events_dropped_total,
                upstream_latency_ms,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the upstream request counter for `instance` with the given outcome
    /// (e.g. `"ok"`, `"timeout"`, `"error"`).
    pub fn inc_upstream_request(&self, instance: &str, outcome: &str) {
        self.inner
            .upstream_requests_total
            .with_label_values(&[instance, outcome])
            .inc();
    }

    /// Set the small-object cache entry-count gauge.
    pub fn set_cache_entries(&self, count: i64) {
        self.inner.cache_entries.set(count);
    }

    /// Set the client pool size gauge.
    pub fn set_client_pool_size(&self, count: i64) {
        self.inner.client_pool_size.set(count);
    }

    /// Set the active-instance count gauge.
    pub fn set_active_instances(&self, count: i64) {
        self.inner.active_instances.set(count);
    }

    /// Increment the bulk-action-per-instance failure counter.
    pub fn inc_bulk_action_failure(&self) {
        self.inner.bulk_action_failures_total.inc();
    }

    /// Set the live SSE subscriber gauge.
    pub fn set_sse_subscribers(&self, count: i64) {
        self.inner.sse_subscribers.set(count);
    }

    /// Increment the SSE dropped-event counter.
    pub fn inc_sse_event_dropped(&self) {
        self.inner.sse_events_dropped_total.inc();
    }

    /// Record the latency of a completed upstream request.
    pub fn observe_upstream_latency(&self, duration: Duration) {
        self.inner.upstream_latency_ms.set(Self::duration_to_ms(duration));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_entries: self.inner.cache_entries.get(),
            client_pool_size: self.inner.client_pool_size.get(),
            active_instances: self.inner.active_instances.get(),
            bulk_action_failures_total: self.inner.bulk_action_failures_total.get(),
            sse_subscribers: self.inner.sse_subscribers.get(),
            sse_events_dropped_total: self.inner.sse_events_dropped_total.get(),
            upstream_latency_ms: self.inner.upstream_latency_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/api/instances", 200);
        metrics.inc_upstream_request("demo", "ok");
        metrics.set_cache_entries(12);
        metrics.set_client_pool_size(3);
        metrics.set_active_instances(3);
        metrics.inc_bulk_action_failure();
        metrics.set_sse_subscribers(2);
        metrics.inc_sse_event_dropped();
        metrics.observe_upstream_latency(Duration::from_millis(42));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_entries, 12);
        assert_eq!(snapshot.client_pool_size, 3);
        assert_eq!(snapshot.active_instances, 3);
        assert_eq!(snapshot.bulk_action_failures_total, 1);
        assert_eq!(snapshot.sse_subscribers, 2);
        assert_eq!(snapshot.sse_events_dropped_total, 1);
        assert_eq!(snapshot.upstream_latency_ms, 42);

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("upstream_requests_total"));
        assert!(rendered.contains("client_pool_size"));
        Ok(())
    }
}
