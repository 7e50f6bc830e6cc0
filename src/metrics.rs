//! Request, cache and upstream metrics.
//!
//! Recording is always safe: without an installed recorder the `metrics`
//! macros are no-ops, which is what the test suite relies on.

use crate::error::{Result, TimegateError};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Once;
use tracing::info;

static REGISTER: Once = Once::new();

const REQUESTS: &str = "timegate_requests_total";
const CACHE_HITS: &str = "timegate_cache_hits_total";
const CACHE_MISSES: &str = "timegate_cache_misses_total";
const CACHE_STORES: &str = "timegate_cache_stores_total";
const CACHE_OVERSIZE: &str = "timegate_cache_oversize_total";
const UPSTREAM_ERRORS: &str = "timegate_upstream_errors_total";
const UPSTREAM_DURATION: &str = "timegate_upstream_duration_seconds";

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TimegateError::Configuration(format!("metrics exporter: {}", e)))?;
    info!("Prometheus exporter listening on http://{}/metrics", addr);
    REGISTER.call_once(TimegateMetrics::register_metrics);
    Ok(())
}

pub struct TimegateMetrics;

impl TimegateMetrics {
    fn register_metrics() {
        describe_counter!(REQUESTS, "Requests handled, by endpoint");
        describe_counter!(CACHE_HITS, "Timemap lookups answered from the cache");
        describe_counter!(CACHE_MISSES, "Timemap lookups that went to the source");
        describe_counter!(CACHE_STORES, "Timemaps written to the cache");
        describe_counter!(CACHE_OVERSIZE, "Timemaps not cached because they exceed max_size");
        describe_counter!(UPSTREAM_ERRORS, "Failed source lookups, by source and cause");
        describe_histogram!(UPSTREAM_DURATION, "Duration of source lookups");
    }

    pub fn record_request(endpoint: &'static str) {
        counter!(REQUESTS, "endpoint" => endpoint).increment(1);
    }

    pub fn record_cache_hit() {
        counter!(CACHE_HITS).increment(1);
    }

    pub fn record_cache_miss() {
        counter!(CACHE_MISSES).increment(1);
    }

    pub fn record_cache_store() {
        counter!(CACHE_STORES).increment(1);
    }

    pub fn record_cache_oversize() {
        counter!(CACHE_OVERSIZE).increment(1);
    }

    pub fn record_upstream_duration(source: &str, duration_secs: f64) {
        histogram!(UPSTREAM_DURATION, "source" => source.to_string()).record(duration_secs);
    }

    pub fn record_upstream_error(source: &str, cause: &'static str) {
        counter!(UPSTREAM_ERRORS, "source" => source.to_string(), "cause" => cause).increment(1);
    }
}
