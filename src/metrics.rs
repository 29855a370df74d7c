//! Prometheus metrics for the stream service
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! process-wide default registry, so several servers (and tests) can coexist
//! in one process.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metrics collected by the stream service
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,

    /// Stream requests by outcome: full, partial, error
    pub requests_total: IntCounterVec,

    /// Asset lookups by result: hit, miss
    pub cache_lookups_total: IntCounterVec,

    /// Fetch pipeline runs by result: success or an error kind
    pub fetch_jobs_total: IntCounterVec,

    /// Duration of fetch pipeline runs
    pub fetch_duration_seconds: Histogram,

    /// Fetch pipelines currently running
    pub fetches_in_flight: IntGauge,

    /// Requests turned away because another request owned the fetch
    pub not_ready_total: IntCounter,

    /// Body bytes promised to clients (sum of Content-Length)
    pub bytes_served_total: IntCounter,
}

impl ServiceMetrics {
    /// Create metrics in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics and register them in `registry`
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "audio_cache_stream_requests_total",
                "Stream requests by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new(
                "audio_cache_lookups_total",
                "Asset store lookups by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let fetch_jobs_total = IntCounterVec::new(
            Opts::new(
                "audio_cache_fetch_jobs_total",
                "Fetch pipeline runs by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(fetch_jobs_total.clone()))?;

        let fetch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "audio_cache_fetch_duration_seconds",
                "Duration of fetch pipeline runs in seconds",
            )
            .buckets(vec![
                0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
            ]),
        )?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;

        let fetches_in_flight = IntGauge::new(
            "audio_cache_fetches_in_flight",
            "Fetch pipelines currently running",
        )?;
        registry.register(Box::new(fetches_in_flight.clone()))?;

        let not_ready_total = IntCounter::new(
            "audio_cache_not_ready_total",
            "Requests rejected because another request owned the fetch",
        )?;
        registry.register(Box::new(not_ready_total.clone()))?;

        let bytes_served_total = IntCounter::new(
            "audio_cache_bytes_served_total",
            "Body bytes promised to clients",
        )?;
        registry.register(Box::new(bytes_served_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            cache_lookups_total,
            fetch_jobs_total,
            fetch_duration_seconds,
            fetches_in_flight,
            not_ready_total,
            bytes_served_total,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_fetch(&self, result: &str, duration: Duration) {
        self.fetch_jobs_total.with_label_values(&[result]).inc();
        self.fetch_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_bytes_served(&self, bytes: u64) {
        self.bytes_served_total.inc_by(bytes);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        // Two instances must not collide on metric names.
        let a = ServiceMetrics::new().unwrap();
        let b = ServiceMetrics::new().unwrap();
        a.record_request("full");
        assert_eq!(a.requests_total.with_label_values(&["full"]).get(), 1);
        assert_eq!(b.requests_total.with_label_values(&["full"]).get(), 0);
    }

    #[test]
    fn test_render_contains_recorded_values() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_request("partial");
        metrics.record_lookup(true);
        metrics.record_lookup(false);
        metrics.record_fetch("success", Duration::from_millis(1500));
        metrics.record_bytes_served(1000);
        metrics.not_ready_total.inc();

        let output = metrics.render().unwrap();
        assert!(output.contains("audio_cache_stream_requests_total{outcome=\"partial\"} 1"));
        assert!(output.contains("audio_cache_lookups_total{result=\"hit\"} 1"));
        assert!(output.contains("audio_cache_lookups_total{result=\"miss\"} 1"));
        assert!(output.contains("audio_cache_fetch_jobs_total{result=\"success\"} 1"));
        assert!(output.contains("audio_cache_bytes_served_total 1000"));
        assert!(output.contains("audio_cache_not_ready_total 1"));
        assert!(output.contains("# TYPE audio_cache_fetch_duration_seconds histogram"));
    }
}
