//! Metrics collection
//!
//! Prometheus-compatible counters, gauges and latency histograms for:
//! - Per-endpoint request counts and latency
//! - Quorum outcomes and latency per operation
//! - Replica results that arrive after the request already returned
//! - Cache hits/misses and durable-store fallbacks

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Upper bounds of the latency buckets, in milliseconds
const LATENCY_BOUNDS_MS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

/// Fixed-bucket latency histogram. The last slot counts everything above the
/// largest bound.
#[derive(Debug)]
pub struct Histogram {
    slots: [AtomicU64; LATENCY_BOUNDS_MS.len() + 1],
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let micros = elapsed.as_micros() as u64;
        let slot = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| micros <= bound * 1_000)
            .unwrap_or(LATENCY_BOUNDS_MS.len());

        self.slots[slot].fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative `(le, count)` pairs ending with `+Inf`
    pub fn cumulative(&self) -> Vec<(String, u64)> {
        let mut running = 0;
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                running += slot.load(Ordering::Relaxed);
                let le = LATENCY_BOUNDS_MS
                    .get(i)
                    .map_or_else(|| "+Inf".to_string(), u64::to_string);
                (le, running)
            })
            .collect()
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn render(&self, out: &mut String, name: &str, labels: &str) {
        let sep = if labels.is_empty() { "" } else { "," };
        for (le, count) in self.cumulative() {
            let _ = writeln!(out, "{}_bucket{{{}{}le=\"{}\"}} {}", name, labels, sep, le, count);
        }
        let labels = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels)
        };
        let _ = writeln!(out, "{}_sum{} {}", name, labels, self.sum_ms());
        let _ = writeln!(out, "{}_count{} {}", name, labels, self.count());
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, v: u64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct EndpointMetrics {
    pub requests: Counter,
    pub server_errors: Counter,
    pub latency: Histogram,
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

/// Global metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    endpoints: Mutex<HashMap<String, Arc<EndpointMetrics>>>,

    pub quorum_writes_ok: Counter,
    pub quorum_writes_failed: Counter,
    pub quorum_reads_ok: Counter,
    pub quorum_reads_failed: Counter,
    pub quorum_timeouts: Counter,
    pub quorum_cancellations: Counter,
    pub quorum_write_latency: Histogram,
    pub quorum_read_latency: Histogram,
    /// Replica outcomes that arrived after their request had already returned
    pub late_replica_results: Counter,
    pub late_replica_failures: Counter,

    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_write_failures: Counter,
    pub store_fallbacks: Counter,

    pub ring_nodes: Gauge,
    pub ring_virtual_nodes: Gauge,

    started: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::default(),
            quorum_writes_ok: Counter::default(),
            quorum_writes_failed: Counter::default(),
            quorum_reads_ok: Counter::default(),
            quorum_reads_failed: Counter::default(),
            quorum_timeouts: Counter::default(),
            quorum_cancellations: Counter::default(),
            quorum_write_latency: Histogram::new(),
            quorum_read_latency: Histogram::new(),
            late_replica_results: Counter::default(),
            late_replica_failures: Counter::default(),
            cache_hits: Counter::default(),
            cache_misses: Counter::default(),
            cache_write_failures: Counter::default(),
            store_fallbacks: Counter::default(),
            ring_nodes: Gauge::default(),
            ring_virtual_nodes: Gauge::default(),
            started: Instant::now(),
        }
    }

    /// Metrics for one route template, created on first use
    pub fn endpoint(&self, route: &str) -> Arc<EndpointMetrics> {
        self.endpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(route.to_string())
            .or_default()
            .clone()
    }

    pub fn record_request(&self, route: &str, elapsed: Duration, ok: bool) {
        let endpoint = self.endpoint(route);
        endpoint.requests.inc();
        endpoint.latency.observe(elapsed);
        if !ok {
            endpoint.server_errors.inc();
        }
    }

    /// Render everything in the Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters: [(&str, &str, &Counter); 12] = [
            ("quorum_writes_ok_total", "Write quorums satisfied", &self.quorum_writes_ok),
            ("quorum_writes_failed_total", "Write quorums failed", &self.quorum_writes_failed),
            ("quorum_reads_ok_total", "Read quorums satisfied", &self.quorum_reads_ok),
            ("quorum_reads_failed_total", "Read quorums failed", &self.quorum_reads_failed),
            ("quorum_timeouts_total", "Quorum operations that hit their deadline", &self.quorum_timeouts),
            ("quorum_cancellations_total", "Quorum operations cancelled by the caller", &self.quorum_cancellations),
            ("late_replica_results_total", "Replica results ignored after the quorum returned", &self.late_replica_results),
            ("late_replica_failures_total", "Late replica results that were failures", &self.late_replica_failures),
            ("cache_hits_total", "Reads served from cache", &self.cache_hits),
            ("cache_misses_total", "Reads that missed the cache", &self.cache_misses),
            ("cache_write_failures_total", "Best-effort cache writes that failed", &self.cache_write_failures),
            ("store_fallbacks_total", "Reads served from the durable store after quorum failure", &self.store_fallbacks),
        ];
        for (name, help, counter) in counters {
            let name = format!("ringkv_{}", name);
            header(&mut out, &name, help, "counter");
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        let gauges = [
            ("ring_nodes", "Physical nodes on the ring", self.ring_nodes.get()),
            ("ring_virtual_nodes", "Virtual nodes on the ring", self.ring_virtual_nodes.get()),
            ("uptime_seconds", "Process uptime in seconds", self.started.elapsed().as_secs()),
        ];
        for (name, help, value) in gauges {
            let name = format!("ringkv_{}", name);
            header(&mut out, &name, help, "gauge");
            let _ = writeln!(out, "{} {}", name, value);
        }

        header(
            &mut out,
            "ringkv_quorum_duration_ms",
            "Time until a quorum operation returned",
            "histogram",
        );
        self.quorum_write_latency
            .render(&mut out, "ringkv_quorum_duration_ms", "op=\"write\"");
        self.quorum_read_latency
            .render(&mut out, "ringkv_quorum_duration_ms", "op=\"read\"");

        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let mut routes: Vec<_> = endpoints.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));

        header(&mut out, "ringkv_http_requests_total", "Requests per route", "counter");
        for (route, m) in &routes {
            let _ = writeln!(out, "ringkv_http_requests_total{{route=\"{}\"}} {}", route, m.requests.get());
        }
        header(&mut out, "ringkv_http_server_errors_total", "5xx responses per route", "counter");
        for (route, m) in &routes {
            let _ = writeln!(out, "ringkv_http_server_errors_total{{route=\"{}\"}} {}", route, m.server_errors.get());
        }
        header(&mut out, "ringkv_http_duration_ms", "Request latency per route", "histogram");
        for (route, m) in &routes {
            m.latency
                .render(&mut out, "ringkv_http_duration_ms", &format!("route=\"{}\"", route));
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let hist = Histogram::new();
        hist.observe(Duration::from_millis(5));
        hist.observe(Duration::from_millis(40));
        hist.observe(Duration::from_secs(60));

        assert_eq!(hist.count(), 3);
        let buckets = hist.cumulative();
        assert_eq!(buckets[1], ("5".to_string(), 1));
        assert_eq!(buckets[4], ("50".to_string(), 2));
        assert_eq!(buckets.last().unwrap(), &("+Inf".to_string(), 3));
        assert!((hist.sum_ms() - 60_045.0).abs() < 1e-6);
    }

    #[test]
    fn test_record_request_counts_server_errors() {
        let registry = MetricsRegistry::new();
        registry.record_request("/get/:key", Duration::from_millis(50), true);
        registry.record_request("/get/:key", Duration::from_millis(100), false);

        let endpoint = registry.endpoint("/get/:key");
        assert_eq!(endpoint.requests.get(), 2);
        assert_eq!(endpoint.server_errors.get(), 1);
    }

    #[test]
    fn test_prometheus_output() {
        let registry = MetricsRegistry::new();
        registry.cache_hits.inc();
        registry.quorum_write_latency.observe(Duration::from_millis(3));
        registry.record_request("/set", Duration::from_millis(3), true);

        let text = registry.to_prometheus();
        assert!(text.contains("ringkv_cache_hits_total 1"));
        assert!(text.contains("ringkv_http_requests_total{route=\"/set\"} 1"));
        assert!(text.contains("ringkv_quorum_duration_ms_count{op=\"write\"} 1"));
        assert!(text.contains("ringkv_http_duration_ms_bucket{route=\"/set\",le=\"+Inf\"} 1"));
    }
}
