//! Prometheus metrics for lrucached

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Counter interface the entry store reports into.
///
/// Kept narrow so the store does not depend on how statistics are exposed.
pub trait StatsRecorder: Send + Sync {
    fn record_hit(&self);
    fn record_miss(&self);
    fn record_eviction(&self);
    fn record_expired(&self, count: usize);
    fn set_item_count(&self, count: usize);
    fn set_used_bytes(&self, bytes: usize);
}

/// Global metrics instance
pub struct Metrics {
    pub registry: Registry,

    // Command counters
    pub cmd_get: IntCounter,
    pub cmd_set: IntCounter,
    pub cmd_add: IntCounter,
    pub cmd_replace: IntCounter,
    pub cmd_append: IntCounter,
    pub cmd_prepend: IntCounter,
    pub cmd_delete: IntCounter,
    pub cmd_incr: IntCounter,
    pub cmd_decr: IntCounter,
    pub cmd_touch: IntCounter,
    pub cmd_flush: IntCounter,

    // Hit/miss counters
    pub get_hits: IntCounter,
    pub get_misses: IntCounter,

    // Store state
    pub evictions: IntCounter,
    pub expired_reclaimed: IntCounter,
    pub curr_items: IntGauge,
    pub used_bytes: IntGauge,

    // Connection metrics
    pub active_connections: IntGauge,
    pub total_connections: IntCounter,
    pub rejected_connections: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    // Latency histograms
    pub cmd_latency: Histogram,

    // Error counters
    pub protocol_errors: IntCounter,
    pub storage_errors: IntCounter,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let cmd_get = counter(&registry, "lrucached_cmd_get_total", "Total GET commands");
        let cmd_set = counter(&registry, "lrucached_cmd_set_total", "Total SET commands");
        let cmd_add = counter(&registry, "lrucached_cmd_add_total", "Total ADD commands");
        let cmd_replace = counter(
            &registry,
            "lrucached_cmd_replace_total",
            "Total REPLACE commands",
        );
        let cmd_append = counter(
            &registry,
            "lrucached_cmd_append_total",
            "Total APPEND commands",
        );
        let cmd_prepend = counter(
            &registry,
            "lrucached_cmd_prepend_total",
            "Total PREPEND commands",
        );
        let cmd_delete = counter(
            &registry,
            "lrucached_cmd_delete_total",
            "Total DELETE commands",
        );
        let cmd_incr = counter(&registry, "lrucached_cmd_incr_total", "Total INCR commands");
        let cmd_decr = counter(&registry, "lrucached_cmd_decr_total", "Total DECR commands");
        let cmd_touch = counter(&registry, "lrucached_cmd_touch_total", "Total TOUCH commands");
        let cmd_flush = counter(
            &registry,
            "lrucached_cmd_flush_total",
            "Total FLUSH_ALL commands",
        );

        let get_hits = counter(&registry, "lrucached_get_hits_total", "Total GET hits");
        let get_misses = counter(&registry, "lrucached_get_misses_total", "Total GET misses");

        let evictions = counter(
            &registry,
            "lrucached_evictions_total",
            "Live entries evicted to stay within the memory budget",
        );
        let expired_reclaimed = counter(
            &registry,
            "lrucached_expired_reclaimed_total",
            "Expired entries removed lazily, by eviction or by the sweeper",
        );
        let curr_items = gauge(&registry, "lrucached_curr_items", "Entries currently stored");
        let used_bytes = gauge(
            &registry,
            "lrucached_used_bytes",
            "Accounted size of all stored entries",
        );

        let active_connections = gauge(
            &registry,
            "lrucached_active_connections",
            "Current active connections",
        );
        let total_connections = counter(
            &registry,
            "lrucached_connections_total",
            "Total connections accepted",
        );
        let rejected_connections = counter(
            &registry,
            "lrucached_rejected_connections_total",
            "Total connections rejected",
        );

        let bytes_read = counter(&registry, "lrucached_bytes_read_total", "Total bytes read");
        let bytes_written = counter(
            &registry,
            "lrucached_bytes_written_total",
            "Total bytes written",
        );

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new("lrucached_cmd_latency_seconds", "Command latency in seconds")
                .buckets(vec![
                    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
                ]),
        )
        .expect("valid histogram options");
        registry
            .register(Box::new(cmd_latency.clone()))
            .expect("unique metric name");

        let protocol_errors = counter(
            &registry,
            "lrucached_protocol_errors_total",
            "Total protocol errors",
        );
        let storage_errors = counter(
            &registry,
            "lrucached_storage_errors_total",
            "Total failed store operations (out of memory, non-numeric value)",
        );

        Self {
            registry,
            cmd_get,
            cmd_set,
            cmd_add,
            cmd_replace,
            cmd_append,
            cmd_prepend,
            cmd_delete,
            cmd_incr,
            cmd_decr,
            cmd_touch,
            cmd_flush,
            get_hits,
            get_misses,
            evictions,
            expired_reclaimed,
            curr_items,
            used_bytes,
            active_connections,
            total_connections,
            rejected_connections,
            bytes_read,
            bytes_written,
            cmd_latency,
            protocol_errors,
            storage_errors,
        }
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRecorder for Metrics {
    #[inline]
    fn record_hit(&self) {
        self.get_hits.inc();
    }

    #[inline]
    fn record_miss(&self) {
        self.get_misses.inc();
    }

    #[inline]
    fn record_eviction(&self) {
        self.evictions.inc();
    }

    #[inline]
    fn record_expired(&self, count: usize) {
        self.expired_reclaimed.inc_by(count as u64);
    }

    #[inline]
    fn set_item_count(&self, count: usize) {
        self.curr_items.set(count as i64);
    }

    #[inline]
    fn set_used_bytes(&self, bytes: usize) {
        self.used_bytes.set(bytes as i64);
    }
}

// Metric names are static and registered once per registry, so failures here
// are programming errors.
fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter options");
    registry
        .register(Box::new(counter.clone()))
        .expect("unique metric name");
    counter
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("valid gauge options");
    registry
        .register(Box::new(gauge.clone()))
        .expect("unique metric name");
    gauge
}
