// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// - order command throughput and latency, labelled by outcome
// - status transitions (kitchen steps, finalize, overrides)
// - optimistic concurrency conflicts in the order store
//
// Scraped via /metrics on the metrics server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub order_commands: IntCounterVec,
    pub order_command_duration: HistogramVec,
    pub status_transitions: IntCounterVec,
    pub status_overrides: IntCounter,
    pub store_conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let order_commands = IntCounterVec::new(
            Opts::new("order_commands_total", "Order commands handled, by outcome"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(order_commands.clone()))?;

        let order_command_duration = HistogramVec::new(
            HistogramOpts::new("order_command_duration_seconds", "Order command handling duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["command"],
        )?;
        registry.register(Box::new(order_command_duration.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status changes"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let status_overrides = IntCounter::new(
            "order_status_overrides_total",
            "Administrative status overrides",
        )?;
        registry.register(Box::new(status_overrides.clone()))?;

        let store_conflicts = IntCounter::new(
            "order_store_conflicts_total",
            "Optimistic concurrency conflicts while saving orders",
        )?;
        registry.register(Box::new(store_conflicts.clone()))?;

        Ok(Self {
            registry,
            order_commands,
            order_command_duration,
            status_transitions,
            status_overrides,
            store_conflicts,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `outcome` is "ok" or an error kind label
    pub fn record_command(&self, command: &str, duration_secs: f64, outcome: &str) {
        self.order_commands.with_label_values(&[command, outcome]).inc();
        self.order_command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_override(&self) {
        self.status_overrides.inc();
    }

    pub fn record_conflict(&self) {
        self.store_conflicts.inc();
    }
}
