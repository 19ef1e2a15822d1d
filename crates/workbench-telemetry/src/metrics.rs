//! Prometheus metrics for the tool bus.
//!
//! All metrics follow the naming convention: `<namespace>_bus_<metric>_<unit>`
//!
//! Each bus owns its own [`Registry`], so two buses in one process (or two
//! tests running in parallel) never share counters.

use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

/// Counters and gauges describing bus activity.
#[derive(Clone)]
pub struct BusMetrics {
    registry: Registry,

    /// Messages handed to `dispatch`
    pub messages_dispatched: IntCounter,

    /// Subscriber callbacks that completed without error
    pub handler_invocations: IntCounter,

    /// Subscriber callbacks that returned an error or panicked
    pub subscriber_errors: IntCounter,

    /// Messages filed into the dead-letter queue, by reason
    pub dead_lettered: IntCounterVec,

    /// Bus-level delivery retries scheduled
    pub delivery_retries: IntCounter,

    /// Messages accepted without a strict schema
    pub unknown_schema: IntCounter,

    /// Tools currently registered as active
    pub active_tools: IntGauge,

    /// Time spent in one synchronous delivery pass
    pub delivery_duration: Histogram,
}

impl BusMetrics {
    /// Create and register every bus metric under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let name = |metric: &str| format!("{namespace}_bus_{metric}");

        let messages_dispatched = IntCounter::new(
            name("messages_dispatched_total"),
            "Total messages handed to the dispatcher",
        )
        .map_err(init_err)?;

        let handler_invocations = IntCounter::new(
            name("handler_invocations_total"),
            "Subscriber callbacks completed successfully",
        )
        .map_err(init_err)?;

        let subscriber_errors = IntCounter::new(
            name("subscriber_errors_total"),
            "Subscriber callbacks that failed or panicked",
        )
        .map_err(init_err)?;

        let dead_lettered = IntCounterVec::new(
            Opts::new(name("dead_lettered_total"), "Messages moved to the dead-letter queue"),
            &["reason"], // reason: validation/unauthorized/delivery_exhausted
        )
        .map_err(init_err)?;

        let delivery_retries = IntCounter::new(
            name("delivery_retries_total"),
            "Bus-level delivery retries scheduled",
        )
        .map_err(init_err)?;

        let unknown_schema = IntCounter::new(
            name("unknown_schema_total"),
            "Messages accepted with only the generic envelope check",
        )
        .map_err(init_err)?;

        let active_tools = IntGauge::new(name("active_tools"), "Tools currently mounted")
            .map_err(init_err)?;

        let delivery_duration = Histogram::with_opts(
            HistogramOpts::new(
                name("delivery_duration_seconds"),
                "Time spent delivering one message to its subscribers",
            )
            .buckets(exponential_buckets(0.000_01, 2.0, 14).map_err(init_err)?),
        )
        .map_err(init_err)?;

        registry.register(Box::new(messages_dispatched.clone())).map_err(init_err)?;
        registry.register(Box::new(handler_invocations.clone())).map_err(init_err)?;
        registry.register(Box::new(subscriber_errors.clone())).map_err(init_err)?;
        registry.register(Box::new(dead_lettered.clone())).map_err(init_err)?;
        registry.register(Box::new(delivery_retries.clone())).map_err(init_err)?;
        registry.register(Box::new(unknown_schema.clone())).map_err(init_err)?;
        registry.register(Box::new(active_tools.clone())).map_err(init_err)?;
        registry.register(Box::new(delivery_duration.clone())).map_err(init_err)?;

        Ok(Self {
            registry,
            messages_dispatched,
            handler_invocations,
            subscriber_errors,
            dead_lettered,
            delivery_retries,
            unknown_schema,
            active_tools,
            delivery_duration,
        })
    }

    /// Count one dead-lettered message.
    pub fn record_dead_letter(&self, reason: &str) {
        self.dead_lettered.with_label_values(&[reason]).inc();
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(init_err)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

fn init_err(e: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsInit(e.to_string())
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        let a = BusMetrics::new("wb").unwrap();
        let b = BusMetrics::new("wb").unwrap();

        a.messages_dispatched.inc();
        assert_eq!(a.messages_dispatched.get(), 1);
        assert_eq!(b.messages_dispatched.get(), 0);
    }

    #[test]
    fn test_dead_letter_labels() {
        let metrics = BusMetrics::new("wb").unwrap();
        metrics.record_dead_letter("validation");
        metrics.record_dead_letter("validation");
        metrics.record_dead_letter("unauthorized");

        assert_eq!(metrics.dead_lettered.with_label_values(&["validation"]).get(), 2);
        assert_eq!(metrics.dead_lettered.with_label_values(&["unauthorized"]).get(), 1);
    }

    #[test]
    fn test_encode_contains_namespace() {
        let metrics = BusMetrics::new("wb").unwrap();
        metrics.messages_dispatched.inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("wb_bus_messages_dispatched_total 1"));
    }

    #[test]
    fn test_histogram_timer() {
        let metrics = BusMetrics::new("wb").unwrap();
        {
            let _timer = time_histogram!(metrics.delivery_duration);
        }
        assert_eq!(metrics.delivery_duration.get_sample_count(), 1);
    }
}
