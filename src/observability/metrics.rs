use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub releases_total: IntCounterVec,
    pub couriers_freed_total: IntCounter,
    pub sweeps_total: IntCounterVec,
    pub operation_latency_seconds: HistogramVec,
    pub order_events_in_queue: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let releases_total = IntCounterVec::new(
            Opts::new(
                "releases_total",
                "Total courier releases by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid releases_total metric");

        let couriers_freed_total = IntCounter::new(
            "couriers_freed_total",
            "Couriers released by the expiry sweep",
        )
        .expect("valid couriers_freed_total metric");

        let sweeps_total = IntCounterVec::new(
            Opts::new("sweeps_total", "Expiry sweep runs by outcome"),
            &["outcome"],
        )
        .expect("valid sweeps_total metric");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Latency of engine operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid operation_latency_seconds metric");

        let order_events_in_queue = IntGauge::new(
            "order_events_in_queue",
            "Order status events waiting to be consumed",
        )
        .expect("valid order_events_in_queue metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(releases_total.clone()))
            .expect("register releases_total");
        registry
            .register(Box::new(couriers_freed_total.clone()))
            .expect("register couriers_freed_total");
        registry
            .register(Box::new(sweeps_total.clone()))
            .expect("register sweeps_total");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("register operation_latency_seconds");
        registry
            .register(Box::new(order_events_in_queue.clone()))
            .expect("register order_events_in_queue");

        Self {
            registry,
            assignments_total,
            releases_total,
            couriers_freed_total,
            sweeps_total,
            operation_latency_seconds,
            order_events_in_queue,
        }
    }

    pub fn observe_latency(&self, operation: &str, seconds: f64) {
        self.operation_latency_seconds
            .with_label_values(&[operation])
            .observe(seconds);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}
