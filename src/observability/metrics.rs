use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub checkpoint_transitions_total: IntCounterVec,
    pub checkpoint_latency_seconds: HistogramVec,
    pub estimator_failures_total: IntCounter,
    pub legs_in_progress: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let checkpoint_transitions_total = IntCounterVec::new(
            Opts::new(
                "checkpoint_transitions_total",
                "Checkpoint actions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid checkpoint_transitions_total metric");

        let checkpoint_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "checkpoint_latency_seconds",
                "Latency of checkpoint actions in seconds",
            ),
            &["action"],
        )
        .expect("valid checkpoint_latency_seconds metric");

        let estimator_failures_total = IntCounter::new(
            "estimator_failures_total",
            "Legs saved without mileage because the distance estimator failed",
        )
        .expect("valid estimator_failures_total metric");

        let legs_in_progress = IntGauge::new("legs_in_progress", "Legs started but not ended")
            .expect("valid legs_in_progress metric");

        registry
            .register(Box::new(checkpoint_transitions_total.clone()))
            .expect("register checkpoint_transitions_total");
        registry
            .register(Box::new(checkpoint_latency_seconds.clone()))
            .expect("register checkpoint_latency_seconds");
        registry
            .register(Box::new(estimator_failures_total.clone()))
            .expect("register estimator_failures_total");
        registry
            .register(Box::new(legs_in_progress.clone()))
            .expect("register legs_in_progress");

        Self {
            registry,
            checkpoint_transitions_total,
            checkpoint_latency_seconds,
            estimator_failures_total,
            legs_in_progress,
        }
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
