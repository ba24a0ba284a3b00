use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Request metrics for the prediction route. Without a configured meter
/// provider the global meter is a no-op.
#[derive(Clone)]
pub struct PredictMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
}

impl PredictMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.5, 5.0,
        ];
        let duration = meter
            .f64_histogram("predict_duration_seconds")
            .with_description("Time to answer a prediction request (upload + preprocess + infer)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let requests = meter
            .u64_counter("predict_requests_total")
            .with_description("Prediction requests by outcome")
            .build();

        Self { duration, requests }
    }

    pub fn record(&self, elapsed: Duration, outcome: &'static str) {
        let attributes = [KeyValue::new("outcome", outcome)];
        self.duration.record(elapsed.as_secs_f64(), &attributes);
        self.requests.add(1, &attributes);
    }
}
