use log::trace;

/// The metrics sink. Key strings form a stable contract with the ops dashboards, so handlers interpolate
/// event labels, statuses and account paths into the exact shapes the dashboards expect.
pub trait EventRecorder: Send + Sync {
    /// Count one occurrence of `key`.
    fn record_hit(&self, key: &str);

    /// Record a numeric observation under `key` (latency, price, gap).
    fn record_outcome(&self, value: f64, key: &str);
}

/// Recorder that drops every metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl EventRecorder for NullRecorder {
    fn record_hit(&self, _key: &str) {}

    fn record_outcome(&self, _value: f64, _key: &str) {}
}

/// Recorder that forwards metrics to the log at trace level. Handy while wiring an embedder up, before a real
/// metrics sink is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn record_hit(&self, key: &str) {
        trace!("📊️ HIT {key}");
    }

    fn record_outcome(&self, value: f64, key: &str) {
        trace!("📊️ OUTCOME {key} = {value}");
    }
}
