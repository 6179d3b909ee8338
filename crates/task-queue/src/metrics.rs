use prometheus::{IntGaugeVec, Opts};
use tracing::warn;

/// Per-queue job counts, labeled by `queue` and `state`. Feeds the
/// degraded/unhealthy thresholds in the worker health aggregator.
#[derive(Clone)]
pub struct TaskQueueMetrics {
    pub depth: IntGaugeVec,
}

impl TaskQueueMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let depth = IntGaugeVec::new(
            Opts::new("task_queue_depth", "Number of jobs per queue and state")
                .const_label("service", service.to_string()),
            &["queue", "state"],
        )
        .expect("valid metric opts for task_queue_depth");

        if let Err(e) = registry.register(Box::new(depth.clone())) {
            warn!("Failed to register task queue metric: {}", e);
        }

        Self { depth }
    }

    pub fn observe(&self, queue: &str, counts: &crate::QueueCounts) {
        self.depth.with_label_values(&[queue, "waiting"]).set(counts.waiting);
        self.depth.with_label_values(&[queue, "delayed"]).set(counts.delayed);
        self.depth.with_label_values(&[queue, "active"]).set(counts.active);
        self.depth.with_label_values(&[queue, "completed"]).set(counts.completed);
        self.depth.with_label_values(&[queue, "failed"]).set(counts.failed);
    }
}
