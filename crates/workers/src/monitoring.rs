//! Polls store, broker and task-queue health on a fixed interval and
//! aggregates them into one report, the way `db-pool::create_pool` verifies
//! its connection with a `SELECT 1` before calling itself ready.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config_core::MonitoringConfig;
use sqlx::PgPool;
use task_queue::metrics::TaskQueueMetrics;
use task_queue::{QueueCounts, TaskQueueRepository};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: Status,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: Status,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    fn aggregate(components: Vec<ComponentHealth>) -> Self {
        let status = if components.iter().any(|c| c.status == Status::Unhealthy) {
            Status::Unhealthy
        } else if components.iter().any(|c| c.status == Status::Degraded) {
            Status::Degraded
        } else {
            Status::Healthy
        };
        Self { status, components }
    }
}

/// Probes the stream broker. `commerce-server` supplies a real
/// implementation over its Redis connection; tests use
/// [`AlwaysHealthyBroker`].
#[async_trait]
pub trait BrokerProbe: Send + Sync {
    async fn check(&self) -> anyhow::Result<()>;
}

pub struct AlwaysHealthyBroker;

#[async_trait]
impl BrokerProbe for AlwaysHealthyBroker {
    async fn check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct HealthMonitor<Q: TaskQueueRepository, B: BrokerProbe> {
    pool: PgPool,
    queue: Arc<Q>,
    broker: Arc<B>,
    metrics: TaskQueueMetrics,
    queues: Vec<String>,
    config: MonitoringConfig,
}

impl<Q: TaskQueueRepository, B: BrokerProbe> HealthMonitor<Q, B> {
    pub fn new(pool: PgPool, queue: Arc<Q>, broker: Arc<B>, service_name: &str, queues: Vec<String>, config: MonitoringConfig) -> Self {
        Self {
            pool,
            queue,
            broker,
            metrics: TaskQueueMetrics::new(service_name),
            queues,
            config,
        }
    }

    pub async fn check_once(&self) -> HealthReport {
        let mut components = Vec::with_capacity(2 + self.queues.len());

        components.push(self.check_store().await);
        components.push(self.check_broker().await);

        for queue in &self.queues {
            components.push(self.check_queue(queue).await);
        }

        HealthReport::aggregate(components)
    }

    async fn check_store(&self) -> ComponentHealth {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => ComponentHealth {
                name: "store",
                status: Status::Healthy,
                reason: None,
            },
            Err(e) => ComponentHealth {
                name: "store",
                status: Status::Unhealthy,
                reason: Some(e.to_string()),
            },
        }
    }

    async fn check_broker(&self) -> ComponentHealth {
        match self.broker.check().await {
            Ok(()) => ComponentHealth {
                name: "broker",
                status: Status::Healthy,
                reason: None,
            },
            Err(e) => ComponentHealth {
                name: "broker",
                status: Status::Unhealthy,
                reason: Some(e.to_string()),
            },
        }
    }

    async fn check_queue(&self, queue: &str) -> ComponentHealth {
        match self.queue.queue_counts(queue).await {
            Ok(counts) => {
                self.metrics.observe(queue, &counts);
                if let Some(reason) = self.degraded_reason(&counts) {
                    ComponentHealth {
                        name: "queue",
                        status: Status::Degraded,
                        reason: Some(format!("{queue}: {reason}")),
                    }
                } else {
                    ComponentHealth {
                        name: "queue",
                        status: Status::Healthy,
                        reason: None,
                    }
                }
            }
            Err(e) => ComponentHealth {
                name: "queue",
                status: Status::Unhealthy,
                reason: Some(format!("{queue}: {e}")),
            },
        }
    }

    fn degraded_reason(&self, counts: &QueueCounts) -> Option<String> {
        if counts.waiting > self.config.warn_waiting {
            Some(format!("waiting={} exceeds {}", counts.waiting, self.config.warn_waiting))
        } else if counts.failed > self.config.warn_failed {
            Some(format!("failed={} exceeds {}", counts.failed, self.config.warn_failed))
        } else if counts.delayed > self.config.warn_delayed {
            Some(format!("delayed={} exceeds {}", counts.delayed, self.config.warn_delayed))
        } else {
            None
        }
    }

    /// Runs forever, logging the aggregate status every `poll_ms`, until
    /// `shutdown` is cancelled.
    pub async fn run_forever(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            let report = self.check_once().await;
            match report.status {
                Status::Healthy => tracing::debug!("worker health: healthy"),
                Status::Degraded => {
                    tracing::warn!(components = ?report.components, "worker health: degraded")
                }
                Status::Unhealthy => {
                    tracing::error!(components = ?report.components, "worker health: unhealthy")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_takes_the_worst_status() {
        let report = HealthReport::aggregate(vec![
            ComponentHealth { name: "store", status: Status::Healthy, reason: None },
            ComponentHealth { name: "queue", status: Status::Degraded, reason: Some("waiting=200".into()) },
        ]);
        assert_eq!(report.status, Status::Degraded);
    }

    #[test]
    fn unhealthy_dominates_degraded() {
        let report = HealthReport::aggregate(vec![
            ComponentHealth { name: "queue", status: Status::Degraded, reason: None },
            ComponentHealth { name: "store", status: Status::Unhealthy, reason: Some("connection refused".into()) },
        ]);
        assert_eq!(report.status, Status::Unhealthy);
    }
}
