//! Observability infrastructure for the benchmark agent
//!
//! Provides:
//! - Prometheus metrics (registry size, deploy latency, outcome and error counters)
//! - Structured JSON logging of lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Deploys pull images, so buckets reach into minutes
const DEPLOY_LATENCY_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    benchmarks_registered: IntGauge,
    containers_managed: IntGauge,
    deploy_latency_seconds: Histogram,
    deployments_total: IntCounterVec,
    runtime_errors_total: IntCounterVec,
    intensity_updates_total: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            benchmarks_registered: register_int_gauge!(
                "benchmark_agent_benchmarks_registered",
                "Number of benchmarks currently held in the registry"
            )
            .expect("Failed to register benchmarks_registered"),

            containers_managed: register_int_gauge!(
                "benchmark_agent_containers_managed",
                "Number of containers tracked across all benchmarks"
            )
            .expect("Failed to register containers_managed"),

            deploy_latency_seconds: register_histogram!(
                "benchmark_agent_deploy_latency_seconds",
                "Time from image pull to the last replica started",
                DEPLOY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register deploy_latency_seconds"),

            deployments_total: register_int_counter_vec!(
                "benchmark_agent_deployments_total",
                "Finished deployments by outcome",
                &["outcome"]
            )
            .expect("Failed to register deployments_total"),

            runtime_errors_total: register_int_counter_vec!(
                "benchmark_agent_runtime_errors_total",
                "Failed container runtime calls by operation",
                &["operation"]
            )
            .expect("Failed to register runtime_errors_total"),

            intensity_updates_total: register_int_counter!(
                "benchmark_agent_intensity_updates_total",
                "Intensity updates applied to every replica of a benchmark"
            )
            .expect("Failed to register intensity_updates_total"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    inner: &'static AgentMetricsInner,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentMetrics").finish_non_exhaustive()
    }
}

impl AgentMetrics {
    /// Create a metrics handle, registering the metrics on first use
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(AgentMetricsInner::new),
        }
    }

    pub fn set_benchmarks_registered(&self, count: usize) {
        self.inner.benchmarks_registered.set(count as i64);
    }

    pub fn set_containers_managed(&self, count: usize) {
        self.inner.containers_managed.set(count as i64);
    }

    pub fn observe_deploy_latency(&self, duration_secs: f64) {
        self.inner.deploy_latency_seconds.observe(duration_secs);
    }

    /// `outcome` is `deployed` or `failed`
    pub fn inc_deployments(&self, outcome: &str) {
        self.inner
            .deployments_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_runtime_errors(&self, operation: &str) {
        self.inner
            .runtime_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn inc_intensity_updates(&self) {
        self.inner.intensity_updates_total.inc();
    }
}

/// Structured logger for benchmark lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, runtime: &str, port: u16) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            runtime = %runtime,
            port = port,
            "Benchmark agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Benchmark agent shutting down"
        );
    }

    pub fn log_benchmark_deployed(
        &self,
        benchmark: &str,
        image: &str,
        replicas: usize,
        intensity: u32,
        duration_secs: f64,
    ) {
        info!(
            event = "benchmark_deployed",
            node = %self.node_name,
            benchmark = %benchmark,
            image = %image,
            replicas = replicas,
            intensity = intensity,
            duration_secs = duration_secs,
            "Benchmark deployed"
        );
    }

    pub fn log_benchmark_failed(&self, benchmark: &str, error: &str, residual_containers: usize) {
        warn!(
            event = "benchmark_failed",
            node = %self.node_name,
            benchmark = %benchmark,
            error = %error,
            residual_containers = residual_containers,
            "Benchmark deployment failed"
        );
    }

    pub fn log_teardown(&self, benchmark: &str, removed: usize, failed: usize) {
        if failed == 0 {
            info!(
                event = "benchmark_torn_down",
                node = %self.node_name,
                benchmark = %benchmark,
                removed = removed,
                "Benchmark torn down"
            );
        } else {
            warn!(
                event = "benchmark_torn_down",
                node = %self.node_name,
                benchmark = %benchmark,
                removed = removed,
                failed = failed,
                "Benchmark torn down with containers left behind"
            );
        }
    }

    pub fn log_orphans_purged(&self, removed: usize, failed: usize) {
        info!(
            event = "orphans_purged",
            node = %self.node_name,
            removed = removed,
            failed = failed,
            "Purged containers left by a previous agent"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_shared_across_handles() {
        let metrics = AgentMetrics::new();
        let other = metrics.clone();

        metrics.set_benchmarks_registered(3);
        metrics.observe_deploy_latency(1.5);
        metrics.inc_runtime_errors("pull image");

        let before = other.inner.intensity_updates_total.get();
        metrics.inc_intensity_updates();
        assert!(other.inner.intensity_updates_total.get() > before);

        let deployed = other
            .inner
            .deployments_total
            .with_label_values(&["deployed"])
            .get();
        AgentMetrics::new().inc_deployments("deployed");
        assert!(
            other
                .inner
                .deployments_total
                .with_label_values(&["deployed"])
                .get()
                > deployed
        );
    }

    #[test]
    fn test_metrics_appear_in_default_registry() {
        let metrics = AgentMetrics::new();
        metrics.set_containers_managed(7);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "benchmark_agent_containers_managed"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
        logger.log_teardown("b", 2, 0);
        logger.log_teardown("b", 1, 1);
    }
}
