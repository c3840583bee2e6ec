//! Benchmark lifecycle orchestration
//!
//! Drives create, deploy, intensity update and teardown against a
//! [`ContainerRuntime`], keeping the [`BenchmarkRegistry`] in step with what
//! actually exists on the host. All mutations of one benchmark serialize
//! through its [`OperationGuard`].

mod builder;


pub use builder::{DeployMode, OrchestratorBuilder, OrchestratorConfig};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, RuntimeError};
use crate::models::{
    replica_name, validate_intensity, BenchmarkSpec, DeploymentRecord, DeploymentState,
    MARKER_LABEL,
};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::planner::{self, CpuLimits, ImageRef};
use crate::registry::{BenchmarkRegistry, OperationGuard};
use crate::runtime::{ContainerRuntime, RemoveOptions};

/// Result of a successful `create`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Every replica is running
    Deployed,
    /// Deployment continues in the background; poll the status
    Accepted,
}

/// A container that could not be removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFailure {
    pub container: String,
    pub container_id: String,
    pub error: String,
}

/// Outcome of removing every recorded container of one benchmark
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub removed: usize,
    pub failed: Vec<ContainerFailure>,
}

impl TeardownReport {
    /// True when no container of the benchmark remains
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a successful `delete`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A failed deployment was dropped from the registry
    Discarded,
    TornDown(TeardownReport),
}

/// Outcome of tearing down every registered benchmark
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkTeardownReport {
    /// Benchmarks fully removed and evicted
    pub removed: Vec<String>,
    /// Benchmarks kept in the registry because containers remain
    pub residual: BTreeMap<String, Vec<ContainerFailure>>,
}

impl BulkTeardownReport {
    pub fn is_complete(&self) -> bool {
        self.residual.is_empty()
    }
}

/// Outcome of the sweep for containers left by an earlier agent process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

/// Lifecycle controller shared by every request handler
#[derive(Clone)]
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    registry: BenchmarkRegistry,
    config: OrchestratorConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: BenchmarkRegistry,
        config: OrchestratorConfig,
        metrics: AgentMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            runtime,
            registry,
            config,
            metrics,
            logger,
        }
    }

    pub fn registry(&self) -> &BenchmarkRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate, reserve the name and deploy `spec`.
    ///
    /// Validation and duplicate errors leave no trace. In synchronous mode
    /// a deploy error is returned as well as recorded; in background mode
    /// the deploy runs on its own task and only the record reflects it.
    pub async fn create(&self, spec: BenchmarkSpec) -> Result<CreateOutcome, OrchestratorError> {
        spec.validate()?;

        let name = spec.name.clone();
        let guard = self
            .registry
            .try_reserve(spec.clone())
            .await
            .ok_or_else(|| OrchestratorError::Duplicate { name: name.clone() })?;
        self.refresh_gauges().await;

        info!(
            benchmark = %name,
            image = %spec.image,
            replicas = spec.replica_count(),
            intensity = spec.intensity,
            mode = ?self.config.deploy_mode,
            "Benchmark accepted"
        );

        match self.config.deploy_mode {
            DeployMode::Sync => {
                // The deploy outlives a dropped caller so the record still ends terminal
                let this = self.clone();
                tokio::spawn(async move { this.deploy(spec, guard).await })
                    .await
                    .map_err(|e| OrchestratorError::Deploy {
                        name,
                        source: RuntimeError::api("deploy", e),
                    })??;
                Ok(CreateOutcome::Deployed)
            }
            DeployMode::Background => {
                let this = self.clone();
                tokio::spawn(async move {
                    // Failure is already on the record
                    let _ = this.deploy(spec, guard).await;
                });
                Ok(CreateOutcome::Accepted)
            }
        }
    }

    /// Deploy a reserved benchmark, moving its record to a terminal state
    async fn deploy(
        &self,
        spec: BenchmarkSpec,
        guard: OperationGuard,
    ) -> Result<(), OrchestratorError> {
        let started = Instant::now();
        let name = spec.name.clone();

        match self.start_replicas(&spec, &guard).await {
            Ok(replicas) => {
                self.registry
                    .set_state(&name, DeploymentState::Deployed, None)
                    .await;

                let elapsed = started.elapsed().as_secs_f64();
                self.metrics.observe_deploy_latency(elapsed);
                self.metrics.inc_deployments("deployed");
                self.logger.log_benchmark_deployed(
                    &name,
                    &spec.image,
                    replicas,
                    spec.intensity,
                    elapsed,
                );
                self.refresh_gauges().await;
                Ok(())
            }
            Err(source) => {
                self.registry
                    .set_state(&name, DeploymentState::Failed, Some(source.to_string()))
                    .await;

                let residual = self
                    .registry
                    .get(&name)
                    .await
                    .map(|record| record.name_to_id.len())
                    .unwrap_or(0);
                self.metrics.inc_deployments("failed");
                self.logger
                    .log_benchmark_failed(&name, &source.to_string(), residual);
                self.refresh_gauges().await;
                Err(OrchestratorError::Deploy { name, source })
            }
        }
    }

    /// Pull, then create and start every replica in order.
    ///
    /// On a replica failure the containers created so far are removed before
    /// the error is returned.
    async fn start_replicas(
        &self,
        spec: &BenchmarkSpec,
        guard: &OperationGuard,
    ) -> Result<usize, RuntimeError> {
        let name = spec.name.as_str();
        let image = ImageRef::parse(&spec.image);

        debug!(benchmark = %name, image = %image, "Pulling image");
        self.bounded(
            "pull image",
            self.config.pull_timeout,
            self.runtime.pull_image(&image),
        )
        .await
        .map_err(|e| {
            error!(benchmark = %name, image = %image, error = %e, "Image pull failed");
            e
        })?;

        let plan = planner::plan(spec);
        self.registry
            .set_state(name, DeploymentState::Deploying, None)
            .await;

        let replicas = spec.replica_count();
        for index in 1..=replicas {
            let container = replica_name(name, index);

            let id = match self
                .bounded(
                    "create container",
                    self.config.runtime_timeout,
                    self.runtime.create_container(&container, &plan),
                )
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    error!(benchmark = %name, container = %container, error = %e, "Container create failed");
                    self.remove_all(name, guard).await;
                    return Err(e);
                }
            };
            self.registry.record_container(name, &container, &id).await;

            if let Err(e) = self
                .bounded(
                    "start container",
                    self.config.runtime_timeout,
                    self.runtime.start_container(&id),
                )
                .await
            {
                error!(
                    benchmark = %name,
                    container = %container,
                    container_id = %id,
                    error = %e,
                    "Container start failed"
                );
                self.remove_all(name, guard).await;
                return Err(e);
            }

            debug!(benchmark = %name, container = %container, container_id = %id, "Replica started");
        }

        Ok(replicas as usize)
    }

    /// Force-remove every recorded container of `name`.
    ///
    /// Individual failures are reported, never fatal. A container the
    /// runtime no longer knows counts as removed. The caller must hold the
    /// operation guard of `name`.
    pub async fn remove_all(&self, name: &str, _guard: &OperationGuard) -> TeardownReport {
        let mut report = TeardownReport::default();
        let Some(record) = self.registry.get(name).await else {
            return report;
        };

        for (container, id) in record.name_to_id {
            let result = self
                .bounded(
                    "remove container",
                    self.config.runtime_timeout,
                    self.runtime.remove_container(&id, RemoveOptions::force()),
                )
                .await;

            match result {
                Ok(()) => {
                    self.registry.forget_container(name, &container).await;
                    report.removed += 1;
                }
                Err(e) if e.is_not_found() => {
                    debug!(benchmark = %name, container = %container, "Container already gone");
                    self.registry.forget_container(name, &container).await;
                    report.removed += 1;
                }
                Err(e) => {
                    error!(
                        benchmark = %name,
                        container = %container,
                        container_id = %id,
                        error = %e,
                        "Container removal failed"
                    );
                    report.failed.push(ContainerFailure {
                        container,
                        container_id: id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.refresh_gauges().await;
        report
    }

    /// Apply a new intensity to every replica of a deployed benchmark.
    ///
    /// Replicas are updated in order and the first failure aborts the
    /// update; replicas already updated keep the new limits.
    pub async fn update_intensity(
        &self,
        name: &str,
        intensity: u32,
    ) -> Result<(), OrchestratorError> {
        validate_intensity(intensity)?;
        self.require_deployed(name).await?;

        let _guard = self
            .registry
            .lock(name)
            .await
            .ok_or_else(|| Self::not_found(name))?;
        // State may have moved while waiting for the guard
        let record = self.require_deployed(name).await?;

        let limits = CpuLimits::for_intensity(intensity);
        for container in record.replica_names() {
            let Some(id) = record.name_to_id.get(&container) else {
                warn!(benchmark = %name, container = %container, "Replica has no recorded container");
                continue;
            };

            self.bounded(
                "update container",
                self.config.runtime_timeout,
                self.runtime.update_container(id, limits),
            )
            .await
            .map_err(|source| {
                error!(
                    benchmark = %name,
                    container = %container,
                    container_id = %id,
                    error = %source,
                    "Intensity update failed"
                );
                OrchestratorError::Update {
                    name: name.to_string(),
                    container: container.clone(),
                    source,
                }
            })?;
        }

        self.registry.set_intensity(name, intensity).await;
        self.metrics.inc_intensity_updates();
        info!(
            benchmark = %name,
            intensity = intensity,
            cpu_quota = limits.quota,
            cpu_period = limits.period,
            "Intensity updated"
        );
        Ok(())
    }

    /// Tear down `name` and drop it from the registry.
    ///
    /// Waits for an in-flight deploy of the same name to finish first. The
    /// record is removed even when some containers could not be; the report
    /// lists them.
    pub async fn delete(&self, name: &str) -> Result<DeleteOutcome, OrchestratorError> {
        let guard = self
            .registry
            .lock(name)
            .await
            .ok_or_else(|| Self::not_found(name))?;
        let record = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| Self::not_found(name))?;

        if record.state == DeploymentState::Failed {
            self.registry.remove(name).await;
            self.refresh_gauges().await;
            info!(benchmark = %name, "Discarded failed benchmark");
            return Ok(DeleteOutcome::Discarded);
        }

        let report = self.remove_all(name, &guard).await;
        self.registry.remove(name).await;
        drop(guard);

        self.logger
            .log_teardown(name, report.removed, report.failed.len());
        self.refresh_gauges().await;
        Ok(DeleteOutcome::TornDown(report))
    }

    /// Tear down every registered benchmark.
    ///
    /// A benchmark is evicted only when all of its containers are gone;
    /// the others stay registered and are listed as residual.
    pub async fn delete_all(&self) -> BulkTeardownReport {
        let mut bulk = BulkTeardownReport::default();

        for name in self.registry.names().await {
            let Some(guard) = self.registry.lock(&name).await else {
                continue;
            };

            let report = self.remove_all(&name, &guard).await;
            self.logger
                .log_teardown(&name, report.removed, report.failed.len());
            if report.is_complete() {
                self.registry.remove(&name).await;
                bulk.removed.push(name);
            } else {
                bulk.residual.insert(name, report.failed);
            }
        }

        self.refresh_gauges().await;
        if !bulk.is_complete() {
            warn!(
                residual = bulk.residual.len(),
                "Bulk teardown left benchmarks with containers"
            );
        }
        bulk
    }

    /// Remove marker-labelled containers the registry does not know about
    pub async fn purge_orphans(&self) -> Result<PurgeReport, OrchestratorError> {
        let ids = self
            .bounded(
                "list containers",
                self.config.runtime_timeout,
                self.runtime.list_containers(MARKER_LABEL),
            )
            .await
            .map_err(OrchestratorError::Discovery)?;

        let known: BTreeSet<String> = self
            .registry
            .list_all()
            .await
            .into_values()
            .flat_map(|record| record.name_to_id.into_values())
            .collect();

        let mut report = PurgeReport::default();
        for id in ids.into_iter().filter(|id| !known.contains(id)) {
            let result = self
                .bounded(
                    "remove container",
                    self.config.runtime_timeout,
                    self.runtime.remove_container(&id, RemoveOptions::force()),
                )
                .await;

            match result {
                Ok(()) => report.removed += 1,
                Err(e) if e.is_not_found() => report.removed += 1,
                Err(e) => {
                    warn!(container_id = %id, error = %e, "Failed to remove orphaned container");
                    report.failed += 1;
                }
            }
        }

        self.logger
            .log_orphans_purged(report.removed, report.failed);
        Ok(report)
    }

    /// Current record of `name`; a `FAILED` record is returned once, then forgotten
    pub async fn status(&self, name: &str) -> Option<DeploymentRecord> {
        let record = self.registry.observe(name).await;
        if matches!(&record, Some(r) if r.state == DeploymentState::Failed) {
            self.refresh_gauges().await;
        }
        record
    }

    pub async fn list(&self) -> BTreeMap<String, DeploymentRecord> {
        self.registry.list_all().await
    }

    /// Record of `name` if it exists and is `DEPLOYED`
    pub async fn require_deployed(
        &self,
        name: &str,
    ) -> Result<DeploymentRecord, OrchestratorError> {
        let record = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| Self::not_found(name))?;
        if record.state != DeploymentState::Deployed {
            return Err(OrchestratorError::NotDeployed {
                name: name.to_string(),
                state: record.state,
            });
        }
        Ok(record)
    }

    fn not_found(name: &str) -> OrchestratorError {
        OrchestratorError::NotFound {
            name: name.to_string(),
        }
    }

    /// Run a runtime call under `limit`, counting failures
    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        limit: Duration,
        call: F,
    ) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, RuntimeError>>,
    {
        let result = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout {
                operation,
                after: limit,
            }),
        };

        if let Err(e) = &result {
            if !e.is_not_found() {
                self.metrics.inc_runtime_errors(operation);
            }
        }
        result
    }

    async fn refresh_gauges(&self) {
        self.metrics
            .set_benchmarks_registered(self.registry.len().await);
        self.metrics
            .set_containers_managed(self.registry.container_count().await);
    }
}
