//! In-memory container runtime
//!
//! Backs the agent's dry-run mode and the test suites. Failures can be
//! injected per image or per container name, and an optional latency makes
//! every call suspend so concurrent behaviour can be observed.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{ContainerRuntime, RemoveOptions};
use crate::error::RuntimeError;
use crate::planner::{ContainerPlan, CpuLimits, ImageRef};

/// A container held by [`FakeRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub cpu_limits: Option<CpuLimits>,
    pub running: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    /// id -> container
    containers: BTreeMap<String, FakeContainer>,
    images: BTreeSet<String>,
    next_id: u64,
    unreachable: bool,
    fail_pull: HashSet<String>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_update: HashSet<String>,
    fail_remove: HashSet<String>,
    update_calls: usize,
}

impl FakeState {
    fn name_of(&self, id: &str) -> Result<String, RuntimeError> {
        self.containers
            .get(id)
            .map(|c| c.name.clone())
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })
    }
}

/// Container runtime that never leaves the process
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    latency: Option<Duration>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend for `latency` at the start of every runtime call
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::default(),
            latency: Some(latency),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Make pulls of `image` (`repo:tag`) fail
    pub fn fail_pull(&self, image: &str) {
        self.state().fail_pull.insert(image.to_string());
    }

    /// Make creation of the container called `name` fail
    pub fn fail_create(&self, name: &str) {
        self.state().fail_create.insert(name.to_string());
    }

    pub fn fail_start(&self, name: &str) {
        self.state().fail_start.insert(name.to_string());
    }

    pub fn fail_update(&self, name: &str) {
        self.state().fail_update.insert(name.to_string());
    }

    pub fn fail_remove(&self, name: &str) {
        self.state().fail_remove.insert(name.to_string());
    }

    /// Let removal of `name` succeed again
    pub fn heal_remove(&self, name: &str) {
        self.state().fail_remove.remove(name);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    /// Insert a container as if an earlier agent process had left it behind
    pub fn seed_container(&self, name: &str, labels: BTreeMap<String, String>) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("fake-{:012}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                image: "seeded:latest".to_string(),
                command: Vec::new(),
                labels,
                cpu_limits: None,
                running: true,
            },
        );
        id
    }

    /// Snapshot of every live container, ordered by id
    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state().containers.values().cloned().collect()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.state().images.iter().cloned().collect()
    }

    /// Number of `update_container` calls received, failed ones included
    pub fn update_calls(&self) -> usize {
        self.state().update_calls
    }

    fn check_reachable(&self) -> Result<(), RuntimeError> {
        if self.state().unreachable {
            return Err(RuntimeError::Unavailable("fake runtime unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.check_reachable()
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        self.delay().await;
        self.check_reachable()?;

        let reference = image.to_string();
        let mut state = self.state();
        if state.fail_pull.contains(&reference) {
            return Err(RuntimeError::api(
                "pull image",
                format!("manifest for {} not found", reference),
            ));
        }
        state.images.insert(reference);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        plan: &ContainerPlan,
    ) -> Result<String, RuntimeError> {
        self.delay().await;
        self.check_reachable()?;

        let mut state = self.state();
        if state.fail_create.contains(name) {
            return Err(RuntimeError::api("create container", "injected failure"));
        }
        if state.containers.values().any(|c| c.name == name) {
            return Err(RuntimeError::api(
                "create container",
                format!("container name \"/{}\" is already in use", name),
            ));
        }

        state.next_id += 1;
        let id = format!("fake-{:012}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                image: plan.image.to_string(),
                command: plan.command.clone(),
                labels: plan.labels.clone(),
                cpu_limits: plan.cpu_limits,
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.delay().await;
        self.check_reachable()?;

        let mut state = self.state();
        let name = state.name_of(id)?;
        if state.fail_start.contains(&name) {
            return Err(RuntimeError::api("start container", "injected failure"));
        }
        if let Some(container) = state.containers.get_mut(id) {
            container.running = true;
        }
        Ok(())
    }

    async fn update_container(&self, id: &str, limits: CpuLimits) -> Result<(), RuntimeError> {
        self.delay().await;
        self.check_reachable()?;

        let mut state = self.state();
        state.update_calls += 1;
        let name = state.name_of(id)?;
        if state.fail_update.contains(&name) {
            return Err(RuntimeError::api("update container", "injected failure"));
        }
        if let Some(container) = state.containers.get_mut(id) {
            container.cpu_limits = Some(limits);
        }
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        self.delay().await;
        self.check_reachable()?;

        let mut state = self.state();
        let name = state.name_of(id)?;
        if state.fail_remove.contains(&name) {
            return Err(RuntimeError::api("remove container", "injected failure"));
        }
        let running = state.containers.get(id).map(|c| c.running).unwrap_or(false);
        if running && !options.force {
            return Err(RuntimeError::api(
                "remove container",
                format!("container {} is running", id),
            ));
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<String>, RuntimeError> {
        self.check_reachable()?;

        Ok(self
            .state()
            .containers
            .values()
            .filter(|c| c.labels.contains_key(label))
            .map(|c| c.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkSpec, CommandSpec, MARKER_LABEL};
    use crate::planner::plan;

    fn test_plan() -> ContainerPlan {
        plan(&BenchmarkSpec {
            name: "b".to_string(),
            image: "busybox".to_string(),
            command: CommandSpec::default(),
            count: 1,
            intensity: 10,
            cgroup_config: None,
            net_config: None,
            target_host_config: None,
            duration_config: None,
        })
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let runtime = FakeRuntime::new();
        let id = runtime.create_container("b1", &test_plan()).await.unwrap();
        assert!(!runtime.container("b1").unwrap().running);

        runtime.start_container(&id).await.unwrap();
        assert!(runtime.container("b1").unwrap().running);

        runtime
            .update_container(&id, CpuLimits::for_intensity(20))
            .await
            .unwrap();
        assert_eq!(runtime.container("b1").unwrap().cpu_limits.unwrap().quota, 20_000);

        // Running containers need force
        let soft = RemoveOptions {
            force: false,
            remove_volumes: true,
        };
        assert!(runtime.remove_container(&id, soft).await.is_err());
        runtime.remove_container(&id, RemoveOptions::force()).await.unwrap();
        assert!(runtime.containers().is_empty());

        let err = runtime
            .remove_container(&id, RemoveOptions::force())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let runtime = FakeRuntime::new();
        runtime.create_container("b1", &test_plan()).await.unwrap();
        assert!(runtime.create_container("b1", &test_plan()).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_label() {
        let runtime = FakeRuntime::new();
        runtime.create_container("b1", &test_plan()).await.unwrap();
        runtime.seed_container("stranger", BTreeMap::new());

        let ids = runtime.list_containers(MARKER_LABEL).await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let runtime = FakeRuntime::new();
        runtime.set_reachable(false);
        assert!(matches!(
            runtime.ping().await,
            Err(RuntimeError::Unavailable(_))
        ));
        runtime.set_reachable(true);
        assert!(runtime.ping().await.is_ok());
    }
}
