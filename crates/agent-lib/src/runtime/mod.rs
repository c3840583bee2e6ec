//! Container runtime adapters
//!
//! The orchestrator talks to the container engine only through
//! [`ContainerRuntime`]. [`DockerRuntime`] drives a local Docker daemon;
//! [`FakeRuntime`] keeps containers in memory for tests and dry runs.

mod docker;
mod fake;

pub use docker::DockerRuntime;
pub use fake::{FakeContainer, FakeRuntime};

use crate::error::RuntimeError;
use crate::planner::{ContainerPlan, CpuLimits, ImageRef};

pub use async_trait::async_trait;

/// Options for container removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    pub force: bool,
    pub remove_volumes: bool,
}

impl RemoveOptions {
    /// Kill if running and drop anonymous volumes
    pub fn force() -> Self {
        Self {
            force: true,
            remove_volumes: true,
        }
    }
}

/// Blocking, fallible primitives against a local container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the engine answers
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Pull `image` so containers can be created from it
    async fn pull_image(&self, image: &ImageRef) -> Result<(), RuntimeError>;

    /// Create a named container, returning the runtime-assigned id
    async fn create_container(&self, name: &str, plan: &ContainerPlan)
        -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Apply new CPU limits to a running container
    async fn update_container(&self, id: &str, limits: CpuLimits) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, options: RemoveOptions)
        -> Result<(), RuntimeError>;

    /// Ids of all containers, running or not, carrying `label`
    async fn list_containers(&self, label: &str) -> Result<Vec<String>, RuntimeError>;
}
