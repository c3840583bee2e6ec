//! Agent library for containerized benchmark workloads
//!
//! This crate provides the core functionality for:
//! - Benchmark specifications and deployment records
//! - Planning container configurations from a specification
//! - Driving a container runtime (Docker, or in memory)
//! - Deploy, intensity update and teardown orchestration
//! - Health checks and observability

pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod runtime;

pub use error::{OrchestratorError, RuntimeError, ValidationError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use orchestrator::{
    BulkTeardownReport, ContainerFailure, CreateOutcome, DeleteOutcome, DeployMode, Orchestrator,
    OrchestratorBuilder, OrchestratorConfig, PurgeReport, TeardownReport,
};
pub use registry::BenchmarkRegistry;
pub use runtime::{ContainerRuntime, DockerRuntime, FakeRuntime};
