//! Error types shared by the runtime adapters and the orchestrator

use std::time::Duration;
use thiserror::Error;

use crate::models::DeploymentState;

/// Rejections raised before any runtime call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid benchmark name '{0}': use letters, digits, '_', '.' or '-', starting with a letter or digit")]
    InvalidName(String),

    #[error("intensity {0} is out of range 0-100")]
    IntensityOutOfRange(u32),
}

/// Failures reported by a container runtime adapter
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("container {id} not found")]
    NotFound { id: String },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} failed: {reason}")]
    Api {
        operation: &'static str,
        reason: String,
    },
}

impl RuntimeError {
    pub fn api(operation: &'static str, reason: impl ToString) -> Self {
        Self::Api {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors surfaced by lifecycle operations
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Benchmark {name} already created. Please delete it before re-creating")]
    Duplicate { name: String },

    #[error("Benchmark {name} does not exist")]
    NotFound { name: String },

    #[error("Benchmark {name} has not been deployed (state {state})")]
    NotDeployed {
        name: String,
        state: DeploymentState,
    },

    #[error("Failed to deploy benchmark {name}: {source}")]
    Deploy {
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Unable to update container {container} of benchmark {name}: {source}")]
    Update {
        name: String,
        container: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to list agent-managed containers: {0}")]
    Discovery(#[source] RuntimeError),
}
