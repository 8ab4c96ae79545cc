//! Deployment state machine
//!
//! Jobs are submitted to an external cluster scheduler and polled until the
//! scheduler reports the deployment as successful, canceled or failed.
//! The scheduler is reached through the [`Scheduler`] trait; [`NomadClient`]
//! speaks the HTTP job API and tests use an in-memory implementation.

pub mod builder;
pub mod job;
pub mod nomad;
pub mod runner;

#[cfg(test)]
pub(crate) mod memory;

pub use builder::{binary_job, faucet_job, node_set_job, wallet_job};
pub use job::{Job, Resources, RestartPolicy, Task, TaskGroup};
pub use nomad::NomadClient;
pub use runner::{DeploymentError, JobRunner, RunOutcome, RunnerConfig};

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the scheduler API
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scheduler returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid job specification: {0}")]
    InvalidJob(String),
}

/// Deployment status as reported by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    Running,
    Successful,
    Canceled,
    Failed,
    Other(String),
}

impl DeploymentStatus {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "running" => DeploymentStatus::Running,
            "successful" => DeploymentStatus::Successful,
            "canceled" | "cancelled" => DeploymentStatus::Canceled,
            "failed" => DeploymentStatus::Failed,
            _ => DeploymentStatus::Other(status.to_string()),
        }
    }
}

/// Job registration and status API of a cluster scheduler
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Register (or update) a job
    async fn register(&self, job: &Job) -> Result<(), SchedulerError>;

    /// Job status such as `pending`, `running` or `dead`; `None` if unknown
    async fn job_status(&self, job_id: &str) -> Result<Option<String>, SchedulerError>;

    /// Status of the latest deployment; `None` until one exists
    async fn deployment_status(&self, job_id: &str) -> Result<Option<String>, SchedulerError>;

    /// Deregister a job; `purge` also drops its history
    async fn deregister(&self, job_id: &str, purge: bool) -> Result<(), SchedulerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deployment_status() {
        assert_eq!(DeploymentStatus::parse("running"), DeploymentStatus::Running);
        assert_eq!(DeploymentStatus::parse("successful"), DeploymentStatus::Successful);
        assert_eq!(DeploymentStatus::parse("canceled"), DeploymentStatus::Canceled);
        assert_eq!(DeploymentStatus::parse("cancelled"), DeploymentStatus::Canceled);
        assert_eq!(DeploymentStatus::parse("Failed"), DeploymentStatus::Failed);
        assert_eq!(
            DeploymentStatus::parse("paused"),
            DeploymentStatus::Other("paused".to_string())
        );
    }
}
