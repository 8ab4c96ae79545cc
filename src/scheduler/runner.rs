//! Job submission and deployment tracking

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DeploymentStatus, Job, Scheduler, SchedulerError};
use crate::error::MultiError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Errors that can occur while deploying a job
#[derive(Error, Debug)]
pub enum DeploymentError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Deployment of job '{job_id}' was canceled")]
    Canceled { job_id: String },

    #[error("Deployment of job '{job_id}' failed")]
    Failed { job_id: String },

    #[error("Deployment of job '{job_id}' did not finish within {timeout:?}")]
    Timeout { job_id: String, timeout: Duration },

    #[error("Stopped waiting for job '{job_id}'")]
    Interrupted { job_id: String },
}

impl DeploymentError {
    /// Id of the job the error is about, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            DeploymentError::Scheduler(_) => None,
            DeploymentError::Canceled { job_id }
            | DeploymentError::Failed { job_id }
            | DeploymentError::Timeout { job_id, .. }
            | DeploymentError::Interrupted { job_id } => Some(job_id),
        }
    }
}

/// Polling behaviour of [`JobRunner::run_and_wait`]
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    /// Treat an expired wait as success instead of failing
    pub assume_success_on_timeout: bool,
    /// Stop waiting as soon as a deployment reports `failed` instead of
    /// polling on until it settles or the wait times out
    pub fail_on_failed_deployment: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            assume_success_on_timeout: false,
            fail_on_failed_deployment: false,
        }
    }
}

/// Result of [`JobRunner::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AlreadyRunning,
    Submitted,
}

#[derive(Clone)]
pub struct JobRunner {
    scheduler: Arc<dyn Scheduler>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Register a job unless the scheduler already reports it running
    pub async fn run(&self, job: &Job) -> Result<RunOutcome, DeploymentError> {
        let status = self.scheduler.job_status(&job.id).await?;
        if status.as_deref() == Some("running") {
            info!("Job '{}' is already running", job.id);
            return Ok(RunOutcome::AlreadyRunning);
        }

        self.scheduler.register(job).await?;
        info!("Submitted job '{}'", job.id);
        Ok(RunOutcome::Submitted)
    }

    /// Register a job and block until its deployment settles
    pub async fn run_and_wait(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<(), DeploymentError> {
        self.scheduler.register(job).await?;
        info!("Submitted job '{}', waiting for deployment", job.id);
        self.wait_for_deployment(&job.id, cancel).await
    }

    /// Poll the deployment status of `job_id` until it is terminal.
    ///
    /// `successful` and `canceled` always end the wait. `failed` only does
    /// when [`RunnerConfig::fail_on_failed_deployment`] is set, otherwise it
    /// is polled like any other pending status.
    ///
    /// Scheduler errors are returned immediately; retrying is left to the
    /// caller.
    pub async fn wait_for_deployment(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DeploymentError> {
        let deadline = Instant::now() + self.config.wait_timeout;

        loop {
            let status = self.scheduler.deployment_status(job_id).await?;
            match status.as_deref().map(DeploymentStatus::parse) {
                Some(DeploymentStatus::Successful) => {
                    info!("Deployment of job '{}' successful", job_id);
                    return Ok(());
                }
                Some(DeploymentStatus::Canceled) => {
                    return Err(DeploymentError::Canceled {
                        job_id: job_id.to_string(),
                    });
                }
                Some(DeploymentStatus::Failed) if self.config.fail_on_failed_deployment => {
                    return Err(DeploymentError::Failed {
                        job_id: job_id.to_string(),
                    });
                }
                other => debug!("Job '{}' deployment status: {:?}", job_id, other),
            }

            let now = Instant::now();
            if now >= deadline {
                if self.config.assume_success_on_timeout {
                    warn!(
                        "Deployment of job '{}' still pending after {:?}, assuming success",
                        job_id, self.config.wait_timeout
                    );
                    return Ok(());
                }
                return Err(DeploymentError::Timeout {
                    job_id: job_id.to_string(),
                    timeout: self.config.wait_timeout,
                });
            }

            let next = (now + self.config.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DeploymentError::Interrupted {
                        job_id: job_id.to_string(),
                    });
                }
                _ = sleep_until(next) => {}
            }
        }
    }

    /// Run a job and, when it was newly submitted, wait for its deployment
    pub async fn deploy(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, DeploymentError> {
        let outcome = self.run(job).await?;
        if outcome == RunOutcome::Submitted {
            self.wait_for_deployment(&job.id, cancel).await?;
        }
        Ok(outcome)
    }

    /// Deploy several jobs concurrently; the first failure wins
    pub async fn deploy_all(
        &self,
        jobs: &[Job],
        cancel: &CancellationToken,
    ) -> Result<(), DeploymentError> {
        try_join_all(jobs.iter().map(|job| self.deploy(job, cancel))).await?;
        Ok(())
    }

    pub async fn stop(&self, job_id: &str, purge: bool) -> Result<(), DeploymentError> {
        self.scheduler.deregister(job_id, purge).await?;
        info!("Stopped job '{}'", job_id);
        Ok(())
    }

    /// Stop every job, reporting all failures rather than the first one
    pub async fn stop_jobs<S: AsRef<str>>(&self, job_ids: &[S], purge: bool) -> Result<(), MultiError> {
        let results = join_all(job_ids.iter().map(|id| async move {
            let id = id.as_ref();
            self.stop(id, purge).await.map_err(|e| {
                warn!("Failed to stop job '{}': {}", id, e);
                e
            })
        }))
        .await;

        results
            .into_iter()
            .filter_map(Result::err)
            .collect::<MultiError>()
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::memory::MemoryScheduler;

    fn fast() -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_millis(10),
            wait_timeout: Duration::from_millis(200),
            assume_success_on_timeout: false,
            fail_on_failed_deployment: false,
        }
    }

    fn runner(scheduler: &Arc<MemoryScheduler>) -> JobRunner {
        JobRunner::new(scheduler.clone()).with_config(fast())
    }

    #[tokio::test]
    async fn test_run_submits_new_job() {
        let scheduler = Arc::new(MemoryScheduler::new());
        let outcome = runner(&scheduler).run(&Job::new("a")).await.unwrap();
        assert_eq!(outcome, RunOutcome::Submitted);
        assert_eq!(scheduler.registrations(), ["a"]);
    }

    #[tokio::test]
    async fn test_run_short_circuits_when_running() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.set_job_status("a", "running");
        let runner = runner(&scheduler);

        assert_eq!(runner.run(&Job::new("a")).await.unwrap(), RunOutcome::AlreadyRunning);
        assert_eq!(runner.run(&Job::new("a")).await.unwrap(), RunOutcome::AlreadyRunning);
        assert!(scheduler.registrations().is_empty());
    }

    #[tokio::test]
    async fn test_run_and_wait_success_after_progress() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("a", &["running", "running", "successful"]);

        runner(&scheduler)
            .run_and_wait(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scheduler.registrations(), ["a"]);
    }

    #[tokio::test]
    async fn test_canceled_deployment_fails_fast() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("st-local-nodeset-a-0-full", &["running", "canceled"]);
        let runner = JobRunner::new(scheduler.clone()).with_config(RunnerConfig {
            wait_timeout: Duration::from_secs(60),
            ..fast()
        });

        let started = std::time::Instant::now();
        let err = runner
            .run_and_wait(&Job::new("st-local-nodeset-a-0-full"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DeploymentError::Canceled { .. }));
        assert!(err.to_string().contains("st-local-nodeset-a-0-full"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_failed_deployment_keeps_polling_by_default() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("a", &["failed", "running", "successful"]);
        runner(&scheduler)
            .run_and_wait(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap();

        scheduler.script_deployment("b", &["failed"]);
        let err = runner(&scheduler)
            .run_and_wait(&Job::new("b"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_failed_deployment_is_error_when_configured() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("a", &["failed"]);
        let runner = JobRunner::new(scheduler.clone()).with_config(RunnerConfig {
            fail_on_failed_deployment: true,
            ..fast()
        });
        let err = runner
            .run_and_wait(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.job_id(), Some("a"));
        assert!(matches!(err, DeploymentError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_fails_by_default() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("a", &["running"]);
        let err = runner(&scheduler)
            .run_and_wait(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_timeout_can_assume_success() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("a", &["running"]);
        let runner = JobRunner::new(scheduler.clone()).with_config(RunnerConfig {
            assume_success_on_timeout: true,
            ..fast()
        });
        runner
            .run_and_wait(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("a", &["running"]);
        let runner = JobRunner::new(scheduler.clone()).with_config(RunnerConfig {
            wait_timeout: Duration::from_secs(60),
            ..fast()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = runner.run_and_wait(&Job::new("a"), &cancel).await.unwrap_err();
        assert!(matches!(err, DeploymentError::Interrupted { .. }));
    }

    #[tokio::test]
    async fn test_scheduler_error_propagates() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.fail_status_queries("a");
        let err = runner(&scheduler)
            .run_and_wait(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::Scheduler(_)));
    }

    #[tokio::test]
    async fn test_stop_jobs_aggregates_failures() {
        let scheduler = Arc::new(MemoryScheduler::new());
        for id in ["a", "b", "c"] {
            scheduler.set_job_status(id, "running");
        }
        scheduler.fail_deregister("a");
        scheduler.fail_deregister("c");

        let err = runner(&scheduler)
            .stop_jobs(&["a", "b", "c"], true)
            .await
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(scheduler.deregistrations(), [("b".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_deploy_skips_wait_when_running() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.set_job_status("a", "running");
        scheduler.script_deployment("a", &["canceled"]);

        let outcome = runner(&scheduler)
            .deploy(&Job::new("a"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn test_deploy_all() {
        let scheduler = Arc::new(MemoryScheduler::new());
        let jobs = vec![Job::new("a"), Job::new("b")];
        runner(&scheduler)
            .deploy_all(&jobs, &CancellationToken::new())
            .await
            .unwrap();
        let mut registered = scheduler.registrations();
        registered.sort();
        assert_eq!(registered, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_deploy_all_fails_on_first_error() {
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("b", &["failed"]);
        let jobs = vec![Job::new("a"), Job::new("b")];
        let err = runner(&scheduler)
            .deploy_all(&jobs, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.job_id(), Some("b"));
    }
}
