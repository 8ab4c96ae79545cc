//! In-memory scheduler for tests

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Job, Scheduler, SchedulerError};

/// Registered jobs report `running`; deployments succeed immediately
/// unless a status script is set for the job.
#[derive(Default)]
pub(crate) struct MemoryScheduler {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<String, Job>,
    job_status: HashMap<String, String>,
    deployment_scripts: HashMap<String, VecDeque<String>>,
    registrations: Vec<String>,
    deregistrations: Vec<(String, bool)>,
    failing_deregister: HashSet<String>,
    failing_status: HashSet<String>,
}

impl MemoryScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_job_status(&self, id: &str, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.job_status.insert(id.to_string(), status.to_string());
    }

    /// Successive deployment statuses; the last one repeats
    pub(crate) fn script_deployment(&self, id: &str, statuses: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.deployment_scripts.insert(
            id.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub(crate) fn fail_deregister(&self, id: &str) {
        self.inner.lock().unwrap().failing_deregister.insert(id.to_string());
    }

    pub(crate) fn fail_status_queries(&self, id: &str) {
        self.inner.lock().unwrap().failing_status.insert(id.to_string());
    }

    pub(crate) fn registrations(&self) -> Vec<String> {
        self.inner.lock().unwrap().registrations.clone()
    }

    pub(crate) fn deregistrations(&self) -> Vec<(String, bool)> {
        self.inner.lock().unwrap().deregistrations.clone()
    }

    pub(crate) fn job(&self, id: &str) -> Option<Job> {
        self.inner.lock().unwrap().jobs.get(id).cloned()
    }

    /// Ids whose job status is `running`, sorted
    pub(crate) fn running(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<String> = inner
            .job_status
            .iter()
            .filter(|(_, s)| s.as_str() == "running")
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

fn unavailable(id: &str) -> SchedulerError {
    SchedulerError::Api {
        status: 500,
        message: format!("scheduler unavailable for '{}'", id),
    }
}

#[async_trait]
impl Scheduler for MemoryScheduler {
    async fn register(&self, job: &Job) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.registrations.push(job.id.clone());
        inner.job_status.insert(job.id.clone(), "running".to_string());
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn job_status(&self, job_id: &str) -> Result<Option<String>, SchedulerError> {
        let inner = self.inner.lock().unwrap();
        if inner.failing_status.contains(job_id) {
            return Err(unavailable(job_id));
        }
        Ok(inner.job_status.get(job_id).cloned())
    }

    async fn deployment_status(&self, job_id: &str) -> Result<Option<String>, SchedulerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_status.contains(job_id) {
            return Err(unavailable(job_id));
        }
        if let Some(script) = inner.deployment_scripts.get_mut(job_id) {
            let status = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            return Ok(status);
        }
        if inner.jobs.contains_key(job_id) {
            return Ok(Some("successful".to_string()));
        }
        Ok(None)
    }

    async fn deregister(&self, job_id: &str, purge: bool) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_deregister.contains(job_id) {
            return Err(unavailable(job_id));
        }
        inner.jobs.remove(job_id);
        inner.job_status.insert(job_id.to_string(), "dead".to_string());
        inner.deregistrations.push((job_id.to_string(), purge));
        Ok(())
    }
}
