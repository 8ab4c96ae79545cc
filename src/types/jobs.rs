//! Scheduler job ids believed to be running

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Job ids partitioned by what they run. An id lives in exactly one
/// partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkJobs {
    #[serde(default)]
    pub node_set_jobs: BTreeSet<String>,
    #[serde(default)]
    pub extra_jobs: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faucet_job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_job: Option<String>,
}

impl NetworkJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.node_set_jobs.contains(id)
            || self.extra_jobs.contains(id)
            || self.faucet_job.as_deref() == Some(id)
            || self.wallet_job.as_deref() == Some(id)
    }

    /// Returns false when the id is already recorded anywhere
    pub fn add_node_set_job(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        !self.exists(&id) && self.node_set_jobs.insert(id)
    }

    /// Returns false when the id is already recorded anywhere
    pub fn add_extra_job(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        !self.exists(&id) && self.extra_jobs.insert(id)
    }

    pub fn set_faucet_job(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.exists(&id) {
            return false;
        }
        self.faucet_job = Some(id);
        true
    }

    pub fn set_wallet_job(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.exists(&id) {
            return false;
        }
        self.wallet_job = Some(id);
        true
    }

    /// Forget an id from whichever partition holds it
    pub fn remove(&mut self, id: &str) -> bool {
        if self.node_set_jobs.remove(id) || self.extra_jobs.remove(id) {
            return true;
        }
        if self.faucet_job.as_deref() == Some(id) {
            self.faucet_job = None;
            return true;
        }
        if self.wallet_job.as_deref() == Some(id) {
            self.wallet_job = None;
            return true;
        }
        false
    }

    /// Every recorded id: node sets, extra, faucet, wallet
    pub fn all_ids(&self) -> Vec<String> {
        self.node_set_jobs
            .iter()
            .chain(self.extra_jobs.iter())
            .chain(self.faucet_job.iter())
            .chain(self.wallet_job.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.node_set_jobs.is_empty()
            && self.extra_jobs.is_empty()
            && self.faucet_job.is_none()
            && self.wallet_job.is_none()
    }
}
