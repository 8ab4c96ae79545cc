//! Config generation pipeline
//!
//! Every generated service goes through the same three steps:
//!
//! 1. **Initiate**: the service binary's own `init` command writes a baseline
//!    config (and any credentials) into a fresh home directory under the
//!    network's output directory.
//! 2. **Template**: the optional operator template is rendered with a
//!    service-specific context.
//! 3. **Merge**: the rendered TOML is merged over the baseline, rendered
//!    fields winning, and written back.
//!
//! Node sets are initiated first so that templates of every service can
//! refer to the whole topology.

pub mod binary;
pub mod contexts;
pub mod faucet;
pub mod merge;
pub mod node_set;
pub mod template;
pub mod visor;
pub mod wallet;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use contexts::{NetworkContext, NodeSetContext, NodeSetSummary, ServiceContext};
pub use merge::MergeError;
pub use template::{render_fields, render_with, Templatable, TemplateError};

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigError, NetworkConfig, TemplateSource};
use crate::error::MultiError;
use crate::exec::ExecError;
use crate::scheduler::{DeploymentError, JobRunner, SchedulerError};
use crate::types::GeneratedServices;

/// Errors that can occur while generating a network
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initiate service: {0}")]
    Exec(#[from] ExecError),

    #[error("Failed to render template of '{service}': {source}")]
    Template {
        service: String,
        #[source]
        source: TemplateError,
    },

    #[error("Failed to merge config of '{service}': {source}")]
    Merge {
        service: String,
        #[source]
        source: MergeError,
    },

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job specification: {0}")]
    Job(#[from] SchedulerError),

    #[error("Pre-generate job failed: {0}")]
    Deployment(#[from] DeploymentError),

    #[error("Generated service '{service}' is incomplete: {source}")]
    Verify {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    NodeSets(MultiError),
}

/// Output of the `init --output json` command of the orchestrated binaries
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutput {
    pub config_file_path: PathBuf,
}

/// Chain id from the config, or `{network}-{timestamp}`
pub fn resolve_chain_id(config: &NetworkConfig) -> String {
    match &config.network.chain_id {
        Some(id) if !id.trim().is_empty() => id.clone(),
        _ => format!(
            "{}-{}",
            config.network.name,
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        ),
    }
}

/// Drives generation of a whole network
pub struct Generator<'a> {
    config: &'a NetworkConfig,
    chain_id: String,
    runner: &'a JobRunner,
    submitted_jobs: Mutex<Vec<String>>,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a NetworkConfig, chain_id: impl Into<String>, runner: &'a JobRunner) -> Self {
        Self {
            config,
            chain_id: chain_id.into(),
            runner,
            submitted_jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        self.config
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn runner(&self) -> &JobRunner {
        self.runner
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// `{prefix}-{name}`
    pub fn service_name(&self, name: &str) -> String {
        format!("{}-{}", self.config.prefix, name)
    }

    /// Record a job submitted to the scheduler while generating
    pub(crate) async fn track_submitted_job(&self, job_id: &str) {
        self.submitted_jobs.lock().await.push(job_id.to_string());
    }

    /// Generate node sets, then wallet, faucet and binaries.
    ///
    /// When generation fails, the pre-generate jobs already submitted are
    /// stopped and purged so that nothing is left running without a state
    /// file recording it.
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<GeneratedServices, GenerateError> {
        let result = self.generate_services(cancel).await;
        if result.is_err() {
            self.stop_submitted_jobs().await;
        }
        result
    }

    async fn stop_submitted_jobs(&self) {
        let job_ids = std::mem::take(&mut *self.submitted_jobs.lock().await);
        if job_ids.is_empty() {
            return;
        }
        warn!(
            "Generation failed, stopping {} pre-generate job(s): {}",
            job_ids.len(),
            job_ids.join(", ")
        );
        if let Err(e) = self.runner.stop_jobs(&job_ids, true).await {
            warn!("Failed to stop pre-generate jobs: {}", e);
        }
    }

    async fn generate_services(
        &self,
        cancel: &CancellationToken,
    ) -> Result<GeneratedServices, GenerateError> {
        create_dir(self.output_dir())?;
        info!(
            "Generating network '{}' (chain id {}) in {}",
            self.config.network.name,
            self.chain_id,
            self.output_dir().display()
        );

        let node_sets = node_set::generate_node_sets(self, cancel).await?;
        let summaries: Vec<NodeSetSummary> = node_sets.iter().map(NodeSetSummary::from).collect();

        let wallet = match &self.config.network.wallet {
            Some(cfg) => Some(wallet::generate(self, cfg, &summaries, cancel).await?),
            None => None,
        };

        let faucet = match &self.config.network.faucet {
            Some(cfg) => Some(faucet::generate(self, cfg, &summaries, cancel).await?),
            None => None,
        };

        let mut binaries = Vec::with_capacity(self.config.network.binaries.len());
        for cfg in &self.config.network.binaries {
            binaries.push(binary::generate(self, cfg, &summaries)?);
        }

        let services = GeneratedServices::new(wallet, faucet, binaries, node_sets);
        verify_services(&services)?;

        info!(
            "Generated {} node set(s) for network '{}'",
            services.node_sets.len(),
            self.config.network.name
        );
        Ok(services)
    }
}

/// Render an optional template and merge it into `config_path`
pub(crate) fn apply_template<C: serde::Serialize>(
    service: &str,
    source: &TemplateSource,
    ctx: &C,
    config_path: &Path,
) -> Result<(), GenerateError> {
    let Some(template) = source.resolve()? else {
        return Ok(());
    };
    let rendered = render_with(&template, ctx).map_err(|source| GenerateError::Template {
        service: service.to_string(),
        source,
    })?;
    merge::merge_file(config_path, &rendered).map_err(|source| GenerateError::Merge {
        service: service.to_string(),
        source,
    })
}

pub(crate) fn create_dir(path: &Path) -> Result<(), GenerateError> {
    std::fs::create_dir_all(path).map_err(|source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn verify_services(services: &GeneratedServices) -> Result<(), GenerateError> {
    let node_services = services.node_sets.values().flat_map(|ns| ns.services());
    let others = services
        .wallet
        .iter()
        .map(|w| &w.service)
        .chain(services.faucet.iter().map(|f| &f.service))
        .chain(services.binaries.iter().map(|b| &b.service));

    for svc in node_services.chain(others) {
        svc.verify_on_disk().map_err(|source| GenerateError::Verify {
            service: svc.name.clone(),
            source,
        })?;
    }
    Ok(())
}
