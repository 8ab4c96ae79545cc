//! Network operations
//!
//! Each operation loads the persisted state of a network directory, drives
//! the generator, the job runner and the probes, and persists the result.
//! Callers must not run two state-changing operations on the same directory
//! at once.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigError, NetworkConfig};
use crate::error::MultiError;
use crate::generator::template::render_with;
use crate::generator::{resolve_chain_id, GenerateError, Generator, NetworkContext, TemplateError};
use crate::probes::{self, ProbeSettings};
use crate::scheduler::{
    binary_job, faucet_job, node_set_job, wallet_job, DeploymentError, Job, JobRunner,
    SchedulerError,
};
use crate::state::{load_network_state, NetworkState, StateError};
use crate::types::{GeneratedServices, NetworkJobs, NodeSet, RegistryError};

/// Errors that can occur during a network operation
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("Deployment failed: {0}")]
    Deployment(#[from] DeploymentError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to render job '{name}': {source}")]
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error("A network already exists in {}", .0.display())]
    AlreadyGenerated(PathBuf),

    #[error("No network has been generated in {}", .0.display())]
    NotGenerated(PathBuf),

    #[error("Network in {} is not running", .0.display())]
    NotRunning(PathBuf),

    #[error("Readiness probes failed: {0}")]
    Probes(MultiError),

    #[error("Failed to stop jobs: {0}")]
    Stop(MultiError),

    #[error("Failed to remove {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scheduler status of one recorded job
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusEntry {
    pub job_id: String,
    pub kind: JobKind,
    /// `None` when the scheduler does not know the job
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    NodeSet,
    Extra,
    Faucet,
    Wallet,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub name: String,
    pub chain_id: String,
    pub output_dir: PathBuf,
    pub running: bool,
    pub jobs: Vec<JobStatusEntry>,
}

/// Runs network operations against one scheduler
pub struct Network {
    runner: JobRunner,
    probe_settings: ProbeSettings,
}

impl Network {
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner,
            probe_settings: ProbeSettings::default(),
        }
    }

    pub fn with_probe_settings(mut self, settings: ProbeSettings) -> Self {
        self.probe_settings = settings;
        self
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Generate every artifact of a new network and persist its state.
    ///
    /// Refuses to touch a directory that already holds a network.
    pub async fn generate(
        &self,
        config: NetworkConfig,
        cancel: &CancellationToken,
    ) -> Result<NetworkState, NetworkError> {
        let dir = config.output_dir.clone();
        if !load_network_state(&dir)?.empty() {
            return Err(NetworkError::AlreadyGenerated(dir));
        }

        let chain_id = resolve_chain_id(&config);
        let services = Generator::new(&config, &chain_id, &self.runner)
            .generate(cancel)
            .await?;

        let mut jobs = NetworkJobs::new();
        for id in services.pre_generate_job_ids() {
            jobs.add_extra_job(id);
        }

        let state = NetworkState {
            config: Some(config),
            generated_services: Some(services),
            running_jobs: Some(jobs),
            vega_chain_id: chain_id,
        };
        state.persist(&dir)?;
        Ok(state)
    }

    /// Start pre-start jobs, node sets, then wallet, faucet and binaries.
    ///
    /// Node sets must pass their readiness probes before the auxiliary
    /// services are started. Job ids are persisted even when a step fails.
    pub async fn start(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<NetworkState, NetworkError> {
        let mut state = load_generated(dir)?;
        let mut jobs = state.running_jobs.take().unwrap_or_default();

        let result = self.start_jobs(&state, &mut jobs, cancel).await;
        state.running_jobs = Some(jobs);
        state.persist(dir)?;
        result?;

        info!("Network in {} started", dir.display());
        Ok(state)
    }

    async fn start_jobs(
        &self,
        state: &NetworkState,
        jobs: &mut NetworkJobs,
        cancel: &CancellationToken,
    ) -> Result<(), NetworkError> {
        let (config, services) = generated_parts(state)?;

        for job in pre_start_jobs(config, &state.vega_chain_id, services)? {
            self.runner.deploy(&job, cancel).await?;
            jobs.add_extra_job(job.id);
        }

        let node_sets = services.to_slice();
        let node_set_jobs = node_sets
            .iter()
            .map(|ns| node_set_job(ns))
            .collect::<Result<Vec<_>, _>>()?;
        for job in &node_set_jobs {
            jobs.add_node_set_job(job.id.clone());
        }
        self.runner.deploy_all(&node_set_jobs, cancel).await?;
        self.probe_node_sets(&node_sets, cancel).await?;

        if let Some(wallet) = &services.wallet {
            let job = wallet_job(wallet);
            self.runner.deploy(&job, cancel).await?;
            jobs.set_wallet_job(job.id);
        }
        if let Some(faucet) = &services.faucet {
            let job = faucet_job(faucet);
            self.runner.deploy(&job, cancel).await?;
            jobs.set_faucet_job(job.id);
        }
        for binary in &services.binaries {
            let job = binary_job(binary);
            self.runner.deploy(&job, cancel).await?;
            jobs.add_extra_job(job.id);
        }
        Ok(())
    }

    /// Stop every recorded job and forget them
    pub async fn stop(&self, dir: &Path) -> Result<NetworkState, NetworkError> {
        let mut state = load_generated(dir)?;
        let ids = state
            .running_jobs
            .as_ref()
            .map(NetworkJobs::all_ids)
            .unwrap_or_default();
        if ids.is_empty() {
            return Err(NetworkError::NotRunning(dir.to_path_buf()));
        }

        self.runner
            .stop_jobs(&ids, false)
            .await
            .map_err(NetworkError::Stop)?;

        state.running_jobs = Some(NetworkJobs::new());
        state.persist(dir)?;
        info!("Network in {} stopped", dir.display());
        Ok(state)
    }

    /// Purge every recorded job and delete the network directory
    pub async fn destroy(&self, dir: &Path) -> Result<(), NetworkError> {
        let state = load_network_state(dir)?;
        let ids = state
            .running_jobs
            .as_ref()
            .map(NetworkJobs::all_ids)
            .unwrap_or_default();

        if !ids.is_empty() {
            self.runner
                .stop_jobs(&ids, true)
                .await
                .map_err(NetworkError::Stop)?;
        }

        if dir.exists() {
            std::fs::remove_dir_all(dir).map_err(|source| NetworkError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        info!("Network in {} destroyed", dir.display());
        Ok(())
    }

    /// Scheduler status of every node set and recorded job
    pub async fn status(&self, dir: &Path) -> Result<NetworkStatus, NetworkError> {
        let state = load_generated(dir)?;
        let (config, services) = generated_parts(&state)?;
        let recorded = state.running_jobs.clone().unwrap_or_default();

        let mut wanted: Vec<(String, JobKind)> = services
            .to_slice()
            .iter()
            .map(|ns| (ns.name.clone(), JobKind::NodeSet))
            .collect();
        for id in &recorded.extra_jobs {
            wanted.push((id.clone(), JobKind::Extra));
        }
        if let Some(id) = &recorded.faucet_job {
            wanted.push((id.clone(), JobKind::Faucet));
        }
        if let Some(id) = &recorded.wallet_job {
            wanted.push((id.clone(), JobKind::Wallet));
        }

        let scheduler = self.runner.scheduler();
        let jobs = join_all(wanted.into_iter().map(|(job_id, kind)| async move {
            match scheduler.job_status(&job_id).await {
                Ok(status) => JobStatusEntry {
                    job_id,
                    kind,
                    status,
                    error: None,
                },
                Err(e) => JobStatusEntry {
                    job_id,
                    kind,
                    status: None,
                    error: Some(e.to_string()),
                },
            }
        }))
        .await;

        Ok(NetworkStatus {
            name: config.network.name.clone(),
            chain_id: state.vega_chain_id.clone(),
            output_dir: dir.to_path_buf(),
            running: state.running(),
            jobs,
        })
    }

    /// Re-run the readiness probes of every node set
    pub async fn probe(&self, dir: &Path, cancel: &CancellationToken) -> Result<(), NetworkError> {
        let state = load_generated(dir)?;
        let (_, services) = generated_parts(&state)?;
        self.probe_node_sets(&services.to_slice(), cancel).await
    }

    /// Start one node set by name and wait for it to become ready
    pub async fn start_node_set(
        &self,
        dir: &Path,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<NetworkState, NetworkError> {
        let mut state = load_generated(dir)?;
        let (_, services) = generated_parts(&state)?;
        let ns = services.node_set_by_name(name)?;

        let job = node_set_job(ns)?;
        self.runner.deploy(&job, cancel).await?;
        self.probe_node_sets(&[ns], cancel).await?;

        state
            .running_jobs
            .get_or_insert_with(NetworkJobs::new)
            .add_node_set_job(job.id);
        state.persist(dir)?;
        Ok(state)
    }

    /// Stop one node set by name
    pub async fn stop_node_set(&self, dir: &Path, name: &str) -> Result<NetworkState, NetworkError> {
        let mut state = load_generated(dir)?;
        let (_, services) = generated_parts(&state)?;
        let job_id = services.node_set_by_name(name)?.name.clone();

        self.runner.stop(&job_id, false).await?;

        if let Some(jobs) = state.running_jobs.as_mut() {
            jobs.remove(&job_id);
        }
        state.persist(dir)?;
        Ok(state)
    }

    /// Probe node sets concurrently; every failure is reported
    async fn probe_node_sets(
        &self,
        node_sets: &[&NodeSet],
        cancel: &CancellationToken,
    ) -> Result<(), NetworkError> {
        let settings = &self.probe_settings;
        let checks = node_sets.iter().filter_map(|ns| {
            let ns: &NodeSet = ns;
            let cfg = ns.readiness_probe.as_ref()?;
            Some(probes::probe_with(&ns.name, cfg, settings, cancel))
        });
        let results = join_all(checks).await;

        let errors: MultiError = results
            .into_iter()
            .filter_map(Result::err)
            .inspect(|e| warn!("{}", e))
            .collect();
        errors.into_result().map_err(NetworkError::Probes)
    }
}

fn load_generated(dir: &Path) -> Result<NetworkState, NetworkError> {
    let state = load_network_state(dir)?;
    if state.empty() {
        return Err(NetworkError::NotGenerated(dir.to_path_buf()));
    }
    Ok(state)
}

fn generated_parts(state: &NetworkState) -> Result<(&NetworkConfig, &GeneratedServices), NetworkError> {
    match (&state.config, &state.generated_services) {
        (Some(config), Some(services)) => Ok((config, services)),
        _ => Err(NetworkError::NotGenerated(
            state.output_dir().map(Path::to_path_buf).unwrap_or_default(),
        )),
    }
}

/// Render the network's pre-start job templates
fn pre_start_jobs(
    config: &NetworkConfig,
    chain_id: &str,
    services: &GeneratedServices,
) -> Result<Vec<Job>, NetworkError> {
    let ctx = NetworkContext::new(config, chain_id, &services.to_slice());
    let mut jobs = Vec::with_capacity(config.network.pre_start.len());
    for tpl in &config.network.pre_start {
        let Some(text) = tpl.source.resolve()? else {
            continue;
        };
        let rendered = render_with(&text, &ctx).map_err(|source| NetworkError::Template {
            name: tpl.name.clone(),
            source,
        })?;
        jobs.push(Job::from_json(&rendered)?);
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::fixtures::sample_config;
    use crate::config::{JobTemplate, TemplateSource};
    use crate::probes::{ProbesConfig, TcpProbe};
    use crate::scheduler::memory::MemoryScheduler;
    use crate::scheduler::RunnerConfig;
    use crate::types::node_set::fixtures::{node_set, service};
    use crate::types::{NodeMode, Wallet};

    fn fast_probes() -> ProbeSettings {
        ProbeSettings {
            overall_timeout: Duration::from_millis(400),
            attempt_timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(50),
        }
    }

    fn network(scheduler: &Arc<MemoryScheduler>) -> Network {
        let runner = JobRunner::new(scheduler.clone()).with_config(RunnerConfig {
            poll_interval: Duration::from_millis(10),
            wait_timeout: Duration::from_secs(2),
            assume_success_on_timeout: false,
            fail_on_failed_deployment: false,
        });
        Network::new(runner).with_probe_settings(fast_probes())
    }

    /// Persist a generated (not running) network into `dir`
    fn generated_state(dir: &Path) -> NetworkState {
        let mut config = sample_config(dir);
        config.network.pre_start.push(JobTemplate {
            name: "ganache".to_string(),
            source: TemplateSource::inline(r#"{"ID": "{{ .prefix }}-ganache"}"#),
        });

        let sets = vec![
            node_set("st-local-nodeset-validators-0-validator", "validators", 0, NodeMode::Validator),
            node_set("st-local-nodeset-validators-1-validator", "validators", 1, NodeMode::Validator),
            node_set("st-local-nodeset-full-2-full", "full", 2, NodeMode::Full),
        ];
        let wallet = Wallet {
            service: service("st-local-wallet"),
            binary: PathBuf::from("vega"),
        };

        let state = NetworkState {
            config: Some(config),
            generated_services: Some(GeneratedServices::new(Some(wallet), None, vec![], sets)),
            running_jobs: Some(NetworkJobs::new()),
            vega_chain_id: "chain-1".to_string(),
        };
        state.persist(dir).unwrap();
        state
    }

    #[tokio::test]
    async fn test_operations_require_generated_network() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);

        let err = net.start(dir.path(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, NetworkError::NotGenerated(_)));
        assert!(matches!(
            net.status(dir.path()).await,
            Err(NetworkError::NotGenerated(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_refuses_existing_network() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());

        let err = network(&scheduler)
            .generate(sample_config(dir.path()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::AlreadyGenerated(_)));
    }

    #[tokio::test]
    async fn test_start_records_jobs() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());

        let state = network(&scheduler)
            .start(dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(state.running());

        let jobs = state.running_jobs.as_ref().unwrap();
        assert_eq!(jobs.node_set_jobs.len(), 3);
        assert!(jobs.extra_jobs.contains("st-local-ganache"));
        assert_eq!(jobs.wallet_job.as_deref(), Some("st-local-wallet"));
        assert_eq!(scheduler.registrations()[0], "st-local-ganache");

        let reloaded = load_network_state(dir.path()).unwrap();
        assert_eq!(reloaded.running_jobs, state.running_jobs);
    }

    #[tokio::test]
    async fn test_start_twice_does_not_resubmit() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);

        net.start(dir.path(), &CancellationToken::new()).await.unwrap();
        let submitted = scheduler.registrations().len();
        net.start(dir.path(), &CancellationToken::new()).await.unwrap();
        assert_eq!(scheduler.registrations().len(), submitted);
    }

    #[tokio::test]
    async fn test_canceled_node_set_fails_start_and_keeps_ids() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        scheduler.script_deployment("st-local-nodeset-full-2-full", &["canceled"]);

        let err = network(&scheduler)
            .start(dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("st-local-nodeset-full-2-full"));

        let state = load_network_state(dir.path()).unwrap();
        assert_eq!(state.running_jobs.unwrap().node_set_jobs.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_probe_blocks_auxiliary_services() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = generated_state(dir.path());
        let services = state.generated_services.as_mut().unwrap();
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = closed.local_addr().unwrap().to_string();
        drop(closed);
        services
            .node_sets
            .get_mut("st-local-nodeset-full-2-full")
            .unwrap()
            .readiness_probe = Some(ProbesConfig {
            tcp: Some(TcpProbe { address }),
            ..Default::default()
        });
        state.persist(dir.path()).unwrap();

        let scheduler = Arc::new(MemoryScheduler::new());
        let err = network(&scheduler)
            .start(dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, NetworkError::Probes(ref e) if e.len() == 1));
        assert!(scheduler.job("st-local-wallet").is_none());
    }

    #[tokio::test]
    async fn test_stop_clears_jobs() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);
        net.start(dir.path(), &CancellationToken::new()).await.unwrap();

        let state = net.stop(dir.path()).await.unwrap();
        assert!(!state.running());
        assert!(scheduler.running().is_empty());
        assert_eq!(scheduler.deregistrations().len(), 5);
        assert!(scheduler.deregistrations().iter().all(|(_, purge)| !purge));

        assert!(matches!(
            net.stop(dir.path()).await,
            Err(NetworkError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);
        net.start(dir.path(), &CancellationToken::new()).await.unwrap();
        scheduler.fail_deregister("st-local-wallet");
        scheduler.fail_deregister("st-local-ganache");

        let err = net.stop(dir.path()).await.unwrap_err();
        assert!(matches!(err, NetworkError::Stop(ref e) if e.len() == 2));
        assert!(load_network_state(dir.path()).unwrap().running());
    }

    #[tokio::test]
    async fn test_destroy_purges_and_removes_dir() {
        let dir = tempfile::tempdir().unwrap();
        let net_dir = dir.path().join("net");
        generated_state(&net_dir);
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);
        net.start(&net_dir, &CancellationToken::new()).await.unwrap();

        net.destroy(&net_dir).await.unwrap();
        assert!(!net_dir.exists());
        assert!(scheduler.deregistrations().iter().all(|(_, purge)| *purge));
    }

    #[tokio::test]
    async fn test_status() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);

        let status = net.status(dir.path()).await.unwrap();
        assert!(!status.running);
        assert_eq!(status.jobs.len(), 3);
        assert!(status.jobs.iter().all(|j| j.status.is_none()));

        net.start(dir.path(), &CancellationToken::new()).await.unwrap();
        let status = net.status(dir.path()).await.unwrap();
        assert!(status.running);
        assert_eq!(status.chain_id, "chain-1");
        assert_eq!(status.jobs.len(), 5);
        assert!(status
            .jobs
            .iter()
            .all(|j| j.status.as_deref() == Some("running")));
    }

    #[tokio::test]
    async fn test_start_and_stop_single_node_set() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        let net = network(&scheduler);
        let name = "st-local-nodeset-validators-1-validator";

        let state = net
            .start_node_set(dir.path(), name, &CancellationToken::new())
            .await
            .unwrap();
        assert!(state.running());
        assert_eq!(scheduler.running(), [name]);

        let state = net.stop_node_set(dir.path(), name).await.unwrap();
        assert!(!state.running());

        let err = net
            .start_node_set(dir.path(), "nope", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Registry(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_probe_without_probes_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        generated_state(dir.path());
        let scheduler = Arc::new(MemoryScheduler::new());
        network(&scheduler)
            .probe(dir.path(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_generate_stops_pre_generate_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sample_config(&dir.path().join("net"));
        config.vega_binary = crate::generator::testing::fake_binary(dir.path());
        let full = &mut config.network.node_sets[1];
        full.data_node_binary = Some(dir.path().join("missing-data-node"));
        full.pre_generate.push(JobTemplate {
            name: "ganache".to_string(),
            source: TemplateSource::inline(r#"{"ID": "{{ .prefix }}-ganache"}"#),
        });
        let scheduler = Arc::new(MemoryScheduler::new());

        let err = network(&scheduler)
            .generate(config, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, NetworkError::Generate(GenerateError::NodeSets(_))));
        assert_eq!(scheduler.registrations(), ["st-local-ganache"]);
        assert_eq!(
            scheduler.deregistrations(),
            [("st-local-ganache".to_string(), true)]
        );
        assert!(scheduler.running().is_empty());
        assert!(load_network_state(&dir.path().join("net")).unwrap().empty());
    }
}
