//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::TimingArgs;
use crate::config::{load_network_config, ConfigError, NetworkConfig};
use crate::context::{self, Config, Context, ContextError};
use crate::network::{Network, NetworkError};
use crate::probes::ProbeSettings;
use crate::scheduler::{JobRunner, NomadClient, RunnerConfig};
use crate::state::NetworkState;
use crate::types::NodeMode;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Context Commands (Pure business logic)
// ============================================================================

/// Info about a context for display
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub name: String,
    pub url: String,
    pub is_current: bool,
}

/// List all contexts, including the built-in `local`
pub fn context_list(config: &Config) -> Vec<ContextInfo> {
    let current = config.current_name();
    config
        .all()
        .into_iter()
        .map(|ctx| ContextInfo {
            is_current: ctx.name == current,
            name: ctx.name,
            url: ctx.url,
        })
        .collect()
}

/// Get current context name and URL
pub fn context_current(config: &Config) -> CommandResult<(String, String)> {
    let ctx = config.current()?;
    Ok((ctx.name, ctx.url))
}

pub fn context_use(config: &mut Config, name: &str) -> CommandResult<()> {
    context::set_current_context(config, name)?;
    Ok(())
}

pub fn context_add(
    config: &mut Config,
    name: &str,
    url: &str,
    token: Option<&str>,
) -> CommandResult<()> {
    let mut ctx = Context::new(name, url);
    if let Some(token) = token {
        ctx = ctx.with_token(token);
    }
    context::add_context(config, ctx)?;
    Ok(())
}

/// Delete a context; returns whether it existed
pub fn context_delete(config: &mut Config, name: &str) -> bool {
    context::remove_context(config, name).is_some()
}

// ============================================================================
// Scheduler wiring
// ============================================================================

/// Scheduler endpoint from the current context and command-line overrides
pub fn scheduler_context(
    config: &Config,
    url: Option<&str>,
    token: Option<&str>,
) -> CommandResult<Context> {
    let mut ctx = match url {
        Some(url) => Context::new("command-line", url),
        None => config.current()?,
    };
    if let Some(token) = token {
        ctx.token = Some(token.to_string());
    }
    Ok(ctx)
}

pub fn runner_config(timing: &TimingArgs) -> RunnerConfig {
    RunnerConfig {
        poll_interval: Duration::from_secs(timing.poll_interval.max(1)),
        wait_timeout: Duration::from_secs(timing.wait_timeout),
        assume_success_on_timeout: timing.assume_success_on_timeout,
        fail_on_failed_deployment: timing.fail_on_failed_deployment,
    }
}

pub fn probe_settings(timing: &TimingArgs) -> ProbeSettings {
    ProbeSettings {
        overall_timeout: Duration::from_secs(timing.probe_timeout),
        ..ProbeSettings::default()
    }
}

/// Network operations against the scheduler of `ctx`
pub fn build_network(ctx: &Context, timing: &TimingArgs) -> Network {
    let mut client = NomadClient::new(ctx.url.as_str());
    if let Some(token) = &ctx.token {
        client = client.with_token(token.as_str());
    }
    let runner = JobRunner::new(Arc::new(client)).with_config(runner_config(timing));
    Network::new(runner).with_probe_settings(probe_settings(timing))
}

// ============================================================================
// Network Commands
// ============================================================================

/// ~/.capsule/testnet
pub fn default_network_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".capsule")
        .join("testnet")
}

pub fn network_home(home: Option<&Path>) -> PathBuf {
    home.map(Path::to_path_buf)
        .unwrap_or_else(default_network_home)
}

/// Load a network config; `--home` replaces its output directory
pub fn load_generate_config(path: &Path, home: Option<&Path>) -> CommandResult<NetworkConfig> {
    let mut config = load_network_config(path)?;
    if let Some(home) = home {
        config.output_dir = home.to_path_buf();
    }
    Ok(config)
}

/// One generated node set for display
#[derive(Debug, Clone)]
pub struct NodeSetInfo {
    pub name: String,
    pub group_name: String,
    pub mode: NodeMode,
    pub index: usize,
    pub data_node: bool,
    pub visor: bool,
    pub running: bool,
}

/// Node sets of a network in index order
pub fn node_set_list(state: &NetworkState) -> Vec<NodeSetInfo> {
    let Some(services) = &state.generated_services else {
        return Vec::new();
    };
    services
        .to_slice()
        .into_iter()
        .map(|ns| NodeSetInfo {
            name: ns.name.clone(),
            group_name: ns.group_name.clone(),
            mode: ns.mode,
            index: ns.index,
            data_node: ns.data_node.is_some(),
            visor: ns.visor.is_some(),
            running: state
                .running_jobs
                .as_ref()
                .is_some_and(|jobs| jobs.node_set_jobs.contains(&ns.name)),
        })
        .collect()
}
