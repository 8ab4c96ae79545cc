//! Declarative network topology as written by the operator

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::generator::template::Templatable;
use crate::probes::ProbesConfig;
use crate::types::NodeMode;

/// The complete network description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Directory that receives every generated artifact and `network.dat`
    pub output_dir: PathBuf,

    /// Node binary; also used for the wallet and faucet unless overridden
    pub vega_binary: PathBuf,

    /// Prefix for generated service names and job ids
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_tendermint_prefix")]
    pub tendermint_node_prefix: String,

    #[serde(default = "default_vega_prefix")]
    pub vega_node_prefix: String,

    #[serde(default = "default_data_node_prefix")]
    pub data_node_prefix: String,

    #[serde(default = "default_visor_prefix")]
    pub visor_prefix: String,

    pub network: NetworkDefinition,
}

fn default_prefix() -> String {
    "st-local".to_string()
}

fn default_tendermint_prefix() -> String {
    "tendermint".to_string()
}

fn default_vega_prefix() -> String {
    "vega".to_string()
}

fn default_data_node_prefix() -> String {
    "data".to_string()
}

fn default_visor_prefix() -> String {
    "visor".to_string()
}

/// Services that make up the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    pub name: String,

    /// Chain id; generated from the network name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faucet: Option<FaucetConfig>,

    /// Extra jobs that must be running before any node set starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_start: Vec<JobTemplate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<BinaryConfig>,

    pub node_sets: Vec<NodeConfig>,
}

/// Inline template or a reference to a template file.
/// The inline template always wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,
}

impl TemplateSource {
    pub fn inline(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            template_file: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_none() && self.template_file.is_none()
    }

    /// Load the template text, if any
    pub fn resolve(&self) -> Result<Option<String>, ConfigError> {
        if let Some(inline) = &self.template {
            return Ok(Some(inline.clone()));
        }
        match &self.template_file {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|source| ConfigError::TemplateFile {
                    path: path.clone(),
                    source,
                }),
            None => Ok(None),
        }
    }
}

/// One group of identical node sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Group name shared by every node set generated from this entry
    pub name: String,

    pub mode: NodeMode,

    #[serde(default = "default_count")]
    pub count: usize,

    /// Generates a data node next to every node when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_node_binary: Option<PathBuf>,

    /// Runs the node under the process supervisor when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visor_binary: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub node_template: TemplateSource,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub tendermint_template: TemplateSource,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub data_node_template: TemplateSource,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub visor_run_template: TemplateSource,

    /// Scheduler job template replacing the default node-set job
    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub job_template: TemplateSource,

    /// Jobs that must complete before the node set is generated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_generate: Vec<JobTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ProbesConfig>,
}

fn default_count() -> usize {
    1
}

/// Named scheduler job given as a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub name: String,

    #[serde(flatten)]
    pub source: TemplateSource,
}

/// Generic binary service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryConfig {
    pub name: String,

    pub binary: PathBuf,

    /// Run arguments; accept template syntax
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub config: TemplateSource,
}

impl Templatable for BinaryConfig {
    fn templated_fields(&mut self) -> Vec<&mut String> {
        self.args.iter_mut().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaucetConfig {
    #[serde(default = "default_faucet_name")]
    pub name: String,

    /// Passphrase protecting the faucet wallet
    pub passphrase: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub config: TemplateSource,
}

fn default_faucet_name() -> String {
    "faucet".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub config: TemplateSource,
}

fn default_wallet_name() -> String {
    "wallet".to_string()
}

impl NetworkConfig {
    /// Structural checks that do not touch the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Validation(msg)) };

        if self.network.name.trim().is_empty() {
            return invalid("network name must not be empty".to_string());
        }
        if self.prefix.trim().is_empty() {
            return invalid("prefix must not be empty".to_string());
        }
        if self.network.node_sets.is_empty() {
            return invalid("at least one node set is required".to_string());
        }

        let mut groups = HashSet::new();
        for ns in &self.network.node_sets {
            if ns.name.trim().is_empty() {
                return invalid("node set name must not be empty".to_string());
            }
            if !groups.insert(ns.name.as_str()) {
                return invalid(format!("duplicate node set name '{}'", ns.name));
            }
            if ns.count == 0 {
                return invalid(format!("node set '{}' must have count >= 1", ns.name));
            }
            if let Some(probe) = &ns.readiness_probe {
                validate_probe(&ns.name, probe)?;
            }
            for job in &ns.pre_generate {
                validate_job_template(job)?;
            }
        }

        let mut binaries = HashSet::new();
        for bin in &self.network.binaries {
            if !binaries.insert(bin.name.as_str()) {
                return invalid(format!("duplicate binary name '{}'", bin.name));
            }
        }

        for job in &self.network.pre_start {
            validate_job_template(job)?;
        }

        Ok(())
    }

    /// Expand `~` and environment variables in every path
    pub fn expand_paths(&mut self) -> Result<(), ConfigError> {
        expand(&mut self.output_dir)?;
        expand(&mut self.vega_binary)?;

        let net = &mut self.network;
        if let Some(wallet) = &mut net.wallet {
            expand_opt(&mut wallet.binary)?;
            expand_opt(&mut wallet.config.template_file)?;
        }
        if let Some(faucet) = &mut net.faucet {
            expand_opt(&mut faucet.binary)?;
            expand_opt(&mut faucet.config.template_file)?;
        }
        for job in &mut net.pre_start {
            expand_opt(&mut job.source.template_file)?;
        }
        for bin in &mut net.binaries {
            expand(&mut bin.binary)?;
            expand_opt(&mut bin.config.template_file)?;
        }
        for ns in &mut net.node_sets {
            expand_opt(&mut ns.data_node_binary)?;
            expand_opt(&mut ns.visor_binary)?;
            for source in [
                &mut ns.node_template,
                &mut ns.tendermint_template,
                &mut ns.data_node_template,
                &mut ns.visor_run_template,
                &mut ns.job_template,
            ] {
                expand_opt(&mut source.template_file)?;
            }
            for job in &mut ns.pre_generate {
                expand_opt(&mut job.source.template_file)?;
            }
        }
        Ok(())
    }

    pub fn node_config(&self, group_name: &str) -> Option<&NodeConfig> {
        self.network.node_sets.iter().find(|n| n.name == group_name)
    }
}

fn validate_probe(owner: &str, probe: &ProbesConfig) -> Result<(), ConfigError> {
    let empty = |s: &str| s.trim().is_empty();
    let bad = probe.http.as_ref().is_some_and(|p| empty(&p.url))
        || probe.tcp.as_ref().is_some_and(|p| empty(&p.address))
        || probe
            .postgres
            .as_ref()
            .is_some_and(|p| empty(&p.connection) || empty(&p.query));
    if bad {
        return Err(ConfigError::Validation(format!(
            "readiness probe of '{}' has an empty target",
            owner
        )));
    }
    Ok(())
}

fn validate_job_template(job: &JobTemplate) -> Result<(), ConfigError> {
    if job.source.is_empty() {
        return Err(ConfigError::Validation(format!(
            "job '{}' needs a template or template_file",
            job.name
        )));
    }
    Ok(())
}

fn expand(path: &mut PathBuf) -> Result<(), ConfigError> {
    let raw = path.to_string_lossy().into_owned();
    let expanded =
        shellexpand::full(&raw).map_err(|e| ConfigError::Expand(raw.clone(), e.to_string()))?;
    *path = PathBuf::from(expanded.as_ref());
    Ok(())
}

fn expand_opt(path: &mut Option<PathBuf>) -> Result<(), ConfigError> {
    match path {
        Some(p) => expand(p),
        None => Ok(()),
    }
}
