//! Template contexts
//!
//! Templates address these fields as `{{ .field }}`.

use std::path::PathBuf;

use serde::Serialize;

use crate::types::{NodeMode, NodeSet};

/// Context of node, consensus-layer, data-node, visor, job and probe
/// templates of one node set.
///
/// Init results (`node_id`, `validator_public_key`) are unset when
/// pre-generate jobs are rendered.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSetContext {
    pub prefix: String,
    pub network_name: String,
    pub chain_id: String,
    pub output_dir: PathBuf,

    pub name: String,
    pub group_name: String,
    pub mode: NodeMode,
    pub index: usize,
    pub relative_index: usize,

    pub vega_binary: PathBuf,
    pub vega_home: PathBuf,
    pub tendermint_home: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_node_home: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visor_home: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_public_key: Option<String>,

    /// Every initiated node set of the network, in index order
    pub node_sets: Vec<NodeSetSummary>,
}

/// What templates may know about another node set
#[derive(Debug, Clone, Serialize)]
pub struct NodeSetSummary {
    pub name: String,
    pub group_name: String,
    pub mode: NodeMode,
    pub index: usize,
    pub node_id: String,
    pub vega_home: PathBuf,
    pub tendermint_home: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_node_home: Option<PathBuf>,
}

impl From<&NodeSet> for NodeSetSummary {
    fn from(ns: &NodeSet) -> Self {
        Self {
            name: ns.name.clone(),
            group_name: ns.group_name.clone(),
            mode: ns.mode,
            index: ns.index,
            node_id: ns.tendermint.node_id.clone(),
            vega_home: ns.vega.service.home_dir.clone(),
            tendermint_home: ns.tendermint.service.home_dir.clone(),
            data_node_home: ns.data_node.as_ref().map(|d| d.service.home_dir.clone()),
        }
    }
}

/// Context of wallet, faucet and binary templates
#[derive(Debug, Clone, Serialize)]
pub struct ServiceContext {
    pub prefix: String,
    pub network_name: String,
    pub chain_id: String,
    pub output_dir: PathBuf,

    pub name: String,
    pub home_dir: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_file: Option<PathBuf>,

    pub node_sets: Vec<NodeSetSummary>,
    pub validators: Vec<NodeSetSummary>,
}

impl ServiceContext {
    pub fn new(
        generator: &super::Generator<'_>,
        name: impl Into<String>,
        home_dir: PathBuf,
        node_sets: &[NodeSetSummary],
    ) -> Self {
        let config = generator.config();
        Self {
            prefix: config.prefix.clone(),
            network_name: config.network.name.clone(),
            chain_id: generator.chain_id().to_string(),
            output_dir: config.output_dir.clone(),
            name: name.into(),
            home_dir,
            public_key: None,
            passphrase_file: None,
            node_sets: node_sets.to_vec(),
            validators: node_sets
                .iter()
                .filter(|ns| ns.mode == NodeMode::Validator)
                .cloned()
                .collect(),
        }
    }
}

/// Context of network-level pre-start job templates
#[derive(Debug, Clone, Serialize)]
pub struct NetworkContext {
    pub prefix: String,
    pub network_name: String,
    pub chain_id: String,
    pub output_dir: PathBuf,
    pub node_sets: Vec<NodeSetSummary>,
}

impl NetworkContext {
    pub fn new(config: &crate::config::NetworkConfig, chain_id: &str, node_sets: &[&NodeSet]) -> Self {
        Self {
            prefix: config.prefix.clone(),
            network_name: config.network.name.clone(),
            chain_id: chain_id.to_string(),
            output_dir: config.output_dir.clone(),
            node_sets: node_sets.iter().map(|ns| NodeSetSummary::from(*ns)).collect(),
        }
    }
}
