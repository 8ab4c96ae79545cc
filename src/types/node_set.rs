//! Node sets and node-set filters

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::service::{DataNode, GeneratedService, TendermintNode, VegaNode, Visor};
use crate::probes::ProbesConfig;

/// Operating mode of a node set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    Validator,
    Full,
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Validator => f.write_str("validator"),
            NodeMode::Full => f.write_str("full"),
        }
    }
}

/// A job that had to complete before a node set was generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreGenerateJob {
    pub name: String,
    pub job_id: String,
}

/// One group of co-located node processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSet {
    pub group_name: String,
    pub name: String,
    pub mode: NodeMode,
    /// Unique across the network, assigned in generation order
    pub index: usize,
    /// Position within the group
    pub relative_index: usize,
    pub vega: VegaNode,
    pub tendermint: TendermintNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_node: Option<DataNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visor: Option<Visor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_generate_jobs: Vec<PreGenerateJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ProbesConfig>,
    /// Rendered scheduler job replacing the default one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_raw: Option<String>,
}

impl NodeSet {
    pub fn is_validator(&self) -> bool {
        self.mode == NodeMode::Validator
    }

    /// Every generated service that belongs to this node set
    pub fn services(&self) -> Vec<&GeneratedService> {
        let mut services = vec![&self.vega.service, &self.tendermint.service];
        if let Some(dn) = &self.data_node {
            services.push(&dn.service);
        }
        if let Some(visor) = &self.visor {
            services.push(&visor.service);
        }
        services
    }
}

/// Predicate over node sets
pub type NodeSetFilter = Box<dyn Fn(&NodeSet) -> bool + Send + Sync>;

/// Keep node sets whose name is in `names`
pub fn filter_by_name<I, S>(names: I) -> NodeSetFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: HashSet<String> = names.into_iter().map(Into::into).collect();
    Box::new(move |ns: &NodeSet| names.contains(&ns.name))
}

/// Keep node sets whose group name is in `groups`
pub fn filter_by_group_name<I, S>(groups: I) -> NodeSetFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let groups: HashSet<String> = groups.into_iter().map(Into::into).collect();
    Box::new(move |ns: &NodeSet| groups.contains(&ns.group_name))
}

/// Keep node sets that pass every filter. No filters keeps everything.
pub fn filter_node_sets<'a, I>(node_sets: I, filters: &[NodeSetFilter]) -> Vec<&'a NodeSet>
where
    I: IntoIterator<Item = &'a NodeSet>,
{
    node_sets
        .into_iter()
        .filter(|ns| filters.iter().all(|f| f(*ns)))
        .collect()
}
