//! Aggregate root of everything generated for a network

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::node_set::{filter_node_sets, NodeSet, NodeSetFilter, PreGenerateJob};
use super::service::{Faucet, GeneratedBinary, GeneratedService, Wallet};
use super::RegistryError;

/// Generated wallet, faucet, binaries and node sets of one network.
///
/// Built once from finished artifacts; the node-set map is keyed by
/// `NodeSet::name` and the flattened pre-generate job list is derived at
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedServices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Wallet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faucet: Option<Faucet>,
    #[serde(default)]
    pub binaries: Vec<GeneratedBinary>,
    #[serde(default)]
    pub node_sets: BTreeMap<String, NodeSet>,
    #[serde(default)]
    pub pre_generate_jobs: Vec<PreGenerateJob>,
}

impl GeneratedServices {
    pub fn new(
        wallet: Option<Wallet>,
        faucet: Option<Faucet>,
        binaries: Vec<GeneratedBinary>,
        node_sets: Vec<NodeSet>,
    ) -> Self {
        let mut ordered: Vec<&NodeSet> = node_sets.iter().collect();
        ordered.sort_by_key(|ns| ns.index);
        let pre_generate_jobs = ordered
            .iter()
            .flat_map(|ns| ns.pre_generate_jobs.iter().cloned())
            .collect();

        let node_sets = node_sets
            .into_iter()
            .map(|ns| (ns.name.clone(), ns))
            .collect();

        Self {
            wallet,
            faucet,
            binaries,
            node_sets,
            pre_generate_jobs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_sets.is_empty()
    }

    /// Resolve any constituent service by its generated name
    pub fn get_by_name(&self, name: &str) -> Option<&GeneratedService> {
        if let Some(wallet) = self.wallet.as_ref().filter(|w| w.service.name == name) {
            return Some(&wallet.service);
        }
        if let Some(faucet) = self.faucet.as_ref().filter(|f| f.service.name == name) {
            return Some(&faucet.service);
        }
        for ns in self.node_sets.values() {
            if let Some(svc) = ns.services().into_iter().find(|s| s.name == name) {
                return Some(svc);
            }
        }
        self.binaries
            .iter()
            .map(|b| &b.service)
            .find(|s| s.name == name)
    }

    pub fn node_set_by_name(&self, name: &str) -> Result<&NodeSet, RegistryError> {
        self.node_sets
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Node sets ordered by index
    pub fn to_slice(&self) -> Vec<&NodeSet> {
        let mut sets: Vec<&NodeSet> = self.node_sets.values().collect();
        sets.sort_by_key(|ns| ns.index);
        sets
    }

    /// Node sets passing every filter, ordered by index
    pub fn filtered(&self, filters: &[NodeSetFilter]) -> Vec<&NodeSet> {
        filter_node_sets(self.to_slice(), filters)
    }

    pub fn validators(&self) -> Vec<&NodeSet> {
        self.to_slice().into_iter().filter(|ns| ns.is_validator()).collect()
    }

    pub fn non_validators(&self) -> Vec<&NodeSet> {
        self.to_slice().into_iter().filter(|ns| !ns.is_validator()).collect()
    }

    pub fn pre_generate_job_ids(&self) -> Vec<&str> {
        self.pre_generate_jobs
            .iter()
            .map(|j| j.job_id.as_str())
            .collect()
    }
}
