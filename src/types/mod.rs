//! Topology & service registry
//!
//! In-memory model of a generated network: node sets, their sub-services,
//! the wallet/faucet/binary services and the scheduler job ids that run them.

pub mod jobs;
pub mod node_set;
pub mod service;
pub mod services;

pub use jobs::NetworkJobs;
pub use node_set::{
    filter_by_group_name, filter_by_name, filter_node_sets, NodeMode, NodeSet, NodeSetFilter,
    PreGenerateJob,
};
pub use service::{
    DataNode, Faucet, GeneratedBinary, GeneratedService, TendermintNode, VegaNode, Visor, Wallet,
};
pub use services::GeneratedServices;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Node set '{0}' not found")]
    NotFound(String),
}
