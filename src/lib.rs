//! capsule: provision, deploy and supervise ephemeral validator networks
//! on a Nomad-compatible cluster scheduler.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod generator;
pub mod network;
pub mod probes;
pub mod scheduler;
pub mod state;
pub mod types;
