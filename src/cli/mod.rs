//! CLI module for capsule
//!
//! Provides subcommands:
//! - `capsule network` - Generate, start, stop, destroy, inspect and probe a network
//! - `capsule nodes` - List, start and stop individual node sets
//! - `capsule context` - Manage scheduler contexts

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "capsule")]
#[command(about = "Provision and run ephemeral validator networks on a cluster scheduler")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the client config file (default: ~/.capsule/config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Network directory (default: ~/.capsule/testnet, or the config's
    /// output_dir for `network generate`)
    #[arg(long, global = true, env = "CAPSULE_HOME")]
    pub home: Option<PathBuf>,

    /// Scheduler address, overrides the current context
    #[arg(long, global = true, env = "CAPSULE_SCHEDULER_ADDR")]
    pub scheduler_url: Option<String>,

    /// Scheduler ACL token, overrides the current context
    #[arg(long, global = true, env = "CAPSULE_SCHEDULER_TOKEN", hide_env_values = true)]
    pub scheduler_token: Option<String>,

    /// Path to a .env file loaded before anything else
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    #[command(flatten)]
    pub timing: TimingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Deployment and probe timing
#[derive(Parser, Debug, Clone)]
pub struct TimingArgs {
    /// Seconds between deployment status polls
    #[arg(long, global = true, default_value = "5", value_name = "SECS")]
    pub poll_interval: u64,

    /// Seconds to wait for a deployment to settle
    #[arg(long, global = true, default_value = "300", value_name = "SECS")]
    pub wait_timeout: u64,

    /// Treat a deployment that has not settled in time as successful
    #[arg(long, global = true)]
    pub assume_success_on_timeout: bool,

    /// Give up on a deployment as soon as the scheduler reports it failed
    #[arg(long, global = true)]
    pub fail_on_failed_deployment: bool,

    /// Seconds allowed for all readiness probes of a node set
    #[arg(long, global = true, default_value = "60", value_name = "SECS")]
    pub probe_timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the whole network
    Network(NetworkArgs),

    /// Manage individual node sets
    Nodes(NodesArgs),

    /// Manage scheduler contexts
    Context(ContextArgs),
}

#[derive(Parser, Debug)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub action: NetworkAction,
}

#[derive(Subcommand, Debug)]
pub enum NetworkAction {
    /// Generate configs for every service of a network
    Generate {
        /// Network config (YAML, or JSON with a .json extension)
        config: PathBuf,
    },

    /// Start every job of a generated network
    Start,

    /// Stop every running job
    Stop,

    /// Purge every job and delete the network directory
    Destroy,

    /// Show the scheduler status of every job
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run the readiness probes of every node set
    Probe,
}

#[derive(Parser, Debug)]
pub struct NodesArgs {
    #[command(subcommand)]
    pub action: NodesAction,
}

#[derive(Subcommand, Debug)]
pub enum NodesAction {
    /// List generated node sets
    #[command(name = "ls", visible_alias = "list")]
    Ls,

    /// Start one node set
    Start {
        /// Node set name
        name: String,
    },

    /// Stop one node set
    Stop {
        /// Node set name
        name: String,
    },
}

/// Arguments for the context command
#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// List all contexts
    List,

    /// Show current context
    Current,

    /// Switch to a context
    Use {
        /// Context name
        name: String,
    },

    /// Add a new context
    Add {
        /// Context name
        name: String,

        /// Scheduler address
        #[arg(long)]
        url: String,

        /// ACL token for authentication
        #[arg(long)]
        token: Option<String>,
    },

    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}
