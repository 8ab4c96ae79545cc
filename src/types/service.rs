//! Generated service artifacts

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::NodeMode;

/// Common part of every generated artifact.
///
/// `config_file_path` and `home_dir` are the join key used to find a running
/// instance's configuration; both exist on disk once generation succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedService {
    pub name: String,
    pub config_file_path: PathBuf,
    pub home_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debugger_port: Option<u16>,
}

impl GeneratedService {
    pub fn new(name: impl Into<String>, home_dir: PathBuf, config_file_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            config_file_path,
            home_dir,
            debugger_port: None,
        }
    }

    /// Fails unless both the home directory and the config file exist
    pub fn verify_on_disk(&self) -> std::io::Result<()> {
        ensure_exists(&self.home_dir, true)?;
        ensure_exists(&self.config_file_path, false)
    }
}

fn ensure_exists(path: &Path, dir: bool) -> std::io::Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
    })?;
    if meta.is_dir() != dir {
        let expected = if dir { "a directory" } else { "a file" };
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is not {}", path.display(), expected),
        ));
    }
    Ok(())
}

/// The chain node of a node set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegaNode {
    pub service: GeneratedService,
    pub mode: NodeMode,
    pub binary: PathBuf,
}

/// The consensus-layer node of a node set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TendermintNode {
    pub service: GeneratedService,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_public_key: Option<String>,
}

/// Data-indexing node attached to a node set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNode {
    pub service: GeneratedService,
    pub binary: PathBuf,
}

/// Process supervisor wrapping the node of a node set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visor {
    pub service: GeneratedService,
    pub binary: PathBuf,
    /// Run config used on first start
    pub genesis_run_config: PathBuf,
    /// Run config picked up at protocol upgrade
    pub upgrade_run_config: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub service: GeneratedService,
    pub binary: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faucet {
    pub service: GeneratedService,
    pub binary: PathBuf,
    pub public_key: String,
    pub passphrase_file: PathBuf,
}

/// Generic binary service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBinary {
    pub service: GeneratedService,
    pub binary: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}
