//! Network state store
//!
//! The durable snapshot of a network lives in `network.dat` inside the
//! network's output directory: the state serialized as JSON, then
//! hex-encoded. A missing file means no network has been generated yet.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::types::{GeneratedServices, NetworkJobs};

pub const STATE_FILE_NAME: &str = "network.dat";

/// Errors that can occur while loading or persisting network state
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode network state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Network state is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Failed to decode network state: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    #[serde(default)]
    pub config: Option<NetworkConfig>,
    #[serde(default)]
    pub generated_services: Option<GeneratedServices>,
    #[serde(default)]
    pub running_jobs: Option<NetworkJobs>,
    #[serde(default)]
    pub vega_chain_id: String,
}

impl NetworkState {
    /// True when no config or no node sets are recorded
    pub fn empty(&self) -> bool {
        self.config.is_none()
            || self
                .generated_services
                .as_ref()
                .map_or(true, GeneratedServices::is_empty)
    }

    /// True when non-empty and at least one node-set job is recorded
    pub fn running(&self) -> bool {
        !self.empty()
            && self
                .running_jobs
                .as_ref()
                .is_some_and(|jobs| !jobs.node_set_jobs.is_empty())
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.config.as_ref().map(|c| c.output_dir.as_path())
    }

    pub fn encode(&self) -> Result<String, StateError> {
        let json = serde_json::to_vec(self).map_err(StateError::Encode)?;
        Ok(hex::encode(json))
    }

    /// Inverse of [`encode`](Self::encode); blank input yields the empty state
    pub fn decode(data: &[u8]) -> Result<Self, StateError> {
        let data = data.trim_ascii();
        if data.is_empty() {
            return Ok(Self::default());
        }
        let json = hex::decode(data)?;
        serde_json::from_slice(&json).map_err(StateError::Decode)
    }

    /// Write the state to `dir/network.dat`, replacing any previous file
    pub fn persist(&self, dir: &Path) -> Result<(), StateError> {
        std::fs::create_dir_all(dir).map_err(|source| StateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = state_file_path(dir);
        let tmp = dir.join(format!("{}.tmp", STATE_FILE_NAME));
        let encoded = self.encode()?;

        std::fs::write(&tmp, encoded).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;

        info!("Network state persisted to {}", path.display());
        Ok(())
    }
}

pub fn state_file_path(dir: &Path) -> PathBuf {
    dir.join(STATE_FILE_NAME)
}

/// Load the state of the network in `dir`.
///
/// A missing state file yields the empty state. The recorded output
/// directory is replaced with `dir` so a moved network stays consistent.
pub fn load_network_state(dir: &Path) -> Result<NetworkState, StateError> {
    let path = state_file_path(dir);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No network state at {}", path.display());
            return Ok(NetworkState::default());
        }
        Err(source) => return Err(StateError::Io { path, source }),
    };

    let mut state = NetworkState::decode(&data)?;
    if let Some(config) = state.config.as_mut() {
        config.output_dir = dir.to_path_buf();
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::sample_config;
    use crate::types::node_set::fixtures::seven_node_sets;

    fn full_state(dir: &Path) -> NetworkState {
        let mut jobs = NetworkJobs::new();
        jobs.add_node_set_job("ns1");
        jobs.add_extra_job("ganache");
        jobs.set_faucet_job("st-local-faucet");

        NetworkState {
            config: Some(sample_config(dir)),
            generated_services: Some(GeneratedServices::new(None, None, vec![], seven_node_sets())),
            running_jobs: Some(jobs),
            vega_chain_id: "testnet-20260101000000".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let state = full_state(Path::new("/tmp/net"));
        let encoded = state.encode().unwrap();
        assert!(encoded.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(NetworkState::decode(encoded.as_bytes()).unwrap(), state);
    }

    #[test]
    fn test_decode_blank_is_empty() {
        let state = NetworkState::decode(b"").unwrap();
        assert!(state.empty());
        assert!(!state.running());
        assert_eq!(state, NetworkState::default());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(NetworkState::decode(b"zz"), Err(StateError::Hex(_))));
        let not_json = hex::encode("not json");
        assert!(matches!(
            NetworkState::decode(not_json.as_bytes()),
            Err(StateError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_and_running() {
        let mut state = full_state(Path::new("/tmp/net"));
        assert!(!state.empty());
        assert!(state.running());

        state.running_jobs.as_mut().unwrap().remove("ns1");
        assert!(!state.running());

        state.generated_services = Some(GeneratedServices::default());
        assert!(state.empty());
    }

    #[test]
    fn test_load_missing_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_network_state(dir.path()).unwrap();
        assert!(state.empty());
    }

    #[test]
    fn test_persist_and_load_relocated() {
        let original = tempfile::tempdir().unwrap();
        let moved = tempfile::tempdir().unwrap();

        let state = full_state(original.path());
        state.persist(original.path()).unwrap();
        assert!(!original.path().join("network.dat.tmp").exists());

        std::fs::copy(
            state_file_path(original.path()),
            state_file_path(moved.path()),
        )
        .unwrap();

        let loaded = load_network_state(moved.path()).unwrap();
        assert_eq!(loaded.output_dir(), Some(moved.path()));
        assert_eq!(loaded.generated_services, state.generated_services);
        assert_eq!(loaded.running_jobs, state.running_jobs);
        assert_eq!(loaded.vega_chain_id, state.vega_chain_id);
    }
}
