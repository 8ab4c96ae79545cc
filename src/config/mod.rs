pub mod network;

pub use network::{
    BinaryConfig, FaucetConfig, JobTemplate, NetworkConfig, NetworkDefinition, NodeConfig,
    TemplateSource, WalletConfig,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a network config
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Validation(String),

    #[error("Failed to read template file {}: {source}", .path.display())]
    TemplateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to expand path '{0}': {1}")]
    Expand(String, String),
}

/// Encoding of a config document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.json` files are JSON, everything else YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

// ============================================================================
// SBIO: Pure parsing (no I/O)
// ============================================================================

/// Parse and validate a network config
pub fn parse_network_config(
    content: &str,
    format: ConfigFormat,
) -> Result<NetworkConfig, ConfigError> {
    let config: NetworkConfig = match format {
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        }
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        }
    };
    config.validate()?;
    Ok(config)
}

// ============================================================================
// SBIO: I/O wrapper
// ============================================================================

/// Load a network config from disk and expand its paths
pub fn load_network_config(path: &Path) -> Result<NetworkConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_network_config(&content, ConfigFormat::from_path(path))?;
    config.expand_paths()?;
    Ok(config)
}
