//! Scheduler contexts
//!
//! Named scheduler endpoints persisted at `~/.capsule/config`, in the
//! spirit of kubeconfig contexts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::nomad::DEFAULT_SCHEDULER_ADDR;

/// Name of the built-in context pointing at a local scheduler agent
pub const LOCAL_CONTEXT: &str = "local";

/// Default config file location: ~/.capsule/config
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".capsule")
        .join("config")
}

/// Errors that can occur during context operations
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("Context '{0}' is built in and cannot be changed")]
    BuiltIn(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A named scheduler endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    /// Scheduler API address (e.g., "http://10.0.0.5:4646")
    pub url: String,
    /// Optional ACL token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Context {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn local() -> Self {
        Self::new(LOCAL_CONTEXT, DEFAULT_SCHEDULER_ADDR)
    }
}

/// The complete client config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Currently active context name, `local` when unset
    #[serde(rename = "current-context", default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

pub fn parse_config(content: &str) -> Result<Config, ContextError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(content).map_err(|e| ContextError::ParseError(e.to_string()))
}

pub fn serialize_config(config: &Config) -> Result<String, ContextError> {
    serde_yaml::to_string(config).map_err(|e| ContextError::WriteError(e.to_string()))
}

/// Add or update a context
pub fn add_context(config: &mut Config, context: Context) -> Result<(), ContextError> {
    if context.name == LOCAL_CONTEXT {
        return Err(ContextError::BuiltIn(context.name));
    }
    config.contexts.insert(context.name.clone(), context);
    Ok(())
}

/// Remove a context, falling back to `local` if it was the current one
pub fn remove_context(config: &mut Config, name: &str) -> Option<Context> {
    let removed = config.contexts.remove(name);
    if config.current_context.as_deref() == Some(name) {
        config.current_context = None;
    }
    removed
}

pub fn set_current_context(config: &mut Config, name: &str) -> Result<(), ContextError> {
    if name != LOCAL_CONTEXT && !config.contexts.contains_key(name) {
        return Err(ContextError::ContextNotFound(name.to_string()));
    }
    config.current_context = Some(name.to_string());
    Ok(())
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from a path; a missing file is an empty config
pub fn load_config_from(path: &Path) -> Result<Config, ContextError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ContextError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ContextError> {
    let io_err = |source| ContextError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content).map_err(io_err)
}

impl Config {
    pub fn current_name(&self) -> &str {
        self.current_context.as_deref().unwrap_or(LOCAL_CONTEXT)
    }

    /// Resolve a context by name, including the built-in `local`
    pub fn get(&self, name: &str) -> Result<Context, ContextError> {
        if let Some(ctx) = self.contexts.get(name) {
            return Ok(ctx.clone());
        }
        if name == LOCAL_CONTEXT {
            return Ok(Context::local());
        }
        Err(ContextError::ContextNotFound(name.to_string()))
    }

    pub fn current(&self) -> Result<Context, ContextError> {
        self.get(self.current_name())
    }

    /// Every context including `local`, sorted by name
    pub fn all(&self) -> Vec<Context> {
        let mut contexts: Vec<Context> = self.contexts.values().cloned().collect();
        if !self.contexts.contains_key(LOCAL_CONTEXT) {
            contexts.push(Context::local());
        }
        contexts.sort_by(|a, b| a.name.cmp(&b.name));
        contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_local() {
        let config = Config::default();
        assert_eq!(config.current_name(), "local");
        let ctx = config.current().unwrap();
        assert_eq!(ctx.url, "http://127.0.0.1:4646");
        assert!(ctx.token.is_none());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
current-context: staging
contexts:
  staging:
    name: staging
    url: http://10.0.0.5:4646
    token: s3cr3t
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.current_name(), "staging");
        let ctx = config.current().unwrap();
        assert_eq!(ctx.url, "http://10.0.0.5:4646");
        assert_eq!(ctx.token.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_parse_empty_config() {
        assert_eq!(parse_config("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = parse_config("contexts: [1, 2");
        assert!(matches!(result, Err(ContextError::ParseError(_))));
    }

    #[test]
    fn test_serialize_config() {
        let mut config = Config::default();
        add_context(&mut config, Context::new("staging", "http://10.0.0.5:4646")).unwrap();
        set_current_context(&mut config, "staging").unwrap();

        let yaml = serialize_config(&config).unwrap();
        assert!(yaml.contains("current-context: staging"));
        assert!(yaml.contains("url: http://10.0.0.5:4646"));
        assert!(!yaml.contains("token"));
    }

    #[test]
    fn test_add_local_rejected() {
        let mut config = Config::default();
        let result = add_context(&mut config, Context::new("local", "http://elsewhere:4646"));
        assert!(matches!(result, Err(ContextError::BuiltIn(_))));
    }

    #[test]
    fn test_remove_current_context_falls_back_to_local() {
        let mut config = Config::default();
        add_context(&mut config, Context::new("staging", "http://10.0.0.5:4646")).unwrap();
        set_current_context(&mut config, "staging").unwrap();

        let removed = remove_context(&mut config, "staging");
        assert!(removed.is_some());
        assert_eq!(config.current_name(), "local");
    }

    #[test]
    fn test_set_current_context_not_found() {
        let mut config = Config::default();
        let result = set_current_context(&mut config, "nonexistent");
        assert!(matches!(result, Err(ContextError::ContextNotFound(_))));
    }

    #[test]
    fn test_all_includes_local_sorted() {
        let mut config = Config::default();
        add_context(&mut config, Context::new("staging", "http://10.0.0.5:4646")).unwrap();
        add_context(&mut config, Context::new("devnet", "http://10.0.0.6:4646")).unwrap();

        let names: Vec<String> = config.all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["devnet", "local", "staging"]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config");

        let mut config = Config::default();
        add_context(
            &mut config,
            Context::new("staging", "http://10.0.0.5:4646").with_token("s3cr3t"),
        )
        .unwrap();
        save_config_to(&config, &path).unwrap();

        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent")).unwrap();
        assert_eq!(config, Config::default());
    }
}
