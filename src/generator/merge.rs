//! Merging rendered templates into self-initialized TOML configs

use std::path::{Path, PathBuf};

use thiserror::Error;
use toml::{Table, Value};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Rendered template is not valid TOML: {0}")]
    Rendered(#[source] toml::de::Error),

    #[error("Config {} is not valid TOML: {source}", .path.display())]
    Baseline {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize merged config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Deep-merge `overlay` into `base`. Tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let incoming = match value {
            Value::Table(incoming) => incoming,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        if let Some(Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, Value::Table(incoming));
    }
}

/// Read a TOML table
pub fn read_table(path: &Path) -> Result<Table, MergeError> {
    let content = std::fs::read_to_string(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content.parse::<Table>().map_err(|source| MergeError::Baseline {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a TOML table; a missing file is an empty table
pub fn read_table_or_empty(path: &Path) -> Result<Table, MergeError> {
    if !path.exists() {
        return Ok(Table::new());
    }
    read_table(path)
}

/// Merge `rendered` over the config at `baseline` and write the result to
/// every destination. A missing baseline counts as empty.
pub fn merge_into(
    baseline: &Path,
    rendered: &str,
    destinations: &[&Path],
) -> Result<(), MergeError> {
    write_merged(read_table_or_empty(baseline)?, rendered, destinations)
}

/// Merge `rendered` into the config at `path` in place.
///
/// The config must already exist: it is the baseline written by the
/// service's own init command.
pub fn merge_file(path: &Path, rendered: &str) -> Result<(), MergeError> {
    write_merged(read_table(path)?, rendered, &[path])
}

fn write_merged(mut merged: Table, rendered: &str, destinations: &[&Path]) -> Result<(), MergeError> {
    let overlay = rendered.parse::<Table>().map_err(MergeError::Rendered)?;
    merge_tables(&mut merged, overlay);
    let output = toml::to_string(&merged)?;

    for dest in destinations {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MergeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(dest, &output).map_err(|source| MergeError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
