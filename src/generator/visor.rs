//! Visor generation
//!
//! The visor supervises the node process. Its run config is written twice:
//! to the genesis run config used on first start and to the upgrade run
//! config picked up at a protocol upgrade.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::contexts::NodeSetContext;
use super::template::render_with;
use super::{create_dir, merge, path_arg, GenerateError, InitOutput};
use crate::config::TemplateSource;
use crate::exec;
use crate::types::{GeneratedService, Visor};

pub const RUN_CONFIG_FILE: &str = "run-config.toml";
pub const GENESIS_DIR: &str = "genesis";
pub const UPGRADE_DIR: &str = "upgrade";

pub async fn generate(
    name: &str,
    binary: &Path,
    home: &Path,
    run_template: &TemplateSource,
    ctx: &NodeSetContext,
    cancel: &CancellationToken,
) -> Result<Visor, GenerateError> {
    create_dir(home)?;
    let out: InitOutput = exec::run_json(
        binary,
        &["init", "--home", path_arg(home).as_str(), "--output", "json"],
        cancel,
    )
    .await?;

    let genesis = home.join(GENESIS_DIR).join(RUN_CONFIG_FILE);
    let upgrade = home.join(UPGRADE_DIR).join(RUN_CONFIG_FILE);

    // Without a template the baseline is still copied to both run configs.
    let rendered = match run_template.resolve()? {
        Some(text) => render_with(&text, ctx).map_err(|source| GenerateError::Template {
            service: name.to_string(),
            source,
        })?,
        None => String::new(),
    };
    merge::merge_into(&genesis, &rendered, &[genesis.as_path(), upgrade.as_path()]).map_err(
        |source| GenerateError::Merge {
            service: name.to_string(),
            source,
        },
    )?;

    Ok(Visor {
        service: GeneratedService::new(name, home.to_path_buf(), out.config_file_path),
        binary: binary.to_path_buf(),
        genesis_run_config: genesis,
        upgrade_run_config: upgrade,
    })
}
