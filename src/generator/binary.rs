//! Generic binary services
//!
//! Binaries have no init command of their own: the home directory and an
//! empty baseline config are created here, then the template is merged in.
//! Run arguments accept template syntax.

use super::contexts::{NodeSetSummary, ServiceContext};
use super::template::render_fields;
use super::{apply_template, create_dir, GenerateError, Generator};
use crate::config::BinaryConfig;
use crate::types::{GeneratedBinary, GeneratedService};

pub const BINARIES_DIR: &str = "binaries";
pub const CONFIG_FILE: &str = "config.toml";

pub fn generate(
    gen: &Generator<'_>,
    cfg: &BinaryConfig,
    node_sets: &[NodeSetSummary],
) -> Result<GeneratedBinary, GenerateError> {
    let home = gen.output_dir().join(BINARIES_DIR).join(&cfg.name);
    create_dir(&home)?;

    let config_path = home.join(CONFIG_FILE);
    if !config_path.exists() {
        std::fs::write(&config_path, "").map_err(|source| GenerateError::Io {
            path: config_path.clone(),
            source,
        })?;
    }

    let name = gen.service_name(&cfg.name);
    let ctx = ServiceContext::new(gen, &name, home.clone(), node_sets);
    apply_template(&name, &cfg.config, &ctx, &config_path)?;

    let mut rendered = cfg.clone();
    render_fields(&mut rendered, &ctx).map_err(|source| GenerateError::Template {
        service: name.clone(),
        source,
    })?;

    Ok(GeneratedBinary {
        service: GeneratedService::new(name, home, config_path),
        binary: cfg.binary.clone(),
        args: rendered.args,
    })
}
