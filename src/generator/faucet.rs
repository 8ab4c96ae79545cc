//! Faucet generation

use std::path::PathBuf;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::contexts::{NodeSetSummary, ServiceContext};
use super::{apply_template, create_dir, path_arg, GenerateError, Generator};
use crate::config::FaucetConfig;
use crate::exec;
use crate::types::{Faucet, GeneratedService};

pub const PASSPHRASE_FILE: &str = "passphrase.txt";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaucetInitOutput {
    public_key: String,
    config_file_path: PathBuf,
}

pub async fn generate(
    gen: &Generator<'_>,
    cfg: &FaucetConfig,
    node_sets: &[NodeSetSummary],
    cancel: &CancellationToken,
) -> Result<Faucet, GenerateError> {
    let home = gen.output_dir().join(&cfg.name);
    create_dir(&home)?;

    let passphrase_file = home.join(PASSPHRASE_FILE);
    std::fs::write(&passphrase_file, &cfg.passphrase).map_err(|source| GenerateError::Io {
        path: passphrase_file.clone(),
        source,
    })?;

    let binary = cfg
        .binary
        .clone()
        .unwrap_or_else(|| gen.config().vega_binary.clone());
    let out: FaucetInitOutput = exec::run_json(
        &binary,
        &[
            "faucet".to_string(),
            "init".to_string(),
            "--home".to_string(),
            path_arg(&home),
            "--passphrase-file".to_string(),
            path_arg(&passphrase_file),
            "--output".to_string(),
            "json".to_string(),
        ],
        cancel,
    )
    .await?;

    let name = gen.service_name(&cfg.name);
    let mut ctx = ServiceContext::new(gen, &name, home.clone(), node_sets);
    ctx.public_key = Some(out.public_key.clone());
    ctx.passphrase_file = Some(passphrase_file.clone());
    apply_template(&name, &cfg.config, &ctx, &out.config_file_path)?;

    info!("Generated faucet '{}' with public key {}", name, out.public_key);
    Ok(Faucet {
        service: GeneratedService::new(name, home, out.config_file_path),
        binary,
        public_key: out.public_key,
        passphrase_file,
    })
}
