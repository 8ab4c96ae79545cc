//! Wallet generation

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::contexts::{NodeSetSummary, ServiceContext};
use super::{apply_template, create_dir, path_arg, GenerateError, Generator, InitOutput};
use crate::config::WalletConfig;
use crate::exec;
use crate::types::{GeneratedService, Wallet};

pub async fn generate(
    gen: &Generator<'_>,
    cfg: &WalletConfig,
    node_sets: &[NodeSetSummary],
    cancel: &CancellationToken,
) -> Result<Wallet, GenerateError> {
    let home = gen.output_dir().join(&cfg.name);
    create_dir(&home)?;

    let binary = cfg
        .binary
        .clone()
        .unwrap_or_else(|| gen.config().vega_binary.clone());
    let out: InitOutput = exec::run_json(
        &binary,
        &[
            "wallet".to_string(),
            "init".to_string(),
            "--home".to_string(),
            path_arg(&home),
            "--output".to_string(),
            "json".to_string(),
        ],
        cancel,
    )
    .await?;

    let name = gen.service_name(&cfg.name);
    let ctx = ServiceContext::new(gen, &name, home.clone(), node_sets);
    apply_template(&name, &cfg.config, &ctx, &out.config_file_path)?;

    info!("Generated wallet '{}'", name);
    Ok(Wallet {
        service: GeneratedService::new(name, home, out.config_file_path),
        binary,
    })
}
