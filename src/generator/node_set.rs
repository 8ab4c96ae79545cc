//! Node-set generation
//!
//! Each node set is planned from its group config, its pre-generate jobs are
//! run, then the consensus-layer node, the node and the optional data node
//! are initiated. Templates are applied once every node set is initiated so
//! that they can reference peers.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::contexts::{NodeSetContext, NodeSetSummary};
use super::{apply_template, create_dir, path_arg, visor, GenerateError, Generator, InitOutput};
use crate::config::{NetworkConfig, NodeConfig};
use crate::error::MultiError;
use crate::exec;
use crate::generator::template::{render_fields, render_with};
use crate::scheduler::Job;
use crate::types::{
    DataNode, GeneratedService, NodeSet, PreGenerateJob, TendermintNode, VegaNode,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TendermintInitOutput {
    node_id: String,
    #[serde(default)]
    validator_public_key: Option<String>,
    config_file_path: PathBuf,
}

/// Identity and directories of a node set before anything is generated
#[derive(Debug, Clone)]
pub struct NodeSetPlan<'a> {
    pub node_config: &'a NodeConfig,
    pub name: String,
    pub index: usize,
    pub relative_index: usize,
    pub vega_home: PathBuf,
    pub tendermint_home: PathBuf,
    pub data_node_home: Option<PathBuf>,
    pub visor_home: Option<PathBuf>,
}

/// Lay out every node set in config order with global indices
pub fn plan_node_sets(config: &NetworkConfig) -> Vec<NodeSetPlan<'_>> {
    let home = |prefix: &str, index: usize| {
        config.output_dir.join(prefix).join(format!("node{}", index))
    };

    let mut plans = Vec::new();
    let mut index = 0;
    for node_config in &config.network.node_sets {
        for relative_index in 0..node_config.count {
            plans.push(NodeSetPlan {
                node_config,
                name: node_set_name(&config.prefix, &node_config.name, index, node_config),
                index,
                relative_index,
                vega_home: home(&config.vega_node_prefix, index),
                tendermint_home: home(&config.tendermint_node_prefix, index),
                data_node_home: node_config
                    .data_node_binary
                    .as_ref()
                    .map(|_| home(&config.data_node_prefix, index)),
                visor_home: node_config
                    .visor_binary
                    .as_ref()
                    .map(|_| home(&config.visor_prefix, index)),
            });
            index += 1;
        }
    }
    plans
}

/// `{prefix}-nodeset-{group}-{index}-{mode}`
fn node_set_name(prefix: &str, group: &str, index: usize, node_config: &NodeConfig) -> String {
    format!("{}-nodeset-{}-{}-{}", prefix, group, index, node_config.mode)
}

fn context(
    gen: &Generator<'_>,
    plan: &NodeSetPlan<'_>,
    tendermint: Option<&TendermintNode>,
    node_sets: &[NodeSetSummary],
) -> NodeSetContext {
    let config = gen.config();
    NodeSetContext {
        prefix: config.prefix.clone(),
        network_name: config.network.name.clone(),
        chain_id: gen.chain_id().to_string(),
        output_dir: config.output_dir.clone(),
        name: plan.name.clone(),
        group_name: plan.node_config.name.clone(),
        mode: plan.node_config.mode,
        index: plan.index,
        relative_index: plan.relative_index,
        vega_binary: config.vega_binary.clone(),
        vega_home: plan.vega_home.clone(),
        tendermint_home: plan.tendermint_home.clone(),
        data_node_home: plan.data_node_home.clone(),
        visor_home: plan.visor_home.clone(),
        node_id: tendermint.map(|t| t.node_id.clone()),
        validator_public_key: tendermint.and_then(|t| t.validator_public_key.clone()),
        node_sets: node_sets.to_vec(),
    }
}

/// Generate every node set of the network.
///
/// A node set that fails does not stop the others; all failures are
/// returned together.
pub async fn generate_node_sets(
    gen: &Generator<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<NodeSet>, GenerateError> {
    let plans = plan_node_sets(gen.config());
    let mut errors = MultiError::new();

    let mut initiated = Vec::with_capacity(plans.len());
    for plan in &plans {
        match initiate(gen, plan, cancel).await {
            Ok(ns) => initiated.push((plan, ns)),
            Err(e) => {
                warn!("Failed to initiate node set '{}': {}", plan.name, e);
                errors.push(e);
            }
        }
    }

    let summaries: Vec<NodeSetSummary> =
        initiated.iter().map(|(_, ns)| NodeSetSummary::from(ns)).collect();

    let mut node_sets = Vec::with_capacity(initiated.len());
    for (plan, mut ns) in initiated {
        match finish(gen, plan, &mut ns, &summaries, cancel).await {
            Ok(()) => {
                info!("Generated node set '{}'", ns.name);
                node_sets.push(ns);
            }
            Err(e) => {
                warn!("Failed to generate node set '{}': {}", plan.name, e);
                errors.push(e);
            }
        }
    }

    if !errors.is_empty() {
        return Err(GenerateError::NodeSets(errors));
    }
    Ok(node_sets)
}

/// Run the pre-generate jobs of a node set and wait for their deployments
async fn run_pre_generate_jobs(
    gen: &Generator<'_>,
    plan: &NodeSetPlan<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<PreGenerateJob>, GenerateError> {
    let templates = &plan.node_config.pre_generate;
    if templates.is_empty() {
        return Ok(Vec::new());
    }

    let ctx = context(gen, plan, None, &[]);
    let mut jobs = Vec::with_capacity(templates.len());
    for tpl in templates {
        let Some(text) = tpl.source.resolve()? else {
            continue;
        };
        let rendered = render_with(&text, &ctx).map_err(|source| GenerateError::Template {
            service: tpl.name.clone(),
            source,
        })?;
        let job = Job::from_json(&rendered)?;

        info!(
            "Running pre-generate job '{}' for node set '{}'",
            job.id, plan.name
        );
        gen.track_submitted_job(&job.id).await;
        gen.runner().run_and_wait(&job, cancel).await?;
        jobs.push(PreGenerateJob {
            name: tpl.name.clone(),
            job_id: job.id,
        });
    }
    Ok(jobs)
}

async fn initiate(
    gen: &Generator<'_>,
    plan: &NodeSetPlan<'_>,
    cancel: &CancellationToken,
) -> Result<NodeSet, GenerateError> {
    let pre_generate_jobs = run_pre_generate_jobs(gen, plan, cancel).await?;

    let config = gen.config();
    let mode = plan.node_config.mode.to_string();

    create_dir(&plan.tendermint_home)?;
    let tm: TendermintInitOutput = exec::run_json(
        &config.vega_binary,
        &[
            "tendermint".to_string(),
            "init".to_string(),
            mode.clone(),
            "--home".to_string(),
            path_arg(&plan.tendermint_home),
            "--output".to_string(),
            "json".to_string(),
        ],
        cancel,
    )
    .await?;
    debug!("Node set '{}' has node id {}", plan.name, tm.node_id);

    create_dir(&plan.vega_home)?;
    let vega: InitOutput = exec::run_json(
        &config.vega_binary,
        &[
            "init".to_string(),
            mode,
            "--home".to_string(),
            path_arg(&plan.vega_home),
            "--tendermint-home".to_string(),
            path_arg(&plan.tendermint_home),
            "--output".to_string(),
            "json".to_string(),
        ],
        cancel,
    )
    .await?;

    let data_node = match (&plan.node_config.data_node_binary, &plan.data_node_home) {
        (Some(binary), Some(home)) => Some(init_data_node(gen, plan, binary, home, cancel).await?),
        _ => None,
    };

    Ok(NodeSet {
        group_name: plan.node_config.name.clone(),
        name: plan.name.clone(),
        mode: plan.node_config.mode,
        index: plan.index,
        relative_index: plan.relative_index,
        vega: VegaNode {
            service: GeneratedService::new(
                service_name(config, &config.vega_node_prefix, plan.index),
                plan.vega_home.clone(),
                vega.config_file_path,
            ),
            mode: plan.node_config.mode,
            binary: config.vega_binary.clone(),
        },
        tendermint: TendermintNode {
            service: GeneratedService::new(
                service_name(config, &config.tendermint_node_prefix, plan.index),
                plan.tendermint_home.clone(),
                tm.config_file_path,
            ),
            node_id: tm.node_id,
            validator_public_key: tm.validator_public_key,
        },
        data_node,
        visor: None,
        pre_generate_jobs,
        readiness_probe: None,
        job_raw: None,
    })
}

async fn init_data_node(
    gen: &Generator<'_>,
    plan: &NodeSetPlan<'_>,
    binary: &Path,
    home: &Path,
    cancel: &CancellationToken,
) -> Result<DataNode, GenerateError> {
    create_dir(home)?;
    let out: InitOutput = exec::run_json(
        binary,
        &[
            "init".to_string(),
            "--home".to_string(),
            path_arg(home),
            "--output".to_string(),
            "json".to_string(),
            gen.chain_id().to_string(),
        ],
        cancel,
    )
    .await?;

    let config = gen.config();
    Ok(DataNode {
        service: GeneratedService::new(
            service_name(config, &config.data_node_prefix, plan.index),
            home.to_path_buf(),
            out.config_file_path,
        ),
        binary: binary.to_path_buf(),
    })
}

/// `{prefix}-{kind prefix}-{index}`
fn service_name(config: &NetworkConfig, kind: &str, index: usize) -> String {
    format!("{}-{}-{}", config.prefix, kind, index)
}

/// Apply templates, generate the visor, render the job override and the
/// readiness probe
async fn finish(
    gen: &Generator<'_>,
    plan: &NodeSetPlan<'_>,
    ns: &mut NodeSet,
    node_sets: &[NodeSetSummary],
    cancel: &CancellationToken,
) -> Result<(), GenerateError> {
    let nc = plan.node_config;
    let ctx = context(gen, plan, Some(&ns.tendermint), node_sets);

    let tm = &ns.tendermint.service;
    apply_template(&tm.name, &nc.tendermint_template, &ctx, &tm.config_file_path)?;

    let vega = &ns.vega.service;
    apply_template(&vega.name, &nc.node_template, &ctx, &vega.config_file_path)?;

    if let Some(dn) = &ns.data_node {
        apply_template(
            &dn.service.name,
            &nc.data_node_template,
            &ctx,
            &dn.service.config_file_path,
        )?;
    }

    if let (Some(binary), Some(home)) = (&nc.visor_binary, &plan.visor_home) {
        let name = service_name(gen.config(), &gen.config().visor_prefix, plan.index);
        ns.visor = Some(
            visor::generate(&name, binary, home, &nc.visor_run_template, &ctx, cancel).await?,
        );
    }

    if let Some(text) = nc.job_template.resolve()? {
        let rendered = render_with(&text, &ctx).map_err(|source| GenerateError::Template {
            service: ns.name.clone(),
            source,
        })?;
        Job::from_json(&rendered)?;
        ns.job_raw = Some(rendered);
    }

    if let Some(probe) = &nc.readiness_probe {
        let mut probe = probe.clone();
        render_fields(&mut probe, &ctx).map_err(|source| GenerateError::Template {
            service: ns.name.clone(),
            source,
        })?;
        ns.readiness_probe = Some(probe);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::sample_config;
    use crate::types::NodeMode;

    #[test]
    fn test_plan_indices_and_names() {
        let config = sample_config(Path::new("/net"));
        let plans = plan_node_sets(&config);

        let names: Vec<&str> = plans.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "st-local-nodeset-validators-0-validator",
                "st-local-nodeset-validators-1-validator",
                "st-local-nodeset-full-2-full",
            ]
        );
        let relative: Vec<usize> = plans.iter().map(|p| p.relative_index).collect();
        assert_eq!(relative, [0, 1, 0]);
    }

    #[test]
    fn test_plan_homes() {
        let config = sample_config(Path::new("/net"));
        let plans = plan_node_sets(&config);

        assert_eq!(plans[1].vega_home, Path::new("/net/vega/node1"));
        assert_eq!(plans[1].tendermint_home, Path::new("/net/tendermint/node1"));
        assert_eq!(plans[1].data_node_home, None);
        assert_eq!(plans[2].data_node_home.as_deref(), Some(Path::new("/net/data/node2")));
        assert!(plans.iter().all(|p| p.visor_home.is_none()));
        assert_eq!(plans[2].node_config.mode, NodeMode::Full);
    }
}
