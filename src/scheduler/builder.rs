//! Default job specifications for generated services

use std::path::Path;

use super::{Job, SchedulerError, Task, TaskGroup};
use crate::types::{Faucet, GeneratedBinary, NodeSet, Wallet};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Job running a node set.
///
/// A rendered override wins over the default and always takes the node-set
/// name as its id. The default runs the visor when one was generated,
/// otherwise the node plus its data node.
pub fn node_set_job(ns: &NodeSet) -> Result<Job, SchedulerError> {
    if let Some(raw) = &ns.job_raw {
        return Ok(Job::from_json(raw)?.with_id(ns.name.clone()));
    }

    let mut group = TaskGroup::new(&ns.name);

    if let Some(visor) = &ns.visor {
        let home = path_arg(&visor.service.home_dir);
        group = group.with_task(Task::raw_exec(
            &visor.service.name,
            &path_arg(&visor.binary),
            &["run", "--home", home.as_str()],
        ));
    } else {
        let vega_home = path_arg(&ns.vega.service.home_dir);
        let tm_home = path_arg(&ns.tendermint.service.home_dir);
        group = group.with_task(Task::raw_exec(
            &ns.vega.service.name,
            &path_arg(&ns.vega.binary),
            &[
                "start",
                "--home",
                vega_home.as_str(),
                "--tendermint-home",
                tm_home.as_str(),
            ],
        ));

        if let Some(dn) = &ns.data_node {
            let home = path_arg(&dn.service.home_dir);
            group = group.with_task(Task::raw_exec(
                &dn.service.name,
                &path_arg(&dn.binary),
                &["start", "--home", home.as_str()],
            ));
        }
    }

    Ok(Job::new(&ns.name).with_task_group(group))
}

pub fn wallet_job(wallet: &Wallet) -> Job {
    let home = path_arg(&wallet.service.home_dir);
    let task = Task::raw_exec(
        &wallet.service.name,
        &path_arg(&wallet.binary),
        &["wallet", "service", "run", "--home", home.as_str()],
    );
    Job::new(&wallet.service.name)
        .with_task_group(TaskGroup::new(&wallet.service.name).with_task(task))
}

pub fn faucet_job(faucet: &Faucet) -> Job {
    let home = path_arg(&faucet.service.home_dir);
    let passphrase = path_arg(&faucet.passphrase_file);
    let task = Task::raw_exec(
        &faucet.service.name,
        &path_arg(&faucet.binary),
        &[
            "faucet",
            "run",
            "--home",
            home.as_str(),
            "--passphrase-file",
            passphrase.as_str(),
        ],
    );
    Job::new(&faucet.service.name)
        .with_task_group(TaskGroup::new(&faucet.service.name).with_task(task))
}

pub fn binary_job(binary: &GeneratedBinary) -> Job {
    let task = Task::raw_exec(&binary.service.name, &path_arg(&binary.binary), &binary.args);
    Job::new(&binary.service.name)
        .with_task_group(TaskGroup::new(&binary.service.name).with_task(task))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::node_set::fixtures::{node_set, service};
    use crate::types::{DataNode, NodeMode, Visor};

    #[test]
    fn test_default_node_set_job() {
        let mut ns = node_set("st-local-nodeset-full-0-full", "full", 0, NodeMode::Full);
        ns.data_node = Some(DataNode {
            service: service("data0"),
            binary: PathBuf::from("/bin/data-node"),
        });

        let job = node_set_job(&ns).unwrap();
        assert_eq!(job.id, ns.name);
        let tasks = &job.task_groups[0].tasks;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].command(), Some("vega"));
        assert_eq!(
            tasks[0].args(),
            [
                "start",
                "--home",
                "/net/st-local-nodeset-full-0-full-vega",
                "--tendermint-home",
                "/net/st-local-nodeset-full-0-full-tendermint",
            ]
        );
        assert_eq!(tasks[1].command(), Some("/bin/data-node"));
    }

    #[test]
    fn test_visor_replaces_node_tasks() {
        let mut ns = node_set("ns", "g", 0, NodeMode::Validator);
        ns.visor = Some(Visor {
            service: service("visor0"),
            binary: PathBuf::from("/bin/visor"),
            genesis_run_config: PathBuf::from("/net/visor0/genesis/run-config.toml"),
            upgrade_run_config: PathBuf::from("/net/visor0/upgrade/run-config.toml"),
        });

        let job = node_set_job(&ns).unwrap();
        let tasks = &job.task_groups[0].tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].command(), Some("/bin/visor"));
        assert_eq!(tasks[0].args(), ["run", "--home", "/net/visor0"]);
    }

    #[test]
    fn test_override_id_forced_to_node_set_name() {
        let mut ns = node_set("st-local-nodeset-g-3-validator", "g", 3, NodeMode::Validator);
        ns.job_raw = Some(r#"{"ID": "whatever", "Type": "batch"}"#.to_string());

        let job = node_set_job(&ns).unwrap();
        assert_eq!(job.id, "st-local-nodeset-g-3-validator");
        assert_eq!(job.job_type, "batch");
    }

    #[test]
    fn test_invalid_override() {
        let mut ns = node_set("ns", "g", 0, NodeMode::Validator);
        ns.job_raw = Some("{".to_string());
        assert!(node_set_job(&ns).is_err());
    }

    #[test]
    fn test_service_jobs_use_service_name() {
        let faucet = Faucet {
            service: service("st-local-faucet"),
            binary: PathBuf::from("vega"),
            public_key: "abc".to_string(),
            passphrase_file: PathBuf::from("/net/st-local-faucet/passphrase"),
        };
        let job = faucet_job(&faucet);
        assert_eq!(job.id, "st-local-faucet");
        assert!(job.task_groups[0].tasks[0]
            .args()
            .contains(&"/net/st-local-faucet/passphrase"));

        let bin = GeneratedBinary {
            service: service("st-local-bot"),
            binary: PathBuf::from("/bin/bot"),
            args: vec!["--wallet".to_string(), "http://localhost:1789".to_string()],
        };
        let job = binary_job(&bin);
        assert_eq!(job.id, "st-local-bot");
        assert_eq!(job.task_groups[0].tasks[0].args(), ["--wallet", "http://localhost:1789"]);

        let wallet = Wallet {
            service: service("st-local-wallet"),
            binary: PathBuf::from("vega"),
        };
        assert_eq!(wallet_job(&wallet).id, "st-local-wallet");
    }
}
