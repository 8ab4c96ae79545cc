//! Scheduler job specification
//!
//! Field names follow the scheduler's JSON job API (PascalCase, `ID`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SchedulerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "Type", default = "default_job_type")]
    pub job_type: String,

    #[serde(default = "default_datacenters")]
    pub datacenters: Vec<String>,

    #[serde(default)]
    pub task_groups: Vec<TaskGroup>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

fn default_job_type() -> String {
    "service".to_string()
}

fn default_datacenters() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskGroup {
    pub name: String,

    #[serde(default = "default_count")]
    pub count: u32,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub name: String,

    pub driver: String,

    /// Driver-specific settings, e.g. `command` and `args` for `raw_exec`
    #[serde(default)]
    pub config: Value,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "CPU")]
    pub cpu: u32,

    #[serde(rename = "MemoryMB")]
    pub memory_mb: u32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpu: 100,
            memory_mb: 512,
        }
    }
}

/// Interval and delay are nanoseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub attempts: u32,
    pub interval: u64,
    pub delay: u64,
    pub mode: String,
}

impl RestartPolicy {
    /// Never restart; a crashed node should surface as a failed deployment
    pub fn fail_fast() -> Self {
        Self {
            attempts: 0,
            interval: 30 * 60 * 1_000_000_000,
            delay: 15 * 1_000_000_000,
            mode: "fail".to_string(),
        }
    }
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            job_type: default_job_type(),
            datacenters: default_datacenters(),
            task_groups: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_task_group(mut self, group: TaskGroup) -> Self {
        self.task_groups.push(group);
        self
    }

    /// Decode a job from JSON, bare or wrapped as `{"Job": {...}}`
    pub fn from_json(content: &str) -> Result<Self, SchedulerError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| SchedulerError::InvalidJob(e.to_string()))?;
        let value = match value {
            Value::Object(mut map) if map.contains_key("Job") => {
                map.remove("Job").unwrap_or(Value::Null)
            }
            other => other,
        };
        let mut job: Job =
            serde_json::from_value(value).map_err(|e| SchedulerError::InvalidJob(e.to_string()))?;
        if job.id.trim().is_empty() {
            return Err(SchedulerError::InvalidJob("job ID must not be empty".to_string()));
        }
        if job.name.is_empty() {
            job.name = job.id.clone();
        }
        Ok(job)
    }

    /// Replace the id and name, keeping everything else
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.name = id.clone();
        self.id = id;
        self
    }
}

impl TaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 1,
            tasks: Vec::new(),
            restart_policy: Some(RestartPolicy::fail_fast()),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }
}

impl Task {
    /// A `raw_exec` task running `command` with `args`
    pub fn raw_exec<S: AsRef<str>>(name: impl Into<String>, command: &str, args: &[S]) -> Self {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        Self {
            name: name.into(),
            driver: "raw_exec".to_string(),
            config: serde_json::json!({
                "command": command,
                "args": args,
            }),
            env: BTreeMap::new(),
            resources: Some(Resources::default()),
        }
    }

    pub fn command(&self) -> Option<&str> {
        self.config.get("command").and_then(Value::as_str)
    }

    pub fn args(&self) -> Vec<&str> {
        self.config
            .get("args")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}
