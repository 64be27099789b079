//! Input readers: YAML workflow descriptions and arrival-time files.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dag::{Workflow, WorkflowKind};
use crate::error::{Error, Result};

fn zero() -> f64 {
    0.
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlTask {
    name: String,
    /// CPU seconds per instance type, cheapest type first.
    cpu_time: Vec<f64>,
    #[serde(default = "zero")]
    trans_data: f64,
    #[serde(default = "zero")]
    rec_data: f64,
    #[serde(default = "zero")]
    read_data: f64,
    #[serde(default = "zero")]
    seq_data: f64,
    #[serde(default = "Vec::new")]
    depends_on: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlWorkflow {
    kind: Option<WorkflowKind>,
    deadline: f64,
    meet_dl: f64,
    tasks: Vec<YamlTask>,
}

impl Workflow {
    /// Reads a workflow from a YAML file: a deadline, the target meeting
    /// probability and a task list wired up by task names.
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Result<Workflow> {
        let content = std::fs::read_to_string(&file)
            .map_err(|_| Error::InputMissing(file.as_ref().display().to_string()))?;
        let yaml: YamlWorkflow = serde_yaml::from_str(&content)
            .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file.as_ref().display()));

        let mut workflow = Workflow::new(yaml.deadline, yaml.meet_dl);
        workflow.kind = yaml.kind;
        let mut ids: HashMap<&str, usize> = HashMap::new();
        for task in yaml.tasks.iter() {
            let id = workflow.add_task(
                &task.name,
                task.cpu_time.clone(),
                task.trans_data,
                task.rec_data,
                task.read_data,
                task.seq_data,
            );
            ids.insert(&task.name, id);
        }
        for (id, task) in yaml.tasks.iter().enumerate() {
            for dep in task.depends_on.iter() {
                let from = ids
                    .get(dep.as_str())
                    .unwrap_or_else(|| panic!("Unknown task {} in dependencies of {}", dep, task.name));
                workflow.add_dependency(*from, id);
            }
        }
        workflow.topological_order()?;
        if let Some(kind) = workflow.kind {
            if kind.task_count() + 2 != workflow.task_count() {
                log::warn!(
                    "workflow tagged {} should have {} tasks plus source and sink, found {}",
                    kind,
                    kind.task_count(),
                    workflow.task_count()
                );
            }
        }
        Ok(workflow)
    }
}

/// Reads per-job arrival times for the given arrival rate: the file
/// `arrivaltime_integer_<lambda>.txt` carries two header lines followed by
/// monotonically increasing floats, one per workflow job after the first.
/// Returns `num_jobs` absolute arrival times starting with 0.
pub fn read_arrival_times<P: AsRef<Path>>(dir: P, lambda: f64, num_jobs: usize) -> Result<Vec<f64>> {
    let mut arrivals = vec![0.];
    if num_jobs <= 1 {
        return Ok(arrivals);
    }
    let path = dir.as_ref().join(format!("arrivaltime_integer_{}.txt", lambda));
    let name = path.display().to_string();
    let content = std::fs::read_to_string(&path).map_err(|_| Error::InputMissing(name.clone()))?;
    for (i, line) in content.lines().skip(2).enumerate() {
        if arrivals.len() == num_jobs {
            break;
        }
        let arrival: f64 = line.trim().parse().map_err(|_| Error::InvalidSample {
            file: name.clone(),
            line: i + 3,
            reason: "not a number",
        })?;
        arrivals.push(arrival);
    }
    if arrivals.len() < num_jobs {
        return Err(Error::InvalidSample {
            file: name,
            line: content.lines().count() + 1,
            reason: "file truncated",
        });
    }
    Ok(arrivals)
}
