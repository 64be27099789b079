//! Workflow DAG model.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::samples::{Channel, SampleTables};
use crate::task::Task;

/// Well-known workflow topologies with their admission constants: the number
/// of real tasks and the number of tasks that are ready as soon as the job
/// arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Montage,
    Montage100,
    Montage1000,
    Ligo,
    Ligo100,
    Ligo1000,
    Epigenome,
    Epi100,
    Epi1000,
}

impl WorkflowKind {
    /// Number of real (non-structural) tasks.
    pub fn task_count(&self) -> usize {
        match self {
            WorkflowKind::Montage => 20,
            WorkflowKind::Montage100 => 100,
            WorkflowKind::Montage1000 => 1000,
            WorkflowKind::Ligo => 40,
            WorkflowKind::Ligo100 => 100,
            WorkflowKind::Ligo1000 => 1000,
            WorkflowKind::Epigenome => 20,
            WorkflowKind::Epi100 => 100,
            WorkflowKind::Epi1000 => 997,
        }
    }

    /// Number of tasks ready at job arrival.
    pub fn initial_ready_count(&self) -> usize {
        match self {
            WorkflowKind::Montage => 4,
            WorkflowKind::Montage100 => 16,
            WorkflowKind::Montage1000 => 166,
            WorkflowKind::Ligo => 9,
            WorkflowKind::Ligo100 => 23,
            WorkflowKind::Ligo1000 => 229,
            WorkflowKind::Epigenome => 1,
            WorkflowKind::Epi100 => 1,
            WorkflowKind::Epi1000 => 7,
        }
    }
}

impl Display for WorkflowKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let tag = match self {
            WorkflowKind::Montage => "montage",
            WorkflowKind::Montage100 => "montage100",
            WorkflowKind::Montage1000 => "montage1000",
            WorkflowKind::Ligo => "ligo",
            WorkflowKind::Ligo100 => "ligo100",
            WorkflowKind::Ligo1000 => "ligo1000",
            WorkflowKind::Epigenome => "epigenome",
            WorkflowKind::Epi100 => "epi100",
            WorkflowKind::Epi1000 => "epi1000",
        };
        write!(f, "{}", tag)
    }
}

impl FromStr for WorkflowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "montage" => Ok(WorkflowKind::Montage),
            "montage100" => Ok(WorkflowKind::Montage100),
            "montage1000" => Ok(WorkflowKind::Montage1000),
            "ligo" => Ok(WorkflowKind::Ligo),
            "ligo100" => Ok(WorkflowKind::Ligo100),
            "ligo1000" => Ok(WorkflowKind::Ligo1000),
            "epigenome" => Ok(WorkflowKind::Epigenome),
            "epi100" => Ok(WorkflowKind::Epi100),
            "epi1000" => Ok(WorkflowKind::Epi1000),
            _ => Err(Error::InvalidDag("what is the dag type?".to_string())),
        }
    }
}

/// A workflow instance: a DAG of tasks with a deadline and the required
/// probability of meeting it.
///
/// Vertex 0 is the source and the last vertex is the sink; on the catalog
/// topologies both are structural (zero work) and are finished immediately at
/// job admission. The task arena and the derived per-(type, sample) tables
/// are shared read-only during simulation; per-replica runtime state is held
/// separately by the simulator.
#[derive(Clone, Debug)]
pub struct Workflow {
    tasks: Vec<Task>,
    pub kind: Option<WorkflowKind>,
    /// Allowed makespan, relative to the job arrival.
    pub deadline: f64,
    /// Required probability of meeting the deadline, in (0, 1].
    pub meet_dl: f64,
    samples_per_type: usize,
}

impl Workflow {
    /// Creates an empty workflow.
    pub fn new(deadline: f64, meet_dl: f64) -> Self {
        Self {
            tasks: Vec::new(),
            kind: None,
            deadline,
            meet_dl,
            samples_per_type: 0,
        }
    }

    /// Adds a new task with the provided static attributes and returns its id.
    pub fn add_task(
        &mut self,
        name: &str,
        cpu_time: Vec<f64>,
        trans_data: f64,
        rec_data: f64,
        read_data: f64,
        seq_data: f64,
    ) -> usize {
        let task_id = self.tasks.len();
        self.tasks
            .push(Task::new(name, cpu_time, trans_data, rec_data, read_data, seq_data));
        task_id
    }

    /// Adds a precedence edge between two tasks.
    pub fn add_dependency(&mut self, from: usize, to: usize) {
        assert_ne!(from, to, "Can't add a self-dependency");
        self.tasks[from].successors.push(to);
        self.tasks[to].predecessors.push(from);
    }

    /// Returns task by id.
    pub fn get_task(&self, task_id: usize) -> &Task {
        &self.tasks[task_id]
    }

    /// Returns mutable task reference by id.
    pub fn get_task_mut(&mut self, task_id: usize) -> &mut Task {
        &mut self.tasks[task_id]
    }

    /// Returns all tasks.
    pub fn get_tasks(&self) -> &Vec<Task> {
        &self.tasks
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn source(&self) -> usize {
        0
    }

    pub fn sink(&self) -> usize {
        self.tasks.len() - 1
    }

    /// Number of performance samples per type, available after
    /// [`derive_time_vectors`](Self::derive_time_vectors).
    pub fn samples_per_type(&self) -> usize {
        self.samples_per_type
    }

    /// Returns a topological order of the task ids, or `InvalidDag` if the
    /// graph is empty or contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        if self.tasks.is_empty() {
            return Err(Error::InvalidDag("workflow has no tasks".to_string()));
        }
        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.predecessors.len()).collect();
        let mut queue: VecDeque<usize> = (0..self.tasks.len()).filter(|&v| in_degree[v] == 0).collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(v) = queue.pop_front() {
            order.push(v);
            for &succ in self.tasks[v].successors.iter() {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    queue.push_back(succ);
                }
            }
        }
        if order.len() != self.tasks.len() {
            return Err(Error::InvalidDag("workflow graph contains a cycle".to_string()));
        }
        Ok(order)
    }

    /// Tasks that are marked ready at job admission: the catalog constant for
    /// tagged workflows, or every task depending only on the source for
    /// hand-built ones.
    pub fn initial_ready_tasks(&self) -> Vec<usize> {
        if let Some(kind) = self.kind {
            return (1..=kind.initial_ready_count()).collect();
        }
        let source = self.source();
        (0..self.tasks.len())
            .filter(|&v| {
                let preds = &self.tasks[v].predecessors;
                v != source && !preds.is_empty() && preds.iter().all(|&p| p == source)
            })
            .collect()
    }

    /// Computes the per-(type, sample) time vectors of every task from the
    /// sample tables:
    ///
    /// ```text
    /// net_up    = trans_data * netup_sample   / 8000
    /// net_down  = rec_data   * netdown_sample / 8000
    /// random_io = read_data  / randio_sample
    /// seq_io    = seq_data   / seqio_sample
    /// probest_time = cpu_time + net_up + net_down + random_io + seq_io
    /// ```
    ///
    /// then sorts `probest_time` ascending within each type and records the
    /// `meet_dl`-quantile as `est_time`. Deterministic: re-deriving from the
    /// same tables produces bitwise-equal vectors.
    pub fn derive_time_vectors(&mut self, tables: &SampleTables) -> Result<()> {
        let types = tables.types();
        let samples = tables.samples_per_type();
        let quantile = ((self.meet_dl * samples as f64) as usize).min(samples - 1);
        for task in self.tasks.iter_mut() {
            assert_eq!(
                task.cpu_time.len(),
                types,
                "Task {} must have one CPU time per instance type",
                task.name
            );
            task.net_up = vec![0.; types * samples];
            task.net_down = vec![0.; types * samples];
            task.random_io = vec![0.; types * samples];
            task.seq_io = vec![0.; types * samples];
            task.probest_time = vec![0.; types * samples];
            task.est_time = vec![0.; types];
            for tp in 0..types {
                for j in 0..samples {
                    let idx = tp * samples + j;
                    let rand_io = tables.sample(tp, j, Channel::RandIo);
                    let seq_io = tables.sample(tp, j, Channel::SeqIo);
                    if rand_io <= 0. || seq_io <= 0. {
                        return Err(Error::InvalidSample {
                            file: if rand_io <= 0. { "randio" } else { "seqio" }.to_string(),
                            line: idx + 1,
                            reason: "must be positive",
                        });
                    }
                    task.net_up[idx] = task.trans_data * tables.sample(tp, j, Channel::NetUp) / 8000.;
                    task.net_down[idx] = task.rec_data * tables.sample(tp, j, Channel::NetDown) / 8000.;
                    task.random_io[idx] = task.read_data / rand_io;
                    task.seq_io[idx] = task.seq_data / seq_io;
                    task.probest_time[idx] = task.cpu_time[tp]
                        + task.net_up[idx]
                        + task.net_down[idx]
                        + task.random_io[idx]
                        + task.seq_io[idx];
                }
                task.probest_time[tp * samples..(tp + 1) * samples].sort_unstable_by(|a, b| a.total_cmp(b));
                task.est_time[tp] = task.probest_time[tp * samples + quantile];
            }
        }
        self.samples_per_type = samples;
        Ok(())
    }

    /// The planner-chosen types of all tasks, in vertex order.
    pub fn assigned_types(&self) -> Vec<u8> {
        self.tasks.iter().map(|t| t.assigned_type as u8).collect()
    }
}
