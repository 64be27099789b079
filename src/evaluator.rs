//! Cost and deadline-feasibility evaluation of type assignments.

use std::sync::Arc;

use crate::config::Mode;
use crate::dag::Workflow;
use crate::error::{Error, Result};

/// Monetary cost of executing the workflow under a full per-task assignment:
/// the sum of `est_time * price / 3600` over all tasks. NaN costs are mapped
/// to infinity so they never win a bound comparison.
pub fn assignment_cost(workflow: &Workflow, assignment: &[u8], prices: &[f64]) -> f64 {
    let total: f64 = workflow
        .get_tasks()
        .iter()
        .zip(assignment.iter())
        .map(|(task, &tp)| task.est_time[tp as usize] * prices[tp as usize] / 3600.)
        .sum();
    if total.is_nan() {
        f64::INFINITY
    } else {
        total
    }
}

/// Makespan of a deterministic list schedule over unlimited per-type VMs:
/// every task starts as soon as its last predecessor finishes and runs for
/// its quantile estimate on the assigned type.
pub fn assignment_makespan(workflow: &Workflow, assignment: &[u8]) -> f64 {
    let order = match workflow.topological_order() {
        Ok(order) => order,
        Err(_) => return f64::INFINITY,
    };
    let mut finish = vec![0.; workflow.task_count()];
    for &v in order.iter() {
        let task = workflow.get_task(v);
        let start = task.predecessors.iter().map(|&p| finish[p]).fold(0., f64::max);
        finish[v] = start + task.est_time[assignment[v] as usize];
    }
    finish[workflow.sink()]
}

/// Whether the sink of the list schedule finishes within the deadline.
pub fn assignment_feasible(workflow: &Workflow, assignment: &[u8]) -> bool {
    assignment_makespan(workflow, assignment) <= workflow.deadline
}

/// Makespan of the workflow when every task runs on one uniform type.
pub fn uniform_makespan(workflow: &Workflow, tp: usize) -> f64 {
    let assignment = vec![tp as u8; workflow.task_count()];
    assignment_makespan(workflow, &assignment)
}

/// Cost of the workflow when every task runs on one uniform type.
pub fn uniform_cost(workflow: &Workflow, tp: usize, prices: &[f64]) -> f64 {
    let assignment = vec![tp as u8; workflow.task_count()];
    assignment_cost(workflow, &assignment, prices)
}

/// The cheapest uniform type meeting the workflow deadline, if any.
pub fn cheapest_uniform_feasible(workflow: &Workflow, prices: &[f64]) -> Option<usize> {
    let mut candidates: Vec<usize> = (0..prices.len()).collect();
    candidates.sort_by(|a, b| prices[*a].total_cmp(&prices[*b]));
    candidates
        .into_iter()
        .find(|&tp| uniform_makespan(workflow, tp) <= workflow.deadline)
}

/// The uniform type with the smallest makespan.
pub fn fastest_uniform(workflow: &Workflow) -> usize {
    let types = workflow.get_task(0).est_time.len();
    let mut best = 0;
    for tp in 1..types {
        if uniform_makespan(workflow, tp) < uniform_makespan(workflow, best) {
            best = tp;
        }
    }
    best
}

/// Resolves an ensemble choice to a concrete uniform type for one workflow:
/// choice 0 is the cheapest deadline-satisfying type, choice 1 the fastest.
pub fn ensemble_type(workflow: &Workflow, choice: u8, prices: &[f64]) -> Option<usize> {
    match choice {
        0 => cheapest_uniform_feasible(workflow, prices),
        _ => Some(fastest_uniform(workflow)),
    }
}

/// Mode-dispatching objective used by the configuration search. Holds the
/// workflows read-only and is cheap to clone across worker threads.
#[derive(Clone)]
pub struct Objective {
    mode: Mode,
    workflows: Arc<Vec<Workflow>>,
    prices: Arc<Vec<f64>>,
}

impl Objective {
    pub fn new(mode: Mode, workflows: Arc<Vec<Workflow>>, prices: Arc<Vec<f64>>) -> Result<Self> {
        if mode == Mode::FollowSun {
            return Err(Error::UnsupportedMode(mode));
        }
        Ok(Self {
            mode,
            workflows,
            prices,
        })
    }

    /// Length of a configuration vector: tasks of the single workflow in
    /// deadline mode, one entry per workflow in ensemble mode.
    pub fn dimension(&self) -> usize {
        match self.mode {
            Mode::Deadline => self.workflows[0].task_count(),
            _ => self.workflows.len(),
        }
    }

    /// Lower-bound cost of completing a configuration. Positions beyond the
    /// decided prefix hold the cheapest alternative, so the value never
    /// exceeds the cost of any completion.
    pub fn cost(&self, configurations: &[u8]) -> f64 {
        match self.mode {
            Mode::Deadline => assignment_cost(&self.workflows[0], configurations, &self.prices),
            _ => {
                let total: f64 = self
                    .workflows
                    .iter()
                    .zip(configurations.iter())
                    .map(|(wf, &choice)| match ensemble_type(wf, choice, &self.prices) {
                        Some(tp) => uniform_cost(wf, tp, &self.prices),
                        None => f64::INFINITY,
                    })
                    .sum();
                if total.is_nan() {
                    f64::INFINITY
                } else {
                    total
                }
            }
        }
    }

    /// Whether the configuration meets every workflow's deadline under the
    /// deterministic quantile schedule.
    pub fn feasible(&self, configurations: &[u8]) -> bool {
        match self.mode {
            Mode::Deadline => assignment_feasible(&self.workflows[0], configurations),
            _ => self
                .workflows
                .iter()
                .zip(configurations.iter())
                .all(|(wf, &choice)| match ensemble_type(wf, choice, &self.prices) {
                    Some(tp) => uniform_makespan(wf, tp) <= wf.deadline,
                    None => false,
                }),
        }
    }
}
