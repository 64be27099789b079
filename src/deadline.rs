//! Sub-deadline distribution and initial instance configuration.

use itertools::Itertools;
use log::debug;

use crate::dag::Workflow;
use crate::error::Result;

/// Index of the cheapest instance type (the price table is sorted, but the
/// argmin keeps this correct for equal-priced prefixes).
fn cheapest_type(prices: &[f64]) -> usize {
    let mut best = 0;
    for (tp, price) in prices.iter().enumerate() {
        if *price < prices[best] {
            best = tp;
        }
    }
    best
}

/// Distributes the workflow deadline into per-task sub-deadlines.
///
/// Traverses the graph in reverse topological order. With `est_min(v)` the
/// estimated time of task `v` on the cheapest type, a task's sub-deadline is
/// the minimum of its own-path slack (the deadline minus the longest
/// `est_min` path from the task to the sink, the task itself excluded) and
/// every successor's latest start (`sub_deadline(s) - est_min(s)`), taking
/// the first of equal candidates so ties resolve toward smaller vertex ids.
/// The sink ends up exactly at the deadline and sub-deadlines never decrease
/// along an edge.
pub fn assign_sub_deadlines(workflow: &mut Workflow, prices: &[f64]) -> Result<()> {
    let order = workflow.topological_order()?;
    let n = workflow.task_count();
    let cheapest = cheapest_type(prices);
    let est_min: Vec<f64> = workflow.get_tasks().iter().map(|t| t.est_time[cheapest]).collect();

    // longest cheapest-estimate path from each task to the sink, task excluded
    let mut tail = vec![0.; n];
    for &v in order.iter().rev() {
        tail[v] = workflow
            .get_task(v)
            .successors
            .iter()
            .map(|&s| tail[s] + est_min[s])
            .fold(0., f64::max);
    }

    let deadline = workflow.deadline;
    let mut sub_deadline = vec![deadline; n];
    for &v in order.iter().rev() {
        let own_slack = deadline - tail[v];
        let latest_start = workflow
            .get_task(v)
            .successors
            .iter()
            .map(|&s| sub_deadline[s] - est_min[s])
            .fold(f64::INFINITY, f64::min);
        sub_deadline[v] = own_slack.min(latest_start);
        debug!("task {}: sub-deadline {:.3}", v, sub_deadline[v]);
    }

    for (v, sd) in sub_deadline.into_iter().enumerate() {
        workflow.get_task_mut(v).sub_deadline = sd;
    }
    Ok(())
}

/// Picks the initial instance type of every task: the cheapest type whose
/// estimated time fits the task's window inside the distributed deadline
/// (its sub-deadline minus the latest predecessor sub-deadline, clamped at
/// the arrival), falling back to the fastest type when nothing fits.
pub fn configure_instances(workflow: &mut Workflow, prices: &[f64]) {
    let n = workflow.task_count();
    let by_price: Vec<usize> = (0..prices.len()).sorted_by(|a, b| prices[*a].total_cmp(&prices[*b])).collect();
    for v in 0..n {
        let task = workflow.get_task(v);
        let window = task.sub_deadline
            - task
                .predecessors
                .iter()
                .map(|&p| workflow.get_task(p).sub_deadline)
                .fold(0., f64::max);
        let assigned = by_price
            .iter()
            .copied()
            .find(|&tp| task.est_time[tp] <= window)
            .unwrap_or_else(|| task.fastest_type());
        workflow.get_task_mut(v).assigned_type = assigned;
    }
}
