//! Branch-and-bound A\* search over per-task instance-type assignments.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde::Serialize;
use threadpool::ThreadPool;

use crate::config::{Mode, SearchConfig};
use crate::dag::Workflow;
use crate::error::{Error, Result};
use crate::evaluator::Objective;

/// A search state: the index of the last decided position, the lower-bound
/// cost of any completion, and the full configuration vector (positions
/// beyond `taskno` still hold the cheapest type).
#[derive(Clone, Debug)]
struct SearchNode {
    taskno: usize,
    fvalue: f64,
    configurations: Vec<u8>,
}

/// Best-first ordering: smallest bound first, deeper nodes on ties, then the
/// lexicographically smaller configuration.
fn node_order(a: &SearchNode, b: &SearchNode) -> Ordering {
    a.fvalue
        .total_cmp(&b.fvalue)
        .then_with(|| b.taskno.cmp(&a.taskno))
        .then_with(|| a.configurations.cmp(&b.configurations))
}

/// Removes and returns the up to `k` smallest nodes of the open set.
fn take_smallest(open: &mut Vec<SearchNode>, k: usize) -> Vec<SearchNode> {
    let k = k.min(open.len());
    if k == 0 {
        return Vec::new();
    }
    if k < open.len() {
        open.select_nth_unstable_by(k - 1, node_order);
    }
    let mut batch: Vec<SearchNode> = open.drain(..k).collect();
    batch.sort_unstable_by(node_order);
    batch
}

/// Result of a configuration search.
#[derive(Clone, Debug, Serialize)]
pub struct PlanOutcome {
    /// Per-task instance types (deadline mode) or per-workflow ensemble
    /// choices (ensemble mode).
    pub assignment: Vec<u8>,
    /// Cost of the returned assignment.
    pub cost: f64,
    /// Number of expanded nodes.
    pub expansions: usize,
    /// Whether the expansion budget cut the search short.
    pub budget_exhausted: bool,
}

/// Branch-and-bound A\* planner.
///
/// Owns the open set, the visited-node set, the recorded solutions and the
/// global best cost; worker threads receive handles that only update the
/// best cost and append to the shared sets inside critical sections, and
/// merge their private open sets at each batch barrier.
pub struct Planner {
    mode: Mode,
    workflows: Arc<Vec<Workflow>>,
    prices: Arc<Vec<f64>>,
    config: SearchConfig,
}

impl Planner {
    /// Creates a planner over derived, sub-deadline-assigned workflows.
    pub fn new(mode: Mode, workflows: Vec<Workflow>, prices: Vec<f64>, config: SearchConfig) -> Result<Self> {
        if mode == Mode::FollowSun {
            return Err(Error::UnsupportedMode(mode));
        }
        if workflows.is_empty() || workflows.iter().any(|wf| wf.task_count() == 0) {
            return Err(Error::InvalidDag("workflow has no tasks".to_string()));
        }
        Ok(Self {
            mode,
            workflows: Arc::new(workflows),
            prices: Arc::new(prices),
            config,
        })
    }

    /// Runs the search and returns the best feasible assignment found.
    ///
    /// The greedy bootstrap seeds the best-cost bound and is returned
    /// unchanged when no explored node improves on it; exhausting the
    /// expansion budget is not an error. When even the bootstrap is
    /// infeasible the search fails with `NoFeasibleSolution`.
    pub fn plan(&self) -> Result<PlanOutcome> {
        let objective = Objective::new(self.mode, self.workflows.clone(), self.prices.clone())?;
        let n = objective.dimension();
        let types = self.prices.len();

        let (seed, root) = self.bootstrap(&objective)?;
        info!("bootstrap assignment costs {:.6}", seed.fvalue);

        let best = Arc::new(Mutex::new(seed.fvalue));
        let solutions = Arc::new(Mutex::new(vec![seed]));
        let closed: Arc<Mutex<HashSet<(usize, Vec<u8>)>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut open = vec![root];

        let pool = ThreadPool::new(self.config.num_threads.max(1));
        let mut expansions = 0;
        let budget_exhausted = loop {
            if open.is_empty() {
                break false;
            }
            if expansions > self.config.budget {
                break true;
            }
            let batch = take_smallest(&mut open, self.config.batch_width.max(1));
            expansions += batch.len();
            let merged: Arc<Mutex<Vec<SearchNode>>> = Arc::new(Mutex::new(Vec::new()));
            for node in batch.into_iter() {
                let objective = objective.clone();
                let best = best.clone();
                let solutions = solutions.clone();
                let closed = closed.clone();
                let merged = merged.clone();
                let mode = self.mode;
                pool.execute(move || {
                    if objective.feasible(&node.configurations) {
                        let mut best = best.lock().unwrap();
                        if node.fvalue < *best {
                            *best = node.fvalue;
                            debug!("new best cost {:.6} at depth {}", node.fvalue, node.taskno);
                            solutions.lock().unwrap().push(node.clone());
                        }
                    }
                    closed.lock().unwrap().insert((node.taskno, node.configurations.clone()));

                    let next = node.taskno + 1;
                    if next >= n {
                        return;
                    }
                    let (start, bound) = match mode {
                        Mode::Deadline => (node.configurations[next] as usize + 1, types),
                        _ => (0, 2),
                    };
                    let mut local = Vec::new();
                    for tp in start..bound {
                        let mut configurations = node.configurations.clone();
                        configurations[next] = tp as u8;
                        let fvalue = objective.cost(&configurations);
                        if fvalue >= *best.lock().unwrap() {
                            continue;
                        }
                        let key = (next, configurations);
                        if closed.lock().unwrap().contains(&key) {
                            continue;
                        }
                        local.push(SearchNode {
                            taskno: next,
                            fvalue,
                            configurations: key.1,
                        });
                    }
                    if !local.is_empty() {
                        merged.lock().unwrap().append(&mut local);
                    }
                });
            }
            pool.join();
            open.append(&mut merged.lock().unwrap());
        };

        let solutions = Arc::try_unwrap(solutions)
            .expect("search workers have completed")
            .into_inner()
            .unwrap();
        let found = solutions.last().unwrap();
        info!(
            "search finished: {} expansions, {} recorded solutions, cost {:.6}",
            expansions,
            solutions.len(),
            found.fvalue
        );
        Ok(PlanOutcome {
            assignment: found.configurations.clone(),
            cost: found.fvalue,
            expansions,
            budget_exhausted,
        })
    }

    /// Builds the feasible bootstrap node and the all-cheapest root node.
    ///
    /// Deadline mode starts from the per-task instance configuration and
    /// falls back to the per-task fastest types when that misses the
    /// deadline; ensemble mode starts from the all-cheapest choices, which
    /// are feasible exactly when any choice is.
    fn bootstrap(&self, objective: &Objective) -> Result<(SearchNode, SearchNode)> {
        let n = objective.dimension();
        let mut seed = match self.mode {
            Mode::Deadline => self.workflows[0].assigned_types(),
            _ => vec![0; n],
        };
        if !objective.feasible(&seed) {
            seed = match self.mode {
                Mode::Deadline => self.workflows[0]
                    .get_tasks()
                    .iter()
                    .map(|t| t.fastest_type() as u8)
                    .collect(),
                _ => return Err(Error::NoFeasibleSolution),
            };
            if !objective.feasible(&seed) {
                return Err(Error::NoFeasibleSolution);
            }
        }
        let seed = SearchNode {
            taskno: 0,
            fvalue: objective.cost(&seed),
            configurations: seed,
        };
        let configurations = vec![0; n];
        let root = SearchNode {
            taskno: 0,
            fvalue: objective.cost(&configurations),
            configurations,
        };
        Ok((seed, root))
    }
}
