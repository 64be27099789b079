//! Monte-Carlo autoscaling simulation of a planned assignment.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::debug;
use serde::Serialize;
use threadpool::ThreadPool;

use crate::config::CloudConfig;
use crate::dag::Workflow;
use crate::task::TaskState;

/// A leased on-demand VM: its accumulated life time in seconds and the task
/// bound to it, if any.
#[derive(Clone, Debug)]
struct Vm {
    life_time: f64,
    task: Option<(usize, usize)>,
}

/// Runtime state of one task inside one replica. The shared workflow is
/// never touched; replicas own only these records, keyed by task index.
#[derive(Clone, Copy, Debug)]
struct TaskRun {
    state: TaskState,
    /// Remaining provisioning delay; `None` while no VM request is pending.
    ready_countdown: Option<u64>,
    rest_time: f64,
    start_time: f64,
    end_time: f64,
    cost: f64,
}

impl TaskRun {
    fn new() -> Self {
        Self {
            state: TaskState::NotReady,
            ready_countdown: None,
            rest_time: 0.,
            start_time: 0.,
            end_time: 0.,
            cost: 0.,
        }
    }
}

/// Metrics collected from one Monte-Carlo replica.
#[derive(Clone, Debug, Serialize)]
pub struct ReplicaStats {
    /// Sample column driving this replica.
    pub replica: usize,
    /// Total VM leasing cost, billed per started hour at VM release.
    pub money_cost: f64,
    /// Simulated time at which the last task finished.
    pub finish_time: f64,
    /// Jobs that missed their deadline.
    pub violations: usize,
    /// Mean job execution time (last real task end minus arrival).
    pub average_execution_time: f64,
    /// Sum of per-task costs (`task time * price / 3600`).
    pub task_cost: f64,
}

/// Aggregated result over all replicas.
#[derive(Clone, Debug, Serialize)]
pub struct SimulationResult {
    pub deadline_meeting_rate: f64,
    pub average_cost: f64,
    pub replicas: Vec<ReplicaStats>,
    /// Wall-clock seconds spent simulating.
    pub elapsed: f64,
}

/// Replays a type assignment over a fleet of per-type VM pools, once per
/// performance sample column, using earliest-sub-deadline-first dispatch,
/// on-demand provisioning lag and per-started-hour billing.
pub struct AutoscalingSimulator {
    workflow: Arc<Workflow>,
    /// One assignment per job; all jobs share the plan in deadline mode.
    assignments: Arc<Vec<Vec<u8>>>,
    arrivals: Arc<Vec<f64>>,
    prices: Arc<Vec<f64>>,
    on_demand_lag: u64,
}

impl AutoscalingSimulator {
    /// Creates a simulator with a separate assignment per job.
    pub fn new(workflow: Workflow, assignments: Vec<Vec<u8>>, arrivals: Vec<f64>, cloud: &CloudConfig) -> Self {
        assert!(
            workflow.samples_per_type() > 0,
            "Time vectors must be derived before simulation"
        );
        assert!(!arrivals.is_empty(), "Need at least one job");
        assert_eq!(assignments.len(), arrivals.len(), "Need one assignment per job");
        for assignment in assignments.iter() {
            assert_eq!(assignment.len(), workflow.task_count());
        }
        Self {
            workflow: Arc::new(workflow),
            assignments: Arc::new(assignments),
            arrivals: Arc::new(arrivals),
            prices: Arc::new(cloud.prices.clone()),
            on_demand_lag: cloud.on_demand_lag,
        }
    }

    /// Creates a simulator where every job executes the same assignment.
    pub fn with_shared_assignment(
        workflow: Workflow,
        assignment: Vec<u8>,
        arrivals: Vec<f64>,
        cloud: &CloudConfig,
    ) -> Self {
        let assignments = vec![assignment; arrivals.len()];
        Self::new(workflow, assignments, arrivals, cloud)
    }

    /// Runs all replicas on `num_threads` workers and aggregates the
    /// deadline-meeting rate and the average per-job cost.
    pub fn run(&self, num_threads: usize) -> SimulationResult {
        let samples = self.workflow.samples_per_type();
        let pool = ThreadPool::new(num_threads.max(1));
        let results = Arc::new(Mutex::new(Vec::with_capacity(samples)));
        let start = Instant::now();
        for replica in 0..samples {
            let workflow = self.workflow.clone();
            let assignments = self.assignments.clone();
            let arrivals = self.arrivals.clone();
            let prices = self.prices.clone();
            let lag = self.on_demand_lag;
            let results = results.clone();
            pool.execute(move || {
                let stats = run_replica(&workflow, &assignments, &arrivals, &prices, lag, replica);
                println!("Money Cost: {:.4}, Time: {:.2}", stats.money_cost, stats.finish_time);
                println!(
                    "average execution time of workflows is {:.6}",
                    stats.average_execution_time
                );
                results.lock().unwrap().push(stats);
            });
        }
        pool.join();
        let elapsed = start.elapsed().as_secs_f64();

        let mut replicas = Arc::try_unwrap(results)
            .expect("replica workers have completed")
            .into_inner()
            .unwrap();
        replicas.sort_by_key(|r| r.replica);

        let runs = (samples * self.arrivals.len()) as f64;
        let violations: usize = replicas.iter().map(|r| r.violations).sum();
        let total_cost: f64 = replicas.iter().map(|r| r.money_cost).sum();
        let deadline_meeting_rate = 1. - violations as f64 / runs;
        let average_cost = total_cost / runs;
        println!(
            "deadline meeting rate is {:.6}, average cost is {:.6}",
            deadline_meeting_rate, average_cost
        );
        println!("time elapsed for SC11 algorithm is: {:.4}", elapsed);
        SimulationResult {
            deadline_meeting_rate,
            average_cost,
            replicas,
            elapsed,
        }
    }
}

/// Executes one replica to completion. Deterministic for a fixed sample
/// column: the only inputs are the workflow tables and the replica index.
pub(crate) fn run_replica(
    workflow: &Workflow,
    assignments: &[Vec<u8>],
    arrivals: &[f64],
    prices: &[f64],
    lag: u64,
    replica: usize,
) -> ReplicaStats {
    let samples = workflow.samples_per_type();
    let num_jobs = arrivals.len();
    let n = workflow.task_count();
    let source = workflow.source();
    let sink = workflow.sink();
    let initial_ready = workflow.initial_ready_tasks();

    let mut jobs: Vec<Vec<TaskRun>> = vec![vec![TaskRun::new(); n]; num_jobs];
    let mut pools: Vec<Vec<Vm>> = vec![Vec::new(); prices.len()];
    let mut money_cost = 0.;
    let mut task_cost = 0.;
    let mut t: u64 = 0;

    loop {
        // job admission
        for (j, job) in jobs.iter_mut().enumerate() {
            if t == arrivals[j].trunc() as u64 {
                job[source].state = TaskState::Finished;
                job[sink].state = TaskState::Finished;
                for &v in initial_ready.iter() {
                    job[v].state = TaskState::Ready;
                }
            }
        }

        // ready discovery
        let mut ready: Vec<(usize, usize)> = Vec::new();
        for j in 0..num_jobs {
            for v in 0..n {
                match jobs[j][v].state {
                    TaskState::Ready => ready.push((j, v)),
                    TaskState::NotReady => {
                        let preds = &workflow.get_task(v).predecessors;
                        if !preds.is_empty() && preds.iter().all(|&p| jobs[j][p].state == TaskState::Finished) {
                            jobs[j][v].state = TaskState::Ready;
                            ready.push((j, v));
                        }
                    }
                    _ => {}
                }
            }
        }

        // earliest sub-deadline first dispatch
        ready.sort_by(|&(ja, va), &(jb, vb)| {
            let da = workflow.get_task(va).sub_deadline + arrivals[ja];
            let db = workflow.get_task(vb).sub_deadline + arrivals[jb];
            da.total_cmp(&db).then_with(|| (ja, va).cmp(&(jb, vb)))
        });
        for &(j, v) in ready.iter() {
            let tp = assignments[j][v] as usize;
            match jobs[j][v].ready_countdown {
                None => {
                    if let Some(vm) = pools[tp].iter_mut().find(|vm| vm.task.is_none()) {
                        vm.task = Some((j, v));
                        jobs[j][v].state = TaskState::Scheduled;
                        jobs[j][v].start_time = t as f64;
                        jobs[j][v].rest_time = workflow.get_task(v).probest_time[tp * samples + replica];
                    } else {
                        jobs[j][v].ready_countdown = Some(lag);
                        jobs[j][v].start_time = t as f64;
                    }
                }
                Some(0) => {
                    jobs[j][v].state = TaskState::Scheduled;
                    jobs[j][v].rest_time = workflow.get_task(v).probest_time[tp * samples + replica];
                    jobs[j][v].ready_countdown = None;
                    pools[tp].push(Vm {
                        life_time: lag as f64,
                        task: Some((j, v)),
                    });
                }
                Some(_) => {}
            }
        }

        // release idle VMs, billing per started hour
        for (tp, pool) in pools.iter_mut().enumerate() {
            pool.retain(|vm| {
                if vm.task.is_none() {
                    money_cost += prices[tp] * (vm.life_time / 3600.).ceil();
                    false
                } else {
                    true
                }
            });
        }

        // progress running tasks
        for j in 0..num_jobs {
            for v in 0..n {
                if jobs[j][v].state != TaskState::Scheduled {
                    continue;
                }
                jobs[j][v].rest_time -= 1.;
                if jobs[j][v].rest_time <= 0. {
                    jobs[j][v].state = TaskState::Finished;
                    jobs[j][v].end_time = t as f64;
                    let task_time = t as f64 - jobs[j][v].start_time;
                    let tp = assignments[j][v] as usize;
                    jobs[j][v].cost = task_time * prices[tp] / 3600.;
                    task_cost += jobs[j][v].cost;
                    if let Some(vm) = pools[tp].iter_mut().find(|vm| vm.task == Some((j, v))) {
                        vm.task = None;
                    }
                }
            }
        }

        // VM aging
        for pool in pools.iter_mut() {
            for vm in pool.iter_mut() {
                vm.life_time += 1.;
            }
        }

        // provisioning countdown
        for &(j, v) in ready.iter() {
            if let Some(c) = jobs[j][v].ready_countdown {
                if c > 0 {
                    jobs[j][v].ready_countdown = Some(c - 1);
                }
            }
        }

        t += 1;
        if jobs
            .iter()
            .all(|job| job.iter().all(|run| run.state == TaskState::Finished))
        {
            break;
        }
    }

    // bill VMs that are still alive
    for (tp, pool) in pools.iter().enumerate() {
        for vm in pool.iter() {
            money_cost += prices[tp] * (vm.life_time / 3600.).ceil();
        }
    }

    let mut violations = 0;
    let mut total_execution = 0.;
    for (j, job) in jobs.iter().enumerate() {
        let end = workflow
            .get_task(sink)
            .predecessors
            .iter()
            .map(|&p| job[p].end_time)
            .fold(0., f64::max);
        let execution_time = end - arrivals[j];
        if execution_time > workflow.deadline {
            violations += 1;
        }
        total_execution += execution_time;
    }
    debug!(
        "replica {}: {} violations, money cost {:.4}",
        replica, violations, money_cost
    );
    ReplicaStats {
        replica,
        money_cost,
        finish_time: t as f64,
        violations,
        average_execution_time: total_execution / num_jobs as f64,
        task_cost,
    }
}
