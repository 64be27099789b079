//! End-to-end pipeline: derive time vectors, distribute the deadline, plan
//! the instance types and simulate the plan.

use std::time::Instant;

use log::info;
use serde::Serialize;

use crate::config::{CloudConfig, Mode, SearchConfig};
use crate::dag::Workflow;
use crate::deadline::{assign_sub_deadlines, configure_instances};
use crate::error::Result;
use crate::evaluator::{ensemble_type, fastest_uniform};
use crate::samples::SampleTables;
use crate::search::{PlanOutcome, Planner};
use crate::simulator::{AutoscalingSimulator, SimulationResult};

/// Combined result of planning and simulating one workload.
#[derive(Clone, Debug, Serialize)]
pub struct ExperimentResult {
    pub plan: PlanOutcome,
    pub simulation: SimulationResult,
    /// Wall-clock seconds spent in the configuration search.
    pub planning_time: f64,
}

/// One planning-plus-simulation run over a base workflow and a job stream.
pub struct Experiment {
    pub mode: Mode,
    pub workflow: Workflow,
    pub tables: SampleTables,
    /// Absolute arrival time of every job; the first entry is 0.
    pub arrivals: Vec<f64>,
    pub cloud: CloudConfig,
    pub search: SearchConfig,
    /// Worker threads for the Monte-Carlo replicas.
    pub sim_threads: usize,
}

impl Experiment {
    /// Plans the workload and replays the plan through the autoscaling
    /// simulator. The simulator is only reached with a feasible plan.
    pub fn run(mut self) -> Result<ExperimentResult> {
        self.cloud.validate();
        self.workflow.derive_time_vectors(&self.tables)?;
        assign_sub_deadlines(&mut self.workflow, &self.cloud.prices)?;
        configure_instances(&mut self.workflow, &self.cloud.prices);

        let planning_workflows = match self.mode {
            Mode::Deadline => vec![self.workflow.clone()],
            _ => vec![self.workflow.clone(); self.arrivals.len()],
        };
        let planner = Planner::new(self.mode, planning_workflows, self.cloud.prices.clone(), self.search)?;
        let planning_start = Instant::now();
        let plan = planner.plan()?;
        let planning_time = planning_start.elapsed().as_secs_f64();
        info!("planning took {:.4}s", planning_time);

        let simulator = match self.mode {
            Mode::Deadline => AutoscalingSimulator::with_shared_assignment(
                self.workflow,
                plan.assignment.clone(),
                self.arrivals,
                &self.cloud,
            ),
            _ => {
                let assignments: Vec<Vec<u8>> = plan
                    .assignment
                    .iter()
                    .map(|&choice| {
                        let tp = ensemble_type(&self.workflow, choice, &self.cloud.prices)
                            .unwrap_or_else(|| fastest_uniform(&self.workflow));
                        vec![tp as u8; self.workflow.task_count()]
                    })
                    .collect();
                AutoscalingSimulator::new(self.workflow, assignments, self.arrivals, &self.cloud)
            }
        };
        let simulation = simulator.run(self.sim_threads);
        Ok(ExperimentResult {
            plan,
            simulation,
            planning_time,
        })
    }
}
