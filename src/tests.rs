use std::str::FromStr;

use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::config::{CloudConfig, Mode, SearchConfig};
use crate::dag::{Workflow, WorkflowKind};
use crate::deadline::{assign_sub_deadlines, configure_instances};
use crate::error::Error;
use crate::evaluator::{assignment_cost, assignment_feasible};
use crate::samples::SampleTables;
use crate::search::Planner;
use crate::simulator::{run_replica, AutoscalingSimulator};

pub const PRICES: [f64; 4] = [0.1, 0.2, 0.4, 0.8];

pub fn test_cloud(samples_per_type: usize, on_demand_lag: u64) -> CloudConfig {
    CloudConfig {
        prices: PRICES.to_vec(),
        on_demand_lag,
        samples_per_type,
    }
}

/// Tables where every channel sample is 1, so derived times reduce to the
/// CPU time for tasks without data.
pub fn uniform_tables(types: usize, samples: usize) -> SampleTables {
    let ones = vec![1.; types * samples];
    SampleTables::from_raw(types, samples, ones.clone(), ones.clone(), ones.clone(), ones).unwrap()
}

fn random_tables(rng: &mut Pcg64, types: usize, samples: usize) -> SampleTables {
    let mut channel = |lo: f64, hi: f64| -> Vec<f64> {
        (0..types * samples).map(|_| rng.gen_range(lo..hi)).collect()
    };
    let seq_io = channel(10., 200.);
    let rand_io = channel(50., 5000.);
    let net_up = channel(0.5, 20.);
    let net_down = channel(0.5, 20.);
    SampleTables::from_raw(types, samples, seq_io, rand_io, net_up, net_down).unwrap()
}

/// `source -> a, b -> sink`, every task with CPU times `[10, 5, 3, 2]` and no
/// data, derived over uniform tables with 4 samples per type.
pub fn diamond_workflow(deadline: f64, meet_dl: f64) -> Workflow {
    let mut wf = Workflow::new(deadline, meet_dl);
    let cpu = vec![10., 5., 3., 2.];
    let source = wf.add_task("source", cpu.clone(), 0., 0., 0., 0.);
    let a = wf.add_task("a", cpu.clone(), 0., 0., 0., 0.);
    let b = wf.add_task("b", cpu.clone(), 0., 0., 0., 0.);
    let sink = wf.add_task("sink", cpu, 0., 0., 0., 0.);
    wf.add_dependency(source, a);
    wf.add_dependency(source, b);
    wf.add_dependency(a, sink);
    wf.add_dependency(b, sink);
    wf.derive_time_vectors(&uniform_tables(4, 4)).unwrap();
    wf
}

/// `source -> task -> sink` with the given CPU times on the middle task;
/// source and sink carry no work.
fn single_task_workflow(cpu: Vec<f64>, deadline: f64) -> Workflow {
    let types = cpu.len();
    let mut wf = Workflow::new(deadline, 0.5);
    let source = wf.add_task("source", vec![0.; types], 0., 0., 0., 0.);
    let task = wf.add_task("work", cpu, 0., 0., 0., 0.);
    let sink = wf.add_task("sink", vec![0.; types], 0., 0., 0., 0.);
    wf.add_dependency(source, task);
    wf.add_dependency(task, sink);
    wf.derive_time_vectors(&uniform_tables(types, 4)).unwrap();
    wf
}

fn planned_diamond(deadline: f64, meet_dl: f64) -> Workflow {
    let mut wf = diamond_workflow(deadline, meet_dl);
    assign_sub_deadlines(&mut wf, &PRICES).unwrap();
    configure_instances(&mut wf, &PRICES);
    wf
}

fn deadline_planner(wf: &Workflow, budget: usize) -> Planner {
    Planner::new(
        Mode::Deadline,
        vec![wf.clone()],
        PRICES.to_vec(),
        SearchConfig {
            budget,
            batch_width: 6,
            num_threads: 3,
        },
    )
    .unwrap()
}

#[test]
fn derived_quantiles_are_sorted_and_indexed() {
    let mut rng = Pcg64::seed_from_u64(1);
    let tables = random_tables(&mut rng, 4, 10);
    let mut wf = Workflow::new(100., 0.5);
    wf.add_task("io-heavy", vec![40., 20., 10., 5.], 1000., 2000., 50., 300.);
    wf.derive_time_vectors(&tables).unwrap();
    let task = wf.get_task(0);
    for tp in 0..4 {
        let per_type = &task.probest_time[tp * 10..(tp + 1) * 10];
        assert!(per_type.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(task.est_time[tp], per_type[5]);
    }
}

#[test]
fn derivation_is_idempotent() {
    let mut rng = Pcg64::seed_from_u64(7);
    let tables = random_tables(&mut rng, 4, 16);
    let mut wf = Workflow::new(100., 0.7);
    wf.add_task("t", vec![9., 7., 5., 3.], 123., 456., 78., 90.);
    wf.derive_time_vectors(&tables).unwrap();
    let first = wf.get_task(0).clone();
    wf.derive_time_vectors(&tables).unwrap();
    assert_eq!(first.probest_time, wf.get_task(0).probest_time);
    assert_eq!(first.est_time, wf.get_task(0).est_time);
}

#[test]
fn quantile_boundaries() {
    let mut rng = Pcg64::seed_from_u64(3);
    let mut single = Workflow::new(10., 0.5);
    single.add_task("t", vec![1., 1., 1., 1.], 100., 100., 10., 10.);
    single.derive_time_vectors(&random_tables(&mut rng, 4, 1)).unwrap();
    let task = single.get_task(0);
    for tp in 0..4 {
        assert_eq!(task.est_time[tp], task.probest_time[tp]);
    }

    let mut max = Workflow::new(10., 1.0);
    max.add_task("t", vec![1., 1., 1., 1.], 100., 100., 10., 10.);
    max.derive_time_vectors(&random_tables(&mut rng, 4, 8)).unwrap();
    let task = max.get_task(0);
    for tp in 0..4 {
        let per_type = &task.probest_time[tp * 8..(tp + 1) * 8];
        assert_eq!(task.est_time[tp], per_type[7]);
    }
}

#[test]
fn sub_deadlines_are_monotone_on_random_dags() {
    let mut rng = Pcg64::seed_from_u64(11);
    for _ in 0..20 {
        let n = rng.gen_range(5..15);
        let mut wf = Workflow::new(rng.gen_range(50.0..500.0), 0.5);
        for v in 0..n {
            wf.add_task(&v.to_string(), vec![rng.gen_range(1.0..20.0); 4], 0., 0., 0., 0.);
        }
        for v in 1..n - 1 {
            let pred = rng.gen_range(0..v);
            wf.add_dependency(pred, v);
        }
        for v in 0..n - 1 {
            if wf.get_task(v).successors.is_empty() {
                wf.add_dependency(v, n - 1);
            }
        }
        wf.derive_time_vectors(&uniform_tables(4, 4)).unwrap();
        assign_sub_deadlines(&mut wf, &PRICES).unwrap();
        assert_eq!(wf.get_task(n - 1).sub_deadline, wf.deadline);
        for v in 0..n {
            for &s in wf.get_task(v).successors.iter() {
                assert!(wf.get_task(v).sub_deadline <= wf.get_task(s).sub_deadline);
            }
        }
    }
}

#[test]
fn prefix_cost_is_a_lower_bound_for_completions() {
    let wf = diamond_workflow(80., 0.5);
    // enumerate every complete configuration and every prefix of it
    for code in 0..256 {
        let full: Vec<u8> = (0..4).map(|i| ((code >> (2 * i)) & 3) as u8).collect();
        let full_cost = assignment_cost(&wf, &full, &PRICES);
        for prefix in 0..4 {
            let mut node = full.clone();
            for slot in node.iter_mut().skip(prefix + 1) {
                *slot = 0;
            }
            assert!(assignment_cost(&wf, &node, &PRICES) <= full_cost + 1e-12);
        }
    }
}

#[test]
fn loose_deadline_plans_all_cheapest() {
    let wf = planned_diamond(80., 0.5);
    let outcome = deadline_planner(&wf, 10000).plan().unwrap();
    assert_eq!(outcome.assignment, vec![0, 0, 0, 0]);
    assert!((outcome.cost - 4. * 10. * 0.1 / 3600.).abs() < 1e-9);
    assert!(!outcome.budget_exhausted);
    assert!(assignment_feasible(&wf, &outcome.assignment));
}

#[test]
fn tight_deadline_plans_fastest_types() {
    let wf = planned_diamond(12., 0.5);
    let outcome = deadline_planner(&wf, 10000).plan().unwrap();
    assert_eq!(outcome.assignment, vec![3, 3, 3, 3]);
    assert!((outcome.cost - 4. * 2. * 0.8 / 3600.).abs() < 1e-9);
    assert!(assignment_feasible(&wf, &outcome.assignment));
    // the whole reachable tree is explored: 1 + 3 + 9 + 27 nodes
    assert_eq!(outcome.expansions, 40);
}

#[test]
fn impossible_deadline_is_rejected() {
    let wf = planned_diamond(1., 0.5);
    let result = deadline_planner(&wf, 10000).plan();
    assert!(matches!(result, Err(Error::NoFeasibleSolution)));
}

#[test]
fn single_task_gets_the_cheapest_fitting_type() {
    for (deadline, expected) in [(11., 0u8), (6., 1), (4., 2), (2.5, 3)] {
        let mut wf = single_task_workflow(vec![10., 5., 3., 2.], deadline);
        assign_sub_deadlines(&mut wf, &PRICES).unwrap();
        configure_instances(&mut wf, &PRICES);
        let outcome = deadline_planner(&wf, 10000).plan().unwrap();
        assert_eq!(outcome.assignment[1], expected, "deadline {}", deadline);
    }
}

#[test]
fn ensemble_plans_cheapest_feasible_per_job() {
    let wf = planned_diamond(50., 0.9);
    let planner = Planner::new(
        Mode::Ensemble,
        vec![wf.clone(), wf],
        PRICES.to_vec(),
        SearchConfig::default(),
    )
    .unwrap();
    let outcome = planner.plan().unwrap();
    assert_eq!(outcome.assignment, vec![0, 0]);
    assert!((outcome.cost - 2. * 4. * 10. * 0.1 / 3600.).abs() < 1e-9);
    assert_eq!(outcome.expansions, 1);
}

#[test]
fn budget_exhaustion_still_returns_a_feasible_plan() {
    let mut wf = Workflow::new(250., 0.5);
    for v in 0..100 {
        wf.add_task(&v.to_string(), vec![10., 5., 3., 2.], 0., 0., 0., 0.);
        if v > 0 {
            wf.add_dependency(v - 1, v);
        }
    }
    wf.derive_time_vectors(&uniform_tables(4, 4)).unwrap();
    assign_sub_deadlines(&mut wf, &PRICES).unwrap();
    configure_instances(&mut wf, &PRICES);
    let outcome = deadline_planner(&wf, 50).plan().unwrap();
    assert!(outcome.budget_exhausted);
    assert_eq!(outcome.assignment, vec![3; 100]);
    assert!(assignment_feasible(&wf, &outcome.assignment));
}

#[test]
fn followsun_mode_is_unsupported() {
    let wf = planned_diamond(80., 0.5);
    let result = Planner::new(
        Mode::FollowSun,
        vec![wf],
        PRICES.to_vec(),
        SearchConfig::default(),
    );
    assert!(matches!(result, Err(Error::UnsupportedMode(Mode::FollowSun))));
}

#[test]
fn empty_workflow_is_rejected() {
    let wf = Workflow::new(10., 0.5);
    let result = Planner::new(Mode::Deadline, vec![wf], PRICES.to_vec(), SearchConfig::default());
    assert!(matches!(result, Err(Error::InvalidDag(_))));
}

#[test]
fn cycles_are_detected() {
    let mut wf = Workflow::new(10., 0.5);
    let a = wf.add_task("a", vec![1.; 4], 0., 0., 0., 0.);
    let b = wf.add_task("b", vec![1.; 4], 0., 0., 0., 0.);
    wf.add_dependency(a, b);
    wf.add_dependency(b, a);
    assert!(matches!(wf.topological_order(), Err(Error::InvalidDag(_))));
}

#[test]
fn unknown_topology_tag_is_rejected() {
    let err = WorkflowKind::from_str("genome2000").unwrap_err();
    assert_eq!(err.to_string(), "what is the dag type?");
    assert_eq!(WorkflowKind::from_str("ligo1000").unwrap().task_count(), 1000);
    assert_eq!(WorkflowKind::from_str("epi1000").unwrap().initial_ready_count(), 7);
}

#[test]
fn replica_finishes_after_provisioning_and_compute() {
    let wf = single_task_workflow(vec![10., 5., 3., 2.], 1000.);
    let stats = run_replica(&wf, &[vec![0, 0, 0]], &[0.], &PRICES, 60, 0);
    // 60 ticks of provisioning lag, 10 ticks of compute
    assert_eq!(stats.finish_time, 70.);
    assert_eq!(stats.average_execution_time, 69.);
    assert_eq!(stats.violations, 0);
    // one VM alive for 70 seconds, billed one started hour
    assert!((stats.money_cost - 0.1).abs() < 1e-12);
}

#[test]
fn replica_is_deterministic() {
    let wf = planned_diamond(80., 0.5);
    let assignment = wf.assigned_types();
    let first = run_replica(&wf, &[assignment.clone()], &[0.], &PRICES, 60, 2);
    let second = run_replica(&wf, &[assignment], &[0.], &PRICES, 60, 2);
    assert_eq!(first.money_cost, second.money_cost);
    assert_eq!(first.finish_time, second.finish_time);
    assert_eq!(first.violations, second.violations);
    assert_eq!(first.average_execution_time, second.average_execution_time);
}

#[test]
fn staggered_arrivals_bill_every_vm_exactly_once() {
    let wf = single_task_workflow(vec![20., 10., 5., 2.], 1000.);
    let assignments = vec![vec![0, 0, 0]; 3];
    let stats = run_replica(&wf, &assignments, &[0., 30., 60.], &PRICES, 60, 1);
    // three jobs, three VMs, each alive 80 seconds and billed one started hour
    assert!((stats.money_cost - 3. * 0.1).abs() < 1e-12);
    assert_eq!(stats.violations, 0);
    assert_eq!(stats.average_execution_time, 79.);
    assert_eq!(stats.finish_time, 140.);
}

#[test]
fn fast_plan_meets_a_tight_deadline_without_lag() {
    let wf = planned_diamond(12., 0.5);
    let cloud = test_cloud(4, 0);
    let sim = AutoscalingSimulator::with_shared_assignment(wf, vec![3, 3, 3, 3], vec![0.], &cloud);
    let result = sim.run(2);
    assert_eq!(result.deadline_meeting_rate, 1.0);
    assert!(result.replicas.iter().all(|r| r.violations == 0));
    assert_eq!(result.replicas.len(), 4);
}

#[test]
fn violations_are_conserved_and_money_dominates_task_cost() {
    // with a 60s provisioning lag no job can meet a 12s deadline
    let wf = planned_diamond(12., 0.5);
    let cloud = test_cloud(4, 60);
    let sim = AutoscalingSimulator::with_shared_assignment(wf, vec![3, 3, 3, 3], vec![0.], &cloud);
    let result = sim.run(2);
    let violations: usize = result.replicas.iter().map(|r| r.violations).sum();
    assert_eq!(violations, 4);
    assert_eq!(result.deadline_meeting_rate, 0.);
    for replica in result.replicas.iter() {
        assert!(replica.money_cost >= replica.task_cost);
    }
}

#[test]
fn experiment_plans_and_simulates_end_to_end() {
    use crate::experiment::Experiment;

    let result = Experiment {
        mode: Mode::Deadline,
        workflow: diamond_workflow(80., 0.5),
        tables: uniform_tables(4, 4),
        arrivals: vec![0.],
        cloud: test_cloud(4, 60),
        search: SearchConfig::default(),
        sim_threads: 2,
    }
    .run()
    .unwrap();
    assert_eq!(result.plan.assignment, vec![0, 0, 0, 0]);
    assert_eq!(result.simulation.deadline_meeting_rate, 1.0);
    // two VMs per replica, each billed one started hour of the cheapest type
    assert!((result.simulation.average_cost - 0.2).abs() < 1e-12);
}
