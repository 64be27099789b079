//! Workflow task model.

/// Execution state of a task within one simulation replica.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum TaskState {
    /// Waiting for its predecessors.
    NotReady,
    /// All predecessors finished, waiting for a VM.
    Ready,
    /// Bound to a VM and running (or provisioning one).
    Scheduled,
    /// Task is completed.
    Finished,
}

/// Represents a workflow task.
///
/// Static attributes describe the work: per-type CPU seconds and the data
/// sizes driving network transfers and disk I/O. Derived per-(type, sample)
/// vectors are filled in by
/// [`Workflow::derive_time_vectors`](crate::dag::Workflow::derive_time_vectors)
/// and stay immutable afterwards; runtime execution state lives in the
/// simulator, keyed by task index.
#[derive(Clone, Debug)]
pub struct Task {
    pub name: String,
    /// CPU seconds on each instance type.
    pub cpu_time: Vec<f64>,
    /// Data transmitted to successors, drives upload time.
    pub trans_data: f64,
    /// Data received from predecessors, drives download time.
    pub rec_data: f64,
    /// Randomly accessed data, drives random I/O time.
    pub read_data: f64,
    /// Sequentially accessed data, drives sequential I/O time.
    pub seq_data: f64,
    pub predecessors: Vec<usize>,
    pub successors: Vec<usize>,
    /// Upload time per (type, sample), flat `type * samples + sample` layout.
    pub net_up: Vec<f64>,
    /// Download time per (type, sample).
    pub net_down: Vec<f64>,
    /// Random I/O time per (type, sample).
    pub random_io: Vec<f64>,
    /// Sequential I/O time per (type, sample).
    pub seq_io: Vec<f64>,
    /// Predicted end-to-end execution time per (type, sample), sorted
    /// ascending within each type after derivation.
    pub probest_time: Vec<f64>,
    /// The `meet_dl`-quantile of `probest_time` per type; the planner's
    /// single-value estimate.
    pub est_time: Vec<f64>,
    /// Instance type chosen by the planner.
    pub assigned_type: usize,
    /// Task-level deadline distributed from the workflow deadline,
    /// relative to the workflow arrival.
    pub sub_deadline: f64,
}

impl Task {
    pub(crate) fn new(
        name: &str,
        cpu_time: Vec<f64>,
        trans_data: f64,
        rec_data: f64,
        read_data: f64,
        seq_data: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            cpu_time,
            trans_data,
            rec_data,
            read_data,
            seq_data,
            predecessors: Vec::new(),
            successors: Vec::new(),
            net_up: Vec::new(),
            net_down: Vec::new(),
            random_io: Vec::new(),
            seq_io: Vec::new(),
            probest_time: Vec::new(),
            est_time: Vec::new(),
            assigned_type: 0,
            sub_deadline: 0.,
        }
    }

    /// The type with the smallest estimated execution time for this task.
    pub fn fastest_type(&self) -> usize {
        let mut best = 0;
        for (tp, est) in self.est_time.iter().enumerate() {
            if *est < self.est_time[best] {
                best = tp;
            }
        }
        best
    }
}
