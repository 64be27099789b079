//! Error taxonomy shared by the planner and the simulator.

use thiserror::Error;

use crate::config::Mode;

#[derive(Debug, Error)]
pub enum Error {
    /// A required input file is absent.
    #[error("cannot open {0}")]
    InputMissing(String),

    /// A performance sample is malformed (non-finite, non-positive divisor,
    /// or the file ends before all types are covered).
    #[error("invalid sample in {file}, line {line}: {reason}")]
    InvalidSample {
        file: String,
        line: usize,
        reason: &'static str,
    },

    /// The workflow graph is unusable: unknown topology tag, empty, or cyclic.
    #[error("{0}")]
    InvalidDag(String),

    /// The requested use case has no planner implementation.
    #[error("cannot use astar search for the {0} use case")]
    UnsupportedMode(Mode),

    /// Even the greedy bootstrap assignment misses the deadline, so no
    /// configuration can be feasible.
    #[error("no type assignment meets the deadline")]
    NoFeasibleSolution,
}

pub type Result<T> = std::result::Result<T, Error>;
