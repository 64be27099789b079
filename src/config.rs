//! Cloud fleet constants and planner tunables.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_lag() -> u64 {
    60
}
fn default_samples() -> usize {
    1000
}
fn default_budget() -> usize {
    10000
}
fn default_batch() -> usize {
    6
}

/// Planning use case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// A single workflow with a probabilistic deadline; one type per task.
    #[serde(rename = "deadlineapp")]
    Deadline,
    /// A set of workflow jobs planned jointly; one uniform type per job.
    #[serde(rename = "ensemble")]
    Ensemble,
    /// Placeholder for follow-the-sun scheduling; not implemented.
    #[serde(rename = "followsun")]
    FollowSun,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Mode::Deadline => write!(f, "deadlineapp"),
            Mode::Ensemble => write!(f, "ensemble"),
            Mode::FollowSun => write!(f, "followsun"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "deadlineapp" => Ok(Mode::Deadline),
            "ensemble" => Ok(Mode::Ensemble),
            "followsun" => Ok(Mode::FollowSun),
            _ => Err(format!("unknown use case: {}", s)),
        }
    }
}

/// Describes the VM fleet: per-type on-demand pricing, provisioning lag and
/// the number of performance samples used per type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// On-demand price per hour for each instance type, cheapest first.
    pub prices: Vec<f64>,
    /// Seconds between requesting an on-demand VM and it becoming available.
    #[serde(default = "default_lag")]
    pub on_demand_lag: u64,
    /// Number of performance samples kept per instance type.
    #[serde(default = "default_samples")]
    pub samples_per_type: usize,
}

impl CloudConfig {
    /// Returns the number of instance types.
    pub fn types(&self) -> usize {
        self.prices.len()
    }

    /// Loads fleet constants from a YAML file.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|_| Error::InputMissing(file.as_ref().display().to_string()))?;
        let config: CloudConfig = serde_yaml::from_str(&content)
            .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file.as_ref().display()));
        config.validate();
        Ok(config)
    }

    /// Checks the price table invariants assumed by the planner.
    pub fn validate(&self) {
        assert!(!self.prices.is_empty(), "Can't have an empty price table");
        assert!(
            self.prices.iter().all(|p| p.is_finite() && *p > 0.),
            "Prices must be positive"
        );
        assert!(
            self.prices.windows(2).all(|w| w[0] <= w[1]),
            "Prices must be sorted, cheapest type first"
        );
        assert!(self.samples_per_type > 0, "Need at least one sample per type");
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            // EC2 m1 family, us-east on-demand
            prices: vec![0.085, 0.17, 0.34, 0.68],
            on_demand_lag: default_lag(),
            samples_per_type: default_samples(),
        }
    }
}

/// Tunables of the configuration search.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Hard cap on node expansions.
    #[serde(default = "default_budget")]
    pub budget: usize,
    /// Nodes expanded per parallel batch.
    #[serde(default = "default_batch")]
    pub batch_width: usize,
    /// Worker threads used for batch expansion.
    #[serde(default = "default_batch")]
    pub num_threads: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            batch_width: default_batch(),
            num_threads: default_batch(),
        }
    }
}
