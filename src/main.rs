use std::io::Write;
use std::str::FromStr;

use clap::Parser;
use env_logger::Builder;

use cloudplan::config::{CloudConfig, Mode, SearchConfig};
use cloudplan::dag::Workflow;
use cloudplan::error::Result;
use cloudplan::experiment::Experiment;
use cloudplan::parsers::read_arrival_times;
use cloudplan::samples::SampleTables;

#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
/// Plans workflow instance types and simulates autoscaled execution
struct Args {
    /// Path to workflow YAML file
    #[clap(short, long)]
    workflow: String,

    /// Directory with performance sample CSVs and arrival-time files
    #[clap(short, long, default_value = ".")]
    data_dir: String,

    /// Use case (deadlineapp, ensemble or followsun)
    #[clap(short, long, default_value = "deadlineapp")]
    mode: String,

    /// Arrival rate of the workflow job stream
    #[clap(short, long, default_value_t = 0.1)]
    lambda: f64,

    /// Number of workflow jobs
    #[clap(short, long, default_value_t = 1)]
    num_jobs: usize,

    /// Optional cloud config YAML (prices, provisioning lag, samples)
    #[clap(short, long)]
    config: Option<String>,

    /// Workflow deadline override in seconds
    #[clap(short = 'D', long)]
    deadline: Option<f64>,

    /// Required probability of meeting the deadline
    #[clap(long)]
    meet_dl: Option<f64>,

    /// Worker threads for the Monte-Carlo replicas
    #[clap(short, long, default_value_t = 8)]
    threads: usize,

    /// Save the combined results as JSON
    #[clap(short, long)]
    results: Option<String>,
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mode = Mode::from_str(&args.mode).unwrap_or_else(|e| panic!("{}", e));
    let cloud = match &args.config {
        Some(path) => CloudConfig::from_file(path)?,
        None => CloudConfig::default(),
    };

    let mut workflow = Workflow::from_yaml(&args.workflow)?;
    if let Some(deadline) = args.deadline {
        workflow.deadline = deadline;
    }
    if let Some(meet_dl) = args.meet_dl {
        workflow.meet_dl = meet_dl;
    }

    let tables = SampleTables::load(&args.data_dir, cloud.types(), cloud.samples_per_type)?;
    let arrivals = read_arrival_times(&args.data_dir, args.lambda, args.num_jobs)?;

    let result = Experiment {
        mode,
        workflow,
        tables,
        arrivals,
        cloud,
        search: SearchConfig::default(),
        sim_threads: args.threads,
    }
    .run()?;

    if let Some(path) = args.results {
        std::fs::write(&path, serde_json::to_string_pretty(&result).unwrap())
            .unwrap_or_else(|_| panic!("Can't write results to {}", path));
    }
    Ok(())
}
