//! Queuesim CLI
//!
//! Runs the reference sweep of a scenario, or a single run described in a
//! TOML file, and writes CSV to stdout or `--output`. Logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use queuesim_simulator::sweeps;
use queuesim_simulator::{CsvSink, LoopSweep, Report, RetrySweep, RunConfig, SimulatorError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "queuesim")]
#[command(about = "Discrete-event simulations of queues, retries and overload")]
#[command(version)]
struct Cli {
    /// Base seed. Sweep point `i` uses `seed + i`. Random when omitted.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Write CSV here instead of stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Write latency percentiles per run instead of raw completions
    /// (nudge and open-closed only).
    #[arg(long, global = true)]
    summary: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RetrySweepArg {
    FailureRate,
    Clients,
}

#[derive(Clone, Copy, ValueEnum)]
enum LoopSweepArg {
    All,
    Exp,
    Bimod,
    BimodTimeout,
    Weibull,
    Rho,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Sweep(SweepCommand),

    /// Run a single scenario described in a TOML file
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Reference sweeps, one per scenario.
#[derive(Subcommand)]
enum SweepCommand {
    /// Chair lift queue for a range of skier counts
    Ski {
        #[arg(long, default_value = "50000")]
        max_t: f64,
    },

    /// Retry strategies against a failing server
    Retries {
        #[arg(long, value_enum, default_value = "clients")]
        sweep: RetrySweepArg,

        /// Seconds of load before draining
        #[arg(long, default_value = "10")]
        max_t: f64,
    },

    /// FCFS, LIFO and Nudge scheduling
    Nudge {
        #[arg(long, default_value = "1000000")]
        max_t: f64,
    },

    /// Open- and closed-loop load generation
    OpenClosed {
        #[arg(long, value_enum, default_value = "all")]
        sweep: LoopSweepArg,

        #[arg(long, default_value = "5000")]
        max_t: f64,
    },

    /// Timeout and retry collapse under ramp and spike load
    Collapse {
        /// Runs averaged per configuration
        #[arg(long, default_value = "10")]
        runs: u64,
    },

    /// Cache cold start against a rate-limited backend
    Cache {
        #[arg(long, default_value = "60")]
        max_t: f64,
    },
}

fn run_sweep(command: &SweepCommand, seed: u64) -> Result<Report, SimulatorError> {
    let report = match command {
        SweepCommand::Ski { max_t } => sweeps::run_ski(&sweeps::ski_points(*max_t), seed)?,
        SweepCommand::Retries { sweep, max_t } => {
            let sweep = match sweep {
                RetrySweepArg::FailureRate => RetrySweep::FailureRate,
                RetrySweepArg::Clients => RetrySweep::ClientCount,
            };
            sweeps::run_retries(&sweeps::retry_points(sweep, *max_t), seed)?
        }
        SweepCommand::Nudge { max_t } => sweeps::run_nudge(&sweeps::nudge_points(*max_t), seed)?,
        SweepCommand::OpenClosed { sweep, max_t } => {
            let sweep = match sweep {
                LoopSweepArg::All => LoopSweep::All,
                LoopSweepArg::Exp => LoopSweep::Exponential,
                LoopSweepArg::Bimod => LoopSweep::Bimodal,
                LoopSweepArg::BimodTimeout => LoopSweep::BimodalTimeout,
                LoopSweepArg::Weibull => LoopSweep::Weibull,
                LoopSweepArg::Rho => LoopSweep::Rho,
            };
            sweeps::run_open_closed(&sweeps::open_closed_points(sweep, *max_t), seed)?
        }
        SweepCommand::Collapse { runs } => {
            sweeps::run_collapse(&sweeps::collapse_points(), seed, (*runs).max(1))?
        }
        SweepCommand::Cache { max_t } => sweeps::run_cache(&sweeps::cache_points(*max_t), seed)?,
    };
    Ok(report)
}

/// What a command resolves to once any run config is loaded.
enum Job<'a> {
    Sweep(&'a SweepCommand),
    Config(RunConfig),
}

fn run(cli: &Cli) -> Result<(), SimulatorError> {
    let job = match &cli.command {
        Commands::Sweep(sweep) => Job::Sweep(sweep),
        Commands::Run { config } => Job::Config(RunConfig::load(config)?),
    };
    let config_seed = match &job {
        Job::Config(config) => config.seed,
        Job::Sweep(_) => None,
    };

    // `--seed`, then the run config's seed, then a random one.
    let seed = match cli.seed.or(config_seed) {
        Some(seed) => seed,
        None => {
            let seed = rand::random();
            info!(seed, "No seed given, using a random one");
            seed
        }
    };

    let report = match job {
        Job::Sweep(sweep) => run_sweep(sweep, seed)?,
        Job::Config(config) => config.execute(seed)?,
    };

    let mut sink = CsvSink::open(cli.output.as_deref())?;
    report.write(&mut sink, cli.summary)?;
    let rows = sink.rows();
    sink.finish()?;
    info!(seed, rows, "Done");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,queuesim=info,queuesim_simulator=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Simulation failed");
            ExitCode::FAILURE
        }
    }
}
