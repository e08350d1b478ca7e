//! Reference parameter sweeps for each scenario.
//!
//! Points run in parallel. Point `i` is seeded with `seed + i` and results
//! come back in sweep order, so output is identical however many threads
//! the pool has.

use crate::config::Report;
use queuesim_models::cache::{self, CacheConfig};
use queuesim_models::collapse::{self, CollapseConfig, LoadShape};
use queuesim_models::dist::JobSizeConfig;
use queuesim_models::nudge::{self, Discipline, NudgeConfig};
use queuesim_models::open_closed::{self, LoadLoop, OpenClosedConfig};
use queuesim_models::retries::{self, RetriesConfig};
use queuesim_models::ski::{self, SkiConfig};
use queuesim_models::ModelError;
use queuesim_retry::{BackoffPolicy, RetryStrategyConfig};
use rayon::prelude::*;
use tracing::info;

/// One named parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint<C> {
    pub name: String,
    pub config: C,
}

impl<C> SweepPoint<C> {
    pub fn new(name: impl Into<String>, config: C) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Run `f` over every point in parallel, keeping sweep order.
pub fn run_points<C, R, F>(points: &[SweepPoint<C>], seed: u64, f: F) -> Result<Vec<R>, ModelError>
where
    C: Sync,
    R: Send,
    F: Fn(&SweepPoint<C>, u64) -> Result<R, ModelError> + Sync,
{
    info!(points = points.len(), seed, "Starting sweep");
    let results = points
        .par_iter()
        .enumerate()
        .map(|(i, point)| f(point, seed.wrapping_add(i as u64)))
        .collect::<Result<Vec<R>, ModelError>>()?;
    info!(points = points.len(), "Sweep complete");
    Ok(results)
}

/// Chairs of 4 and 6, for 25 to 1225 skiers in steps of 50.
pub fn ski_points(max_t: f64) -> Vec<SweepPoint<SkiConfig>> {
    let mut points = Vec::new();
    for chair_width in [4, 6] {
        for skiers in (25..1250).step_by(50) {
            let config = SkiConfig::default()
                .with_chair_width(chair_width)
                .with_skiers(skiers)
                .with_max_t(max_t);
            points.push(SweepPoint::new(config.name(), config));
        }
    }
    points
}

pub fn run_ski(points: &[SweepPoint<SkiConfig>], seed: u64) -> Result<Report, ModelError> {
    let rows = run_points(points, seed, |point, seed| {
        let mut summary = ski::run(&point.config, seed)?;
        summary.name = point.name.clone();
        Ok(summary)
    })?;
    Ok(Report::Ski(rows))
}

/// Server failure rates swept by both retry sweeps.
pub const FAILURE_RATES: [f64; 17] = [
    0.0, 0.0001, 0.0002, 0.0005, 0.001, 0.002, 0.005, 0.01, 0.02, 0.0325, 0.05, 0.075, 0.1, 0.2,
    0.3, 0.4, 0.5,
];

/// Which retry sweep to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrySweep {
    /// 100 clients at 10 calls per second, four strategies.
    FailureRate,
    /// 1000 calls per second split over 10, 100 or 1000 clients.
    ClientCount,
}

fn adaptive_10pct() -> RetryStrategyConfig {
    RetryStrategyConfig::adaptive(0.1, 5.0)
}

fn breaker_10pct() -> RetryStrategyConfig {
    RetryStrategyConfig::circuit_breaker(RetryStrategyConfig::n_retries(3), 0.1)
}

pub fn retry_points(sweep: RetrySweep, max_t: f64) -> Vec<SweepPoint<RetriesConfig>> {
    let mut points = Vec::new();
    match sweep {
        RetrySweep::FailureRate => {
            let strategies = [
                ("no_retries", RetryStrategyConfig::no_retries()),
                ("three_retries", RetryStrategyConfig::n_retries(3)),
                ("adaptive_10pct", adaptive_10pct()),
                ("breaker_10pct", breaker_10pct()),
            ];
            for failure_rate in FAILURE_RATES {
                for (name, strategy) in &strategies {
                    let config = RetriesConfig::default()
                        .with_failure_rate(failure_rate)
                        .with_strategy(strategy.clone())
                        .with_max_t(max_t);
                    points.push(SweepPoint::new(*name, config));
                }
            }
        }
        RetrySweep::ClientCount => {
            for clients in [10, 100, 1000] {
                for failure_rate in FAILURE_RATES {
                    let strategies = [
                        (format!("adaptive_10pct_{clients}clients"), adaptive_10pct()),
                        (format!("breaker_10pct_{clients}clients"), breaker_10pct()),
                    ];
                    for (name, strategy) in strategies {
                        let config = RetriesConfig::default()
                            .with_clients(clients)
                            .with_total_rate(1000.0)
                            .with_failure_rate(failure_rate)
                            .with_strategy(strategy)
                            .with_max_t(max_t);
                        points.push(SweepPoint::new(name, config));
                    }
                }
            }
        }
    }
    points
}

pub fn run_retries(points: &[SweepPoint<RetriesConfig>], seed: u64) -> Result<Report, ModelError> {
    let rows = run_points(points, seed, |point, seed| {
        retries::run(&point.config, &point.name, seed)
    })?;
    Ok(Report::Retries(rows))
}

/// LIFO, FCFS and Nudge at utilisation 0.5 and 0.8.
pub fn nudge_points(max_t: f64) -> Vec<SweepPoint<NudgeConfig>> {
    let mut points = Vec::new();
    for discipline in [Discipline::Lifo, Discipline::Fcfs, Discipline::Nudge] {
        for rho in [0.5, 0.8] {
            let config = NudgeConfig::default()
                .with_discipline(discipline)
                .with_rho(rho)
                .with_max_t(max_t);
            points.push(SweepPoint::new(config.name(), config));
        }
    }
    points
}

pub fn run_nudge(points: &[SweepPoint<NudgeConfig>], seed: u64) -> Result<Report, ModelError> {
    let runs = run_points(points, seed, |point, seed| nudge::run(&point.config, seed))?;
    Ok(Report::Nudge(runs.into_iter().flatten().collect()))
}

/// Which open/closed loop sweep to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSweep {
    /// Every sweep below, in order.
    All,
    Exponential,
    Bimodal,
    BimodalTimeout,
    Weibull,
    /// Open loop, Weibull jobs, utilisation 0.1 to 0.9.
    Rho,
}

const LOOP_RHO: f64 = 0.8;
/// The rho sweep runs this many times longer than the other families.
const RHO_SWEEP_SCALE: f64 = 4.0;

fn bimodal() -> JobSizeConfig {
    JobSizeConfig::Bimodal {
        mean_1: 0.1,
        mean_2: 10.0,
        p: 0.001,
    }
}

fn weibull() -> JobSizeConfig {
    JobSizeConfig::Weibull {
        mean: 0.1,
        shape: 2.0,
    }
}

fn loop_family(job_size: JobSizeConfig, loads: &[LoadLoop], max_t: f64) -> Vec<SweepPoint<OpenClosedConfig>> {
    loads
        .iter()
        .map(|&load| {
            let config = OpenClosedConfig::default()
                .with_job_size(job_size)
                .with_rho(LOOP_RHO)
                .with_load(load)
                .with_max_t(max_t);
            SweepPoint::new(config.name(), config)
        })
        .collect()
}

pub fn open_closed_points(sweep: LoopSweep, max_t: f64) -> Vec<SweepPoint<OpenClosedConfig>> {
    let open_and_closed = [
        LoadLoop::Open,
        LoadLoop::Closed { mpl: 1 },
        LoadLoop::Closed { mpl: 10 },
    ];
    match sweep {
        LoopSweep::All => [
            LoopSweep::BimodalTimeout,
            LoopSweep::Exponential,
            LoopSweep::Bimodal,
            LoopSweep::Weibull,
            LoopSweep::Rho,
        ]
        .into_iter()
        .flat_map(|sweep| open_closed_points(sweep, max_t))
        .collect(),
        LoopSweep::Exponential => {
            loop_family(JobSizeConfig::Exponential { mean: 0.1 }, &open_and_closed, max_t)
        }
        LoopSweep::Bimodal => loop_family(bimodal(), &open_and_closed, max_t),
        LoopSweep::BimodalTimeout => {
            let mut points = loop_family(
                bimodal(),
                &[LoadLoop::Open, LoadLoop::OpenWithTimeout { timeout: 15.0 }],
                max_t,
            );
            // The plain bimodal family already has a `bimod_open` run.
            for point in &mut points {
                point.name = match point.config.load {
                    LoadLoop::OpenWithTimeout { timeout } => {
                        format!("open_timeout_{}", timeout as u64)
                    }
                    _ => "open".to_string(),
                };
            }
            points
        }
        LoopSweep::Weibull => loop_family(weibull(), &open_and_closed, max_t),
        LoopSweep::Rho => (1..10)
            .map(|i| {
                let rho = i as f64 / 10.0;
                let config = OpenClosedConfig::default()
                    .with_job_size(weibull())
                    .with_rho(rho)
                    .with_max_t(max_t * RHO_SWEEP_SCALE);
                SweepPoint::new(format!("rho_sweep_{rho:.1}"), config)
            })
            .collect(),
    }
}

pub fn run_open_closed(
    points: &[SweepPoint<OpenClosedConfig>],
    seed: u64,
) -> Result<Report, ModelError> {
    let runs = run_points(points, seed, |point, seed| {
        open_closed::run(&point.config, &point.name, seed)
    })?;
    Ok(Report::OpenClosed(runs.into_iter().flatten().collect()))
}

/// Ramp and spike load, each without backoff and with jittered backoff.
pub fn collapse_points() -> Vec<SweepPoint<CollapseConfig>> {
    let mut points = Vec::new();
    for load in [LoadShape::ramp(), LoadShape::spike()] {
        for backoff in [
            BackoffPolicy::None,
            BackoffPolicy::ExponentialJitter { initial: 10.0 },
        ] {
            let config = CollapseConfig::default().with_load(load).with_backoff(backoff);
            points.push(SweepPoint::new(config.name(), config));
        }
    }
    points
}

/// Every (point, run) pair is one parallel job; runs of a point are then
/// averaged window by window.
pub fn run_collapse(
    points: &[SweepPoint<CollapseConfig>],
    seed: u64,
    runs: u64,
) -> Result<Report, ModelError> {
    let jobs: Vec<SweepPoint<CollapseConfig>> = points
        .iter()
        .flat_map(|point| (0..runs).map(move |_| point.clone()))
        .collect();
    let histories = run_points(&jobs, seed, |point, seed| collapse::run(&point.config, seed))?;

    let per_point = runs.max(1) as usize;
    let rows = points
        .iter()
        .zip(histories.chunks(per_point))
        .flat_map(|(point, runs)| collapse::average_runs(runs, &point.name))
        .collect();
    Ok(Report::Collapse(rows))
}

/// Backends serving 0.5%, 1%, 2% and 10% of offered load.
pub fn cache_points(max_t: f64) -> Vec<SweepPoint<CacheConfig>> {
    [5.0, 10.0, 20.0, 100.0]
        .into_iter()
        .map(|rate| {
            let config = CacheConfig::default()
                .with_backend_max_rate(rate)
                .with_max_t(max_t);
            SweepPoint::new(config.name(), config)
        })
        .collect()
}

pub fn run_cache(points: &[SweepPoint<CacheConfig>], seed: u64) -> Result<Report, ModelError> {
    let runs = run_points(points, seed, |point, seed| {
        cache::run(&point.config, &point.name, seed)
    })?;
    Ok(Report::Cache(runs.into_iter().flatten().collect()))
}
