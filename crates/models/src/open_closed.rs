//! Open- versus closed-loop load generation.
//!
//! The same server, fed either by an open-loop client (Poisson arrivals,
//! no matter how slow the server is) or by a closed-loop client (a fixed
//! population that waits for each response, then thinks, then sends the
//! next request). The client-observed latency differs sharply once service
//! times are heavy-tailed.

use crate::dist::{exp_with_mean, exp_with_rate, sample_delay, JobSize, JobSizeConfig};
use crate::error::{at_least_one, positive, ModelError};
use crate::report::CsvRecord;
use crate::{rng_for_run, SimRng};
use queuesim_core::{secs, Event, Handler, HandlerResult, SimError};
use queuesim_simulation::{SimulationRunner, StopPolicy};
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;
use tracing::debug;

/// How load is offered to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadLoop {
    /// Poisson arrivals at `rho / mean job size`.
    #[default]
    Open,
    /// `mpl` clients, each sending its next request a think time after the
    /// previous response.
    Closed { mpl: usize },
    /// Open loop; a response slower than `timeout` seconds is followed by a
    /// replacement request.
    OpenWithTimeout { timeout: f64 },
}

/// Open/closed loop scenario parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenClosedConfig {
    pub job_size: JobSizeConfig,
    /// Target utilisation.
    pub rho: f64,
    pub load: LoadLoop,
    /// Jobs the server works on concurrently.
    pub server_mpl: usize,
    pub max_t: f64,
}

impl Default for OpenClosedConfig {
    fn default() -> Self {
        Self {
            job_size: JobSizeConfig::Exponential { mean: 0.1 },
            rho: 0.8,
            load: LoadLoop::Open,
            server_mpl: 1,
            max_t: 5_000.0,
        }
    }
}

impl OpenClosedConfig {
    pub fn with_job_size(mut self, job_size: JobSizeConfig) -> Self {
        self.job_size = job_size;
        self
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_load(mut self, load: LoadLoop) -> Self {
        self.load = load;
        self
    }

    pub fn with_max_t(mut self, max_t: f64) -> Self {
        self.max_t = max_t;
        self
    }

    /// Default label, e.g. `exp_closed_10`.
    pub fn name(&self) -> String {
        let label = self.job_size.label();
        match self.load {
            LoadLoop::Open => format!("{label}_open"),
            LoadLoop::Closed { mpl } => format!("{label}_closed_{mpl}"),
            LoadLoop::OpenWithTimeout { timeout } => {
                format!("{label}_open_timeout_{}", timeout as u64)
            }
        }
    }

    /// Mean think time of a closed-loop client giving utilisation `rho`.
    pub fn think_time(&self, mpl: usize) -> f64 {
        let mean = self.job_size.mean();
        (1.0 - self.rho) * mean + (mpl as f64 - 1.0) * mean / self.rho
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        positive("rho", self.rho)?;
        at_least_one("server_mpl", self.server_mpl)?;
        positive("max_t", self.max_t)?;
        match self.load {
            LoadLoop::Open => {}
            LoadLoop::Closed { mpl } => {
                at_least_one("closed-loop mpl", mpl)?;
            }
            LoadLoop::OpenWithTimeout { timeout } => {
                positive("timeout", timeout)?;
            }
        }
        Ok(())
    }
}

/// Payloads routed by [`OpenClosedModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// Open-loop arrival.
    Generate,
    /// Closed-loop population sends its first requests.
    ClosedStart,
    /// A closed-loop client finished thinking.
    ThinkDone,
    /// The job in a server slot finished.
    JobDone(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Job {
    size: f64,
    created: Duration,
}

/// One completed job.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopCompletion {
    pub t: f64,
    pub rho: f64,
    /// Client-observed latency.
    pub service_time: f64,
    pub name: String,
    /// Queue length when the job completed.
    pub qlen: usize,
}

impl CsvRecord for LoopCompletion {
    fn header() -> &'static str {
        "t,rho,service_time,name,qlen"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:.6},{:.6},{:.6},{},{}",
            self.t, self.rho, self.service_time, self.name, self.qlen
        )
    }
}

/// Server with a fixed number of slots and an FCFS overflow queue.
#[derive(Debug)]
pub struct Server {
    slots: Vec<Option<Job>>,
    queue: VecDeque<Job>,
}

impl Server {
    fn new(mpl: usize) -> Self {
        Self {
            slots: vec![None; mpl],
            queue: VecDeque::new(),
        }
    }

    /// Occupied slots.
    pub fn busy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Start `job` in a free slot, or queue it.
    fn offer(&mut self, now: Duration, job: Job) -> Option<Event<LoopEvent>> {
        match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.slots[slot] = Some(job);
                Some(Event::after(now, secs(job.size), LoopEvent::JobDone(slot)))
            }
            None => {
                self.queue.push_back(job);
                None
            }
        }
    }
}

/// The open/closed loop scenario.
pub struct OpenClosedModel {
    server: Server,
    load: LoadLoop,
    sizes: JobSize,
    inter_arrival: Option<Exp<f64>>,
    think: Option<Exp<f64>>,
    rho: f64,
    name: String,
    completions: Vec<LoopCompletion>,
    rng: SimRng,
}

impl OpenClosedModel {
    pub fn new(config: &OpenClosedConfig, name: &str, rng: SimRng) -> Result<Self, ModelError> {
        config.validate()?;
        let sizes = config.job_size.sampler()?;
        let mean = config.job_size.mean();

        let inter_arrival = match config.load {
            LoadLoop::Closed { .. } => None,
            LoadLoop::Open | LoadLoop::OpenWithTimeout { .. } => {
                Some(exp_with_rate("arrival rate", config.rho / mean)?)
            }
        };
        let think = match config.load {
            LoadLoop::Closed { mpl } => {
                let think_time = config.think_time(mpl);
                if think_time > 0.0 {
                    Some(exp_with_mean("think time", think_time)?)
                } else {
                    None
                }
            }
            LoadLoop::Open | LoadLoop::OpenWithTimeout { .. } => None,
        };

        Ok(Self {
            server: Server::new(config.server_mpl),
            load: config.load,
            sizes,
            inter_arrival,
            think,
            rho: config.rho,
            name: name.to_string(),
            completions: Vec::new(),
            rng,
        })
    }

    /// The event that starts load generation.
    pub fn initial_event(&self) -> Event<LoopEvent> {
        match self.load {
            LoadLoop::Closed { .. } => Event::new(Duration::ZERO, LoopEvent::ClosedStart),
            LoadLoop::Open | LoadLoop::OpenWithTimeout { .. } => {
                Event::new(Duration::ZERO, LoopEvent::Generate)
            }
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn completions(&self) -> &[LoopCompletion] {
        &self.completions
    }

    pub fn into_completions(self) -> Vec<LoopCompletion> {
        self.completions
    }

    fn new_job(&mut self, now: Duration) -> Job {
        Job {
            size: self.sizes.sample(&mut self.rng),
            created: now,
        }
    }

    fn on_generate(&mut self, now: Duration) -> HandlerResult<LoopEvent> {
        let Some(inter_arrival) = self.inter_arrival else {
            return Ok(Vec::new());
        };
        let job = self.new_job(now);
        let gap = sample_delay(&inter_arrival, &mut self.rng);
        let mut events = vec![Event::after(now, gap, LoopEvent::Generate)];
        events.extend(self.server.offer(now, job));
        Ok(events)
    }

    fn on_closed_start(&mut self, now: Duration) -> HandlerResult<LoopEvent> {
        let LoadLoop::Closed { mpl } = self.load else {
            return Ok(Vec::new());
        };
        let mut events = Vec::with_capacity(mpl);
        for _ in 0..mpl {
            let job = self.new_job(now);
            events.extend(self.server.offer(now, job));
        }
        Ok(events)
    }

    fn on_think_done(&mut self, now: Duration) -> HandlerResult<LoopEvent> {
        let job = self.new_job(now);
        Ok(self.server.offer(now, job).into_iter().collect())
    }

    fn on_job_done(&mut self, now: Duration, slot: usize) -> HandlerResult<LoopEvent> {
        let Some(completed) = self.server.slots.get_mut(slot).and_then(Option::take) else {
            return Err(SimError::InvariantViolation {
                actor: "Server",
                time: now,
                detail: format!("slot {slot} completed while empty"),
            });
        };

        let latency = now.saturating_sub(completed.created).as_secs_f64();
        self.completions.push(LoopCompletion {
            t: now.as_secs_f64(),
            rho: self.rho,
            service_time: latency,
            name: self.name.clone(),
            qlen: self.server.queue.len(),
        });

        let mut events = Vec::new();
        if let Some(next) = self.server.queue.pop_front() {
            self.server.slots[slot] = Some(next);
            events.push(Event::after(now, secs(next.size), LoopEvent::JobDone(slot)));
        }

        match self.load {
            LoadLoop::Open => {}
            LoadLoop::Closed { .. } => {
                let think = match &self.think {
                    Some(dist) => sample_delay(dist, &mut self.rng),
                    None => Duration::ZERO,
                };
                events.push(Event::after(now, think, LoopEvent::ThinkDone));
            }
            LoadLoop::OpenWithTimeout { timeout } => {
                if latency > timeout {
                    let replacement = self.new_job(now);
                    events.extend(self.server.offer(now, replacement));
                }
            }
        }
        Ok(events)
    }
}

impl Handler<LoopEvent> for OpenClosedModel {
    fn handle(&mut self, now: Duration, event: LoopEvent) -> HandlerResult<LoopEvent> {
        match event {
            LoopEvent::Generate => self.on_generate(now),
            LoopEvent::ClosedStart => self.on_closed_start(now),
            LoopEvent::ThinkDone => self.on_think_done(now),
            LoopEvent::JobDone(slot) => self.on_job_done(now, slot),
        }
    }
}

/// Run one open/closed loop simulation, returning every completion.
pub fn run(
    config: &OpenClosedConfig,
    name: &str,
    seed: u64,
) -> Result<Vec<LoopCompletion>, ModelError> {
    let model = OpenClosedModel::new(config, name, rng_for_run(seed))?;
    let initial = model.initial_event();
    let mut runner = SimulationRunner::new(model, StopPolicy::horizon_secs(config.max_t));
    runner.run([initial])?;

    let completions = runner.into_handler().into_completions();
    debug!(name, completions = completions.len(), "Open/closed run complete");
    Ok(completions)
}
