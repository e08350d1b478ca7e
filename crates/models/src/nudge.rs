//! M/G/1 scheduling: FCFS, LIFO and Nudge.
//!
//! Nudge behaves like FCFS with one exception. When a new job arrives and
//! the job at the back of the queue is larger and has never been swapped,
//! the two trade places. Each job is swapped at most once.

use crate::dist::{exp_with_rate, sample_delay, JobClass, WeibullMixture};
use crate::error::{positive, ModelError};
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

/// A job waiting for or receiving service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Job {
    /// Service time in seconds.
    pub size: f64,
    pub created: Duration,
    pub swapped: bool,
}

impl Job {
    pub fn new(size: f64, created: Duration) -> Self {
        Self {
            size,
            created,
            swapped: false,
        }
    }
}

/// Queue discipline in front of the server.
pub trait JobQueue {
    fn push(&mut self, job: Job);

    /// Next job to serve.
    fn pop(&mut self) -> Option<Job>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label used in run names.
    fn name(&self) -> &'static str;
}

/// First come, first served.
#[derive(Debug, Default)]
pub struct Fcfs {
    jobs: VecDeque<Job>,
}

impl JobQueue for Fcfs {
    fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn name(&self) -> &'static str {
        "FCFS"
    }
}

/// Last in, first out.
#[derive(Debug, Default)]
pub struct Lifo {
    jobs: VecDeque<Job>,
}

impl JobQueue for Lifo {
    fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_back()
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn name(&self) -> &'static str {
        "LIFO"
    }
}

/// FCFS with a single swap per job.
#[derive(Debug, Default)]
pub struct Nudge {
    jobs: VecDeque<Job>,
}

impl JobQueue for Nudge {
    fn push(&mut self, job: Job) {
        match self.jobs.back_mut() {
            Some(last) if last.size > job.size && !last.swapped => {
                last.swapped = true;
                let last = *last;
                let len = self.jobs.len();
                self.jobs[len - 1] = job;
                self.jobs.push_back(last);
            }
            _ => self.jobs.push_back(job),
        }
    }

    fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn name(&self) -> &'static str {
        "Nudge"
    }
}

/// Configurable queue discipline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    #[default]
    Fcfs,
    Lifo,
    Nudge,
}

impl Discipline {
    pub fn build(&self) -> Box<dyn JobQueue> {
        match self {
            Discipline::Fcfs => Box::new(Fcfs::default()),
            Discipline::Lifo => Box::new(Lifo::default()),
            Discipline::Nudge => Box::new(Nudge::default()),
        }
    }
}

/// Nudge scenario parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    pub discipline: Discipline,
    /// Offered load.
    pub rho: f64,
    pub classes: Vec<JobClass>,
    pub weibull_shape: f64,
    pub max_t: f64,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::Fcfs,
            rho: 0.5,
            classes: vec![
                JobClass { mean: 1.0, p: 0.89 },
                JobClass { mean: 10.0, p: 0.1 },
                JobClass {
                    mean: 100.0,
                    p: 0.01,
                },
            ],
            weibull_shape: 2.5,
            max_t: 1_000_000.0,
        }
    }
}

impl NudgeConfig {
    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_max_t(mut self, max_t: f64) -> Self {
        self.max_t = max_t;
        self
    }

    /// Label for report rows, e.g. `Nudge_0.80`.
    pub fn name(&self) -> String {
        format!("{}_{:.2}", self.discipline.build().name(), self.rho)
    }
}

/// Payloads routed by [`NudgeModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeEvent {
    /// The client produces a job.
    Generate,
    /// The job in service finishes.
    JobDone,
}

/// One completed job.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub t: f64,
    /// Time from arrival to completion.
    pub service_time: f64,
    /// Time spent waiting in the queue.
    pub q_time: f64,
    pub name: String,
}

impl CsvRecord for Completion {
    fn header() -> &'static str {
        "t,service_time,q_time,name"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:.6},{:.6},{:.6},{}",
            self.t, self.service_time, self.q_time, self.name
        )
    }
}

/// Single-server queue.
pub struct Server {
    queue: Box<dyn JobQueue>,
    in_flight: Option<Job>,
}

impl Server {
    pub fn new(queue: Box<dyn JobQueue>) -> Self {
        Self {
            queue,
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

/// The Nudge scenario: an open-loop client feeding one server.
pub struct NudgeModel {
    server: Server,
    sizes: WeibullMixture,
    inter_arrival: Exp<f64>,
    name: String,
    completions: Vec<Completion>,
    rng: SimRng,
}

impl NudgeModel {
    pub fn new(config: &NudgeConfig, rng: SimRng) -> Result<Self, ModelError> {
        positive("rho", config.rho)?;
        positive("max_t", config.max_t)?;
        let sizes = WeibullMixture::new(&config.classes, config.weibull_shape)?;
        let inter_arrival = exp_with_rate("arrival rate", config.rho / sizes.mean())?;
        Ok(Self {
            server: Server::new(config.discipline.build()),
            sizes,
            inter_arrival,
            name: config.name(),
            completions: Vec::new(),
            rng,
        })
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub fn into_completions(self) -> Vec<Completion> {
        self.completions
    }

    /// Offer a job of the given size at `now`. Returns the completion event
    /// if the server was idle.
    pub fn offer(&mut self, now: Duration, job: Job) -> Option<Event<NudgeEvent>> {
        if self.server.is_busy() {
            self.server.queue.push(job);
            None
        } else {
            self.server.in_flight = Some(job);
            Some(Event::after(now, secs(job.size), NudgeEvent::JobDone))
        }
    }

    fn on_generate(&mut self, now: Duration) -> HandlerResult<NudgeEvent> {
        let job = Job::new(self.sizes.sample(&mut self.rng), now);
        let gap = sample_delay(&self.inter_arrival, &mut self.rng);
        let mut events = vec![Event::after(now, gap, NudgeEvent::Generate)];
        events.extend(self.offer(now, job));
        Ok(events)
    }

    fn on_job_done(&mut self, now: Duration) -> HandlerResult<NudgeEvent> {
        let Some(done) = self.server.in_flight.take() else {
            return Err(SimError::InvariantViolation {
                actor: "Server",
                time: now,
                detail: "job completed on an idle server".to_string(),
            });
        };

        let response = now.saturating_sub(done.created).as_secs_f64();
        self.completions.push(Completion {
            t: now.as_secs_f64(),
            service_time: response,
            q_time: response - done.size,
            name: self.name.clone(),
        });

        let Some(next) = self.server.queue.pop() else {
            return Ok(Vec::new());
        };
        self.server.in_flight = Some(next);
        Ok(vec![Event::after(now, secs(next.size), NudgeEvent::JobDone)])
    }
}

impl Handler<NudgeEvent> for NudgeModel {
    fn handle(&mut self, now: Duration, event: NudgeEvent) -> HandlerResult<NudgeEvent> {
        match event {
            NudgeEvent::Generate => self.on_generate(now),
            NudgeEvent::JobDone => self.on_job_done(now),
        }
    }
}

/// Run one Nudge simulation, returning every completion.
pub fn run(config: &NudgeConfig, seed: u64) -> Result<Vec<Completion>, ModelError> {
    let model = NudgeModel::new(config, rng_for_run(seed))?;
    let mut runner = SimulationRunner::new(model, StopPolicy::horizon_secs(config.max_t));
    runner.run([Event::new(Duration::ZERO, NudgeEvent::Generate)])?;

    let completions = runner.into_handler().into_completions();
    debug!(name = %config.name(), completions = completions.len(), "Nudge run complete");
    Ok(completions)
}
