//! Timeout and retry against a load-sensitive server.
//!
//! Server latency grows linearly with the number of requests in progress.
//! Clients time out after a fixed deadline and retry, which adds load,
//! which raises latency, which causes more timeouts. A short spike in
//! arrivals is enough to tip the system into a state where almost nothing
//! succeeds, and it stays there after the spike has passed.
//!
//! Every attempt carries its sequence number. Timeouts and responses for an
//! attempt that is no longer current are ignored.

use crate::error::{at_least_one, duration_secs, non_negative, positive, ModelError};
use crate::report::CsvRecord;
use crate::{rng_for_run, SimRng};
use queuesim_core::{ensure_invariant, secs, sim_id, Event, Handler, HandlerResult, SimError};
use queuesim_retry::{Backoff, BackoffPolicy};
use queuesim_simulation::{SimulationRunner, StopPolicy};
use rand::Rng;
use rand_distr::Exp1;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, trace};

sim_id!(
    /// One logical request and the client making it.
    RequestId,
    "request"
);

/// Shape of the Poisson arrival rate over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadShape {
    /// Rate `base_rate - slope * |t - peak_t|`, so it peaks at `peak_t`.
    /// Generation stops once the rate reaches zero.
    RampUpDown {
        base_rate: f64,
        slope: f64,
        peak_t: f64,
    },
    /// `base_rate`, except `peak_rate` between `spike_start` and
    /// `spike_start + spike_width`.
    Spike {
        base_rate: f64,
        peak_rate: f64,
        spike_start: f64,
        spike_width: f64,
    },
}

impl LoadShape {
    pub fn ramp() -> Self {
        LoadShape::RampUpDown {
            base_rate: 80.0,
            slope: 1.6,
            peak_t: 25.0,
        }
    }

    pub fn spike() -> Self {
        LoadShape::Spike {
            base_rate: 40.0,
            peak_rate: 80.0,
            spike_start: 20.0,
            spike_width: 5.0,
        }
    }

    /// Arrival rate at time `t` seconds.
    pub fn rate_at(&self, t: f64) -> f64 {
        match *self {
            LoadShape::RampUpDown {
                base_rate,
                slope,
                peak_t,
            } => base_rate - slope * (t - peak_t).abs(),
            LoadShape::Spike {
                base_rate,
                peak_rate,
                spike_start,
                spike_width,
            } => {
                if t < spike_start || t > spike_start + spike_width {
                    base_rate
                } else {
                    peak_rate
                }
            }
        }
    }

    /// Short label used in run names.
    pub fn label(&self) -> &'static str {
        match self {
            LoadShape::RampUpDown { .. } => "ramp",
            LoadShape::Spike { .. } => "spike",
        }
    }
}

impl Default for LoadShape {
    fn default() -> Self {
        Self::ramp()
    }
}

/// Collapse scenario parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseConfig {
    pub load: LoadShape,
    /// Wait before each retry.
    pub backoff: BackoffPolicy,
    /// Mean one-way network delay in seconds.
    pub network_delay: f64,
    /// Client deadline per attempt.
    pub timeout: f64,
    /// Attempts per request, including the first.
    pub tries: u32,
    pub base_server_time: f64,
    /// Extra server time per request in progress.
    pub concurrency_slope: f64,
    pub stats_every: f64,
    pub first_arrival: f64,
    pub max_t: f64,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            load: LoadShape::ramp(),
            backoff: BackoffPolicy::None,
            network_delay: 0.1,
            timeout: 3.0,
            tries: 3,
            base_server_time: 1.0,
            concurrency_slope: 0.01,
            stats_every: 1.0,
            first_arrival: 0.01,
            max_t: 80.0,
        }
    }
}

impl CollapseConfig {
    pub fn with_load(mut self, load: LoadShape) -> Self {
        self.load = load;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_t(mut self, max_t: f64) -> Self {
        self.max_t = max_t;
        self
    }

    /// Default label, e.g. `spike_backoff_and_jitter`.
    pub fn name(&self) -> String {
        let retry = match self.backoff {
            BackoffPolicy::None => "no_backoff",
            BackoffPolicy::Exponential { .. } => "backoff",
            BackoffPolicy::ExponentialJitter { .. } => "backoff_and_jitter",
        };
        format!("{}_{}", self.load.label(), retry)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        positive("network_delay", self.network_delay)?;
        duration_secs("timeout", self.timeout)?;
        positive("base_server_time", self.base_server_time)?;
        non_negative("concurrency_slope", self.concurrency_slope)?;
        positive("stats_every", self.stats_every)?;
        non_negative("first_arrival", self.first_arrival)?;
        positive("max_t", self.max_t)?;
        at_least_one("tries", self.tries as usize)?;
        self.backoff.validate()?;
        match self.load {
            LoadShape::RampUpDown {
                base_rate, slope, ..
            } => {
                positive("base_rate", base_rate)?;
                non_negative("slope", slope)?;
            }
            LoadShape::Spike {
                base_rate,
                peak_rate,
                spike_width,
                ..
            } => {
                positive("base_rate", base_rate)?;
                positive("peak_rate", peak_rate)?;
                non_negative("spike_width", spike_width)?;
            }
        }
        Ok(())
    }
}

/// Payloads routed by [`CollapseModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseEvent {
    /// The load generator produces a new request.
    GenLoad,
    /// A client's deadline for `attempt` expires.
    Timeout { request: RequestId, attempt: u32 },
    /// `attempt` reaches the server.
    ServerStart { request: RequestId, attempt: u32 },
    /// The server finishes `attempt`.
    ServerEnd { request: RequestId, attempt: u32 },
    /// The response to `attempt` reaches the client.
    Response { request: RequestId, attempt: u32 },
    /// Close the current stats window.
    PrintStats,
}

/// Client state for one request.
#[derive(Debug, Clone)]
pub struct RequestClient {
    tries_left: u32,
    current_try: u32,
    backoff: Backoff,
}

impl RequestClient {
    fn new(tries: u32, backoff: Backoff) -> Self {
        Self {
            tries_left: tries,
            current_try: 0,
            backoff,
        }
    }

    /// Sequence number of the attempt the client is waiting on.
    pub fn current_try(&self) -> u32 {
        self.current_try
    }

    pub fn tries_left(&self) -> u32 {
        self.tries_left
    }
}

/// Counters for one stats window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SecondStats {
    /// Window start, in seconds.
    pub start_t: f64,
    pub starts: u64,
    pub successes: u64,
    pub retries: u64,
    pub timeouts: u64,
    /// Requests in progress at the server when the window closed.
    pub concurrency: u64,
}

/// One row of the collapse report: a window averaged over runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseRow {
    pub t: f64,
    pub starts: f64,
    pub successes: f64,
    pub retries: f64,
    pub timeouts: f64,
    pub concurrency: f64,
    pub run_name: String,
}

impl CsvRecord for CollapseRow {
    fn header() -> &'static str {
        "t,starts,successes,retries,timeouts,concurrency,run_name"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}",
            self.t,
            self.starts,
            self.successes,
            self.retries,
            self.timeouts,
            self.concurrency,
            self.run_name
        )
    }
}

/// Average window `j` across every run that has one.
pub fn average_runs(runs: &[Vec<SecondStats>], run_name: &str) -> Vec<CollapseRow> {
    let windows = runs.iter().map(Vec::len).max().unwrap_or(0);
    (0..windows)
        .map(|j| {
            let present: Vec<&SecondStats> = runs.iter().filter_map(|r| r.get(j)).collect();
            let n = present.len().max(1) as f64;
            let avg = |f: fn(&SecondStats) -> u64| -> f64 {
                present.iter().map(|s| f(s) as f64).sum::<f64>() / n
            };
            CollapseRow {
                t: present.first().map(|s| s.start_t).unwrap_or_default(),
                starts: avg(|s| s.starts),
                successes: avg(|s| s.successes),
                retries: avg(|s| s.retries),
                timeouts: avg(|s| s.timeouts),
                concurrency: avg(|s| s.concurrency),
                run_name: run_name.to_string(),
            }
        })
        .collect()
}

/// The collapse scenario: load generator, clients, server and stats.
pub struct CollapseModel {
    config: CollapseConfig,
    requests: Vec<RequestClient>,
    concurrency: u64,
    current: SecondStats,
    history: Vec<SecondStats>,
    rng: SimRng,
}

impl CollapseModel {
    pub fn new(config: &CollapseConfig, rng: SimRng) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            requests: Vec::new(),
            concurrency: 0,
            current: SecondStats::default(),
            history: Vec::new(),
            rng,
        })
    }

    pub fn initial_events(&self) -> Vec<Event<CollapseEvent>> {
        vec![
            Event::at_secs(self.config.stats_every, CollapseEvent::PrintStats),
            Event::at_secs(self.config.first_arrival, CollapseEvent::GenLoad),
        ]
    }

    pub fn request(&self, id: RequestId) -> Option<&RequestClient> {
        self.requests.get(id.index())
    }

    /// Requests in progress at the server.
    pub fn concurrency(&self) -> u64 {
        self.concurrency
    }

    /// The open stats window.
    pub fn current_window(&self) -> &SecondStats {
        &self.current
    }

    pub fn into_history(self) -> Vec<SecondStats> {
        self.history
    }

    fn network_delay(&mut self) -> Duration {
        let x: f64 = self.rng.sample(Exp1);
        secs(x * self.config.network_delay)
    }

    fn request_mut(
        requests: &mut [RequestClient],
        id: RequestId,
        now: Duration,
    ) -> Result<&mut RequestClient, SimError> {
        match requests.get_mut(id.index()) {
            Some(request) => Ok(request),
            None => Err(SimError::InvariantViolation {
                actor: "Client",
                time: now,
                detail: format!("unknown {id}"),
            }),
        }
    }

    /// Send the current attempt after `extra` and arm its timeout.
    fn send(&mut self, request: RequestId, now: Duration, extra: Duration) -> HandlerResult<CollapseEvent> {
        let attempt = Self::request_mut(&mut self.requests, request, now)?.current_try;
        let sent = now.saturating_add(extra);
        let network_delay = self.network_delay();
        Ok(vec![
            Event::after(
                sent,
                secs(self.config.timeout),
                CollapseEvent::Timeout { request, attempt },
            ),
            Event::after(
                sent,
                network_delay,
                CollapseEvent::ServerStart { request, attempt },
            ),
        ])
    }

    fn on_gen_load(&mut self, now: Duration) -> HandlerResult<CollapseEvent> {
        let id = RequestId::new(self.requests.len() as u64);
        self.requests
            .push(RequestClient::new(self.config.tries, self.config.backoff.start()));
        self.current.starts += 1;
        let mut events = self.send(id, now, Duration::ZERO)?;

        let rate = self.config.load.rate_at(now.as_secs_f64());
        if rate > 0.0 {
            let x: f64 = self.rng.sample(Exp1);
            events.push(Event::after(now, secs(x / rate), CollapseEvent::GenLoad));
        }
        Ok(events)
    }

    fn on_timeout(&mut self, now: Duration, id: RequestId, attempt: u32) -> HandlerResult<CollapseEvent> {
        let request = Self::request_mut(&mut self.requests, id, now)?;
        if attempt != request.current_try {
            trace!(time = ?now, request = %id, attempt, "Stale timeout ignored");
            return Ok(Vec::new());
        }
        request.tries_left = request.tries_left.saturating_sub(1);
        request.current_try += 1;
        let wait = (request.tries_left > 0).then(|| request.backoff.next_delay(&mut self.rng));
        self.current.timeouts += 1;
        let Some(wait) = wait else {
            return Ok(Vec::new());
        };

        self.current.retries += 1;
        self.send(id, now, wait)
    }

    fn on_server_start(&mut self, now: Duration, request: RequestId, attempt: u32) -> HandlerResult<CollapseEvent> {
        self.concurrency += 1;
        let latency = self.config.base_server_time
            + self.concurrency as f64 * self.config.concurrency_slope;
        Ok(vec![Event::after(
            now,
            secs(latency),
            CollapseEvent::ServerEnd { request, attempt },
        )])
    }

    fn on_server_end(&mut self, now: Duration, request: RequestId, attempt: u32) -> HandlerResult<CollapseEvent> {
        ensure_invariant!(
            self.concurrency > 0,
            "Server",
            now,
            "{} attempt {} finished with nothing in progress",
            request,
            attempt
        );
        self.concurrency -= 1;
        let delay = self.network_delay();
        Ok(vec![Event::after(
            now,
            delay,
            CollapseEvent::Response { request, attempt },
        )])
    }

    fn on_response(&mut self, now: Duration, id: RequestId, attempt: u32) -> HandlerResult<CollapseEvent> {
        let request = Self::request_mut(&mut self.requests, id, now)?;
        if attempt != request.current_try {
            trace!(time = ?now, request = %id, attempt, "Late response ignored");
            return Ok(Vec::new());
        }
        request.current_try += 1;
        self.current.successes += 1;
        Ok(Vec::new())
    }

    fn on_print_stats(&mut self, now: Duration) -> HandlerResult<CollapseEvent> {
        self.current.concurrency = self.concurrency;
        let closed = std::mem::replace(
            &mut self.current,
            SecondStats {
                start_t: now.as_secs_f64(),
                ..SecondStats::default()
            },
        );
        self.history.push(closed);
        Ok(vec![Event::after(
            now,
            secs(self.config.stats_every),
            CollapseEvent::PrintStats,
        )])
    }
}

impl Handler<CollapseEvent> for CollapseModel {
    fn handle(&mut self, now: Duration, event: CollapseEvent) -> HandlerResult<CollapseEvent> {
        match event {
            CollapseEvent::GenLoad => self.on_gen_load(now),
            CollapseEvent::Timeout { request, attempt } => self.on_timeout(now, request, attempt),
            CollapseEvent::ServerStart { request, attempt } => {
                self.on_server_start(now, request, attempt)
            }
            CollapseEvent::ServerEnd { request, attempt } => {
                self.on_server_end(now, request, attempt)
            }
            CollapseEvent::Response { request, attempt } => self.on_response(now, request, attempt),
            CollapseEvent::PrintStats => self.on_print_stats(now),
        }
    }
}

/// Run one collapse simulation, returning its closed stats windows.
pub fn run(config: &CollapseConfig, seed: u64) -> Result<Vec<SecondStats>, ModelError> {
    let model = CollapseModel::new(config, rng_for_run(seed))?;
    let initial = model.initial_events();
    let mut runner = SimulationRunner::new(model, StopPolicy::horizon_secs(config.max_t));
    runner.run(initial)?;
    debug!(
        name = %config.name(),
        events = runner.stats().events_processed,
        "Collapse run complete"
    );
    Ok(runner.into_handler().into_history())
}

/// Run `runs` simulations with seeds `seed..seed + runs` and average them.
pub fn run_averaged(
    config: &CollapseConfig,
    name: &str,
    seed: u64,
    runs: u64,
) -> Result<Vec<CollapseRow>, ModelError> {
    let histories = (0..runs)
        .map(|i| run(config, seed.wrapping_add(i)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(average_runs(&histories, name))
}
