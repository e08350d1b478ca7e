//! Retry storm model.
//!
//! Many clients call a single server that fails a fixed fraction of
//! attempts. Each call retries according to the client's
//! [`RetryStrategy`](queuesim_retry::RetryStrategy); the report counts how
//! much extra load the retries put on the server.
//!
//! Clients generate work until the drain horizon, after which in-flight
//! calls run to completion and the queue empties.
//!
//! ```text
//!  GenLoad ──▶ CallStart ──rtt──▶ ServerHandle ──▶ CallSucceeded ──▶ client
//!                                      ▲       └──▶ CallFailed ──┬─▶ client
//!                                      └────── rtt + backoff ────┘
//! ```

mod call;
mod client;
mod server;

pub use call::Call;
pub use client::{Client, ClientKind};
pub use server::Server;

use crate::dist::{exp_with_mean, exp_with_rate, sample_delay};
use crate::error::{at_least_one, positive, ModelError};
use crate::report::CsvRecord;
use crate::{rng_for_run, SimRng};
use client::Next;
use queuesim_core::{sim_id, Event, Handler, HandlerResult, SimError};
use queuesim_retry::{BackoffPolicy, RetryStrategyConfig};
use queuesim_simulation::{RunController, SimulationRunner, StopPolicy};
use rand_distr::Exp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, trace};

sim_id!(
    /// A client, indexing [`RetryModel`]'s client list.
    ClientId,
    "client"
);

sim_id!(
    /// A logical call (all of its attempts).
    CallId,
    "call"
);

/// Retry storm parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetriesConfig {
    pub clients: usize,
    /// Calls per second per client.
    pub rate_per_client: f64,
    pub failure_rate: f64,
    pub client_kind: ClientKind,
    pub strategy: RetryStrategyConfig,
    /// Backoff between attempts of one call.
    pub call_backoff: BackoffPolicy,
    /// Mean network round trip in seconds.
    pub rtt_mean: f64,
    /// Seconds of load generation before draining.
    pub max_t: f64,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            clients: 100,
            rate_per_client: 10.0,
            failure_rate: 0.0,
            client_kind: ClientKind::Open,
            strategy: RetryStrategyConfig::n_retries(3),
            call_backoff: BackoffPolicy::None,
            rtt_mean: 0.01,
            max_t: 10.0,
        }
    }
}

impl RetriesConfig {
    pub fn with_clients(mut self, clients: usize) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_rate_per_client(mut self, rate: f64) -> Self {
        self.rate_per_client = rate;
        self
    }

    /// Split a total call rate evenly across the clients.
    pub fn with_total_rate(mut self, rate: f64) -> Self {
        self.rate_per_client = rate / self.clients.max(1) as f64;
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    pub fn with_client_kind(mut self, kind: ClientKind) -> Self {
        self.client_kind = kind;
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategyConfig) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_call_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.call_backoff = backoff;
        self
    }

    pub fn with_max_t(mut self, max_t: f64) -> Self {
        self.max_t = max_t;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        at_least_one("clients", self.clients)?;
        positive("rate_per_client", self.rate_per_client)?;
        positive("rtt_mean", self.rtt_mean)?;
        positive("max_t", self.max_t)?;
        self.strategy.validate()?;
        self.call_backoff.validate()?;
        Ok(())
    }
}

/// Payloads routed by [`RetryModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    GenLoad(ClientId),
    CallStart(CallId),
    ServerHandle(CallId),
    CallSucceeded(CallId),
    CallFailed(CallId),
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    pub successes: u64,
    /// Every attempt, first tries and retries.
    pub total_calls: u64,
    /// First tries only.
    pub unique_calls: u64,
}

/// One row of the retry storm report.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStats {
    pub failure_rate: f64,
    pub successes: u64,
    pub total_calls: u64,
    pub unique_calls: u64,
    pub name: String,
}

impl RetryStats {
    /// Attempts per logical call.
    pub fn amplification(&self) -> f64 {
        if self.unique_calls == 0 {
            0.0
        } else {
            self.total_calls as f64 / self.unique_calls as f64
        }
    }
}

impl CsvRecord for RetryStats {
    fn header() -> &'static str {
        "failure_rate,successes,total_calls,unique_calls,name"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:.6},{},{},{},{}",
            self.failure_rate, self.successes, self.total_calls, self.unique_calls, self.name
        )
    }
}

/// The retry storm scenario.
pub struct RetryModel {
    clients: Vec<Client>,
    calls: HashMap<CallId, Call>,
    next_call: u64,
    server: Server,
    call_backoff: BackoffPolicy,
    rtt: Exp<f64>,
    counters: RetryCounters,
    controller: RunController,
    rng: SimRng,
}

impl RetryModel {
    /// Build the model. `controller` must be the one the runner drains.
    pub fn new(
        config: &RetriesConfig,
        controller: RunController,
        rng: SimRng,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let inter_arrival = exp_with_rate("rate_per_client", config.rate_per_client)?;
        let clients = (0..config.clients)
            .map(|_| -> Result<Client, ModelError> {
                Ok(Client::new(
                    config.client_kind,
                    config.strategy.build()?,
                    inter_arrival,
                    config.rate_per_client,
                ))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(Self {
            clients,
            calls: HashMap::new(),
            next_call: 0,
            server: Server::new(config.failure_rate)?,
            call_backoff: config.call_backoff,
            rtt: exp_with_mean("rtt_mean", config.rtt_mean)?,
            counters: RetryCounters::default(),
            controller,
            rng,
        })
    }

    /// One `GenLoad` per client, each after a network round trip.
    pub fn initial_events(&mut self) -> Vec<Event<RetryEvent>> {
        (0..self.clients.len() as u64)
            .map(|i| {
                let delay = sample_delay(&self.rtt, &mut self.rng);
                Event::new(delay, RetryEvent::GenLoad(ClientId::new(i)))
            })
            .collect()
    }

    pub fn counters(&self) -> RetryCounters {
        self.counters
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(id.index())
    }

    /// Calls started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }

    pub fn stats(&self, name: &str) -> RetryStats {
        RetryStats {
            failure_rate: self.server.failure_rate(),
            successes: self.counters.successes,
            total_calls: self.counters.total_calls,
            unique_calls: self.counters.unique_calls,
            name: name.to_string(),
        }
    }

    fn new_call(&mut self, client: ClientId, now: Duration) -> Result<CallId, SimError> {
        let Some(owner) = self.clients.get(client.index()) else {
            return Err(unknown("Client", now, client));
        };
        let policy = owner.strategy().new_call();
        let id = CallId::new(self.next_call);
        self.next_call += 1;
        self.calls
            .insert(id, Call::new(client, policy, self.call_backoff.start()));
        Ok(id)
    }

    /// Turn a client's intent into events.
    fn schedule(&mut self, client: ClientId, now: Duration, next: Next) -> HandlerResult<RetryEvent> {
        Ok(match next {
            Next::Nothing => Vec::new(),
            Next::GenLoad(delay) => vec![Event::after(now, delay, RetryEvent::GenLoad(client))],
            Next::StartCall(delay) => {
                let call = self.new_call(client, now)?;
                vec![Event::after(now, delay, RetryEvent::CallStart(call))]
            }
            Next::GenLoadAndCall(delay) => {
                let call = self.new_call(client, now)?;
                vec![
                    Event::after(now, delay, RetryEvent::GenLoad(client)),
                    Event::new(now, RetryEvent::CallStart(call)),
                ]
            }
        })
    }

    fn on_gen_load(&mut self, now: Duration, id: ClientId) -> HandlerResult<RetryEvent> {
        let draining = self.controller.is_draining();
        let Some(client) = self.clients.get_mut(id.index()) else {
            return Err(unknown("Client", now, id));
        };
        let next = client.gen_load(now, draining, &mut self.rng);
        self.schedule(id, now, next)
    }

    fn on_call_start(&mut self, now: Duration, id: CallId) -> HandlerResult<RetryEvent> {
        let Some(call) = self.calls.get_mut(&id) else {
            return Err(unknown("Call", now, id));
        };
        call.start();
        self.counters.unique_calls += 1;
        self.counters.total_calls += 1;
        let rtt = sample_delay(&self.rtt, &mut self.rng);
        Ok(vec![Event::after(now, rtt, RetryEvent::ServerHandle(id))])
    }

    fn on_server_handle(&mut self, now: Duration, id: CallId) -> HandlerResult<RetryEvent> {
        let outcome = if self.server.handle(&mut self.rng) {
            RetryEvent::CallSucceeded(id)
        } else {
            RetryEvent::CallFailed(id)
        };
        Ok(vec![Event::new(now, outcome)])
    }

    fn on_call_succeeded(&mut self, now: Duration, id: CallId) -> HandlerResult<RetryEvent> {
        let Some(call) = self.calls.remove(&id) else {
            return Err(unknown("Call", now, id));
        };
        self.counters.successes += 1;

        let owner = call.client();
        let draining = self.controller.is_draining();
        let Some(client) = self.clients.get_mut(owner.index()) else {
            return Err(unknown("Client", now, owner));
        };
        let next = client.done_success(now, draining, &mut self.rng);
        self.schedule(owner, now, next)
    }

    fn on_call_failed(&mut self, now: Duration, id: CallId) -> HandlerResult<RetryEvent> {
        let Some(call) = self.calls.get_mut(&id) else {
            return Err(unknown("Call", now, id));
        };

        if let Some(backoff) = call.retry_delay(&mut self.rng) {
            self.counters.total_calls += 1;
            let rtt = sample_delay(&self.rtt, &mut self.rng);
            trace!(time = ?now, call = %id, ?backoff, "Retrying call");
            return Ok(vec![Event::after(
                now,
                rtt.saturating_add(backoff),
                RetryEvent::ServerHandle(id),
            )]);
        }

        let owner = call.client();
        self.calls.remove(&id);
        let draining = self.controller.is_draining();
        let Some(client) = self.clients.get_mut(owner.index()) else {
            return Err(unknown("Client", now, owner));
        };
        let next = client.done_failure(now, draining, &mut self.rng);
        self.schedule(owner, now, next)
    }
}

fn unknown(actor: &'static str, now: Duration, id: impl std::fmt::Display) -> SimError {
    SimError::InvariantViolation {
        actor,
        time: now,
        detail: format!("event for finished or unknown {id}"),
    }
}

impl Handler<RetryEvent> for RetryModel {
    fn handle(&mut self, now: Duration, event: RetryEvent) -> HandlerResult<RetryEvent> {
        match event {
            RetryEvent::GenLoad(id) => self.on_gen_load(now, id),
            RetryEvent::CallStart(id) => self.on_call_start(now, id),
            RetryEvent::ServerHandle(id) => self.on_server_handle(now, id),
            RetryEvent::CallSucceeded(id) => self.on_call_succeeded(now, id),
            RetryEvent::CallFailed(id) => self.on_call_failed(now, id),
        }
    }
}

/// Run one retry storm simulation to completion (generation, then drain).
pub fn run(config: &RetriesConfig, name: &str, seed: u64) -> Result<RetryStats, ModelError> {
    let controller = RunController::new();
    let mut model = RetryModel::new(config, controller.clone(), rng_for_run(seed))?;
    let initial = model.initial_events();

    let mut runner = SimulationRunner::with_controller(
        model,
        StopPolicy::drain_secs(config.max_t),
        controller,
    );
    runner.run(initial)?;

    let model = runner.into_handler();
    let stats = model.stats(name);
    debug!(
        name,
        failure_rate = config.failure_rate,
        total_calls = stats.total_calls,
        in_flight = model.in_flight(),
        "Retry run complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_core::SimError;

    fn small(config: RetriesConfig) -> RetriesConfig {
        config.with_clients(10).with_rate_per_client(10.0).with_max_t(5.0)
    }

    #[test]
    fn test_healthy_server_needs_no_retries() {
        let config = small(RetriesConfig::default());
        let stats = run(&config, "three_retries", 1).unwrap();
        assert!(stats.unique_calls > 0);
        assert_eq!(stats.successes, stats.unique_calls);
        assert_eq!(stats.total_calls, stats.unique_calls);
        assert_eq!(stats.amplification(), 1.0);
    }

    #[test]
    fn test_broken_server_gets_n_plus_one_attempts() {
        let config = small(RetriesConfig::default())
            .with_failure_rate(1.0)
            .with_strategy(RetryStrategyConfig::n_retries(3));
        let stats = run(&config, "three_retries", 2).unwrap();
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.total_calls, 4 * stats.unique_calls);
    }

    #[test]
    fn test_no_retries_against_broken_server() {
        let config = small(RetriesConfig::default())
            .with_failure_rate(1.0)
            .with_strategy(RetryStrategyConfig::no_retries());
        let stats = run(&config, "no_retries", 3).unwrap();
        assert_eq!(stats.total_calls, stats.unique_calls);
    }

    #[test]
    fn test_breaker_caps_amplification() {
        let base = small(RetriesConfig::default()).with_failure_rate(0.5);
        let retries = run(
            &base.clone().with_strategy(RetryStrategyConfig::n_retries(3)),
            "three_retries",
            4,
        )
        .unwrap();
        let breaker = run(
            &base.with_strategy(RetryStrategyConfig::circuit_breaker(
                RetryStrategyConfig::n_retries(3),
                0.1,
            )),
            "breaker_10pct",
            4,
        )
        .unwrap();
        assert!(breaker.amplification() < retries.amplification());
    }

    #[test]
    fn test_open_client_gen_load_events() {
        let controller = RunController::new();
        let config = small(RetriesConfig::default());
        let mut model = RetryModel::new(&config, controller.clone(), rng_for_run(5)).unwrap();
        let client = ClientId::new(0);

        let events = model.handle(Duration::ZERO, RetryEvent::GenLoad(client)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].payload(), RetryEvent::GenLoad(c) if *c == client));
        assert_eq!(events[1].time(), Duration::ZERO);
        let RetryEvent::CallStart(call) = *events[1].payload() else {
            panic!("expected a call start, got {:?}", events[1].payload());
        };
        assert_eq!(model.in_flight(), 1);

        let events = model.handle(Duration::ZERO, RetryEvent::CallStart(call)).unwrap();
        assert!(matches!(events[0].payload(), RetryEvent::ServerHandle(_)));
        assert_eq!(model.counters().unique_calls, 1);

        controller.begin_drain();
        let events = model.handle(Duration::from_secs(6), RetryEvent::GenLoad(client)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_finished_call_event_is_fatal() {
        let config = small(RetriesConfig::default());
        let mut model = RetryModel::new(&config, RunController::new(), rng_for_run(6)).unwrap();
        let err = model
            .handle(Duration::ZERO, RetryEvent::CallSucceeded(CallId::new(77)))
            .unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation { actor: "Call", .. }));
    }

    #[test]
    fn test_serial_clients_drain_completely() {
        for kind in [ClientKind::Serial, ClientKind::SerialWithBackoff] {
            let config = small(RetriesConfig::default())
                .with_client_kind(kind)
                .with_failure_rate(0.3);
            let controller = RunController::new();
            let mut model = RetryModel::new(&config, controller.clone(), rng_for_run(8)).unwrap();
            let initial = model.initial_events();
            let mut runner = SimulationRunner::with_controller(
                model,
                StopPolicy::drain_secs(config.max_t),
                controller,
            );
            runner.run(initial).unwrap();
            assert!(runner.controller().is_draining());
            assert_eq!(runner.handler().in_flight(), 0, "{kind:?}");
        }
    }

    #[test]
    fn test_same_seed_same_stats() {
        let config = small(RetriesConfig::default()).with_failure_rate(0.2);
        assert_eq!(
            run(&config, "x", 11).unwrap(),
            run(&config, "x", 11).unwrap()
        );
    }

    #[test]
    fn test_csv_row() {
        let stats = RetryStats {
            failure_rate: 0.1,
            successes: 90,
            total_calls: 120,
            unique_calls: 100,
            name: "three_retries".to_string(),
        };
        assert_eq!(stats.to_row().unwrap(), "0.100000,90,120,100,three_retries");
    }

    #[test]
    fn test_unrepresentable_call_backoff_rejected() {
        let config = small(RetriesConfig::default())
            .with_failure_rate(1.0)
            .with_call_backoff(BackoffPolicy::Exponential { base: 1e300 });
        assert!(matches!(run(&config, "huge_backoff", 1), Err(ModelError::Retry(_))));
    }

    #[test]
    fn test_large_call_backoff_runs_to_completion() {
        let config = small(RetriesConfig::default())
            .with_max_t(2.0)
            .with_failure_rate(1.0)
            .with_strategy(RetryStrategyConfig::n_retries(70))
            .with_call_backoff(BackoffPolicy::Exponential { base: 1e18 });
        let stats = run(&config, "large_backoff", 1).unwrap();
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.total_calls, 71 * stats.unique_calls);
    }
}
