use queuesim_retry::{Backoff, BackoffPolicy, RetryStrategy};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a client paces its calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// Poisson arrivals with no concurrency limit.
    #[default]
    Open,
    /// One call in flight, started as close to the target rate as that
    /// allows.
    Serial,
    /// Serial, and after a failed call waits an uncapped, doubling backoff
    /// (starting at one inter-arrival time) before the next one.
    SerialWithBackoff,
}

/// What the client wants next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Next {
    Nothing,
    /// Start a new call after this delay.
    StartCall(Duration),
    /// Run `gen_load` again after this delay.
    GenLoad(Duration),
    /// Both: another `gen_load` and a call starting now.
    GenLoadAndCall(Duration),
}

/// A load-generating client.
pub struct Client {
    kind: ClientKind,
    strategy: Box<dyn RetryStrategy>,
    inter_arrival: Exp<f64>,
    /// Serial pacing: when the last call was scheduled to start.
    last_call_start: Duration,
    /// Client-level backoff for [`ClientKind::SerialWithBackoff`].
    backoff: Backoff,
}

impl Client {
    pub(super) fn new(
        kind: ClientKind,
        strategy: Box<dyn RetryStrategy>,
        inter_arrival: Exp<f64>,
        rate: f64,
    ) -> Self {
        Self {
            kind,
            strategy,
            inter_arrival,
            last_call_start: Duration::ZERO,
            backoff: BackoffPolicy::Exponential { base: 1.0 / rate }.start(),
        }
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    pub fn strategy(&self) -> &dyn RetryStrategy {
        self.strategy.as_ref()
    }

    /// Current client-level backoff in seconds.
    pub fn backoff(&self) -> f64 {
        self.backoff.current()
    }

    /// Time to produce load. `draining` stops all generation.
    pub(super) fn gen_load<R: Rng + ?Sized>(
        &mut self,
        now: Duration,
        draining: bool,
        rng: &mut R,
    ) -> Next {
        if draining {
            return Next::Nothing;
        }
        let gap = crate::dist::sample_delay(&self.inter_arrival, rng);
        match self.kind {
            ClientKind::Open => Next::GenLoadAndCall(gap),
            ClientKind::Serial => {
                // Start immediately if we've already waited longer than the
                // sampled gap since the last start.
                let waited = now.saturating_sub(self.last_call_start);
                let delay = gap.saturating_sub(waited);
                self.last_call_start = now.saturating_add(delay);
                Next::StartCall(delay)
            }
            ClientKind::SerialWithBackoff => Next::StartCall(gap),
        }
    }

    pub(super) fn done_success<R: Rng + ?Sized>(
        &mut self,
        now: Duration,
        draining: bool,
        rng: &mut R,
    ) -> Next {
        match self.kind {
            ClientKind::Open => Next::Nothing,
            ClientKind::Serial => self.gen_load(now, draining, rng),
            ClientKind::SerialWithBackoff => {
                self.backoff.reset();
                self.gen_load(now, draining, rng)
            }
        }
    }

    pub(super) fn done_failure<R: Rng + ?Sized>(
        &mut self,
        now: Duration,
        draining: bool,
        rng: &mut R,
    ) -> Next {
        match self.kind {
            ClientKind::Open => Next::Nothing,
            ClientKind::Serial => self.gen_load(now, draining, rng),
            ClientKind::SerialWithBackoff => Next::GenLoad(self.backoff.next_delay(rng)),
        }
    }
}
