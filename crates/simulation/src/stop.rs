//! Termination policies.

use std::time::Duration;

/// When a run stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopPolicy {
    /// Run until the queue is empty.
    #[default]
    Exhaust,

    /// Stop at the first event whose time is at or past `max_t`. That event
    /// is left queued, never dispatched.
    Horizon(Duration),

    /// Never stop on time. The first event past `horizon` switches the
    /// run's [`RunController`](crate::RunController) into drain mode, after
    /// which generators stop producing arrivals and the run ends when
    /// in-flight work has completed.
    Drain {
        /// Time after which no new work is generated.
        horizon: Duration,
    },
}

impl StopPolicy {
    /// Stop at `max_t` seconds.
    pub fn horizon_secs(max_t: f64) -> Self {
        Self::Horizon(queuesim_core::secs(max_t))
    }

    /// Drain after `horizon` seconds.
    pub fn drain_secs(horizon: f64) -> Self {
        Self::Drain {
            horizon: queuesim_core::secs(horizon),
        }
    }

    /// Whether an event at `time` must not be dispatched.
    pub fn should_stop(&self, time: Duration) -> bool {
        match self {
            StopPolicy::Horizon(max_t) => time >= *max_t,
            StopPolicy::Exhaust | StopPolicy::Drain { .. } => false,
        }
    }

    /// Whether an event at `time` is past the drain horizon.
    pub fn past_drain_horizon(&self, time: Duration) -> bool {
        match self {
            StopPolicy::Drain { horizon } => time > *horizon,
            StopPolicy::Exhaust | StopPolicy::Horizon(_) => false,
        }
    }

    /// The horizon, if the policy has one.
    pub fn horizon(&self) -> Option<Duration> {
        match self {
            StopPolicy::Exhaust => None,
            StopPolicy::Horizon(max_t) => Some(*max_t),
            StopPolicy::Drain { horizon } => Some(*horizon),
        }
    }
}
