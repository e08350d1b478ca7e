//! Delays between attempts.

use crate::config::RetryConfigError;
use queuesim_core::secs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Retry immediately.
    #[default]
    None,

    /// Wait `base` seconds, then twice as long after every further attempt.
    Exponential { base: f64 },

    /// Double the backoff (starting from `initial`) and wait a uniformly
    /// random fraction of it.
    ExponentialJitter { initial: f64 },
}

impl BackoffPolicy {
    /// Fresh backoff state for one call (or one client).
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial(),
        }
    }

    /// Reject parameters that are not a representable delay.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        let (name, value) = match *self {
            BackoffPolicy::None => return Ok(()),
            BackoffPolicy::Exponential { base } => ("base", base),
            BackoffPolicy::ExponentialJitter { initial } => ("initial", initial),
        };
        if value >= 0.0 && Duration::try_from_secs_f64(value).is_ok() {
            Ok(())
        } else {
            Err(RetryConfigError::InvalidBackoff { name, value })
        }
    }

    fn initial(&self) -> f64 {
        match self {
            BackoffPolicy::None => 0.0,
            BackoffPolicy::Exponential { base } => *base,
            BackoffPolicy::ExponentialJitter { initial } => *initial,
        }
    }
}

/// Running backoff state.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: f64,
}

impl Backoff {
    /// Delay before the next attempt; grows the backoff for the one after.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        match self.policy {
            BackoffPolicy::None => Duration::ZERO,
            BackoffPolicy::Exponential { .. } => {
                let delay = self.current;
                self.current *= 2.0;
                secs(delay)
            }
            BackoffPolicy::ExponentialJitter { .. } => {
                self.current *= 2.0;
                secs(rng.gen::<f64>() * self.current)
            }
        }
    }

    /// Current backoff in seconds (the un-jittered value).
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Back to the initial backoff, e.g. after a success.
    pub fn reset(&mut self) {
        self.current = self.policy.initial();
    }
}
