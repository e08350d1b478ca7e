//! Simulated time.
//!
//! Simulated time is a `Duration` since the start of the run. Using
//! `Duration` keeps every timestamp non-negative and totally ordered, so the
//! event queue never has to reason about NaN.

use crate::error::{SimError, SimResult};
use std::time::Duration;

/// Convert (fractional) seconds into simulated time.
///
/// Model code samples delays from continuous distributions that can produce
/// negative values (a normal ride time, say). Those are clamped to zero, NaN
/// maps to zero and values too large to represent saturate at
/// `Duration::MAX`, which is past every horizon.
pub fn secs(s: f64) -> Duration {
    if s.is_nan() || s <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX)
}

/// The simulated clock.
///
/// Holds the time of the most recently dispatched event. It only moves
/// forward; actors read it (through the `now` argument of their handlers)
/// to compute elapsed durations such as `completion - created`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimClock {
    now: Duration,
}

impl SimClock {
    /// A clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    #[inline]
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock to `to`.
    ///
    /// Fails with [`SimError::ClockRegression`] if `to` is before the
    /// current time.
    pub fn advance_to(&mut self, to: Duration) -> SimResult<()> {
        if to < self.now {
            return Err(SimError::ClockRegression {
                now: self.now,
                requested: to,
            });
        }
        self.now = to;
        Ok(())
    }
}
