//! Scheduled events.

use crate::time::secs;
use std::time::Duration;

/// A single scheduled unit of work.
///
/// Events are immutable once created: the fields are private and the runner
/// consumes each event by value when it dispatches it. A retried or modified
/// action is always a *new* event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    time: Duration,
    payload: P,
}

impl<P> Event<P> {
    /// Create an event at an absolute simulated time.
    pub fn new(time: Duration, payload: P) -> Self {
        Self { time, payload }
    }

    /// Create an event at an absolute time given in (fractional) seconds.
    ///
    /// Negative or NaN times are clamped to zero, see [`secs`].
    pub fn at_secs(time: f64, payload: P) -> Self {
        Self::new(secs(time), payload)
    }

    /// Create an event `delay` after `now`.
    pub fn after(now: Duration, delay: Duration, payload: P) -> Self {
        Self::new(now.saturating_add(delay), payload)
    }

    /// When this event fires.
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The payload, which also names the handler it is routed to.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consume the event, returning its payload.
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Consume the event, returning `(time, payload)`.
    pub fn into_parts(self) -> (Duration, P) {
        (self.time, self.payload)
    }
}
