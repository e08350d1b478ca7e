//! The actor/event-handler contract.

use crate::{Event, SimError};
use std::time::Duration;

/// What a handler hands back to the runner: the follow-up events, or a fatal
/// error.
pub type HandlerResult<P> = Result<Vec<Event<P>>, SimError>;

/// Something that reacts to dispatched events.
///
/// This is the core abstraction of the kernel. Scenario models implement it
/// once and route each payload variant to the actor that owns it:
///
/// - **Synchronous**: No blocking, no yielding; runs to completion
/// - **Deterministic**: Same state + payload + RNG draws = same follow-ups
/// - **Queue-blind**: Never inserts into the queue; returns events instead
///
/// # Example
///
/// ```ignore
/// impl Handler<SkiEvent> for SkiModel {
///     fn handle(&mut self, now: Duration, event: SkiEvent) -> HandlerResult<SkiEvent> {
///         match event {
///             SkiEvent::DequeueSkiers => self.lift.dequeue_skiers(now, &mut self.skiers, &mut self.rng),
///             SkiEvent::LeaveLift(id) => self.skiers[id].leave_lift(now, id),
///             // ... etc
///         }
///     }
/// }
/// ```
pub trait Handler<P> {
    /// Process one dispatched event, returning the events it causes.
    ///
    /// # Guarantees
    ///
    /// - An empty vector means "no follow-up work"; stale events take this path
    /// - Returned events are inserted after this call returns, never during it
    /// - Shared state is left consistent before returning, since the very next
    ///   event may re-enter the same actor
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvariantViolation`] when the actor observes state its
    /// model forbids. The runner aborts the run.
    fn handle(&mut self, now: Duration, payload: P) -> HandlerResult<P>;
}

/// A handler backed by a closure, for tests and one-off drivers.
impl<P, F> Handler<P> for F
where
    F: FnMut(Duration, P) -> HandlerResult<P>,
{
    fn handle(&mut self, now: Duration, payload: P) -> HandlerResult<P> {
        (self)(now, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch<H: Handler<u32>>(h: &mut H, now: Duration, p: u32) -> HandlerResult<u32> {
        h.handle(now, p)
    }

    #[test]
    fn test_closure_is_a_handler() {
        let mut seen = Vec::new();
        let mut handler = |now: Duration, p: u32| {
            seen.push(p);
            if p < 2 {
                Ok(vec![Event::after(now, Duration::from_secs(1), p + 1)])
            } else {
                Ok(Vec::new())
            }
        };

        let out = dispatch(&mut handler, Duration::ZERO, 0).unwrap();
        assert_eq!(out, vec![Event::new(Duration::from_secs(1), 1)]);
        let out = dispatch(&mut handler, Duration::from_secs(2), 2).unwrap();
        assert!(out.is_empty());
        assert_eq!(seen, vec![0, 2]);
    }
}
