//! Test helpers for queuesim.
//!
//! Provides a recording [`Handler`] that keeps a trace of every dispatch,
//! optionally driven by a script that returns follow-up events, plus a
//! seeded RNG constructor so tests share one source of determinism.

use queuesim_core::{Event, Handler, HandlerResult, SimError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Seed used by tests that don't care about the exact value.
pub const TEST_SEED: u64 = 42;

/// Deterministic RNG for tests.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

type Script<P> = Box<dyn FnMut(Duration, &P) -> Result<Vec<Event<P>>, SimError>>;

/// Handler that records every `(time, payload)` it is given.
pub struct Recorder<P> {
    trace: Vec<(Duration, P)>,
    script: Script<P>,
}

impl<P: Clone + 'static> Recorder<P> {
    /// A recorder that never schedules follow-ups.
    pub fn new() -> Self {
        Self::scripted(|_, _| Ok(Vec::new()))
    }

    /// A recorder that asks `script` for the follow-ups of each dispatch.
    pub fn scripted<F>(script: F) -> Self
    where
        F: FnMut(Duration, &P) -> Result<Vec<Event<P>>, SimError> + 'static,
    {
        Self {
            trace: Vec::new(),
            script: Box::new(script),
        }
    }

    /// Everything dispatched so far, in dispatch order.
    pub fn trace(&self) -> &[(Duration, P)] {
        &self.trace
    }

    /// Only the payloads, in dispatch order.
    pub fn payloads(&self) -> Vec<P> {
        self.trace.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Only the dispatch times.
    pub fn times(&self) -> Vec<Duration> {
        self.trace.iter().map(|(t, _)| *t).collect()
    }
}

impl<P: Clone + 'static> Default for Recorder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> Handler<P> for Recorder<P> {
    fn handle(&mut self, now: Duration, payload: P) -> HandlerResult<P> {
        let followups = (self.script)(now, &payload)?;
        self.trace.push((now, payload));
        Ok(followups)
    }
}

/// Events at whole-second offsets, one per payload.
pub fn events_at_secs<P>(items: impl IntoIterator<Item = (u64, P)>) -> Vec<Event<P>> {
    items
        .into_iter()
        .map(|(s, p)| Event::new(Duration::from_secs(s), p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let a: Vec<u32> = seeded_rng(TEST_SEED).sample_iter(rand::distributions::Standard).take(8).collect();
        let b: Vec<u32> = seeded_rng(TEST_SEED).sample_iter(rand::distributions::Standard).take(8).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_recorder_keeps_trace() {
        let mut recorder = Recorder::new();
        recorder.handle(Duration::from_secs(1), "a").unwrap();
        recorder.handle(Duration::from_secs(2), "b").unwrap();
        assert_eq!(recorder.payloads(), vec!["a", "b"]);
        assert_eq!(
            recorder.times(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_scripted_followups() {
        let mut recorder = Recorder::scripted(|now, n: &u32| {
            Ok(vec![Event::after(now, Duration::from_secs(1), n + 1)])
        });
        let out = recorder.handle(Duration::from_secs(3), 7).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time(), Duration::from_secs(4));
        assert_eq!(*out[0].payload(), 8);
    }
}
