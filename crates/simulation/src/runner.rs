//! Deterministic simulation runner.
//!
//! The runner owns the event queue, the clock and the model handler. It is
//! the only thing that advances simulated time; all domain logic runs inside
//! `Handler::handle`.

use crate::control::RunController;
use crate::event_queue::EventQueue;
use crate::stop::StopPolicy;
use queuesim_core::{Event, Handler, SimClock, SimError, SimResult};
use std::time::Duration;
use tracing::{debug, trace};

/// Deterministic simulation runner.
///
/// Processes events in `(time, insertion order)` order and feeds every
/// follow-up event back into the queue. Given the same initial events and a
/// handler with the same seeded RNG, it produces identical results every
/// run.
pub struct SimulationRunner<P, H> {
    /// The scenario model receiving every dispatched event.
    handler: H,

    /// Global event queue, ordered deterministically.
    queue: EventQueue<P>,

    /// Time of the most recently dispatched event.
    clock: SimClock,

    /// When to stop.
    stop: StopPolicy,

    /// Drain flag shared with generator actors.
    controller: RunController,

    /// Statistics.
    stats: SimulationStats,
}

/// Statistics collected during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Events dispatched to the handler.
    pub events_processed: u64,
    /// Events inserted, by the driver or as follow-ups.
    pub events_scheduled: u64,
    /// Dispatches whose handler returned no follow-up events.
    pub empty_dispatches: u64,
    /// Largest number of pending events observed.
    pub peak_queue_len: usize,
    /// Simulated time at which drain mode began, if it did.
    pub drain_started_at: Option<Duration>,
}

impl SimulationStats {
    /// Mean follow-ups produced per dispatched event.
    pub fn fanout(&self) -> f64 {
        if self.events_processed == 0 {
            0.0
        } else {
            self.events_scheduled as f64 / self.events_processed as f64
        }
    }
}

/// Why a call to [`SimulationRunner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The queue emptied.
    Exhausted,
    /// The next event is at or past the horizon and was left undispatched.
    HorizonReached {
        /// Time of the first undispatched event.
        next_event: Duration,
    },
    /// The step budget of [`SimulationRunner::run_for_steps`] ran out.
    StepLimit,
}

/// Result of a single [`SimulationRunner::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One event was dispatched.
    Dispatched {
        /// Time of the dispatched event.
        time: Duration,
        /// Number of follow-up events it produced.
        followups: usize,
    },
    /// Nothing left to dispatch.
    Exhausted,
    /// The stop policy refused the next event.
    HorizonReached {
        /// Time of the refused event.
        next_event: Duration,
    },
}

impl<P, H> SimulationRunner<P, H>
where
    H: Handler<P>,
{
    /// Create a runner with its own controller.
    pub fn new(handler: H, stop: StopPolicy) -> Self {
        Self::with_controller(handler, stop, RunController::new())
    }

    /// Create a runner sharing `controller` with the actors inside `handler`.
    pub fn with_controller(handler: H, stop: StopPolicy, controller: RunController) -> Self {
        Self {
            handler,
            queue: EventQueue::new(),
            clock: SimClock::new(),
            stop,
            controller,
            stats: SimulationStats::default(),
        }
    }

    /// Queue an event before (or between) runs.
    pub fn schedule(&mut self, event: Event<P>) {
        self.queue.insert(event);
        self.stats.events_scheduled += 1;
        self.stats.peak_queue_len = self.stats.peak_queue_len.max(self.queue.len());
    }

    /// Queue several events, in order.
    pub fn schedule_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Event<P>>,
    {
        for event in events {
            self.schedule(event);
        }
    }

    /// Seed the queue with `initial` and run until the stop policy or an
    /// empty queue ends the run.
    ///
    /// # Errors
    ///
    /// Any error returned by the handler is propagated unchanged, as is a
    /// follow-up event scheduled before the current time.
    pub fn run<I>(&mut self, initial: I) -> SimResult<RunOutcome>
    where
        I: IntoIterator<Item = Event<P>>,
    {
        self.schedule_all(initial);

        debug!(
            pending = self.queue.len(),
            stop = ?self.stop,
            "Starting simulation run"
        );

        let outcome = loop {
            match self.step()? {
                StepOutcome::Dispatched { .. } => {}
                StepOutcome::Exhausted => break RunOutcome::Exhausted,
                StepOutcome::HorizonReached { next_event } => {
                    break RunOutcome::HorizonReached { next_event }
                }
            }
        };

        debug!(
            events_processed = self.stats.events_processed,
            events_scheduled = self.stats.events_scheduled,
            final_time = ?self.clock.now(),
            ?outcome,
            "Simulation run complete"
        );

        Ok(outcome)
    }

    /// Run for at most `max_steps` dispatches.
    pub fn run_for_steps(&mut self, max_steps: u64) -> SimResult<RunOutcome> {
        for _ in 0..max_steps {
            match self.step()? {
                StepOutcome::Dispatched { .. } => {}
                StepOutcome::Exhausted => return Ok(RunOutcome::Exhausted),
                StepOutcome::HorizonReached { next_event } => {
                    return Ok(RunOutcome::HorizonReached { next_event })
                }
            }
        }
        Ok(RunOutcome::StepLimit)
    }

    /// Dispatch exactly one event, if the queue and the stop policy allow it.
    pub fn step(&mut self) -> SimResult<StepOutcome> {
        let Some(next) = self.queue.peek_time() else {
            return Ok(StepOutcome::Exhausted);
        };

        if self.stop.should_stop(next) {
            debug!(
                next_event = ?next,
                remaining_events = self.queue.len(),
                "Time limit reached"
            );
            return Ok(StepOutcome::HorizonReached { next_event: next });
        }

        if self.stop.past_drain_horizon(next) && self.controller.begin_drain() {
            self.stats.drain_started_at = Some(next);
            debug!(
                time = ?next,
                pending = self.queue.len(),
                "Drain horizon crossed, generators stopping"
            );
        }

        let (key, event) = self.queue.pop_min_keyed()?;
        let (time, payload) = event.into_parts();
        self.clock.advance_to(time)?;
        self.stats.events_processed += 1;

        trace!(
            time = ?time,
            sequence = key.sequence,
            pending = self.queue.len(),
            "Processing event"
        );

        let followups = self.handler.handle(time, payload)?;
        let count = followups.len();
        if count == 0 {
            self.stats.empty_dispatches += 1;
        }

        for event in followups {
            if event.time() < time {
                return Err(SimError::ClockRegression {
                    now: time,
                    requested: event.time(),
                });
            }
            self.schedule(event);
        }

        Ok(StepOutcome::Dispatched {
            time,
            followups: count,
        })
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Statistics so far.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Number of pending events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next pending event.
    pub fn next_event_time(&self) -> Option<Duration> {
        self.queue.peek_time()
    }

    /// The run's drain controller.
    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    /// The stop policy.
    pub fn stop_policy(&self) -> StopPolicy {
        self.stop
    }

    /// Borrow the model.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrow the model (e.g. to inject state between steps).
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consume the runner, returning the model for reporting.
    pub fn into_handler(self) -> H {
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_core::HandlerResult;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, PartialEq)]
    enum Tick {
        Log(&'static str),
        Ping(u32),
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_basic_execution_loop() {
        let mut log = Vec::new();
        let handler = |_now: Duration, tick: Tick| -> HandlerResult<Tick> {
            if let Tick::Log(msg) = tick {
                log.push(msg);
            }
            Ok(Vec::new())
        };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);

        let outcome = runner
            .run([
                Event::new(secs(20), Tick::Log("b")),
                Event::new(secs(10), Tick::Log("a")),
                Event::new(secs(30), Tick::Log("c")),
            ])
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted);
        assert_eq!(runner.stats().events_processed, 3);
        assert_eq!(runner.now(), secs(30));
        drop(runner);
        assert_eq!(log, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_handler_schedules_followup() {
        let handler = |now: Duration, tick: Tick| -> HandlerResult<Tick> {
            match tick {
                Tick::Ping(n) if n < 3 => Ok(vec![Event::after(now, secs(10), Tick::Ping(n + 1))]),
                _ => Ok(Vec::new()),
            }
        };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);
        runner.run([Event::new(secs(0), Tick::Ping(0))]).unwrap();

        assert_eq!(runner.stats().events_processed, 4);
        assert_eq!(runner.stats().events_scheduled, 4);
        assert_eq!(runner.now(), secs(30));
    }

    #[test]
    fn test_horizon_leaves_event_undispatched() {
        let mut dispatched = Vec::new();
        let handler = |now: Duration, _tick: Tick| -> HandlerResult<Tick> {
            dispatched.push(now);
            Ok(vec![Event::after(now, secs(4), Tick::Ping(0))])
        };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Horizon(secs(10)));
        let outcome = runner.run([Event::new(secs(0), Tick::Ping(0))]).unwrap();

        assert_eq!(
            outcome,
            RunOutcome::HorizonReached {
                next_event: secs(12)
            }
        );
        assert_eq!(runner.pending(), 1);
        assert_eq!(runner.now(), secs(8));
        drop(runner);
        assert_eq!(dispatched, vec![secs(0), secs(4), secs(8)]);
    }

    #[test]
    fn test_drain_flips_controller_once() {
        let controller = RunController::new();
        let view = controller.clone();
        let handler = move |now: Duration, _tick: Tick| -> HandlerResult<Tick> {
            if view.is_draining() {
                Ok(Vec::new())
            } else {
                Ok(vec![Event::after(now, secs(3), Tick::Ping(0))])
            }
        };
        let mut runner =
            SimulationRunner::with_controller(handler, StopPolicy::drain_secs(10.0), controller);

        let outcome = runner.run([Event::new(secs(0), Tick::Ping(0))]).unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted);
        assert!(runner.controller().is_draining());
        assert_eq!(runner.stats().drain_started_at, Some(secs(12)));
        // 0, 3, 6, 9 generate; 12 is dispatched in drain mode and stops.
        assert_eq!(runner.stats().events_processed, 5);
    }

    #[test]
    fn test_followup_in_the_past_is_fatal() {
        let handler = |now: Duration, _tick: Tick| -> HandlerResult<Tick> {
            Ok(vec![Event::new(now - secs(1), Tick::Ping(0))])
        };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);
        let err = runner.run([Event::new(secs(5), Tick::Ping(0))]).unwrap_err();
        assert_eq!(
            err,
            SimError::ClockRegression {
                now: secs(5),
                requested: secs(4),
            }
        );
    }

    #[test]
    fn test_handler_error_propagates_unchanged() {
        let handler = |now: Duration, _tick: Tick| -> HandlerResult<Tick> {
            queuesim_core::ensure_invariant!(now < secs(2), "Server", now, "busy server expected");
            Ok(vec![Event::after(now, secs(1), Tick::Ping(0))])
        };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);
        let err = runner.run([Event::new(secs(0), Tick::Ping(0))]).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvariantViolation { actor: "Server", .. }
        ));
        assert_eq!(runner.now(), secs(2));
    }

    #[test]
    fn test_step_by_step() {
        let handler = |_now: Duration, _tick: Tick| -> HandlerResult<Tick> { Ok(Vec::new()) };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);
        runner.schedule_all([
            Event::new(secs(5), Tick::Ping(1)),
            Event::new(secs(15), Tick::Ping(2)),
        ]);

        assert_eq!(
            runner.step().unwrap(),
            StepOutcome::Dispatched {
                time: secs(5),
                followups: 0
            }
        );
        assert_eq!(runner.now(), secs(5));
        assert_eq!(runner.next_event_time(), Some(secs(15)));
        runner.step().unwrap();
        assert_eq!(runner.step().unwrap(), StepOutcome::Exhausted);
        assert_eq!(runner.stats().empty_dispatches, 2);
    }

    #[test]
    fn test_run_for_steps_limits_dispatches() {
        let handler = |_now: Duration, _tick: Tick| -> HandlerResult<Tick> { Ok(Vec::new()) };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);
        runner.schedule_all((0..100).map(|i| Event::new(secs(i), Tick::Ping(0))));

        assert_eq!(runner.run_for_steps(10).unwrap(), RunOutcome::StepLimit);
        assert_eq!(runner.stats().events_processed, 10);
        assert_eq!(runner.pending(), 90);
    }

    #[test]
    fn test_empty_run() {
        let handler = |_now: Duration, _tick: Tick| -> HandlerResult<Tick> { Ok(Vec::new()) };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Exhaust);
        assert_eq!(runner.run(Vec::new()).unwrap(), RunOutcome::Exhausted);
        assert_eq!(runner.stats(), &SimulationStats::default());
        assert_eq!(runner.stats().fanout(), 0.0);
    }

    #[traced_test]
    #[test]
    fn test_stop_and_drain_are_logged() {
        let handler = |now: Duration, _tick: Tick| -> HandlerResult<Tick> {
            Ok(vec![Event::after(now, secs(1), Tick::Ping(0))])
        };
        let mut runner = SimulationRunner::new(handler, StopPolicy::Horizon(secs(3)));
        runner.run([Event::new(secs(0), Tick::Ping(0))]).unwrap();
        assert!(logs_contain("Time limit reached"));

        let controller = RunController::new();
        let view = controller.clone();
        let handler = move |now: Duration, _tick: Tick| -> HandlerResult<Tick> {
            if view.is_draining() {
                return Ok(Vec::new());
            }
            Ok(vec![Event::after(now, secs(1), Tick::Ping(0))])
        };
        let mut runner =
            SimulationRunner::with_controller(handler, StopPolicy::drain_secs(2.0), controller);
        runner.run([Event::new(secs(0), Tick::Ping(0))]).unwrap();
        assert!(logs_contain("Drain horizon crossed"));
    }
}
