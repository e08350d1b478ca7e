//! Ski lift queueing model.
//!
//! Skiers cycle through three states. They wait in the lift line, ride the
//! lift, and ski back down to the line:
//!
//! ```text
//!  Waiting ──board──▶ RidingLift ──leave──▶ Skiing
//!     ▲                                       │
//!     └──────────────── join queue ───────────┘
//! ```
//!
//! A chair arrives every `chair_period` seconds and boards up to
//! `chair_width` skiers. Periodic samples record the queue length and the
//! fraction of skiers out on the slope.

use crate::dist::sample_delay;
use crate::error::{at_least_one, non_negative, positive, ModelError};
use crate::report::CsvRecord;
use crate::{rng_for_run, SimRng};
use queuesim_core::{ensure_invariant, secs, sim_id, Event, Handler, HandlerResult, SimResult};
use queuesim_simulation::{SimulationRunner, StopPolicy};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, trace};

sim_id!(
    /// A skier, indexing [`SkiModel`]'s skier list.
    SkierId,
    "skier"
);

/// Slowest a skier is allowed to be, in m/s.
pub const MIN_SKIER_SPEED: f64 = 0.1;

/// Ski lift scenario parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkiConfig {
    pub skiers: usize,
    pub chair_width: usize,
    /// Seconds between chairs.
    pub chair_period: f64,
    pub ride_time_mean: f64,
    pub ride_time_stdev: f64,
    pub slope_len_m: f64,
    pub speed_mean: f64,
    pub speed_stdev: f64,
    /// Seconds between stats samples.
    pub calc_every: f64,
    pub max_t: f64,
}

impl Default for SkiConfig {
    fn default() -> Self {
        Self {
            skiers: 25,
            chair_width: 4,
            chair_period: 7.0,
            ride_time_mean: 300.0,
            ride_time_stdev: 30.0,
            slope_len_m: 3000.0,
            speed_mean: 5.0,
            speed_stdev: 1.0,
            calc_every: 1.0,
            max_t: 50_000.0,
        }
    }
}

impl SkiConfig {
    pub fn with_skiers(mut self, skiers: usize) -> Self {
        self.skiers = skiers;
        self
    }

    pub fn with_chair_width(mut self, chair_width: usize) -> Self {
        self.chair_width = chair_width;
        self
    }

    pub fn with_chair_period(mut self, chair_period: f64) -> Self {
        self.chair_period = chair_period;
        self
    }

    pub fn with_max_t(mut self, max_t: f64) -> Self {
        self.max_t = max_t;
        self
    }

    /// Label for report rows, e.g. `chair_4_pack`.
    pub fn name(&self) -> String {
        format!("chair_{}_pack", self.chair_width)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        at_least_one("skiers", self.skiers)?;
        at_least_one("chair_width", self.chair_width)?;
        positive("chair_period", self.chair_period)?;
        positive("ride_time_mean", self.ride_time_mean)?;
        non_negative("ride_time_stdev", self.ride_time_stdev)?;
        positive("slope_len_m", self.slope_len_m)?;
        positive("speed_mean", self.speed_mean)?;
        non_negative("speed_stdev", self.speed_stdev)?;
        positive("calc_every", self.calc_every)?;
        positive("max_t", self.max_t)?;
        Ok(())
    }
}

/// Where a skier is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkierState {
    Waiting,
    RidingLift,
    Skiing,
}

/// Payloads routed by [`SkiModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkiEvent {
    /// A chair has arrived at the bottom station.
    DequeueSkiers,
    /// A skier reaches the top.
    LeaveLift(SkierId),
    /// A skier reaches the bottom and joins the line.
    JoinQueue(SkierId),
    /// Periodic stats sample.
    CalcStats,
}

#[derive(Debug, Clone)]
pub struct Skier {
    /// Meters per second.
    speed: f64,
    state: SkierState,
}

impl Skier {
    pub fn new(speed: f64) -> Self {
        Self {
            speed: speed.max(MIN_SKIER_SPEED),
            state: SkierState::Waiting,
        }
    }

    pub fn state(&self) -> SkierState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    fn transition(
        &mut self,
        now: Duration,
        from: SkierState,
        to: SkierState,
    ) -> SimResult<()> {
        ensure_invariant!(
            self.state == from,
            "Skier",
            now,
            "expected {:?} before {:?}, found {:?}",
            from,
            to,
            self.state
        );
        self.state = to;
        Ok(())
    }
}

/// Chair lift and its line.
#[derive(Debug)]
pub struct Lift {
    ride_time: Normal<f64>,
    chair_width: usize,
    chair_period: Duration,
    queue: Vec<SkierId>,
}

impl Lift {
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Skiers in line, front of the line last.
    pub fn queue(&self) -> &[SkierId] {
        &self.queue
    }
}

/// Running averages of the sampled stats.
#[derive(Debug, Default, Clone)]
struct SkiStats {
    samples: u64,
    queue_len_sum: f64,
    skiing_fraction_sum: f64,
}

/// One row of the ski lift report.
#[derive(Debug, Clone, PartialEq)]
pub struct SkiSummary {
    pub avg_queue_len: f64,
    pub skiers_skiing: f64,
    pub skiers: usize,
    pub name: String,
}

impl CsvRecord for SkiSummary {
    fn header() -> &'static str {
        "avg_queue_len,skiers_skiing,skiers,name"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:.6},{:.6},{},{}",
            self.avg_queue_len, self.skiers_skiing, self.skiers, self.name
        )
    }
}

/// The ski lift scenario: one lift, its skiers and the stats sampler.
pub struct SkiModel {
    lift: Lift,
    skiers: Vec<Skier>,
    slope_len_m: f64,
    calc_every: Duration,
    stats: SkiStats,
    rng: SimRng,
}

impl SkiModel {
    /// Build the model with every skier already in line.
    pub fn new(config: &SkiConfig, mut rng: SimRng) -> Result<Self, ModelError> {
        config.validate()?;
        let ride_time = Normal::new(config.ride_time_mean, config.ride_time_stdev)
            .map_err(|e| ModelError::distribution("ride time", e))?;
        let speed = Normal::new(config.speed_mean, config.speed_stdev)
            .map_err(|e| ModelError::distribution("skier speed", e))?;

        let skiers: Vec<Skier> = (0..config.skiers)
            .map(|_| Skier::new(speed.sample(&mut rng)))
            .collect();
        let queue = (0..skiers.len() as u64).map(SkierId::new).collect();

        Ok(Self {
            lift: Lift {
                ride_time,
                chair_width: config.chair_width,
                chair_period: secs(config.chair_period),
                queue,
            },
            skiers,
            slope_len_m: config.slope_len_m,
            calc_every: secs(config.calc_every),
            stats: SkiStats::default(),
            rng,
        })
    }

    pub fn lift(&self) -> &Lift {
        &self.lift
    }

    pub fn skier(&self, id: SkierId) -> Option<&Skier> {
        self.skiers.get(id.index())
    }

    /// Number of skiers in `state`.
    pub fn count_in(&self, state: SkierState) -> usize {
        self.skiers.iter().filter(|s| s.state == state).count()
    }

    /// Averages over all samples taken so far.
    pub fn summary(&self, name: &str) -> SkiSummary {
        let samples = self.stats.samples.max(1) as f64;
        SkiSummary {
            avg_queue_len: self.stats.queue_len_sum / samples,
            skiers_skiing: self.stats.skiing_fraction_sum / samples,
            skiers: self.skiers.len(),
            name: name.to_string(),
        }
    }

    fn skier_mut(&mut self, id: SkierId, now: Duration) -> SimResult<&mut Skier> {
        let known = id.index() < self.skiers.len();
        ensure_invariant!(known, "Lift", now, "unknown {}", id);
        Ok(&mut self.skiers[id.index()])
    }

    fn on_dequeue(&mut self, now: Duration) -> HandlerResult<SkiEvent> {
        let mut events = vec![Event::after(now, self.lift.chair_period, SkiEvent::DequeueSkiers)];
        for _ in 0..self.lift.chair_width {
            let Some(id) = self.lift.queue.pop() else {
                break;
            };
            let ride = sample_delay(&self.lift.ride_time, &mut self.rng);
            self.skier_mut(id, now)?
                .transition(now, SkierState::Waiting, SkierState::RidingLift)?;
            events.push(Event::after(now, ride, SkiEvent::LeaveLift(id)));
        }
        trace!(time = ?now, boarded = events.len() - 1, waiting = self.lift.queue.len(), "Chair departed");
        Ok(events)
    }

    fn on_leave_lift(&mut self, now: Duration, id: SkierId) -> HandlerResult<SkiEvent> {
        let slope_len_m = self.slope_len_m;
        let skier = self.skier_mut(id, now)?;
        skier.transition(now, SkierState::RidingLift, SkierState::Skiing)?;
        let run_time = secs(slope_len_m / skier.speed);
        Ok(vec![Event::after(now, run_time, SkiEvent::JoinQueue(id))])
    }

    fn on_join_queue(&mut self, now: Duration, id: SkierId) -> HandlerResult<SkiEvent> {
        self.skier_mut(id, now)?
            .transition(now, SkierState::Skiing, SkierState::Waiting)?;
        self.lift.queue.push(id);
        Ok(Vec::new())
    }

    fn on_calc_stats(&mut self, now: Duration) -> HandlerResult<SkiEvent> {
        let skiing = self.count_in(SkierState::Skiing) as f64;
        self.stats.samples += 1;
        self.stats.queue_len_sum += self.lift.queue.len() as f64;
        self.stats.skiing_fraction_sum += skiing / self.skiers.len() as f64;
        Ok(vec![Event::after(now, self.calc_every, SkiEvent::CalcStats)])
    }
}

impl Handler<SkiEvent> for SkiModel {
    fn handle(&mut self, now: Duration, event: SkiEvent) -> HandlerResult<SkiEvent> {
        match event {
            SkiEvent::DequeueSkiers => self.on_dequeue(now),
            SkiEvent::LeaveLift(id) => self.on_leave_lift(now, id),
            SkiEvent::JoinQueue(id) => self.on_join_queue(now, id),
            SkiEvent::CalcStats => self.on_calc_stats(now),
        }
    }
}

/// Run one ski lift simulation and summarise it.
pub fn run(config: &SkiConfig, seed: u64) -> Result<SkiSummary, ModelError> {
    let mut rng = rng_for_run(seed);
    let first_chair: f64 = rng.gen();
    let model = SkiModel::new(config, rng)?;

    let mut runner = SimulationRunner::new(model, StopPolicy::horizon_secs(config.max_t));
    runner.run([
        Event::new(Duration::ZERO, SkiEvent::CalcStats),
        Event::at_secs(first_chair, SkiEvent::DequeueSkiers),
    ])?;

    debug!(
        skiers = config.skiers,
        chair_width = config.chair_width,
        events = runner.stats().events_processed,
        "Ski lift run complete"
    );
    Ok(runner.into_handler().summary(&config.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_core::SimError;

    fn model(skiers: usize) -> SkiModel {
        let config = SkiConfig::default()
            .with_skiers(skiers)
            .with_chair_width(4)
            .with_chair_period(7.0);
        SkiModel::new(&config, rng_for_run(42)).unwrap()
    }

    #[test]
    fn test_chair_boards_chair_width_skiers() {
        let mut model = model(10);
        let events = model.handle(Duration::ZERO, SkiEvent::DequeueSkiers).unwrap();

        assert_eq!(model.count_in(SkierState::Waiting), 6);
        assert_eq!(model.count_in(SkierState::RidingLift), 4);
        assert_eq!(model.lift().queue_len(), 6);

        let chairs: Vec<_> = events
            .iter()
            .filter(|e| *e.payload() == SkiEvent::DequeueSkiers)
            .collect();
        assert_eq!(chairs.len(), 1);
        assert_eq!(chairs[0].time(), Duration::from_secs(7));

        let leaving = events
            .iter()
            .filter(|e| matches!(e.payload(), SkiEvent::LeaveLift(_)))
            .count();
        assert_eq!(leaving, 4);
    }

    #[test]
    fn test_boarding_takes_from_back_of_line() {
        let mut model = model(10);
        let events = model.handle(Duration::ZERO, SkiEvent::DequeueSkiers).unwrap();
        let boarded: Vec<u64> = events
            .iter()
            .filter_map(|e| match e.payload() {
                SkiEvent::LeaveLift(id) => Some(id.as_u64()),
                _ => None,
            })
            .collect();
        assert_eq!(boarded, vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_short_line_boards_everyone() {
        let mut model = model(2);
        let events = model.handle(Duration::ZERO, SkiEvent::DequeueSkiers).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(model.lift().queue_len(), 0);
    }

    #[test]
    fn test_full_cycle_returns_to_line() {
        let mut model = model(1);
        let id = SkierId::new(0);
        model.handle(Duration::ZERO, SkiEvent::DequeueSkiers).unwrap();

        let events = model
            .handle(Duration::from_secs(300), SkiEvent::LeaveLift(id))
            .unwrap();
        assert_eq!(model.skier(id).unwrap().state(), SkierState::Skiing);
        let speed = model.skier(id).unwrap().speed();
        let expected = Duration::from_secs(300) + secs(3000.0 / speed);
        assert_eq!(events[0].time(), expected);

        let events = model.handle(expected, SkiEvent::JoinQueue(id)).unwrap();
        assert!(events.is_empty());
        assert_eq!(model.lift().queue(), &[id]);
    }

    #[test]
    fn test_invalid_transition_is_fatal() {
        let mut model = model(3);
        let err = model
            .handle(Duration::from_secs(1), SkiEvent::JoinQueue(SkierId::new(0)))
            .unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation { actor: "Skier", .. }));

        let err = model
            .handle(Duration::from_secs(1), SkiEvent::LeaveLift(SkierId::new(99)))
            .unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation { actor: "Lift", .. }));
    }

    #[test]
    fn test_stats_sampling() {
        let mut model = model(8);
        let events = model.handle(Duration::ZERO, SkiEvent::CalcStats).unwrap();
        assert_eq!(events[0].time(), Duration::from_secs(1));
        model.handle(Duration::ZERO, SkiEvent::DequeueSkiers).unwrap();
        model.handle(Duration::from_secs(1), SkiEvent::CalcStats).unwrap();

        let summary = model.summary("chair_4_pack");
        assert_eq!(summary.avg_queue_len, 6.0);
        assert_eq!(summary.skiers_skiing, 0.0);
        assert_eq!(summary.skiers, 8);
    }

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(Skier::new(-3.0).speed(), MIN_SKIER_SPEED);
    }

    #[test]
    fn test_run_is_deterministic() {
        let config = SkiConfig::default().with_skiers(100).with_max_t(2_000.0);
        let a = run(&config, 7).unwrap();
        let b = run(&config, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "chair_4_pack");
        assert_eq!(
            a.to_row().unwrap(),
            format!("{:.6},{:.6},100,chair_4_pack", a.avg_queue_len, a.skiers_skiing)
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SkiConfig::default().with_chair_width(0);
        assert!(run(&config, 1).is_err());
    }
}
