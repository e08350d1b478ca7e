//! Cache cold start against a rate-limited backend.
//!
//! A full LRU cache absorbs almost all traffic, so the backend only ever
//! sees a trickle. Flushing the cache sends every request to the backend,
//! which can only refill a few keys per second, and the hit rate takes a
//! long time to recover.

use crate::error::{at_least_one, positive, ModelError};
use crate::report::CsvRecord;
use crate::{rng_for_run, SimRng};
use indexmap::IndexSet;
use queuesim_core::{secs, Event, Handler, HandlerResult};
use queuesim_simulation::{SimulationRunner, StopPolicy};
use rand_distr::{Distribution, Zeta};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Duration;
use tracing::debug;

/// Least-recently-used set of keys.
///
/// Iteration order is recency order: the front is the eviction candidate.
#[derive(Debug, Clone)]
pub struct Lru {
    capacity: usize,
    keys: IndexSet<u64>,
}

impl Lru {
    /// A cache already holding keys `1..=capacity`, the most popular ones
    /// under a Zipf key distribution.
    pub fn primed(capacity: usize) -> Self {
        let mut keys = IndexSet::with_capacity(capacity);
        keys.extend(1..=capacity as u64);
        Self { capacity, keys }
    }

    pub fn empty(capacity: usize) -> Self {
        Self {
            capacity,
            keys: IndexSet::with_capacity(capacity),
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: u64) -> bool {
        match self.keys.get_index_of(&key) {
            Some(index) => {
                let last = self.keys.len() - 1;
                self.keys.move_index(index, last);
                true
            }
            None => false,
        }
    }

    /// Insert `key` as most recently used, evicting the least recently used
    /// key when full.
    pub fn put(&mut self, key: u64) {
        if self.get(key) {
            return;
        }
        if self.keys.len() >= self.capacity {
            self.keys.shift_remove_index(0);
        }
        self.keys.insert(key);
    }

    pub fn flush(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.keys.contains(&key)
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.keys.iter().copied()
    }
}

/// Backend that serves at most `max_per_second` fetches per window.
///
/// A window opens at the first fetch more than one second after the
/// previous window opened.
#[derive(Debug, Clone)]
pub struct Backend {
    max_per_second: f64,
    window_start: Duration,
    in_window: u64,
}

impl Backend {
    pub fn new(max_per_second: f64) -> Self {
        Self {
            max_per_second,
            window_start: Duration::ZERO,
            in_window: 0,
        }
    }

    /// Try a fetch at `now`. Returns whether the backend served it.
    pub fn fetch(&mut self, now: Duration) -> bool {
        if now.saturating_sub(self.window_start) > Duration::from_secs(1) {
            self.window_start = now;
            self.in_window = 0;
        }
        self.in_window += 1;
        self.in_window as f64 <= self.max_per_second
    }
}

/// Cache scenario parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Exponent of the Zeta key distribution.
    pub zipf_alpha: f64,
    pub cache_size: usize,
    /// Requests per second, evenly spaced.
    pub arrival_rate: f64,
    pub backend_max_rate: f64,
    pub flush_at: f64,
    pub max_t: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            zipf_alpha: 1.3,
            cache_size: 1000,
            arrival_rate: 1000.0,
            backend_max_rate: 10.0,
            flush_at: 4.0,
            max_t: 60.0,
        }
    }
}

impl CacheConfig {
    pub fn with_backend_max_rate(mut self, rate: f64) -> Self {
        self.backend_max_rate = rate;
        self
    }

    pub fn with_max_t(mut self, max_t: f64) -> Self {
        self.max_t = max_t;
        self
    }

    /// Default label: backend capacity as a share of offered load,
    /// e.g. `backend_0.5%`.
    pub fn name(&self) -> String {
        let share = 100.0 * self.backend_max_rate / self.arrival_rate;
        format!("backend_{share}%")
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.zipf_alpha.is_finite() && self.zipf_alpha > 1.0) {
            return Err(ModelError::InvalidParameter {
                name: "zipf_alpha",
                value: self.zipf_alpha,
                reason: "must be greater than 1",
            });
        }
        at_least_one("cache_size", self.cache_size)?;
        positive("arrival_rate", self.arrival_rate)?;
        positive("backend_max_rate", self.backend_max_rate)?;
        positive("flush_at", self.flush_at)?;
        positive("max_t", self.max_t)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// One request for a Zipf-distributed key.
    Arrival,
    /// Empty the cache.
    Flush,
}

/// Hits and misses since the previous row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Time the row was emitted.
    pub time: f64,
    pub hits: u64,
    pub misses: u64,
    pub rate: f64,
    pub name: String,
}

impl CsvRecord for CacheStats {
    fn header() -> &'static str {
        "time,hits,misses,rate,name"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:.6},{},{},{:.6},{}",
            self.time, self.hits, self.misses, self.rate, self.name
        )
    }
}

#[derive(Debug, Default)]
struct StatsWindow {
    last_row: Duration,
    hits: u64,
    misses: u64,
}

/// Cache, backend and request stream.
pub struct CacheModel {
    name: String,
    lru: Lru,
    backend: Backend,
    keys: Zeta<f64>,
    interval: Duration,
    window: StatsWindow,
    rows: Vec<CacheStats>,
    rng: SimRng,
}

impl CacheModel {
    pub fn new(config: &CacheConfig, name: &str, rng: SimRng) -> Result<Self, ModelError> {
        config.validate()?;
        let keys =
            Zeta::new(config.zipf_alpha).map_err(|e| ModelError::distribution("zeta", e))?;
        Ok(Self {
            name: name.to_string(),
            lru: Lru::primed(config.cache_size),
            backend: Backend::new(config.backend_max_rate),
            keys,
            interval: secs(1.0 / config.arrival_rate),
            window: StatsWindow::default(),
            rows: Vec::new(),
            rng,
        })
    }

    pub fn initial_events(&self, config: &CacheConfig) -> Vec<Event<CacheEvent>> {
        vec![
            Event::at_secs(config.flush_at, CacheEvent::Flush),
            Event::new(self.interval, CacheEvent::Arrival),
        ]
    }

    pub fn lru(&self) -> &Lru {
        &self.lru
    }

    pub fn rows(&self) -> &[CacheStats] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<CacheStats> {
        self.rows
    }

    /// Emit a row once more than a second has passed since the last one,
    /// then count this request.
    fn record(&mut self, now: Duration, hit: bool) {
        if now.saturating_sub(self.window.last_row) > Duration::from_secs(1) {
            let total = self.window.hits + self.window.misses;
            let rate = if total == 0 {
                0.0
            } else {
                self.window.hits as f64 / total as f64
            };
            self.rows.push(CacheStats {
                time: now.as_secs_f64(),
                hits: self.window.hits,
                misses: self.window.misses,
                rate,
                name: self.name.clone(),
            });
            self.window = StatsWindow {
                last_row: now,
                ..StatsWindow::default()
            };
        }
        if hit {
            self.window.hits += 1;
        } else {
            self.window.misses += 1;
        }
    }

    fn on_arrival(&mut self, now: Duration) -> HandlerResult<CacheEvent> {
        let key = self.keys.sample(&mut self.rng) as u64;
        let hit = self.lru.get(key);
        self.record(now, hit);
        if !hit && self.backend.fetch(now) {
            self.lru.put(key);
        }
        Ok(vec![Event::after(now, self.interval, CacheEvent::Arrival)])
    }
}

impl Handler<CacheEvent> for CacheModel {
    fn handle(&mut self, now: Duration, event: CacheEvent) -> HandlerResult<CacheEvent> {
        match event {
            CacheEvent::Arrival => self.on_arrival(now),
            CacheEvent::Flush => {
                debug!(time = ?now, cached = self.lru.len(), "Flushing cache");
                self.lru.flush();
                Ok(Vec::new())
            }
        }
    }
}

/// Run one cache simulation.
pub fn run(config: &CacheConfig, name: &str, seed: u64) -> Result<Vec<CacheStats>, ModelError> {
    let model = CacheModel::new(config, name, rng_for_run(seed))?;
    let initial = model.initial_events(config);
    let mut runner = SimulationRunner::new(model, StopPolicy::horizon_secs(config.max_t));
    runner.run(initial)?;
    Ok(runner.into_handler().into_rows())
}
