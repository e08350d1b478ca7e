//! Queuesim Simulator
//!
//! Drives the scenario models: reference parameter sweeps, single runs
//! described in TOML, and CSV reporting.
//!
//! # Architecture
//!
//! ```text
//! CLI flags / RunConfig (TOML)
//!         │
//!         ▼
//! sweeps::*_points ──► run_points (rayon, seed + i) ──► models::<scenario>::run
//!                                                          │
//!                                                          ▼
//!                                 Report ──► CsvSink (rows or LatencySummary)
//! ```
//!
//! # Example
//!
//! ```
//! use queuesim_models::cache::CacheConfig;
//! use queuesim_simulator::{CsvSink, RunConfig, Scenario};
//!
//! let config = RunConfig::new(Scenario::Cache(CacheConfig::default().with_max_t(3.0)));
//! let report = config.execute(42).unwrap();
//!
//! let mut sink = CsvSink::new(Vec::new());
//! report.write(&mut sink, false).unwrap();
//! assert_eq!(sink.rows(), 2);
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod sweeps;

pub use config::{Report, RunConfig, Scenario};
pub use error::{ConfigError, SimulatorError};
pub use report::{CsvSink, LatencySummary};
pub use sweeps::{LoopSweep, RetrySweep, SweepPoint};
