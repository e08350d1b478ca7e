//! Deterministic simulation runner.
//!
//! This crate drives a [`Handler`](queuesim_core::Handler) over a
//! time-ordered event queue. Given the same initial events and the same
//! seeded RNG inside the handler, it produces identical traces every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Event>)        │ │
//! │  │     Ordered by: time, sequence                     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │  StopPolicy / RunController │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     handler.handle(now, payload)                   │ │
//! │  │     Scenario model routes to its actors            │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Follow-up events → insert_many                 │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod control;
mod event_queue;
mod runner;
mod stop;

pub use control::RunController;
pub use event_queue::{EventKey, EventQueue};
pub use runner::{RunOutcome, SimulationRunner, SimulationStats, StepOutcome};
pub use stop::StopPolicy;
