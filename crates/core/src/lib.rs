//! Core types for the queuesim discrete-event kernel.
//!
//! This crate provides the foundational types every scenario builds on:
//!
//! - [`Event`]: An immutable `(time, payload)` record dispatched exactly once
//! - [`Handler`]: The trait every actor-owning model implements
//! - [`SimClock`]: The monotonically non-decreasing simulated clock
//! - [`SimError`]: Fatal kernel and invariant errors
//!
//! # Architecture
//!
//! ```text
//! driver → initial Events → SimulationRunner → Handler::handle(now, payload) → follow-up Events
//! ```
//!
//! A handler is:
//! - **Synchronous**: runs to completion, never blocks
//! - **Deterministic**: same state + payload + RNG draws = same follow-ups
//! - **Queue-blind**: it never touches the event queue, it only returns events
//!
//! The payload type `P` of a model carries the handler reference: each enum
//! variant names the actor-role that owns the event, and its fields are the
//! payload (usually a tagged index into an actor-owned collection).

mod error;
mod event;
mod id;
mod time;
mod traits;

pub use error::{SimError, SimResult};
pub use event::Event;
pub use time::{secs, SimClock};
pub use traits::{Handler, HandlerResult};
