//! Scenario models built on the queuesim kernel.
//!
//! Each module owns one scenario: its actors, the payload enum routed to
//! them, a serializable config with the reference parameters as defaults,
//! and a `run` function that drives one seeded simulation to completion and
//! returns the scenario's report rows.
//!
//! | module | scenario |
//! |---|---|
//! | [`ski`] | chair lift queue with skiers cycling through it |
//! | [`retries`] | clients retrying against a failing server |
//! | [`nudge`] | M/G/1 queue under FCFS, LIFO and Nudge |
//! | [`open_closed`] | open- vs closed-loop load against a G/G/c server |
//! | [`collapse`] | timeout and retry driving a load-sensitive server into collapse |
//! | [`cache`] | cache flush against a rate-limited backend |

pub mod cache;
pub mod collapse;
pub mod dist;
pub mod nudge;
pub mod open_closed;
pub mod retries;
pub mod ski;

mod error;
mod report;

pub use error::ModelError;
pub use report::CsvRecord;

/// RNG every model samples from. Seeded once per run.
pub type SimRng = rand_chacha::ChaCha8Rng;

/// Build the RNG for one run.
pub fn rng_for_run(seed: u64) -> SimRng {
    use rand::SeedableRng;
    SimRng::seed_from_u64(seed)
}
