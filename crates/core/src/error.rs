//! Kernel error taxonomy.
//!
//! Every variant here is fatal for the run that produced it: the runner
//! propagates it unchanged to the driver and performs no recovery. Stale
//! events are not errors; handlers return an empty follow-up list for them.

use std::time::Duration;

/// Errors raised by the kernel or by an actor observing impossible state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// `pop_min` was called on an empty queue.
    ///
    /// The runner checks emptiness first, so this signals a bug in a loop
    /// driving the queue by hand.
    #[error("pop_min called on an empty event queue")]
    EmptyQueue,

    /// An actor handler observed state that its model forbids, e.g. a job
    /// completing on an idle server.
    #[error("invariant violated in {actor} at t={:.6}s: {detail}", time.as_secs_f64())]
    InvariantViolation {
        actor: &'static str,
        time: Duration,
        detail: String,
    },

    /// A follow-up event was scheduled before the current simulated time.
    #[error(
        "event scheduled at t={:.6}s precedes the clock at t={:.6}s",
        requested.as_secs_f64(),
        now.as_secs_f64()
    )]
    ClockRegression { now: Duration, requested: Duration },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

/// Return `Err(SimError::InvariantViolation)` from the enclosing handler
/// unless `cond` holds.
///
/// ```
/// use queuesim_core::{ensure_invariant, SimResult};
/// use std::time::Duration;
///
/// fn complete(busy: bool, now: Duration) -> SimResult<()> {
///     ensure_invariant!(busy, "Server", now, "job completed on an idle server");
///     Ok(())
/// }
///
/// assert!(complete(true, Duration::ZERO).is_ok());
/// assert!(complete(false, Duration::ZERO).is_err());
/// ```
#[macro_export]
macro_rules! ensure_invariant {
    ($cond:expr, $actor:expr, $now:expr, $($detail:tt)+) => {
        if !$cond {
            return Err($crate::SimError::InvariantViolation {
                actor: $actor,
                time: $now,
                detail: format!($($detail)+),
            }
            .into());
        }
    };
}
