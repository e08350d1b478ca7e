//! Retry strategies and backoff policies.
//!
//! A client holds one [`RetryStrategy`]. Every logical call asks it for a
//! fresh [`RetryPolicy`] via [`RetryStrategy::new_call`]; the policy is told
//! when the call starts and asked, after each failure, whether to try again.
//!
//! Strategies that aggregate across calls (the adaptive token bucket, the
//! circuit breaker) keep that aggregate in state shared between the strategy
//! and the policies it hands out. Strategies that are purely per-call (N
//! retries) hand out independent policies.
//!
//! ```
//! use queuesim_retry::{NRetries, RetryStrategy};
//!
//! let strategy = NRetries::new(2);
//! let mut call = strategy.new_call();
//! call.start();
//! assert!(call.should_retry());
//! assert!(call.should_retry());
//! assert!(!call.should_retry());
//! ```

mod adaptive;
mod backoff;
mod breaker;
mod config;
mod n_retries;
mod policy;

pub use adaptive::{AdaptiveTokenBucket, TokenBucket};
pub use backoff::{Backoff, BackoffPolicy};
pub use breaker::{BreakerCounters, CircuitBreaker};
pub use config::{RetryConfigError, RetryStrategyConfig};
pub use n_retries::NRetries;
pub use policy::{AlwaysRetry, RetryPolicy, RetryStrategy};
