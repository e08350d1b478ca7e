//! Strategy configuration.

use crate::adaptive::AdaptiveTokenBucket;
use crate::breaker::CircuitBreaker;
use crate::n_retries::NRetries;
use crate::policy::{AlwaysRetry, RetryStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid retry strategy parameters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetryConfigError {
    #[error("token bucket fill rate must be finite and non-negative, got {0}")]
    InvalidFillRate(f64),

    #[error("token bucket size must be at least 1, got {0}")]
    InvalidBucketSize(f64),

    #[error("circuit breaker max rate must be within [0, 1], got {0}")]
    InvalidMaxRate(f64),

    #[error("backoff {name} must be a finite, non-negative number of seconds, got {value}")]
    InvalidBackoff { name: &'static str, value: f64 },
}

/// Serializable description of a [`RetryStrategy`].
///
/// Each client builds its own strategy from the config, so shared state
/// (token buckets, breaker counters) is per client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategyConfig {
    /// Retry each call at most `n` times.
    NRetries { n: u32 },

    /// Token-bucket retry budget.
    Adaptive { fill_rate: f64, size: f64 },

    /// Circuit breaker around another strategy.
    CircuitBreaker {
        inner: Box<RetryStrategyConfig>,
        max_rate: f64,
    },

    /// Retry unconditionally.
    AlwaysRetry,
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryStrategyConfig::NRetries { n: 3 }
    }
}

impl RetryStrategyConfig {
    pub fn no_retries() -> Self {
        RetryStrategyConfig::NRetries { n: 0 }
    }

    pub fn n_retries(n: u32) -> Self {
        RetryStrategyConfig::NRetries { n }
    }

    pub fn adaptive(fill_rate: f64, size: f64) -> Self {
        RetryStrategyConfig::Adaptive { fill_rate, size }
    }

    pub fn circuit_breaker(inner: RetryStrategyConfig, max_rate: f64) -> Self {
        RetryStrategyConfig::CircuitBreaker {
            inner: Box::new(inner),
            max_rate,
        }
    }

    /// Check parameters, recursing into wrapped strategies.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        match self {
            RetryStrategyConfig::NRetries { .. } | RetryStrategyConfig::AlwaysRetry => Ok(()),
            RetryStrategyConfig::Adaptive { fill_rate, size } => {
                if !fill_rate.is_finite() || *fill_rate < 0.0 {
                    return Err(RetryConfigError::InvalidFillRate(*fill_rate));
                }
                if !size.is_finite() || *size < 1.0 {
                    return Err(RetryConfigError::InvalidBucketSize(*size));
                }
                Ok(())
            }
            RetryStrategyConfig::CircuitBreaker { inner, max_rate } => {
                if !(0.0..=1.0).contains(max_rate) {
                    return Err(RetryConfigError::InvalidMaxRate(*max_rate));
                }
                inner.validate()
            }
        }
    }

    /// Build a fresh strategy for one client.
    pub fn build(&self) -> Result<Box<dyn RetryStrategy>, RetryConfigError> {
        self.validate()?;
        Ok(self.build_unchecked())
    }

    fn build_unchecked(&self) -> Box<dyn RetryStrategy> {
        match self {
            RetryStrategyConfig::NRetries { n } => Box::new(NRetries::new(*n)),
            RetryStrategyConfig::Adaptive { fill_rate, size } => {
                Box::new(AdaptiveTokenBucket::new(*fill_rate, *size))
            }
            RetryStrategyConfig::CircuitBreaker { inner, max_rate } => {
                Box::new(CircuitBreaker::new(inner.build_unchecked(), *max_rate))
            }
            RetryStrategyConfig::AlwaysRetry => Box::new(AlwaysRetry),
        }
    }
}
