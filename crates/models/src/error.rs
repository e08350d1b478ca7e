//! Scenario errors.

use queuesim_core::SimError;
use queuesim_retry::RetryConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors from building or running a scenario.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// A config value is out of range.
    #[error("invalid {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// A distribution rejected its parameters.
    #[error("invalid {name} distribution: {reason}")]
    Distribution { name: &'static str, reason: String },

    #[error(transparent)]
    Retry(#[from] RetryConfigError),

    #[error("simulation failed: {0}")]
    Sim(#[from] SimError),
}

impl ModelError {
    pub(crate) fn distribution(name: &'static str, err: impl std::fmt::Display) -> Self {
        ModelError::Distribution {
            name,
            reason: err.to_string(),
        }
    }
}

/// Require a finite value strictly greater than zero.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ModelError::InvalidParameter {
            name,
            value,
            reason: "must be positive",
        })
    }
}

/// Require a finite value that is zero or greater.
pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ModelError::InvalidParameter {
            name,
            value,
            reason: "must be non-negative",
        })
    }
}

/// Require a positive number of seconds that fits in simulated time.
pub(crate) fn duration_secs(name: &'static str, value: f64) -> Result<f64, ModelError> {
    positive(name, value)?;
    if Duration::try_from_secs_f64(value).is_ok() {
        Ok(value)
    } else {
        Err(ModelError::InvalidParameter {
            name,
            value,
            reason: "too large for simulated time",
        })
    }
}

/// Require a probability.
pub(crate) fn probability(name: &'static str, value: f64) -> Result<f64, ModelError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ModelError::InvalidParameter {
            name,
            value,
            reason: "must be within [0, 1]",
        })
    }
}

/// Require a non-zero count.
pub(crate) fn at_least_one(name: &'static str, value: usize) -> Result<usize, ModelError> {
    if value >= 1 {
        Ok(value)
    } else {
        Err(ModelError::InvalidParameter {
            name,
            value: value as f64,
            reason: "must be at least 1",
        })
    }
}
