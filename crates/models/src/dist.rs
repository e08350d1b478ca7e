//! Sampling helpers shared by the scenarios.
//!
//! Configs describe distributions by their mean (the way the scenarios are
//! parameterised); this module converts them to `rand_distr` samplers.

use crate::error::{non_negative, positive, probability, ModelError};
use queuesim_core::secs;
use rand::Rng;
use rand_distr::{Distribution, Exp, Weibull};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::gamma;
use std::time::Duration;

/// Exponential distribution with the given mean.
pub fn exp_with_mean(name: &'static str, mean: f64) -> Result<Exp<f64>, ModelError> {
    let mean = positive(name, mean)?;
    Exp::new(1.0 / mean).map_err(|e| ModelError::distribution(name, e))
}

/// Exponential distribution with the given rate (events per second).
pub fn exp_with_rate(name: &'static str, rate: f64) -> Result<Exp<f64>, ModelError> {
    let rate = positive(name, rate)?;
    Exp::new(rate).map_err(|e| ModelError::distribution(name, e))
}

/// Weibull scale giving the requested mean for `shape`.
pub fn weibull_scale(mean: f64, shape: f64) -> f64 {
    mean / gamma(1.0 + 1.0 / shape)
}

/// Weibull distribution parameterised by mean and shape.
pub fn weibull_with_mean(
    name: &'static str,
    mean: f64,
    shape: f64,
) -> Result<Weibull<f64>, ModelError> {
    let mean = positive(name, mean)?;
    let shape = positive("weibull shape", shape)?;
    Weibull::new(weibull_scale(mean, shape), shape).map_err(|e| ModelError::distribution(name, e))
}

/// Sample a delay in seconds as a [`Duration`].
pub fn sample_delay<D, R>(dist: &D, rng: &mut R) -> Duration
where
    D: Distribution<f64>,
    R: Rng + ?Sized,
{
    secs(dist.sample(rng))
}

/// Job size distribution, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSizeConfig {
    /// Exponential sizes.
    Exponential { mean: f64 },

    /// Exponential with mean `mean_1`, or with probability `p` mean `mean_2`.
    Bimodal { mean_1: f64, mean_2: f64, p: f64 },

    /// Weibull sizes.
    Weibull { mean: f64, shape: f64 },
}

impl Default for JobSizeConfig {
    fn default() -> Self {
        JobSizeConfig::Exponential { mean: 0.1 }
    }
}

impl JobSizeConfig {
    /// Mean job size in seconds.
    pub fn mean(&self) -> f64 {
        match *self {
            JobSizeConfig::Exponential { mean } | JobSizeConfig::Weibull { mean, .. } => mean,
            JobSizeConfig::Bimodal { mean_1, mean_2, p } => (1.0 - p) * mean_1 + p * mean_2,
        }
    }

    /// Short label used in run names.
    pub fn label(&self) -> &'static str {
        match self {
            JobSizeConfig::Exponential { .. } => "exp",
            JobSizeConfig::Bimodal { .. } => "bimod",
            JobSizeConfig::Weibull { .. } => "weibull",
        }
    }

    /// Build the sampler.
    pub fn sampler(&self) -> Result<JobSize, ModelError> {
        Ok(match *self {
            JobSizeConfig::Exponential { mean } => {
                JobSize::Exponential(exp_with_mean("job size", mean)?)
            }
            JobSizeConfig::Bimodal { mean_1, mean_2, p } => JobSize::Bimodal {
                first: exp_with_mean("job size mode 1", mean_1)?,
                second: exp_with_mean("job size mode 2", mean_2)?,
                p: probability("bimodal p", p)?,
            },
            JobSizeConfig::Weibull { mean, shape } => {
                JobSize::Weibull(weibull_with_mean("job size", mean, shape)?)
            }
        })
    }
}

/// Job size sampler built from a [`JobSizeConfig`].
#[derive(Debug, Clone, Copy)]
pub enum JobSize {
    Exponential(Exp<f64>),
    Bimodal {
        first: Exp<f64>,
        second: Exp<f64>,
        p: f64,
    },
    Weibull(Weibull<f64>),
}

impl Distribution<f64> for JobSize {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            JobSize::Exponential(d) => d.sample(rng),
            JobSize::Bimodal { first, second, p } => {
                if rng.gen::<f64>() > *p {
                    first.sample(rng)
                } else {
                    second.sample(rng)
                }
            }
            JobSize::Weibull(d) => d.sample(rng),
        }
    }
}

/// One class of a [`WeibullMixture`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobClass {
    /// Mean size in seconds.
    pub mean: f64,
    /// Probability of a job being in this class.
    pub p: f64,
}

/// Mixture of Weibull job classes sharing one shape.
#[derive(Debug, Clone)]
pub struct WeibullMixture {
    classes: Vec<(f64, Weibull<f64>)>,
    mean: f64,
}

impl WeibullMixture {
    /// Classes must have probabilities summing to one (within rounding).
    pub fn new(classes: &[JobClass], shape: f64) -> Result<Self, ModelError> {
        if classes.is_empty() {
            return Err(ModelError::InvalidParameter {
                name: "job classes",
                value: 0.0,
                reason: "at least one class is required",
            });
        }
        let total: f64 = classes.iter().map(|c| c.p).sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(ModelError::InvalidParameter {
                name: "job class probabilities",
                value: total,
                reason: "must sum to 1",
            });
        }

        let mut cumulative = 0.0;
        let mut built = Vec::with_capacity(classes.len());
        for class in classes {
            cumulative += non_negative("job class p", class.p)?;
            built.push((cumulative, weibull_with_mean("job class", class.mean, shape)?));
        }
        let mean = classes.iter().map(|c| c.mean * c.p).sum();
        Ok(Self {
            classes: built,
            mean,
        })
    }

    /// Mean job size across all classes.
    pub fn mean(&self) -> f64 {
        self.mean
    }
}

impl Distribution<f64> for WeibullMixture {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let r: f64 = rng.gen();
        let class = self
            .classes
            .iter()
            .find(|(cumulative, _)| r < *cumulative)
            .or_else(|| self.classes.last());
        match class {
            Some((_, dist)) => dist.sample(rng),
            None => 0.0,
        }
    }
}
