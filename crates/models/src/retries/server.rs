use crate::error::{probability, ModelError};
use rand::Rng;

/// Server that fails each attempt independently with `failure_rate`.
///
/// Load-insensitive: latency is all network round trip, sampled by the
/// caller.
#[derive(Debug, Clone)]
pub struct Server {
    failure_rate: f64,
    attempts: u64,
    failures: u64,
}

impl Server {
    pub fn new(failure_rate: f64) -> Result<Self, ModelError> {
        Ok(Self {
            failure_rate: probability("failure_rate", failure_rate)?,
            attempts: 0,
            failures: 0,
        })
    }

    /// Serve one attempt. Returns `true` on success.
    pub fn handle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        self.attempts += 1;
        let failed = rng.gen::<f64>() < self.failure_rate;
        if failed {
            self.failures += 1;
        }
        !failed
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Attempts served so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_test_helpers::{seeded_rng, TEST_SEED};

    #[test]
    fn test_extremes() {
        let mut rng = seeded_rng(TEST_SEED);
        let mut healthy = Server::new(0.0).unwrap();
        assert!((0..1_000).all(|_| healthy.handle(&mut rng)));

        let mut broken = Server::new(1.0).unwrap();
        assert!((0..1_000).all(|_| !broken.handle(&mut rng)));
        assert_eq!(broken.failures(), 1_000);
    }

    #[test]
    fn test_failure_fraction() {
        let mut rng = seeded_rng(TEST_SEED);
        let mut server = Server::new(0.2).unwrap();
        for _ in 0..20_000 {
            server.handle(&mut rng);
        }
        let observed = server.failures() as f64 / server.attempts() as f64;
        assert!((observed - 0.2).abs() < 0.02, "observed {observed}");
        assert!(Server::new(1.5).is_err());
    }
}
