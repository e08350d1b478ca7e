use super::ClientId;
use queuesim_retry::{Backoff, RetryPolicy};
use rand::Rng;
use std::time::Duration;

/// One logical call: its retry policy and its backoff between attempts.
pub struct Call {
    client: ClientId,
    policy: Box<dyn RetryPolicy>,
    backoff: Backoff,
    attempts: u32,
}

impl Call {
    pub fn new(client: ClientId, policy: Box<dyn RetryPolicy>, backoff: Backoff) -> Self {
        Self {
            client,
            policy,
            backoff,
            attempts: 0,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Attempts sent so far, including the first.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// First attempt.
    pub(super) fn start(&mut self) {
        self.policy.start();
        self.attempts = 1;
    }

    /// After a failed attempt: the delay before the next attempt, or `None`
    /// if the policy gives up.
    pub(super) fn retry_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Duration> {
        if !self.policy.should_retry() {
            return None;
        }
        self.attempts += 1;
        Some(self.backoff.next_delay(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_retry::{BackoffPolicy, NRetries, RetryStrategy};
    use queuesim_test_helpers::{seeded_rng, TEST_SEED};

    #[test]
    fn test_retry_backoff_doubles_until_budget_spent() {
        let mut rng = seeded_rng(TEST_SEED);
        let mut call = Call::new(
            ClientId::new(0),
            NRetries::new(2).new_call(),
            BackoffPolicy::Exponential { base: 0.1 }.start(),
        );
        call.start();

        assert_eq!(call.retry_delay(&mut rng), Some(Duration::from_millis(100)));
        assert_eq!(call.retry_delay(&mut rng), Some(Duration::from_millis(200)));
        assert_eq!(call.retry_delay(&mut rng), None);
        assert_eq!(call.attempts(), 3);
    }
}
