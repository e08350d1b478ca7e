use crate::policy::{RetryPolicy, RetryStrategy};

/// Retry each call at most `max_retries` times.
///
/// Every call gets its own counter; nothing is shared between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NRetries {
    max_retries: u32,
    tries: u32,
}

impl NRetries {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            tries: 0,
        }
    }

    /// Retries this call has been granted or refused so far.
    pub fn tries(&self) -> u32 {
        self.tries
    }
}

impl RetryPolicy for NRetries {
    fn start(&mut self) {}

    fn should_retry(&mut self) -> bool {
        self.tries = self.tries.saturating_add(1);
        self.tries <= self.max_retries
    }
}

impl RetryStrategy for NRetries {
    fn new_call(&self) -> Box<dyn RetryPolicy> {
        Box::new(NRetries::new(self.max_retries))
    }

    fn name(&self) -> String {
        format!("n_retries_{}", self.max_retries)
    }
}
