//! Per-call and per-client retry traits.

/// Retry decisions for a single logical call.
pub trait RetryPolicy {
    /// The call is being sent for the first time.
    fn start(&mut self);

    /// The latest attempt failed. Returns `true` if the call should be
    /// attempted again.
    fn should_retry(&mut self) -> bool;
}

/// A client's retry strategy, producing one [`RetryPolicy`] per call.
pub trait RetryStrategy {
    /// Policy for a new logical call.
    fn new_call(&self) -> Box<dyn RetryPolicy>;

    /// Short label for reports.
    fn name(&self) -> String;
}

/// Retries every failure, forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn start(&mut self) {}

    fn should_retry(&mut self) -> bool {
        true
    }
}

impl RetryStrategy for AlwaysRetry {
    fn new_call(&self) -> Box<dyn RetryPolicy> {
        Box::new(AlwaysRetry)
    }

    fn name(&self) -> String {
        "always_retry".to_string()
    }
}
