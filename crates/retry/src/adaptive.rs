//! Client-wide retry budget.

use crate::policy::{RetryPolicy, RetryStrategy};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Token bucket shared by every call of one client.
///
/// Each call start adds `fill_rate` tokens (up to `size`); each retry spends
/// one whole token. With `fill_rate = 0.1` the client retries at most about
/// one call in ten once the initial burst of `size` tokens is spent.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    fill_rate: f64,
    size: f64,
    tokens: f64,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(fill_rate: f64, size: f64) -> Self {
        Self {
            fill_rate,
            size,
            tokens: size,
        }
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self) {
        self.tokens = (self.tokens + self.fill_rate).min(self.size);
    }

    fn try_take(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Adaptive retry strategy backed by a [`TokenBucket`].
///
/// Policies handed out by [`new_call`](RetryStrategy::new_call) all draw
/// from the same bucket.
#[derive(Debug, Clone)]
pub struct AdaptiveTokenBucket {
    bucket: Rc<RefCell<TokenBucket>>,
}

impl AdaptiveTokenBucket {
    pub fn new(fill_rate: f64, size: f64) -> Self {
        Self {
            bucket: Rc::new(RefCell::new(TokenBucket::new(fill_rate, size))),
        }
    }

    /// Snapshot of the shared bucket.
    pub fn bucket(&self) -> TokenBucket {
        self.bucket.borrow().clone()
    }
}

impl RetryPolicy for AdaptiveTokenBucket {
    fn start(&mut self) {
        self.bucket.borrow_mut().refill();
    }

    fn should_retry(&mut self) -> bool {
        let granted = self.bucket.borrow_mut().try_take();
        if !granted {
            trace!("Retry bucket empty");
        }
        granted
    }
}

impl RetryStrategy for AdaptiveTokenBucket {
    fn new_call(&self) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }

    fn name(&self) -> String {
        let bucket = self.bucket.borrow();
        format!("adaptive_{}_{}", bucket.fill_rate, bucket.size)
    }
}
