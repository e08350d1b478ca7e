//! Client-side circuit breaker over an inner retry strategy.

use crate::policy::{RetryPolicy, RetryStrategy};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Call and failure counts shared by every call of one client.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BreakerCounters {
    pub calls: f64,
    pub failures: f64,
}

impl BreakerCounters {
    /// Failures per started call. Zero before any call has started.
    pub fn failure_rate(&self) -> f64 {
        if self.calls > 0.0 {
            self.failures / self.calls
        } else {
            0.0
        }
    }
}

/// Stops retrying once the client's observed failure rate exceeds
/// `max_rate`; below it, defers to the inner strategy's per-call policy.
pub struct CircuitBreaker {
    inner: Box<dyn RetryStrategy>,
    max_rate: f64,
    counters: Rc<RefCell<BreakerCounters>>,
}

impl CircuitBreaker {
    pub fn new(inner: Box<dyn RetryStrategy>, max_rate: f64) -> Self {
        Self {
            inner,
            max_rate,
            counters: Rc::new(RefCell::new(BreakerCounters::default())),
        }
    }

    /// Snapshot of the shared counters.
    pub fn counters(&self) -> BreakerCounters {
        *self.counters.borrow()
    }
}

impl RetryStrategy for CircuitBreaker {
    fn new_call(&self) -> Box<dyn RetryPolicy> {
        Box::new(BreakerCall {
            inner: self.inner.new_call(),
            max_rate: self.max_rate,
            counters: Rc::clone(&self.counters),
        })
    }

    fn name(&self) -> String {
        format!("breaker_{}_{}", self.max_rate, self.inner.name())
    }
}

struct BreakerCall {
    inner: Box<dyn RetryPolicy>,
    max_rate: f64,
    counters: Rc<RefCell<BreakerCounters>>,
}

impl RetryPolicy for BreakerCall {
    fn start(&mut self) {
        self.counters.borrow_mut().calls += 1.0;
        self.inner.start();
    }

    fn should_retry(&mut self) -> bool {
        let rate = {
            let mut counters = self.counters.borrow_mut();
            counters.failures += 1.0;
            counters.failure_rate()
        };
        if rate > self.max_rate {
            trace!(rate, max_rate = self.max_rate, "Circuit breaker open");
            return false;
        }
        self.inner.should_retry()
    }
}
