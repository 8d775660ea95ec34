//! Window statistics and metrics export for circuit breakers.

use std::time::Duration;

use crate::state::State;

/// Outcome statistics for the current measurement window.
///
/// A window ends whenever the breaker changes state or, while closed, when
/// the configured interval elapses. `requests` always equals
/// `total_successes + total_failures`, and at most one of the two
/// consecutive counters is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Outcomes recorded in this window.
    pub requests: u64,

    /// Successful outcomes in this window.
    pub total_successes: u64,

    /// Failed outcomes in this window.
    pub total_failures: u64,

    /// Length of the current run of successes.
    pub consecutive_successes: u64,

    /// Length of the current run of failures.
    pub consecutive_failures: u64,
}

impl Counts {
    /// Fraction of recorded outcomes that failed, or `0.0` for an empty window.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }

        self.total_failures as f64 / self.requests as f64
    }

    pub(crate) fn record_success(&mut self) {
        self.requests += 1;
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self) {
        self.requests += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Counts::default();
    }
}

/// Trait for metrics sinks that can receive circuit breaker events.
///
/// Sinks are called outside the breaker's lock, from whichever thread made
/// the call that produced the event.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);

    /// Records the failure ratio of the window that tripped the breaker.
    fn record_error_rate(&self, breaker: &str, rate: f64);

    /// Records a call that was refused admission in `state`.
    fn record_rejection(&self, breaker: &str, state: State);

    /// Records the outcome of an admitted call.
    fn record_call(&self, breaker: &str, success: bool, duration: Duration);

    /// Records an outcome discarded because its generation was superseded.
    fn record_stale_outcome(&self, breaker: &str);
}

/// A null metrics sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
    fn record_error_rate(&self, _breaker: &str, _rate: f64) {}
    fn record_rejection(&self, _breaker: &str, _state: State) {}
    fn record_call(&self, _breaker: &str, _success: bool, _duration: Duration) {}
    fn record_stale_outcome(&self, _breaker: &str) {}
}
