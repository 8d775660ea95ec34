//! Trip policies deciding when a closed circuit opens.

use crate::metrics::Counts;

/// A policy that decides, from the current window's counts, whether a closed
/// circuit should trip open.
///
/// The breaker consults the policy only after recording a failure while
/// closed. Any `Fn(&Counts) -> bool` closure is a policy.
pub trait TripPolicy: Send + Sync + 'static {
    /// Returns true if the circuit should open.
    fn ready_to_trip(&self, counts: &Counts) -> bool;
}

impl<F> TripPolicy for F
where
    F: Fn(&Counts) -> bool + Send + Sync + 'static,
{
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        self(counts)
    }
}

/// Trips once the window has enough requests and its failure ratio reaches a
/// threshold.
///
/// The default trips at three or more requests with at least 60% failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureRatio {
    min_requests: u64,
    ratio: f64,
}

impl FailureRatio {
    /// Creates a policy tripping when `requests >= min_requests` and
    /// `failures / requests >= ratio`.
    pub const fn new(min_requests: u64, ratio: f64) -> Self {
        Self {
            min_requests,
            ratio,
        }
    }

    /// Minimum number of requests in the window before the ratio counts.
    pub fn min_requests(&self) -> u64 {
        self.min_requests
    }

    /// Failure ratio at or above which the circuit trips.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl Default for FailureRatio {
    fn default() -> Self {
        Self::new(3, 0.6)
    }
}

impl TripPolicy for FailureRatio {
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.min_requests && counts.failure_ratio() >= self.ratio
    }
}

/// Trips after a run of consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveFailures(pub u64);

impl TripPolicy for ConsecutiveFailures {
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.consecutive_failures >= self.0
    }
}
