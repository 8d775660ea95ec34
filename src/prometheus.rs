//! Prometheus export for circuit breaker metrics.

use std::sync::atomic::AtomicU64;
use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::metrics::MetricSink;
use crate::state::State;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BreakerLabels {
    breaker: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TransitionLabels {
    breaker: String,
    from: String,
    to: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    breaker: String,
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RejectionLabels {
    breaker: String,
    state: String,
}

type HistogramFamily = Family<BreakerLabels, Histogram, fn() -> Histogram>;

fn call_duration_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.0, 16))
}

/// Metric sink that exports breaker events to a `prometheus-client` registry.
///
/// Every metric is labelled with the breaker name, so one sink can be shared
/// by many breakers.
#[derive(Clone, Debug)]
pub struct PrometheusMetricSink {
    transitions: Family<TransitionLabels, Counter>,
    calls: Family<OutcomeLabels, Counter>,
    call_duration: HistogramFamily,
    rejections: Family<RejectionLabels, Counter>,
    stale_outcomes: Family<BreakerLabels, Counter>,
    trip_error_rate: Family<BreakerLabels, Gauge<f64, AtomicU64>>,
}

impl PrometheusMetricSink {
    /// Creates the sink and registers its metrics in `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let sink = Self {
            transitions: Family::default(),
            calls: Family::default(),
            call_duration: HistogramFamily::new_with_constructor(call_duration_histogram),
            rejections: Family::default(),
            stale_outcomes: Family::default(),
            trip_error_rate: Family::default(),
        };

        registry.register(
            "circuit_breaker_transitions",
            "Circuit breaker state transitions",
            sink.transitions.clone(),
        );
        registry.register(
            "circuit_breaker_calls",
            "Calls admitted by the circuit breaker, by outcome",
            sink.calls.clone(),
        );
        registry.register(
            "circuit_breaker_call_duration_seconds",
            "Duration of admitted calls",
            sink.call_duration.clone(),
        );
        registry.register(
            "circuit_breaker_rejections",
            "Calls rejected without running the operation",
            sink.rejections.clone(),
        );
        registry.register(
            "circuit_breaker_stale_outcomes",
            "Outcomes discarded because the breaker moved on",
            sink.stale_outcomes.clone(),
        );
        registry.register(
            "circuit_breaker_trip_error_rate",
            "Failure ratio of the window that last tripped the breaker",
            sink.trip_error_rate.clone(),
        );

        sink
    }

    fn breaker(name: &str) -> BreakerLabels {
        BreakerLabels {
            breaker: name.to_owned(),
        }
    }
}

impl MetricSink for PrometheusMetricSink {
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        self.transitions
            .get_or_create(&TransitionLabels {
                breaker: breaker.to_owned(),
                from: from.as_str().to_owned(),
                to: to.as_str().to_owned(),
            })
            .inc();
    }

    fn record_error_rate(&self, breaker: &str, rate: f64) {
        self.trip_error_rate
            .get_or_create(&Self::breaker(breaker))
            .set(rate);
    }

    fn record_rejection(&self, breaker: &str, state: State) {
        self.rejections
            .get_or_create(&RejectionLabels {
                breaker: breaker.to_owned(),
                state: state.as_str().to_owned(),
            })
            .inc();
    }

    fn record_call(&self, breaker: &str, success: bool, duration: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.calls
            .get_or_create(&OutcomeLabels {
                breaker: breaker.to_owned(),
                outcome: outcome.to_owned(),
            })
            .inc();
        self.call_duration
            .get_or_create(&Self::breaker(breaker))
            .observe(duration.as_secs_f64());
    }

    fn record_stale_outcome(&self, breaker: &str) {
        self.stale_outcomes
            .get_or_create(&Self::breaker(breaker))
            .inc();
    }
}
