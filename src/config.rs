//! Configuration for circuit breakers.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ConfigResult};
use crate::hook::HookRegistry;
use crate::metrics::{Counts, MetricSink, NullMetricSink};
use crate::policy::{FailureRatio, TripPolicy};
use crate::state::State;

/// Default time a tripped circuit stays open before probing.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder<P, E> {
    name: String,
    interval: Duration,
    timeout: Duration,
    policy: P,
    hooks: HookRegistry,
    metric_sink: Arc<dyn MetricSink>,
    clock: Arc<dyn Clock>,
    _error_type: PhantomData<fn() -> E>,
}

/// Validated settings handed to the breaker.
pub(crate) struct Settings<P> {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
    pub(crate) policy: P,
    pub(crate) hooks: HookRegistry,
    pub(crate) metric_sink: Arc<dyn MetricSink>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<E> Default for BreakerBuilder<FailureRatio, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> BreakerBuilder<FailureRatio, E> {
    /// Creates a new builder with default settings: no closed-window reset,
    /// a 60 second open timeout and the [`FailureRatio`] default policy.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            policy: FailureRatio::default(),
            hooks: HookRegistry::new(),
            metric_sink: Arc::new(NullMetricSink),
            clock: Arc::new(SystemClock),
            _error_type: PhantomData,
        }
    }
}

impl<P, E> BreakerBuilder<P, E>
where
    P: TripPolicy,
{
    /// Sets the name reported to observers, logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how often counts are cleared while closed. Zero disables resets.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long the circuit stays open before admitting a probe.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the trip policy.
    pub fn policy<Q: TripPolicy>(self, policy: Q) -> BreakerBuilder<Q, E> {
        BreakerBuilder {
            name: self.name,
            interval: self.interval,
            timeout: self.timeout,
            policy,
            hooks: self.hooks,
            metric_sink: self.metric_sink,
            clock: self.clock,
            _error_type: PhantomData,
        }
    }

    /// Sets the trip policy from a closure over the window counts.
    pub fn ready_to_trip<F>(self, f: F) -> BreakerBuilder<F, E>
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.policy(f)
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the state change observer, keeping any other hooks.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_state_change(f);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Changes the error type for the builder.
    pub fn with_error_type<NewE>(self) -> BreakerBuilder<P, NewE> {
        BreakerBuilder {
            name: self.name,
            interval: self.interval,
            timeout: self.timeout,
            policy: self.policy,
            hooks: self.hooks,
            metric_sink: self.metric_sink,
            clock: self.clock,
            _error_type: PhantomData,
        }
    }

    /// Builds a new circuit breaker with the configured settings.
    ///
    /// Fails if the open-state timeout is zero.
    pub fn build(self) -> ConfigResult<CircuitBreaker<P, E>> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(CircuitBreaker::new(Settings {
            name: self.name,
            interval: self.interval,
            timeout: self.timeout,
            policy: self.policy,
            hooks: self.hooks,
            metric_sink: self.metric_sink,
            clock: self.clock,
        }))
    }
}
