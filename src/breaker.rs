//! Core circuit breaker implementation.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{BreakerBuilder, Settings};
use crate::error::{BreakerError, BreakerResult};
use crate::hook::HookRegistry;
use crate::metrics::{Counts, MetricSink};
use crate::policy::{FailureRatio, TripPolicy};
use crate::state::{Record, Rejection, State, StateMachine, Tick, Transition};

/// Inner state of the circuit breaker, shared between clones.
struct BreakerInner<P> {
    name: String,
    machine: Mutex<StateMachine>,
    policy: P,
    hooks: HookRegistry,
    metric_sink: Arc<dyn MetricSink>,
    clock: Arc<dyn Clock>,
}

/// A circuit breaker that can wrap function calls to prevent cascading failures.
///
/// `P` is the trip policy and `E` the error type of the protected operation.
/// Clones share the same state.
pub struct CircuitBreaker<P, E> {
    inner: Arc<BreakerInner<P>>,
    _error_type: PhantomData<fn() -> E>,
}

impl<E> CircuitBreaker<FailureRatio, E> {
    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder() -> BreakerBuilder<FailureRatio, E> {
        BreakerBuilder::new()
    }
}

impl<P, E> CircuitBreaker<P, E>
where
    P: TripPolicy,
{
    pub(crate) fn new(settings: Settings<P>) -> Self {
        let now = settings.clock.now();
        let inner = BreakerInner {
            name: settings.name,
            machine: Mutex::new(StateMachine::new(settings.interval, settings.timeout, now)),
            policy: settings.policy,
            hooks: settings.hooks,
            metric_sink: settings.metric_sink,
            clock: settings.clock,
        };

        Self {
            inner: Arc::new(inner),
            _error_type: PhantomData,
        }
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the current state of the circuit breaker.
    ///
    /// Elapsed time is applied first, so an open circuit whose timeout has
    /// passed reports `HalfOpen`.
    pub fn state(&self) -> State {
        self.inner.observe(StateMachine::state)
    }

    /// Gets a snapshot of the current window's counts.
    pub fn counts(&self) -> Counts {
        self.inner.observe(StateMachine::counts)
    }

    /// Gets the current generation.
    pub fn generation(&self) -> u64 {
        self.inner.observe(StateMachine::generation)
    }

    /// Executes a function wrapped by the circuit breaker.
    ///
    /// Returns [`BreakerError::Open`] or [`BreakerError::TooManyRequests`]
    /// without running `f` when the call is not admitted. If `f` panics the
    /// call is recorded as a failure before the panic continues.
    pub fn call<F, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let generation = self.inner.before_call().map_err(Rejection::into_error::<E>)?;

        let guard = CallGuard::new(&self.inner, generation);
        let result = f();
        guard.complete(result.is_ok());

        result.map_err(BreakerError::Operation)
    }

    /// Forces the circuit breaker to the open state.
    ///
    /// Returns false if it was already open.
    pub fn force_open(&self) -> bool {
        self.inner.force(State::Open)
    }

    /// Forces the circuit breaker to the closed state with fresh counts.
    ///
    /// Returns false if it was already closed.
    pub fn force_closed(&self) -> bool {
        self.inner.force(State::Closed)
    }
}

#[cfg(feature = "async")]
impl<P, E> CircuitBreaker<P, E>
where
    P: TripPolicy,
{
    /// Executes an async function wrapped by the circuit breaker.
    ///
    /// Dropping the returned future after admission records a failure.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let generation = self.inner.before_call().map_err(Rejection::into_error::<E>)?;

        let guard = CallGuard::new(&self.inner, generation);
        let result = f().await;
        guard.complete(result.is_ok());

        result.map_err(BreakerError::Operation)
    }
}

impl<P> BreakerInner<P>
where
    P: TripPolicy,
{
    fn observe<R>(&self, read: impl FnOnce(&StateMachine) -> R) -> R {
        let now = self.clock.now();
        let (tick, value) = {
            let mut machine = self.machine.lock();
            let tick = machine.tick(now);
            (tick, read(&*machine))
        };
        self.publish_tick(tick);
        value
    }

    /// Checks if a call is allowed, returning the generation it runs under.
    fn before_call(&self) -> Result<u64, Rejection> {
        let now = self.clock.now();
        let (tick, admission, state) = {
            let mut machine = self.machine.lock();
            let tick = machine.tick(now);
            let admission = machine.admit();
            (tick, admission, machine.state())
        };
        self.publish_tick(tick);

        admission.inspect_err(|rejection| {
            debug!(breaker = %self.name, state = %state, reason = rejection.as_str(), "call rejected");
            self.metric_sink.record_rejection(&self.name, state);
            self.hooks.execute_rejection_hook(state);
        })
    }

    /// Records the outcome of a call admitted under `generation`.
    ///
    /// The outcome is committed under the lock before any sink or hook runs,
    /// so a panicking hook cannot leave a half-open probe in flight.
    fn after_call(&self, generation: u64, success: bool, duration: Duration) {
        let now = self.clock.now();
        let (tick, record) = {
            let mut machine = self.machine.lock();
            let tick = machine.tick(now);
            let record = machine.record(generation, success, now, &self.policy);
            (tick, record)
        };

        self.metric_sink.record_call(&self.name, success, duration);
        self.publish_tick(tick);

        match record {
            Record::Stale => {
                debug!(breaker = %self.name, generation, "discarding stale outcome");
                self.metric_sink.record_stale_outcome(&self.name);
            }
            Record::Counted {
                counts,
                transition: Some(transition),
            } => {
                if transition.from == State::Closed {
                    self.metric_sink
                        .record_error_rate(&self.name, counts.failure_ratio());
                }
                self.publish_transition(transition);
            }
            Record::Counted {
                transition: None, ..
            } => {}
        }

        self.hooks.execute_outcome_hook(success);
    }

    fn force(&self, to: State) -> bool {
        let now = self.clock.now();
        let (tick, transition) = {
            let mut machine = self.machine.lock();
            (machine.tick(now), machine.force(to, now))
        };
        self.publish_tick(tick);

        match transition {
            Some(transition) => {
                self.publish_transition(transition);
                true
            }
            None => false,
        }
    }

    fn publish_tick(&self, tick: Tick) {
        match tick {
            Tick::Unchanged => {}
            Tick::WindowReset { generation } => {
                debug!(breaker = %self.name, generation, "closed window reset");
            }
            Tick::Transitioned(transition) => self.publish_transition(transition),
        }
    }

    fn publish_transition(&self, transition: Transition) {
        let Transition {
            from,
            to,
            generation,
        } = transition;

        info!(breaker = %self.name, from = %from, to = %to, generation, "circuit breaker state changed");
        self.metric_sink
            .record_state_transition(&self.name, from, to);
        self.hooks.execute_state_change_hook(&self.name, from, to);
    }
}

/// Reports the outcome of an admitted call exactly once.
///
/// If dropped without [`complete`](CallGuard::complete), because the
/// operation panicked or its future was dropped, a failure is recorded so a
/// half-open probe never stays in flight forever.
struct CallGuard<'a, P>
where
    P: TripPolicy,
{
    inner: &'a BreakerInner<P>,
    generation: u64,
    started: Instant,
    armed: bool,
}

impl<'a, P> CallGuard<'a, P>
where
    P: TripPolicy,
{
    fn new(inner: &'a BreakerInner<P>, generation: u64) -> Self {
        Self {
            inner,
            generation,
            started: Instant::now(),
            armed: true,
        }
    }

    fn complete(mut self, success: bool) {
        self.armed = false;
        self.inner
            .after_call(self.generation, success, self.started.elapsed());
    }
}

impl<P> Drop for CallGuard<'_, P>
where
    P: TripPolicy,
{
    fn drop(&mut self) {
        if self.armed {
            self.inner
                .after_call(self.generation, false, self.started.elapsed());
        }
    }
}

// Allow cloning of circuit breakers - cheap because inner state is Arc'd
impl<P, E> Clone for CircuitBreaker<P, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _error_type: PhantomData,
        }
    }
}

impl<P, E> fmt::Debug for CircuitBreaker<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.inner.machine.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &machine.state())
            .field("generation", &machine.generation())
            .field("counts", &machine.counts())
            .finish()
    }
}
