use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tripwire::{
    BreakerError, CircuitBreaker, ConfigError, ConsecutiveFailures, Counts, FailureRatio,
    HookRegistry, MetricSink, MockClock, State,
};

// Custom error type that implements Error trait
#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl Error for TestError {}

const INTERVAL: Duration = Duration::from_secs(5);
const TIMEOUT: Duration = Duration::from_secs(7);

fn breaker_with_clock(clock: &MockClock) -> CircuitBreaker<FailureRatio, TestError> {
    CircuitBreaker::<FailureRatio, TestError>::builder()
        .name("sms")
        .interval(INTERVAL)
        .timeout(TIMEOUT)
        .clock(clock.clone())
        .build()
        .unwrap()
}

fn fail(breaker: &CircuitBreaker<FailureRatio, TestError>) -> Result<(), BreakerError<TestError>> {
    breaker.call(|| -> Result<(), TestError> { Err(TestError::new("downstream failed")) })
}

fn succeed(breaker: &CircuitBreaker<FailureRatio, TestError>) -> Result<(), BreakerError<TestError>> {
    breaker.call(|| -> Result<(), TestError> { Ok(()) })
}

fn trip(breaker: &CircuitBreaker<FailureRatio, TestError>) {
    for _ in 0..3 {
        let _ = fail(breaker);
    }
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_three_failures_trip_the_breaker() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);
    assert_eq!(breaker.state(), State::Closed);

    assert!(matches!(fail(&breaker), Err(BreakerError::Operation(_))));
    assert!(matches!(fail(&breaker), Err(BreakerError::Operation(_))));
    assert_eq!(breaker.state(), State::Closed);

    assert!(matches!(fail(&breaker), Err(BreakerError::Operation(_))));
    assert_eq!(breaker.state(), State::Open);

    // Fourth call never reaches the operation
    let invoked = Cell::new(false);
    let result = breaker.call(|| -> Result<(), TestError> {
        invoked.set(true);
        Ok(())
    });
    assert!(matches!(result, Err(BreakerError::Open)));
    assert!(!invoked.get());
}

#[test]
fn test_mixed_outcomes_below_threshold_stay_closed() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);

    succeed(&breaker).unwrap();
    let _ = fail(&breaker);
    succeed(&breaker).unwrap();
    let _ = fail(&breaker);

    // 2 of 4 failed: below 60%
    assert_eq!(breaker.state(), State::Closed);

    // 3 of 5 failed: exactly 60% trips
    let _ = fail(&breaker);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_open_timeout_boundary() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);
    trip(&breaker);

    clock.advance(Duration::from_millis(6_900));
    assert!(matches!(succeed(&breaker), Err(BreakerError::Open)));
    assert_eq!(breaker.state(), State::Open);

    let generation = breaker.generation();
    clock.advance(Duration::from_millis(200));

    let observed = Cell::new(None);
    let result = breaker.call(|| -> Result<(), TestError> {
        observed.set(Some(breaker.state()));
        Ok(())
    });
    assert!(result.is_ok());
    assert_eq!(observed.get(), Some(State::HalfOpen));
    assert_eq!(breaker.state(), State::Closed);
    assert!(breaker.generation() > generation);
}

#[test]
fn test_successful_probe_closes_with_fresh_counts() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);
    trip(&breaker);

    clock.advance(TIMEOUT);
    assert_eq!(breaker.state(), State::HalfOpen);

    succeed(&breaker).unwrap();
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.counts(), Counts::default());
}

#[test]
fn test_failed_probe_reopens_and_restarts_timer() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);
    trip(&breaker);

    clock.advance(TIMEOUT);
    assert!(matches!(fail(&breaker), Err(BreakerError::Operation(_))));
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.counts(), Counts::default());

    clock.advance(TIMEOUT - Duration::from_millis(100));
    assert!(matches!(succeed(&breaker), Err(BreakerError::Open)));

    clock.advance(Duration::from_millis(100));
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[test]
fn test_half_open_rejects_concurrent_probe() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);
    trip(&breaker);
    clock.advance(TIMEOUT);

    let nested = Cell::new(None);
    let result = breaker.call(|| -> Result<(), TestError> {
        nested.set(Some(matches!(
            succeed(&breaker),
            Err(BreakerError::TooManyRequests)
        )));
        Ok(())
    });

    assert!(result.is_ok());
    assert_eq!(nested.get(), Some(true));
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn test_closed_window_resets_counts() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);

    let _ = fail(&breaker);
    clock.set_elapsed(Duration::from_secs(1));
    let _ = fail(&breaker);
    assert_eq!(breaker.counts().total_failures, 2);

    clock.set_elapsed(Duration::from_secs(5));
    assert_eq!(breaker.counts(), Counts::default());

    clock.set_elapsed(Duration::from_secs(6));
    let _ = fail(&breaker);
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.counts().requests, 1);
}

#[test]
fn test_stale_outcome_does_not_touch_new_generation() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);

    let result = breaker.call(|| -> Result<(), TestError> {
        // While this call is in flight the breaker trips and times out.
        trip(&breaker);
        clock.advance(TIMEOUT);
        assert_eq!(breaker.state(), State::HalfOpen);
        Err(TestError::new("slow failure"))
    });

    // The caller still sees its own error
    assert!(matches!(result, Err(BreakerError::Operation(_))));

    // but the half-open window is untouched and still admits a probe.
    assert_eq!(breaker.state(), State::HalfOpen);
    assert_eq!(breaker.counts(), Counts::default());
    succeed(&breaker).unwrap();
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn test_observer_sees_every_transition() {
    let clock = MockClock::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .name("sms")
        .timeout(TIMEOUT)
        .clock(clock.clone())
        .on_state_change(move |name, from, to| sink.lock().push((name.to_string(), from, to)))
        .build()
        .unwrap();

    trip(&breaker);
    clock.advance(TIMEOUT);
    let _ = fail(&breaker);
    clock.advance(TIMEOUT);
    succeed(&breaker).unwrap();

    let seen = seen.lock();
    let transitions: Vec<_> = seen.iter().map(|(_, from, to)| (*from, *to)).collect();
    assert_eq!(
        transitions,
        vec![
            (State::Closed, State::Open),
            (State::Open, State::HalfOpen),
            (State::HalfOpen, State::Open),
            (State::Open, State::HalfOpen),
            (State::HalfOpen, State::Closed),
        ]
    );
    assert!(seen.iter().all(|(name, _, _)| name == "sms"));
}

#[test]
fn test_outcome_hooks() {
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (s, f) = (Arc::clone(&successes), Arc::clone(&failures));

    let hooks = HookRegistry::new()
        .on_success(move || {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_failure(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .hooks(hooks)
        .build()
        .unwrap();

    succeed(&breaker).unwrap();
    let _ = fail(&breaker);
    let _ = fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // Rejected, so no hook
    assert!(matches!(succeed(&breaker), Err(BreakerError::Open)));

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[test]
fn test_rejection_hook_sees_the_rejecting_state() {
    let clock = MockClock::new();
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&rejected);

    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .timeout(TIMEOUT)
        .clock(clock.clone())
        .hooks(HookRegistry::new().on_rejection(move |state| seen.lock().push(state)))
        .build()
        .unwrap();

    succeed(&breaker).unwrap();
    assert!(rejected.lock().is_empty());

    breaker.force_open();
    assert!(matches!(succeed(&breaker), Err(BreakerError::Open)));

    clock.advance(TIMEOUT);
    let _ = breaker.call(|| -> Result<(), TestError> {
        assert!(matches!(
            succeed(&breaker),
            Err(BreakerError::TooManyRequests)
        ));
        Ok(())
    });

    assert_eq!(*rejected.lock(), vec![State::Open, State::HalfOpen]);
}

#[test]
fn test_panicking_outcome_hook_does_not_wedge_half_open() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .timeout(TIMEOUT)
        .clock(clock.clone())
        .hooks(HookRegistry::new().on_success(|| panic!("success hook blew up")))
        .build()
        .unwrap();

    breaker.force_open();
    clock.advance(TIMEOUT);
    assert_eq!(breaker.state(), State::HalfOpen);

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = succeed(&breaker);
    }));
    assert!(panicked.is_err());

    // The successful outcome was committed before the hook ran.
    assert_eq!(breaker.state(), State::Closed);
    assert!(matches!(fail(&breaker), Err(BreakerError::Operation(_))));
}

#[test]
fn test_hooks_are_skipped_while_the_operation_unwinds() {
    let clock = MockClock::new();
    let reopened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reopened);

    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .timeout(TIMEOUT)
        .clock(clock.clone())
        .on_state_change(move |_, from, to| {
            if from == State::HalfOpen && to == State::Open {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("observer blew up");
            }
        })
        .build()
        .unwrap();

    breaker.force_open();
    clock.advance(TIMEOUT);

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = breaker.call(|| -> Result<(), TestError> { panic!("operation blew up") });
    }));
    assert!(panicked.is_err());

    // The failure reopened the circuit without running the observer.
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(reopened.load(Ordering::SeqCst), 0);
}

#[derive(Debug, Clone, PartialEq)]
enum SinkEvent {
    Transition(State, State),
    ErrorRate(f64),
    Rejection(State),
    Call(bool),
    Stale,
}

#[derive(Clone, Default)]
struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl MetricSink for RecordingSink {
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        assert_eq!(breaker, "sms");
        self.events.lock().push(SinkEvent::Transition(from, to));
    }

    fn record_error_rate(&self, _breaker: &str, rate: f64) {
        self.events.lock().push(SinkEvent::ErrorRate(rate));
    }

    fn record_rejection(&self, _breaker: &str, state: State) {
        self.events.lock().push(SinkEvent::Rejection(state));
    }

    fn record_call(&self, _breaker: &str, success: bool, _duration: Duration) {
        self.events.lock().push(SinkEvent::Call(success));
    }

    fn record_stale_outcome(&self, _breaker: &str) {
        self.events.lock().push(SinkEvent::Stale);
    }
}

#[test]
fn test_metric_sink_receives_breaker_events() {
    let clock = MockClock::new();
    let sink = RecordingSink::default();
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .name("sms")
        .timeout(TIMEOUT)
        .clock(clock.clone())
        .metric_sink(sink.clone())
        .build()
        .unwrap();

    trip(&breaker);
    assert_eq!(
        sink.take(),
        vec![
            SinkEvent::Call(false),
            SinkEvent::Call(false),
            SinkEvent::Call(false),
            SinkEvent::ErrorRate(1.0),
            SinkEvent::Transition(State::Closed, State::Open),
        ]
    );

    assert!(matches!(succeed(&breaker), Err(BreakerError::Open)));
    assert_eq!(sink.take(), vec![SinkEvent::Rejection(State::Open)]);

    breaker.force_closed();
    sink.take();

    // Superseded by a manual override while in flight
    let result = breaker.call(|| -> Result<(), TestError> {
        breaker.force_open();
        Ok(())
    });
    assert!(result.is_ok());
    assert_eq!(
        sink.take(),
        vec![
            SinkEvent::Transition(State::Closed, State::Open),
            SinkEvent::Call(true),
            SinkEvent::Stale,
        ]
    );
}

#[test]
fn test_custom_policy_closure() {
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .ready_to_trip(|counts: &Counts| counts.consecutive_failures >= 1)
        .build()
        .unwrap();

    breaker
        .call(|| -> Result<u32, TestError> { Ok(1) })
        .unwrap();
    assert_eq!(breaker.state(), State::Closed);

    let _ = breaker.call(|| -> Result<u32, TestError> { Err(TestError::new("boom")) });
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_consecutive_failures_policy() {
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .policy(ConsecutiveFailures(2))
        .build()
        .unwrap();

    for _ in 0..5 {
        breaker.call(|| -> Result<(), TestError> { Ok(()) }).unwrap();
    }
    let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("one")) });
    assert_eq!(breaker.state(), State::Closed);
    let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("two")) });
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_zero_timeout_is_rejected() {
    let result = CircuitBreaker::<FailureRatio, TestError>::builder()
        .timeout(Duration::ZERO)
        .build();
    assert_eq!(result.err(), Some(ConfigError::ZeroTimeout));
}

#[test]
fn test_operation_error_is_passed_through() {
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .build()
        .unwrap();

    let err = fail(&breaker).unwrap_err();
    assert!(!err.is_rejection());
    assert_eq!(err.source().map(|e| e.to_string()), Some("Test error: downstream failed".into()));
    assert_eq!(err.into_operation().map(|e| e.0), Some("downstream failed".to_string()));
}

#[test]
fn test_panicking_probe_counts_as_failure() {
    let clock = MockClock::new();
    let breaker = breaker_with_clock(&clock);
    trip(&breaker);
    clock.advance(TIMEOUT);

    let probe = breaker.clone();
    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = probe.call(|| -> Result<(), TestError> { panic!("probe blew up") });
    }));
    assert!(panicked.is_err());

    // The probe marker was released and the failure reopened the circuit.
    assert_eq!(breaker.state(), State::Open);
    clock.advance(TIMEOUT);
    succeed(&breaker).unwrap();
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn test_circuit_breaker_manual_control() {
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .build()
        .unwrap();

    // Force open
    assert!(breaker.force_open());
    assert_eq!(breaker.state(), State::Open);

    // Check that calls are rejected when open
    let result = breaker.call(|| -> Result<String, TestError> { Ok("success".to_string()) });
    assert!(matches!(result, Err(BreakerError::Open)));

    // Trying to open again should return false (no change)
    assert!(!breaker.force_open());

    // Force closed
    assert!(breaker.force_closed());
    assert_eq!(breaker.state(), State::Closed);
    assert!(!breaker.force_closed());
}

#[test]
fn test_clones_share_state() {
    let breaker = CircuitBreaker::<FailureRatio, TestError>::builder()
        .name("shared")
        .build()
        .unwrap();
    let other = breaker.clone();

    trip(&breaker);
    assert_eq!(other.state(), State::Open);
    assert_eq!(other.name(), "shared");
}
