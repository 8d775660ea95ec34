//! Circuit breaker state machine implementation.
//!
//! The machine is a tagged enum of per-state data plus a generation counter.
//! Every transition and every closed-window rollover starts a new generation
//! and clears the window counts. Outcomes reported against an older
//! generation are discarded.

use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

use crate::error::BreakerError;
use crate::metrics::Counts;
use crate::policy::TripPolicy;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    Closed,

    /// Circuit is open and operations are rejected.
    Open,

    /// Circuit is admitting a single probe to test recovery.
    HalfOpen,
}

impl State {
    /// Lowercase name used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, tagged with the generation it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: State,
    pub(crate) to: State,
    pub(crate) generation: u64,
}

/// Result of applying elapsed time to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Unchanged,
    WindowReset { generation: u64 },
    Transitioned(Transition),
}

/// Why a call was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Open,
    TooManyRequests,
}

impl Rejection {
    pub(crate) fn into_error<E>(self) -> BreakerError<E> {
        match self {
            Rejection::Open => BreakerError::Open,
            Rejection::TooManyRequests => BreakerError::TooManyRequests,
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Rejection::Open => "circuit open",
            Rejection::TooManyRequests => "probe in flight",
        }
    }
}

/// Result of reporting an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Record {
    /// The outcome belonged to a superseded generation.
    Stale,

    /// The outcome was counted. `counts` is the window after the update and
    /// before any reset caused by `transition`.
    Counted {
        counts: Counts,
        transition: Option<Transition>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed { window_start: Instant },
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

impl Phase {
    fn state(&self) -> State {
        match self {
            Phase::Closed { .. } => State::Closed,
            Phase::Open { .. } => State::Open,
            Phase::HalfOpen { .. } => State::HalfOpen,
        }
    }
}

/// State, counts and generation of one breaker. Callers serialize access.
#[derive(Debug)]
pub(crate) struct StateMachine {
    phase: Phase,
    generation: u64,
    counts: Counts,
    interval: Duration,
    timeout: Duration,
}

impl StateMachine {
    /// Creates a closed machine at generation zero.
    pub(crate) fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            phase: Phase::Closed { window_start: now },
            generation: 0,
            counts: Counts::default(),
            interval,
            timeout,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.phase.state()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn counts(&self) -> Counts {
        self.counts
    }

    /// Applies time-driven changes: closed window rollover and open timeout expiry.
    pub(crate) fn tick(&mut self, now: Instant) -> Tick {
        match self.phase {
            Phase::Closed { window_start }
                if !self.interval.is_zero()
                    && now.saturating_duration_since(window_start) >= self.interval =>
            {
                self.enter(State::Closed, now);
                Tick::WindowReset {
                    generation: self.generation,
                }
            }
            Phase::Open { since } if now.saturating_duration_since(since) >= self.timeout => {
                Tick::Transitioned(self.transition(State::HalfOpen, now))
            }
            _ => Tick::Unchanged,
        }
    }

    /// Decides admission for a call in the current phase.
    ///
    /// Returns the generation the call runs under. In half-open the probe
    /// marker is set before returning.
    pub(crate) fn admit(&mut self) -> Result<u64, Rejection> {
        match &mut self.phase {
            Phase::Closed { .. } => Ok(self.generation),
            Phase::Open { .. } => Err(Rejection::Open),
            Phase::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    return Err(Rejection::TooManyRequests);
                }
                *probe_in_flight = true;
                Ok(self.generation)
            }
        }
    }

    /// Counts an outcome reported under `generation` and applies the
    /// resulting transition, if any.
    pub(crate) fn record<P>(
        &mut self,
        generation: u64,
        success: bool,
        now: Instant,
        policy: &P,
    ) -> Record
    where
        P: TripPolicy + ?Sized,
    {
        if generation != self.generation {
            return Record::Stale;
        }

        if success {
            self.counts.record_success();
        } else {
            self.counts.record_failure();
        }
        let counts = self.counts;

        let next = match self.phase {
            Phase::Closed { .. } if !success && policy.ready_to_trip(&counts) => Some(State::Open),
            Phase::HalfOpen { .. } if success => Some(State::Closed),
            Phase::HalfOpen { .. } => Some(State::Open),
            _ => None,
        };

        Record::Counted {
            counts,
            transition: next.map(|to| self.transition(to, now)),
        }
    }

    /// Moves to `to` unless already there.
    pub(crate) fn force(&mut self, to: State, now: Instant) -> Option<Transition> {
        if self.state() == to {
            return None;
        }
        Some(self.transition(to, now))
    }

    fn transition(&mut self, to: State, now: Instant) -> Transition {
        let from = self.state();
        self.enter(to, now);
        Transition {
            from,
            to,
            generation: self.generation,
        }
    }

    fn enter(&mut self, to: State, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.counts.clear();
        self.phase = match to {
            State::Closed => Phase::Closed { window_start: now },
            State::Open => Phase::Open { since: now },
            State::HalfOpen => Phase::HalfOpen {
                probe_in_flight: false,
            },
        };
    }
}
