//! Hook registry for circuit breaker events.

use std::fmt;
use std::sync::Arc;

use crate::state::State;

type StateChangeFn = Arc<dyn Fn(&str, State, State) + Send + Sync + 'static>;
type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;
type RejectionFn = Arc<dyn Fn(State) + Send + Sync + 'static>;

/// Callbacks invoked by a circuit breaker.
///
/// Hooks run synchronously on the calling thread after the breaker's lock is
/// released and after the outcome has been recorded, so a panicking hook
/// propagates to the caller of [`CircuitBreaker::call`](crate::CircuitBreaker::call)
/// without corrupting the breaker's state.
///
/// Hooks are skipped while the thread is already unwinding from a panic in the
/// protected operation. The outcome is still recorded and logged.
#[derive(Clone, Default)]
pub struct HookRegistry {
    on_state_change: Option<StateChangeFn>,
    on_success: Option<HookFn>,
    on_failure: Option<HookFn>,
    on_rejection: Option<RejectionFn>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observer notified with `(name, from, to)` on every state
    /// transition.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Sets the hook to call when an admitted call succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Sets the hook to call when an admitted call fails.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(f));
        self
    }

    /// Sets the hook to call with the current state when a call is rejected
    /// without running.
    pub fn on_rejection<F>(mut self, f: F) -> Self
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        self.on_rejection = Some(Arc::new(f));
        self
    }

    pub(crate) fn execute_state_change_hook(&self, name: &str, from: State, to: State) {
        if std::thread::panicking() {
            return;
        }
        if let Some(hook) = &self.on_state_change {
            hook(name, from, to);
        }
    }

    pub(crate) fn execute_outcome_hook(&self, success: bool) {
        if std::thread::panicking() {
            return;
        }
        let hook = if success {
            &self.on_success
        } else {
            &self.on_failure
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn execute_rejection_hook(&self, state: State) {
        if let Some(hook) = &self.on_rejection {
            hook(state);
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_rejection", &self.on_rejection.is_some())
            .finish()
    }
}
