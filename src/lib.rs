//! # tripwire
//!
//! A generation-aware circuit breaker that guards calls to an unreliable
//! dependency.
//!
//! The breaker wraps any fallible operation, counts its outcomes in a
//! measurement window and stops calling the dependency once a trip policy
//! decides it is unhealthy. After a timeout it lets a single probe through to
//! test recovery.
//!
//! ## States
//!
//! - **Closed**: every call is admitted. Counts are cleared every `interval`
//!   (if non-zero). A failure that makes the trip policy return true opens
//!   the circuit.
//! - **Open**: every call is rejected with [`BreakerError::Open`] until
//!   `timeout` has elapsed since the circuit opened.
//! - **Half-Open**: one probe at a time is admitted; concurrent calls get
//!   [`BreakerError::TooManyRequests`]. A successful probe closes the circuit,
//!   a failed one opens it again.
//!
//! Each transition and window reset starts a new *generation*. A call that
//! completes after its generation has ended does not touch the new window.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::time::Duration;
//! use tripwire::{BreakerError, CircuitBreaker, FailureRatio};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("service unavailable")]
//! struct ServiceError;
//!
//! let breaker = CircuitBreaker::<FailureRatio, ServiceError>::builder()
//!     .name("sms")
//!     .interval(Duration::from_secs(5))
//!     .timeout(Duration::from_secs(7))
//!     .on_state_change(|name, from, to| println!("{name}: {from} -> {to}"))
//!     .build()
//!     .expect("valid configuration");
//!
//! match breaker.call(|| Ok::<_, ServiceError>("delivered")) {
//!     Ok(reply) => println!("call succeeded: {reply}"),
//!     Err(BreakerError::Open) => println!("circuit is open, call was prevented"),
//!     Err(BreakerError::TooManyRequests) => println!("recovery probe in flight"),
//!     Err(BreakerError::Operation(err)) => println!("call failed: {err}"),
//! }
//! ```
//!
//! ## Features
//!
//! - `async` - [`CircuitBreaker::call_async`] for future-returning operations
//! - `prometheus` - `PrometheusMetricSink` for `prometheus-client`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod clock;
mod config;
mod error;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
#[cfg(feature = "prometheus")]
mod prometheus;
mod state;

// Re-exports
pub use breaker::CircuitBreaker;
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{BreakerBuilder, DEFAULT_TIMEOUT};
pub use error::{BreakerError, BreakerResult, ConfigError, ConfigResult};
pub use hook::HookRegistry;
pub use metrics::{Counts, MetricSink, NullMetricSink};
pub use policy::{ConsecutiveFailures, FailureRatio, TripPolicy};
#[cfg(feature = "prometheus")]
pub use prometheus::PrometheusMetricSink;
pub use state::State;
