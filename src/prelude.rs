//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use tripwire::prelude::*;
//! ```

pub use crate::breaker::CircuitBreaker;
pub use crate::error::{BreakerError, BreakerResult};
pub use crate::metrics::Counts;
pub use crate::policy::{FailureRatio, TripPolicy};
pub use crate::state::State;
