//! Core routing pipeline.
//!
//! - Per-sender rate limiting
//! - Pair and correlation-chain circuit breaking
//! - The router that validates, admits, delivers and audits messages

pub mod circuit;
pub mod metrics;
pub mod rate_limit;
pub mod routing;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitDecision, PairState};
pub use metrics::RouterMetrics;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use routing::{
    A2ARouter, BroadcastMode, Deliver, DeliveryOutcome, RouteResult, RouteStatus, RouterOptions,
};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
