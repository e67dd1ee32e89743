//! Flood protection for agent pairs and correlation chains.
//!
//! Two triggers, either of which opens the circuit for the ordered
//! `(from, to)` pair:
//! - the pair sends more than `max_pair_messages_per_window` messages in one
//!   window;
//! - a correlation chain grows past `max_correlation_depth` messages, which
//!   catches runaway back-and-forth loops no matter which agents take part.
//!
//! An open pair rejects everything until its cooldown elapses and does not
//! count the rejected attempts, so hammering cannot extend the cooldown.
//! Chain counters never reset.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Messages allowed in one correlation chain
    pub max_correlation_depth: u32,
    /// Messages allowed per ordered pair per window
    pub max_pair_messages_per_window: u32,
    /// Pair window length in milliseconds
    pub window_ms: u64,
    /// How long a tripped pair stays open, in milliseconds
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_correlation_depth: 20,
            max_pair_messages_per_window: 50,
            window_ms: 60_000,
            cooldown_ms: 30_000,
        }
    }
}

/// Circuit state for one ordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Closed { count: u32, window_start_ms: i64 },
    Open { until_ms: i64 },
}

/// Outcome of a circuit check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CircuitDecision {
    pub tripped: bool,
    pub reason: Option<String>,
}

impl CircuitDecision {
    fn pass() -> Self {
        Self::default()
    }

    fn trip(reason: String) -> Self {
        Self {
            tripped: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    pairs: HashMap<(String, String), PairState>,
    chains: HashMap<String, u32>,
}

/// Pairwise and chain-depth circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Count one message and decide whether the circuit lets it through.
    pub fn check(
        &self,
        from: &str,
        to: &str,
        correlation_id: Option<&str>,
        now_ms: i64,
    ) -> CircuitDecision {
        let mut state = lock(&self.state);
        let key = (from.to_string(), to.to_string());
        let cooldown_until = now_ms + self.config.cooldown_ms as i64;

        let pair = state.pairs.entry(key).or_insert(PairState::Closed {
            count: 0,
            window_start_ms: now_ms,
        });

        if let PairState::Open { until_ms } = *pair {
            if now_ms < until_ms {
                return CircuitDecision::trip(format!(
                    "Circuit open for {} -> {}: pair message limit exceeded, cooling down for {}ms",
                    from,
                    to,
                    until_ms - now_ms
                ));
            }
            tracing::info!("Circuit for {} -> {} closed after cooldown", from, to);
            *pair = PairState::Closed {
                count: 0,
                window_start_ms: now_ms,
            };
        }

        if let PairState::Closed {
            count,
            window_start_ms,
        } = pair
        {
            if now_ms - *window_start_ms >= self.config.window_ms as i64 {
                *count = 0;
                *window_start_ms = now_ms;
            }
            *count = count.saturating_add(1);

            if *count > self.config.max_pair_messages_per_window {
                let sent = *count;
                *pair = PairState::Open {
                    until_ms: cooldown_until,
                };
                tracing::warn!(
                    "Circuit tripped for {} -> {}: {} messages in window",
                    from,
                    to,
                    sent
                );
                return CircuitDecision::trip(format!(
                    "Pair message limit exceeded for {} -> {} ({} > {} per {}ms)",
                    from, to, sent, self.config.max_pair_messages_per_window, self.config.window_ms
                ));
            }
        }

        if let Some(chain) = correlation_id {
            let depth = {
                let depth = state.chains.entry(chain.to_string()).or_insert(0);
                *depth = depth.saturating_add(1);
                *depth
            };

            if depth > self.config.max_correlation_depth {
                state.pairs.insert(
                    (from.to_string(), to.to_string()),
                    PairState::Open {
                        until_ms: cooldown_until,
                    },
                );
                tracing::warn!(
                    "Circuit tripped for {} -> {}: correlation chain {} at depth {}",
                    from,
                    to,
                    chain,
                    depth
                );
                return CircuitDecision::trip(format!(
                    "Correlation depth exceeded for {} ({} > {})",
                    chain, depth, self.config.max_correlation_depth
                ));
            }
        }

        CircuitDecision::pass()
    }

    /// Current state of an ordered pair, if it has been seen.
    pub fn pair_state(&self, from: &str, to: &str) -> Option<PairState> {
        lock(&self.state)
            .pairs
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    /// Messages observed so far in a correlation chain.
    pub fn chain_depth(&self, correlation_id: &str) -> u32 {
        lock(&self.state).chains.get(correlation_id).copied().unwrap_or(0)
    }

    /// Forget every pair and chain.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.pairs.clear();
        state.chains.clear();
    }
}
