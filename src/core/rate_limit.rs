//! Per-sender admission control.
//!
//! Fixed window per sending agent: every admission check counts, and the
//! check is denied once the count for the current window exceeds the quota.
//! State lives in memory only and is lost on restart.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Admissions allowed per agent per window
    pub max_per_window: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: 100,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start_ms: i64,
}

/// Fixed-window admission counter keyed by sending agent.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one message from `agent_id` and decide whether it may pass.
    pub fn admit(&self, agent_id: &str, now_ms: i64) -> bool {
        let mut windows = lock(&self.windows);
        let window = windows.entry(agent_id.to_string()).or_insert(RateWindow {
            count: 0,
            window_start_ms: now_ms,
        });

        if now_ms - window.window_start_ms >= self.config.window_ms as i64 {
            window.count = 0;
            window.window_start_ms = now_ms;
        }

        window.count = window.count.saturating_add(1);
        let admitted = window.count <= self.config.max_per_window;
        if !admitted {
            tracing::debug!(
                "Agent {} at {}/{} messages in window",
                agent_id,
                window.count,
                self.config.max_per_window
            );
        }
        admitted
    }

    /// Messages counted for an agent in its current window.
    pub fn current_count(&self, agent_id: &str) -> u32 {
        lock(&self.windows).get(agent_id).map_or(0, |w| w.count)
    }

    /// Number of agents with a window.
    pub fn tracked_agents(&self) -> usize {
        lock(&self.windows).len()
    }

    /// Forget every window.
    pub fn reset(&self) {
        lock(&self.windows).clear();
    }
}
