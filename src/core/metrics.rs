//! Router counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the router counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouterMetrics {
    pub total_routed: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub total_rate_limited: u64,
    pub total_validation_failed: u64,
    pub total_circuit_open: u64,
}

impl RouterMetrics {
    /// Messages that reached the delivery stage.
    pub fn total_attempted(&self) -> u64 {
        self.total_delivered + self.total_failed
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    routed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    validation_failed: AtomicU64,
    circuit_open: AtomicU64,
}

impl Counters {
    pub fn routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn validation_failed(&self) {
        self.validation_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn circuit_open(&self) {
        self.circuit_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterMetrics {
        RouterMetrics {
            total_routed: self.routed.load(Ordering::Relaxed),
            total_delivered: self.delivered.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            total_rate_limited: self.rate_limited.load(Ordering::Relaxed),
            total_validation_failed: self.validation_failed.load(Ordering::Relaxed),
            total_circuit_open: self.circuit_open.load(Ordering::Relaxed),
        }
    }
}
