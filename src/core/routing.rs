//! Message routing between agents.
//!
//! Every raw message goes through the same stages in order:
//! validate, rate limit, circuit check, deliver, audit, count. A message
//! rejected before delivery is never audited. A message that reaches
//! delivery is audited exactly once, whether it was delivered or failed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use super::circuit::{CircuitBreaker, CircuitBreakerConfig};
use super::metrics::{Counters, RouterMetrics};
use super::rate_limit::{RateLimitConfig, RateLimiter};
use crate::audit::AuditSink;
use crate::error::Result;
use crate::protocol::envelope::{derive_correlation_id, A2AMessage};
use crate::protocol::types::BROADCAST_AGENT_ID;
use crate::protocol::validator::{EnvelopeValidator, Validate, ValidationIssue};

/// Result of handing a message to a transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered() -> Self {
        Self {
            delivered: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// Transport that places a message with its recipient.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Deliver `message` to `target_agent_id` (`"*"` for a logical broadcast).
    async fn deliver(&self, target_agent_id: &str, message: &A2AMessage) -> Result<DeliveryOutcome>;

    /// Agents a fan-out broadcast should reach.
    async fn known_agents(&self) -> Vec<String> {
        Vec::new()
    }
}

/// How broadcasts reach their recipients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// One delivery to `"*"`; the transport decides who receives it.
    #[default]
    Logical,
    /// One delivery per known agent, skipping the sender.
    FanOut,
}

/// Final status of a route call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Delivered,
    Failed,
    RateLimited,
    CircuitOpen,
    ValidationFailed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Delivered => "delivered",
            RouteStatus::Failed => "failed",
            RouteStatus::RateLimited => "rate_limited",
            RouteStatus::CircuitOpen => "circuit_open",
            RouteStatus::ValidationFailed => "validation_failed",
        }
    }

    /// Whether the message got as far as the transport.
    pub fn reached_delivery(&self) -> bool {
        matches!(self, RouteStatus::Delivered | RouteStatus::Failed)
    }
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one routed message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub status: RouteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Agents the transport was asked to deliver to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    /// Set when the audit sink failed to record a delivery attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

impl RouteResult {
    fn new(status: RouteStatus, message_id: Option<String>) -> Self {
        Self {
            status,
            message_id,
            errors: Vec::new(),
            error: None,
            recipients: Vec::new(),
            processing_time_ms: None,
            audit_error: None,
        }
    }

    fn invalid(errors: Vec<ValidationIssue>) -> Self {
        Self {
            errors,
            ..Self::new(RouteStatus::ValidationFailed, None)
        }
    }

    fn rejected(status: RouteStatus, message_id: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(status, Some(message_id.to_string()))
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status == RouteStatus::Delivered
    }
}

/// Router collaborators and limits.
#[derive(Clone)]
pub struct RouterOptions {
    pub deliver: Arc<dyn Deliver>,
    pub validator: Arc<dyn Validate>,
    pub audit: Option<Arc<dyn AuditSink>>,
    /// `None` disables rate limiting
    pub rate_limiter: Option<RateLimitConfig>,
    /// `None` disables the circuit breaker
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub broadcast: BroadcastMode,
}

impl RouterOptions {
    /// Envelope validation, no audit, no rate limiter, no circuit breaker.
    pub fn new(deliver: Arc<dyn Deliver>) -> Self {
        Self {
            deliver,
            validator: Arc::new(EnvelopeValidator),
            audit: None,
            rate_limiter: None,
            circuit_breaker: None,
            broadcast: BroadcastMode::default(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_rate_limiter(mut self, config: Option<RateLimitConfig>) -> Self {
        self.rate_limiter = config;
        self
    }

    pub fn with_circuit_breaker(mut self, config: Option<CircuitBreakerConfig>) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn with_broadcast(mut self, mode: BroadcastMode) -> Self {
        self.broadcast = mode;
        self
    }
}

/// Validates, admits, delivers and audits agent messages.
///
/// Safe to share across tasks; every limiter keeps its own lock.
pub struct A2ARouter {
    deliver: Arc<dyn Deliver>,
    validator: Arc<dyn Validate>,
    audit: Option<Arc<dyn AuditSink>>,
    rate_limiter: Option<RateLimiter>,
    circuit_breaker: Option<CircuitBreaker>,
    broadcast: BroadcastMode,
    counters: Counters,
}

impl A2ARouter {
    pub fn new(options: RouterOptions) -> Self {
        Self {
            deliver: options.deliver,
            validator: options.validator,
            audit: options.audit,
            rate_limiter: options.rate_limiter.map(RateLimiter::new),
            circuit_breaker: options.circuit_breaker.map(CircuitBreaker::new),
            broadcast: options.broadcast,
            counters: Counters::default(),
        }
    }

    /// Route a raw message using the wall clock.
    pub async fn route(&self, raw: &Value) -> RouteResult {
        self.route_at(raw, chrono::Utc::now().timestamp_millis()).await
    }

    /// Route an already built message.
    pub async fn route_message(&self, message: &A2AMessage) -> RouteResult {
        match serde_json::to_value(message) {
            Ok(raw) => self.route(&raw).await,
            Err(e) => {
                self.counters.routed();
                self.counters.validation_failed();
                RouteResult::invalid(vec![ValidationIssue::new(
                    "",
                    format!("Message could not be serialized: {}", e),
                    "serialize",
                )])
            }
        }
    }

    /// Route a raw message, with `now_ms` as the limiter clock.
    pub async fn route_at(&self, raw: &Value, now_ms: i64) -> RouteResult {
        let started = Instant::now();
        self.counters.routed();

        let message = match self.validator.validate(raw) {
            Ok(message) => message,
            Err(issues) => {
                self.counters.validation_failed();
                tracing::warn!(
                    "Rejected malformed message: {}",
                    issues
                        .iter()
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                return RouteResult::invalid(issues);
            }
        };

        let from = message.from().agent_id.as_str();
        let to = message.to().agent_id.as_str();

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.admit(from, now_ms) {
                self.counters.rate_limited();
                let config = limiter.config();
                tracing::warn!("Rate limited {} from {}", message.message_id(), from);
                return RouteResult::rejected(
                    RouteStatus::RateLimited,
                    message.message_id(),
                    format!(
                        "Agent {} exceeded rate limit of {} messages per {}ms",
                        from, config.max_per_window, config.window_ms
                    ),
                );
            }
        }

        if let Some(breaker) = &self.circuit_breaker {
            let chain = derive_correlation_id(&message);
            let decision = breaker.check(from, to, Some(&chain), now_ms);
            if decision.tripped {
                self.counters.circuit_open();
                let reason = decision
                    .reason
                    .unwrap_or_else(|| format!("Circuit open for {} -> {}", from, to));
                tracing::warn!("Circuit rejected {}: {}", message.message_id(), reason);
                return RouteResult::rejected(RouteStatus::CircuitOpen, message.message_id(), reason);
            }
        }

        let mut result = if message.is_broadcast() {
            self.deliver_broadcast(&message).await
        } else {
            let outcome = self.deliver_to(to, &message).await;
            let mut result = RouteResult::new(
                if outcome.delivered {
                    RouteStatus::Delivered
                } else {
                    RouteStatus::Failed
                },
                Some(message.message_id().to_string()),
            );
            result.error = outcome.error;
            result.recipients = vec![to.to_string()];
            result
        };
        result.processing_time_ms = Some(started.elapsed().as_millis() as u64);

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&message, &result).await {
                tracing::error!("Failed to audit {}: {}", message.message_id(), e);
                result.audit_error = Some(e.to_string());
            }
        }

        match result.status {
            RouteStatus::Delivered => {
                self.counters.delivered();
                tracing::debug!(
                    "Delivered {} {} -> {}",
                    message.message_type(),
                    from,
                    to
                );
            }
            _ => {
                self.counters.failed();
                tracing::warn!(
                    "Delivery of {} to {} failed: {}",
                    message.message_id(),
                    to,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        result
    }

    /// Snapshot of the router counters.
    pub fn metrics(&self) -> RouterMetrics {
        self.counters.snapshot()
    }

    async fn deliver_broadcast(&self, message: &A2AMessage) -> RouteResult {
        let id = Some(message.message_id().to_string());

        let targets = match self.broadcast {
            BroadcastMode::Logical => vec![BROADCAST_AGENT_ID.to_string()],
            BroadcastMode::FanOut => {
                let sender = message.from().agent_id.as_str();
                let mut agents = self.deliver.known_agents().await;
                agents.retain(|a| a != sender && a != BROADCAST_AGENT_ID);
                agents.sort();
                agents.dedup();
                agents
            }
        };

        if targets.is_empty() {
            tracing::debug!("Broadcast {} has no recipients", message.message_id());
            return RouteResult::new(RouteStatus::Delivered, id);
        }

        let mut failures = Vec::new();
        for target in &targets {
            let outcome = self.deliver_to(target, message).await;
            if !outcome.delivered {
                let error = outcome.error.unwrap_or_else(|| "not delivered".to_string());
                tracing::warn!("Broadcast {} to {} failed: {}", message.message_id(), target, error);
                failures.push(format!("{}: {}", target, error));
            }
        }

        let status = if failures.len() == targets.len() {
            RouteStatus::Failed
        } else {
            RouteStatus::Delivered
        };
        RouteResult {
            error: (!failures.is_empty()).then(|| failures.join("; ")),
            recipients: targets,
            ..RouteResult::new(status, id)
        }
    }

    /// Run one delivery in its own task so a panicking transport only fails
    /// this message.
    async fn deliver_to(&self, target: &str, message: &A2AMessage) -> DeliveryOutcome {
        let deliver = Arc::clone(&self.deliver);
        let target = target.to_string();
        let message = message.clone();
        let task = tokio::spawn(async move { deliver.deliver(&target, &message).await });

        match task.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => DeliveryOutcome::failed(e.to_string()),
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                DeliveryOutcome::failed(format!("Delivery panicked: {}", detail))
            }
            Err(e) => DeliveryOutcome::failed(format!("Delivery task aborted: {}", e)),
        }
    }
}
