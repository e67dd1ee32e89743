//! Structural and semantic validation of inbound messages.
//!
//! Two validators are provided:
//! - [`EnvelopeValidator`] checks the envelope only; the payload just has to
//!   be an object. This is what the router uses by default.
//! - [`StrictValidator`] additionally checks each payload against its typed
//!   shape and the semantic rules (reasons for declines, concerns for
//!   requested changes).
//!
//! Both are pure: same input, same answer, no side effects.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::envelope::A2AMessage;
use super::payload::{
    BroadcastPayload, KnowledgeSharePayload, PayloadRules, ReviewRequestPayload,
    ReviewResponsePayload, StatusUpdatePayload, TaskRequestPayload, TaskResponsePayload,
};
use super::types::{MessageType, Priority, A2A_PROTOCOL_VERSION};

/// One reason a message was rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the problem, e.g. `/from/agentId` or `/payload/reason`
    pub path: String,
    /// Human readable description
    pub message: String,
    /// Rule identifier (`required`, `enum`, `protocol_version`, ...)
    pub rule: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            rule: rule.into(),
        }
    }

    fn required(path: &str) -> Self {
        Self::new(path, format!("{} is required", path.trim_start_matches('/')), "required")
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The parsed message, or every issue found.
pub type ValidationResult = std::result::Result<A2AMessage, Vec<ValidationIssue>>;

/// Message validator, injected into the router.
pub trait Validate: Send + Sync {
    fn validate(&self, raw: &Value) -> ValidationResult;
}

/// Validate with the default envelope rules.
pub fn validate(raw: &Value) -> ValidationResult {
    EnvelopeValidator.validate(raw)
}

/// Envelope-only validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeValidator;

impl Validate for EnvelopeValidator {
    fn validate(&self, raw: &Value) -> ValidationResult {
        let issues = envelope_issues(raw);
        if !issues.is_empty() {
            return Err(issues);
        }
        parse(raw)
    }
}

/// Envelope plus per-type payload validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictValidator;

impl Validate for StrictValidator {
    fn validate(&self, raw: &Value) -> ValidationResult {
        let mut issues = envelope_issues(raw);
        if !issues.is_empty() {
            return Err(issues);
        }
        let message = parse(raw)?;

        issues.extend(payload_issues(message.message_type(), message.payload()));
        if issues.is_empty() {
            Ok(message)
        } else {
            Err(issues)
        }
    }
}

fn parse(raw: &Value) -> ValidationResult {
    serde_json::from_value::<A2AMessage>(raw.clone())
        .map_err(|e| vec![ValidationIssue::new("/", format!("Malformed message: {}", e), "schema")])
}

fn envelope_issues(raw: &Value) -> Vec<ValidationIssue> {
    let Some(obj) = raw.as_object() else {
        return vec![ValidationIssue::new(
            "/",
            format!("Message must be a JSON object, got {}", json_kind(raw)),
            "type",
        )];
    };

    let mut issues = Vec::new();

    match obj.get("protocol") {
        None | Some(Value::Null) => issues.push(ValidationIssue::required("/protocol")),
        Some(Value::String(p)) if p == A2A_PROTOCOL_VERSION => {}
        Some(other) => issues.push(ValidationIssue::new(
            "/protocol",
            format!(
                "Unsupported protocol {}; expected '{}'",
                other, A2A_PROTOCOL_VERSION
            ),
            "protocol_version",
        )),
    }

    check_text(obj, "messageId", &mut issues);

    match obj.get("timestamp") {
        None | Some(Value::Null) => issues.push(ValidationIssue::required("/timestamp")),
        Some(Value::String(ts)) if ts.parse::<DateTime<Utc>>().is_ok() => {}
        Some(other) => issues.push(ValidationIssue::new(
            "/timestamp",
            format!("Invalid timestamp {}; expected an ISO-8601 date-time", other),
            "format",
        )),
    }

    check_agent_ref(obj, "from", &mut issues);
    check_agent_ref(obj, "to", &mut issues);

    match obj.get("type") {
        None | Some(Value::Null) => issues.push(ValidationIssue::required("/type")),
        Some(Value::String(t)) if MessageType::parse(t).is_some() => {}
        Some(other) => issues.push(ValidationIssue::new(
            "/type",
            format!(
                "Invalid message type {}; expected one of {}",
                other,
                MessageType::ALL.map(|t| t.as_str()).join(", ")
            ),
            "enum",
        )),
    }

    match obj.get("priority") {
        None | Some(Value::Null) => issues.push(ValidationIssue::required("/priority")),
        Some(Value::String(p)) if Priority::parse(p).is_some() => {}
        Some(other) => issues.push(ValidationIssue::new(
            "/priority",
            format!(
                "Invalid priority {}; expected one of {}",
                other,
                Priority::ALL.map(|p| p.as_str()).join(", ")
            ),
            "enum",
        )),
    }

    match obj.get("correlationId") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(other) => issues.push(ValidationIssue::new(
            "/correlationId",
            format!("correlationId must be a string, got {}", json_kind(other)),
            "type",
        )),
    }

    match obj.get("payload") {
        None | Some(Value::Null) => issues.push(ValidationIssue::required("/payload")),
        Some(Value::Object(_)) => {}
        Some(other) => issues.push(ValidationIssue::new(
            "/payload",
            format!("payload must be an object, got {}", json_kind(other)),
            "type",
        )),
    }

    issues
}

fn check_text(obj: &Map<String, Value>, field: &str, issues: &mut Vec<ValidationIssue>) {
    let path = format!("/{}", field);
    match obj.get(field) {
        None | Some(Value::Null) => issues.push(ValidationIssue::required(&path)),
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::String(_)) => {
            issues.push(ValidationIssue::new(&path, format!("{} must not be empty", field), "non_empty"))
        }
        Some(other) => issues.push(ValidationIssue::new(
            &path,
            format!("{} must be a string, got {}", field, json_kind(other)),
            "type",
        )),
    }
}

fn check_agent_ref(obj: &Map<String, Value>, field: &str, issues: &mut Vec<ValidationIssue>) {
    let path = format!("/{}", field);
    let agent = match obj.get(field) {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::required(&path));
            return;
        }
        Some(Value::Object(agent)) => agent,
        Some(other) => {
            issues.push(ValidationIssue::new(
                &path,
                format!("{} must be an agent reference object, got {}", field, json_kind(other)),
                "type",
            ));
            return;
        }
    };

    for key in ["agentId", "role"] {
        match agent.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            _ => issues.push(ValidationIssue::new(
                format!("{}/{}", path, key),
                format!("{}.{} must be a non-empty string", field, key),
                "required",
            )),
        }
    }

    match agent.get("sessionKey") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(other) => issues.push(ValidationIssue::new(
            format!("{}/sessionKey", path),
            format!("{}.sessionKey must be a string, got {}", field, json_kind(other)),
            "type",
        )),
    }
}

fn payload_issues(message_type: MessageType, payload: &Value) -> Vec<ValidationIssue> {
    match message_type {
        MessageType::TaskRequest => check_payload::<TaskRequestPayload>(message_type, payload),
        MessageType::TaskResponse => check_payload::<TaskResponsePayload>(message_type, payload),
        MessageType::ReviewRequest => check_payload::<ReviewRequestPayload>(message_type, payload),
        MessageType::ReviewResponse => check_payload::<ReviewResponsePayload>(message_type, payload),
        MessageType::StatusUpdate => check_payload::<StatusUpdatePayload>(message_type, payload),
        MessageType::KnowledgeShare => check_payload::<KnowledgeSharePayload>(message_type, payload),
        MessageType::Broadcast => check_payload::<BroadcastPayload>(message_type, payload),
    }
}

fn check_payload<P>(message_type: MessageType, payload: &Value) -> Vec<ValidationIssue>
where
    P: DeserializeOwned + PayloadRules,
{
    match serde_json::from_value::<P>(payload.clone()) {
        Ok(typed) => typed
            .check()
            .into_iter()
            .map(|(field, message, rule)| {
                ValidationIssue::new(format!("/payload/{}", field), message, rule)
            })
            .collect(),
        Err(e) => vec![ValidationIssue::new(
            "/payload",
            format!("Invalid {} payload: {}", message_type, e),
            "payload_schema",
        )],
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
