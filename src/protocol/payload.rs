//! Typed payloads, one per message type.
//!
//! The envelope carries the payload as plain JSON; these structs give the SDK
//! a strongly typed way to build it and let the strict validator check shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Implementation,
    Bugfix,
    Refactor,
    Research,
    Documentation,
    Testing,
    Review,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_files: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequestPayload {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub complexity: Complexity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TaskContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Accepted,
    Declined,
    Completed,
    Failed,
    Blocked,
}

impl TaskAction {
    /// Actions that must explain themselves with a reason.
    pub fn requires_reason(&self) -> bool {
        matches!(self, TaskAction::Declined | TaskAction::Failed | TaskAction::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Accepted => "accepted",
            TaskAction::Declined => "declined",
            TaskAction::Completed => "completed",
            TaskAction::Failed => "failed",
            TaskAction::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponsePayload {
    pub task_id: String,
    pub action: TaskAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl TaskResponsePayload {
    pub fn new(task_id: impl Into<String>, action: TaskAction) -> Self {
        Self {
            task_id: task_id.into(),
            action,
            reason: None,
            result: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_result(mut self, result: TaskResult) -> Self {
        self.result = Some(result);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequestPayload {
    pub task_id: String,
    pub title: String,
    pub branch: String,
    pub worktree: String,
    pub files_for_review: Vec<String>,
    pub author_agent: String,
    pub author_tier: String,
    pub review_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_review_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    ChangesRequested,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    PushAndClose,
    SendBackToWorker,
    Escalate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    MustFix,
    ShouldFix,
    Nit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewConcern {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerFix {
    pub file: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponsePayload {
    pub task_id: String,
    pub verdict: Verdict,
    pub branch: String,
    pub worktree: String,
    pub next_action: NextAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unresolved_concerns: Option<Vec<ReviewConcern>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_fixes: Option<Vec<ReviewerFix>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_tasks: Option<Vec<NextTask>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    InProgress,
    Blocked,
    Waiting,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: WorkStatus,
    pub progress: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<String>,
}

impl StatusUpdatePayload {
    pub fn new(status: WorkStatus, progress: impl Into<String>) -> Self {
        Self {
            task_id: None,
            status,
            progress: progress.into(),
            blocked_by: None,
            estimated_completion: None,
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSharePayload {
    pub topic: String,
    pub discovery: String,
    pub source: String,
    pub actionable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_to: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastScope {
    Org,
    Team,
    Division,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Fyi,
    AttentionNeeded,
    ActionRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastPayload {
    pub scope: BroadcastScope,
    pub topic: String,
    pub message: String,
    pub urgency: Urgency,
}

/// Shape rules beyond what deserialization enforces.
///
/// `check` returns `(field, message, rule)` for each violation; the field is
/// relative to the payload root.
pub trait PayloadRules {
    fn check(&self) -> Vec<(&'static str, String, &'static str)>;
}

fn require_text(
    out: &mut Vec<(&'static str, String, &'static str)>,
    field: &'static str,
    value: &str,
) {
    if value.trim().is_empty() {
        out.push((field, format!("{} must not be empty", field), "non_empty"));
    }
}

impl PayloadRules for TaskRequestPayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "taskId", &self.task_id);
        require_text(&mut out, "title", &self.title);
        require_text(&mut out, "description", &self.description);
        out
    }
}

impl PayloadRules for TaskResponsePayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "taskId", &self.task_id);
        if self.action.requires_reason()
            && self.reason.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            out.push((
                "reason",
                format!("A reason is required when action is '{}'", self.action.as_str()),
                "reason_required",
            ));
        }
        out
    }
}

impl PayloadRules for ReviewRequestPayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "taskId", &self.task_id);
        require_text(&mut out, "title", &self.title);
        require_text(&mut out, "branch", &self.branch);
        require_text(&mut out, "worktree", &self.worktree);
        require_text(&mut out, "authorAgent", &self.author_agent);
        if self.files_for_review.is_empty() {
            out.push((
                "filesForReview",
                "filesForReview must list at least one file".to_string(),
                "non_empty",
            ));
        }
        out
    }
}

impl PayloadRules for ReviewResponsePayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "taskId", &self.task_id);
        require_text(&mut out, "branch", &self.branch);
        if self.verdict == Verdict::ChangesRequested
            && self.unresolved_concerns.as_ref().map_or(true, Vec::is_empty)
        {
            out.push((
                "unresolvedConcerns",
                "changes_requested must list at least one unresolved concern".to_string(),
                "concerns_required",
            ));
        }
        out
    }
}

impl PayloadRules for StatusUpdatePayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "progress", &self.progress);
        out
    }
}

impl PayloadRules for KnowledgeSharePayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "topic", &self.topic);
        require_text(&mut out, "discovery", &self.discovery);
        require_text(&mut out, "source", &self.source);
        out
    }
}

impl PayloadRules for BroadcastPayload {
    fn check(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        require_text(&mut out, "topic", &self.topic);
        require_text(&mut out, "message", &self.message);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_request_camel_case() {
        let payload = TaskRequestPayload {
            task_id: "task-001".to_string(),
            title: "Implement feature X".to_string(),
            description: "Build the thing".to_string(),
            task_type: TaskType::Implementation,
            complexity: Complexity::Medium,
            deadline: None,
            context: None,
            acceptance_criteria: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["taskId"], "task-001");
        assert_eq!(json["taskType"], "implementation");
        assert!(json.get("deadline").is_none());
    }

    #[test]
    fn test_declined_requires_reason() {
        let declined = TaskResponsePayload::new("t1", TaskAction::Declined);
        let issues = declined.check();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].0, "reason");
        assert!(issues[0].1.contains("declined"));

        let blank = TaskResponsePayload::new("t1", TaskAction::Blocked).with_reason("   ");
        assert_eq!(blank.check().len(), 1);

        let accepted = TaskResponsePayload::new("t1", TaskAction::Accepted);
        assert!(accepted.check().is_empty());
    }

    #[test]
    fn test_changes_requested_requires_concerns() {
        let payload: ReviewResponsePayload = serde_json::from_value(json!({
            "taskId": "t1",
            "verdict": "changes_requested",
            "branch": "b",
            "worktree": "/w",
            "nextAction": "send_back_to_worker",
            "unresolvedConcerns": []
        }))
        .unwrap();
        let issues = payload.check();
        assert_eq!(issues[0].0, "unresolvedConcerns");
    }

    #[test]
    fn test_null_optionals_deserialize() {
        let payload: TaskRequestPayload = serde_json::from_value(json!({
            "taskId": "t1",
            "title": "T",
            "description": "D",
            "taskType": "implementation",
            "complexity": "low",
            "deadline": null,
            "context": null,
            "acceptanceCriteria": null
        }))
        .unwrap();
        assert!(payload.context.is_none());
    }

    #[test]
    fn test_actionable_must_be_bool() {
        let result = serde_json::from_value::<KnowledgeSharePayload>(json!({
            "topic": "T",
            "discovery": "D",
            "source": "S",
            "actionable": "yes"
        }));
        assert!(result.is_err());
    }
}
