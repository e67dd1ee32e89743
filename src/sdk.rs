//! Agent-facing SDK.
//!
//! An agent holds one [`A2ASdk`] carrying its identity and the sender its
//! messages go through. The builders fill in the envelope (sender, id,
//! timestamp, default priority) so agents only supply recipient and payload.
//!
//! A conversation starts with a root message that has no correlation id.
//! Every reply carries `derive_correlation_id(root)`, which is the root's
//! message id, so the whole exchange shares one chain.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::core::routing::{A2ARouter, RouteResult};
use crate::error::{Result, SdkError};
use crate::protocol::envelope::A2AMessage;
use crate::protocol::payload::{
    BroadcastPayload, KnowledgeSharePayload, ReviewRequestPayload, ReviewResponsePayload,
    StatusUpdatePayload, TaskRequestPayload, TaskResponsePayload,
};
use crate::protocol::types::{AgentRef, MessageType, Priority};

pub use crate::protocol::envelope::derive_correlation_id;

/// Who the SDK sends as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub role: String,
    pub session_key: Option<String>,
}

impl AgentIdentity {
    pub fn new(agent_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            session_key: None,
        }
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    fn agent_ref(&self) -> AgentRef {
        AgentRef {
            agent_id: self.agent_id.clone(),
            role: self.role.clone(),
            session_key: self.session_key.clone(),
        }
    }
}

/// Hands a built message to the routing layer.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &A2AMessage) -> Result<RouteResult>;
}

#[async_trait]
impl MessageSender for A2ARouter {
    async fn send(&self, message: &A2AMessage) -> Result<RouteResult> {
        Ok(self.route_message(message).await)
    }
}

/// Recipient, payload and optional envelope fields for a direct message.
#[derive(Debug, Clone)]
pub struct SendOptions<P> {
    pub to: AgentRef,
    pub priority: Option<Priority>,
    pub correlation_id: Option<String>,
    pub payload: P,
}

impl<P> SendOptions<P> {
    pub fn new(to: AgentRef, payload: P) -> Self {
        Self {
            to,
            priority: None,
            correlation_id: None,
            payload,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Continue an existing conversation.
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Options for a broadcast; the recipient is always `*`.
#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    pub priority: Option<Priority>,
    pub correlation_id: Option<String>,
    pub payload: BroadcastPayload,
}

impl BroadcastOptions {
    pub fn new(payload: BroadcastPayload) -> Self {
        Self {
            priority: None,
            correlation_id: None,
            payload,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A message that was built and handed to the sender.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: A2AMessage,
    pub outcome: RouteResult,
}

impl SentMessage {
    /// Correlation id a reply to this message should carry.
    pub fn reply_correlation_id(&self) -> String {
        derive_correlation_id(&self.message)
    }
}

/// Per-agent SDK context.
#[derive(Default)]
pub struct A2ASdk {
    identity: Option<AgentIdentity>,
    sender: Option<Arc<dyn MessageSender>>,
}

impl A2ASdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialized context that sends through `sender`.
    pub fn for_agent(identity: AgentIdentity, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            identity: Some(identity),
            sender: Some(sender),
        }
    }

    /// Set the identity. Fails if one is already set.
    pub fn init(&mut self, identity: AgentIdentity) -> Result<()> {
        if let Some(current) = &self.identity {
            return Err(SdkError::AlreadyInitialized(current.agent_id.clone()).into());
        }
        tracing::debug!("A2A SDK initialized for {}", identity.agent_id);
        self.identity = Some(identity);
        Ok(())
    }

    /// Clear the identity and sender.
    pub fn reset(&mut self) {
        self.identity = None;
        self.sender = None;
    }

    pub fn set_send_function(&mut self, sender: Arc<dyn MessageSender>) {
        self.sender = Some(sender);
    }

    pub fn identity(&self) -> Option<&AgentIdentity> {
        self.identity.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.is_some()
    }

    pub async fn send_task_request(&self, options: SendOptions<TaskRequestPayload>) -> Result<SentMessage> {
        self.send_direct(MessageType::TaskRequest, options).await
    }

    pub async fn send_task_response(&self, options: SendOptions<TaskResponsePayload>) -> Result<SentMessage> {
        self.send_direct(MessageType::TaskResponse, options).await
    }

    pub async fn send_review_request(&self, options: SendOptions<ReviewRequestPayload>) -> Result<SentMessage> {
        self.send_direct(MessageType::ReviewRequest, options).await
    }

    pub async fn send_review_response(
        &self,
        options: SendOptions<ReviewResponsePayload>,
    ) -> Result<SentMessage> {
        self.send_direct(MessageType::ReviewResponse, options).await
    }

    pub async fn send_status_update(&self, options: SendOptions<StatusUpdatePayload>) -> Result<SentMessage> {
        self.send_direct(MessageType::StatusUpdate, options).await
    }

    pub async fn send_knowledge_share(
        &self,
        options: SendOptions<KnowledgeSharePayload>,
    ) -> Result<SentMessage> {
        self.send_direct(MessageType::KnowledgeShare, options).await
    }

    /// Broadcast to every agent (`to` is `*`).
    pub async fn send_broadcast(&self, options: BroadcastOptions) -> Result<SentMessage> {
        self.dispatch(
            MessageType::Broadcast,
            AgentRef::broadcast(),
            options.priority,
            options.correlation_id,
            &options.payload,
        )
        .await
    }

    async fn send_direct<P: Serialize>(
        &self,
        message_type: MessageType,
        options: SendOptions<P>,
    ) -> Result<SentMessage> {
        self.dispatch(
            message_type,
            options.to,
            options.priority,
            options.correlation_id,
            &options.payload,
        )
        .await
    }

    async fn dispatch<P: Serialize>(
        &self,
        message_type: MessageType,
        to: AgentRef,
        priority: Option<Priority>,
        correlation_id: Option<String>,
        payload: &P,
    ) -> Result<SentMessage> {
        let identity = self.identity.as_ref().ok_or(SdkError::NotInitialized)?;
        let sender = self.sender.as_ref().ok_or(SdkError::NoSendFunction)?;

        let message = A2AMessage::builder(message_type, identity.agent_ref(), to)
            .priority(priority.unwrap_or_default())
            .maybe_correlation_id(correlation_id)
            .payload(serde_json::to_value(payload)?)
            .build();

        let outcome = sender.send(&message).await?;
        tracing::debug!(
            "{} {} from {} -> {}: {}",
            message_type,
            message.message_id(),
            identity.agent_id,
            message.to().agent_id,
            outcome.status
        );
        Ok(SentMessage { message, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{query_log, AuditLog, AuditQuery, DeliveryStatus};
    use crate::core::circuit::CircuitBreakerConfig;
    use crate::core::rate_limit::RateLimitConfig;
    use crate::core::routing::{RouteStatus, RouterOptions};
    use crate::error::Error;
    use crate::protocol::mailbox::MailboxStore;
    use crate::protocol::payload::{
        BroadcastScope, Complexity, NextAction, ReviewConcern, Severity, TaskAction, TaskResult,
        TaskType, Urgency, Verdict, WorkStatus,
    };
    use crate::protocol::validator::StrictValidator;
    use crate::protocol::BROADCAST_AGENT_ID;
    use std::sync::Mutex;

    struct Harness {
        _temp_dir: tempfile::TempDir,
        log_dir: std::path::PathBuf,
        mailboxes: Arc<MailboxStore>,
        router: Arc<A2ARouter>,
    }

    fn harness(rate_limiter: Option<RateLimitConfig>, circuit: Option<CircuitBreakerConfig>) -> Harness {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("audit");
        let mailboxes = Arc::new(MailboxStore::in_memory());
        let audit = Arc::new(AuditLog::new(&log_dir).with_processed_by("test-router"));
        let router = Arc::new(A2ARouter::new(
            RouterOptions::new(mailboxes.clone())
                .with_validator(Arc::new(StrictValidator))
                .with_audit(audit)
                .with_rate_limiter(rate_limiter)
                .with_circuit_breaker(circuit),
        ));
        Harness {
            _temp_dir: temp_dir,
            log_dir,
            mailboxes,
            router,
        }
    }

    fn agent(h: &Harness, id: &str, role: &str) -> A2ASdk {
        A2ASdk::for_agent(AgentIdentity::new(id, role), h.router.clone())
    }

    fn task(id: &str) -> TaskRequestPayload {
        TaskRequestPayload {
            task_id: id.to_string(),
            title: "Add login page".to_string(),
            description: "Build the login form and wire it to the session API".to_string(),
            task_type: TaskType::Implementation,
            complexity: Complexity::Medium,
            deadline: None,
            context: None,
            acceptance_criteria: Some(vec!["form renders".to_string()]),
        }
    }

    fn review(task_id: &str) -> ReviewRequestPayload {
        ReviewRequestPayload {
            task_id: task_id.to_string(),
            title: "Login page".to_string(),
            branch: "feat/login".to_string(),
            worktree: "/work/login".to_string(),
            files_for_review: vec!["src/login.rs".to_string()],
            author_agent: "roman".to_string(),
            author_tier: "senior".to_string(),
            review_level: "standard".to_string(),
            prior_review_notes: None,
        }
    }

    fn verdict(task_id: &str, verdict: Verdict, concerns: Option<Vec<ReviewConcern>>) -> ReviewResponsePayload {
        ReviewResponsePayload {
            task_id: task_id.to_string(),
            verdict,
            branch: "feat/login".to_string(),
            worktree: "/work/login".to_string(),
            next_action: if verdict == Verdict::Approved {
                NextAction::PushAndClose
            } else {
                NextAction::SendBackToWorker
            },
            unresolved_concerns: concerns,
            reviewer_fixes: None,
            next_tasks: None,
        }
    }

    fn status(message: &str) -> StatusUpdatePayload {
        StatusUpdatePayload::new(WorkStatus::InProgress, message)
    }

    #[test]
    fn test_init_and_reset() {
        let mut sdk = A2ASdk::new();
        assert!(!sdk.is_initialized());
        sdk.init(AgentIdentity::new("amadeus", "CEO")).unwrap();
        assert_eq!(sdk.identity().unwrap().agent_id, "amadeus");

        let err = sdk.init(AgentIdentity::new("roman", "Engineer")).unwrap_err();
        assert!(matches!(err, Error::Sdk(SdkError::AlreadyInitialized(ref id)) if id == "amadeus"));

        sdk.reset();
        assert!(sdk.identity().is_none());
        sdk.init(AgentIdentity::new("roman", "Engineer")).unwrap();
        assert_eq!(sdk.identity().unwrap().agent_id, "roman");
    }

    #[tokio::test]
    async fn test_send_requires_identity_and_sender() {
        let h = harness(None, None);
        let options = SendOptions::new(AgentRef::new("roman", "Engineer"), task("task-1"));

        let sdk = A2ASdk::new();
        let err = sdk.send_task_request(options.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Sdk(SdkError::NotInitialized)));

        let mut sdk = A2ASdk::new();
        sdk.init(AgentIdentity::new("amadeus", "CEO")).unwrap();
        let err = sdk.send_task_request(options.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Sdk(SdkError::NoSendFunction)));

        sdk.set_send_function(h.router.clone());
        assert!(sdk.send_task_request(options).await.unwrap().outcome.is_delivered());

        sdk.reset();
        sdk.init(AgentIdentity::new("amadeus", "CEO")).unwrap();
        let err = sdk
            .send_status_update(SendOptions::new(AgentRef::new("roman", "Engineer"), status("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sdk(SdkError::NoSendFunction)));
    }

    #[tokio::test]
    async fn test_builder_fills_envelope() {
        let captured = Arc::new(CapturingSender::default());
        let sdk = A2ASdk::for_agent(
            AgentIdentity::new("amadeus", "CEO").with_session_key("agent:amadeus:main"),
            captured.clone(),
        );

        let sent = sdk
            .send_task_request(SendOptions::new(AgentRef::new("roman", "Engineer"), task("task-1")))
            .await
            .unwrap();
        let message = &sent.message;
        assert_eq!(message.message_type(), MessageType::TaskRequest);
        assert_eq!(message.priority(), Priority::Normal);
        assert_eq!(message.from().agent_id, "amadeus");
        assert_eq!(message.from().session_key.as_deref(), Some("agent:amadeus:main"));
        assert_eq!(message.payload()["taskId"], "task-1");
        assert!(message.correlation_id().is_none());
        assert_eq!(sent.reply_correlation_id(), message.message_id());
        assert_eq!(captured.messages.lock().unwrap().len(), 1);

        let sent = sdk
            .send_broadcast(BroadcastOptions::new(BroadcastPayload {
                scope: BroadcastScope::Org,
                topic: "Freeze".to_string(),
                message: "Code freeze at 5pm".to_string(),
                urgency: Urgency::AttentionNeeded,
            })
            .priority(Priority::High))
            .await
            .unwrap();
        assert!(sent.message.is_broadcast());
        assert_eq!(sent.message.priority(), Priority::High);
    }

    #[derive(Default)]
    struct CapturingSender {
        messages: Mutex<Vec<A2AMessage>>,
    }

    #[async_trait]
    impl MessageSender for CapturingSender {
        async fn send(&self, message: &A2AMessage) -> Result<RouteResult> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(RouteResult {
                status: RouteStatus::Delivered,
                message_id: Some(message.message_id().to_string()),
                errors: Vec::new(),
                error: None,
                recipients: vec![message.to().agent_id.clone()],
                processing_time_ms: None,
                audit_error: None,
            })
        }
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let h = harness(Some(RateLimitConfig::default()), Some(CircuitBreakerConfig::default()));
        let ceo = agent(&h, "amadeus", "CEO");
        let engineer = agent(&h, "roman", "Engineer");
        let ceo_ref = AgentRef::new("amadeus", "CEO");

        let request = ceo
            .send_task_request(
                SendOptions::new(AgentRef::new("roman", "Engineer"), task("task-001"))
                    .priority(Priority::High),
            )
            .await
            .unwrap();
        assert!(request.outcome.is_delivered());
        let inbox = h.mailboxes.inbox("roman").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message_type(), MessageType::TaskRequest);

        let chain = request.reply_correlation_id();
        let accept = engineer
            .send_task_response(
                SendOptions::new(ceo_ref.clone(), TaskResponsePayload::new("task-001", TaskAction::Accepted))
                    .correlation_id(&chain),
            )
            .await
            .unwrap();
        assert!(accept.outcome.is_delivered());

        engineer
            .send_status_update(
                SendOptions::new(ceo_ref.clone(), status("Form scaffolded").for_task("task-001"))
                    .correlation_id(&chain),
            )
            .await
            .unwrap();

        let done = TaskResponsePayload::new("task-001", TaskAction::Completed).with_result(TaskResult {
            branch: Some("feat/login".to_string()),
            summary: Some("Login page done".to_string()),
            ..Default::default()
        });
        engineer
            .send_task_response(SendOptions::new(ceo_ref, done).correlation_id(&chain))
            .await
            .unwrap();

        let ceo_inbox = h.mailboxes.inbox("amadeus").unwrap();
        assert_eq!(ceo_inbox.len(), 3);
        assert!(ceo_inbox.iter().all(|m| m.correlation_id() == Some(chain.as_str())));

        let audit = query_log(&AuditQuery::new().correlation(&chain), &h.log_dir)
            .await
            .unwrap();
        assert_eq!(audit.total_count, 4);
        assert_eq!(audit.entries[0].message.message_type(), MessageType::TaskRequest);
        assert_eq!(audit.entries[0].meta.processed_by.as_deref(), Some("test-router"));
    }

    #[tokio::test]
    async fn test_declined_without_reason_is_rejected() {
        let h = harness(None, None);
        let engineer = agent(&h, "roman", "Engineer");

        let sent = engineer
            .send_task_response(SendOptions::new(
                AgentRef::new("amadeus", "CEO"),
                TaskResponsePayload::new("task-001", TaskAction::Declined),
            ))
            .await
            .unwrap();
        assert_eq!(sent.outcome.status, RouteStatus::ValidationFailed);
        assert!(sent.outcome.errors.iter().any(|e| e.path == "/payload/reason"));
        assert!(h.mailboxes.inbox("amadeus").unwrap().is_empty());

        let sent = engineer
            .send_task_response(SendOptions::new(
                AgentRef::new("amadeus", "CEO"),
                TaskResponsePayload::new("task-001", TaskAction::Declined).with_reason("At capacity"),
            ))
            .await
            .unwrap();
        assert!(sent.outcome.is_delivered());
    }

    #[tokio::test]
    async fn test_review_cycle_with_send_back() {
        let h = harness(None, Some(CircuitBreakerConfig::default()));
        let author = agent(&h, "roman", "Engineer");
        let reviewer = agent(&h, "tim", "Reviewer");
        let roman = AgentRef::new("roman", "Engineer");
        let tim = AgentRef::new("tim", "Reviewer");

        let first = author
            .send_review_request(SendOptions::new(tim.clone(), review("task-002")))
            .await
            .unwrap();
        let chain = first.reply_correlation_id();

        let concerns = vec![ReviewConcern {
            file: "src/login.rs".to_string(),
            line: Some(42),
            severity: Severity::MustFix,
            description: "Password is logged".to_string(),
        }];
        let feedback = reviewer
            .send_review_response(
                SendOptions::new(
                    roman.clone(),
                    verdict("task-002", Verdict::ChangesRequested, Some(concerns)),
                )
                .correlation_id(&chain),
            )
            .await
            .unwrap();
        assert!(feedback.outcome.is_delivered());
        let inbox = h.mailboxes.inbox("roman").unwrap();
        assert_eq!(inbox[0].payload()["verdict"], "changes_requested");

        let mut second_review = review("task-002");
        second_review.prior_review_notes = Some("Removed password logging".to_string());
        author
            .send_review_request(SendOptions::new(tim, second_review).correlation_id(&chain))
            .await
            .unwrap();
        reviewer
            .send_review_response(
                SendOptions::new(roman, verdict("task-002", Verdict::Approved, None)).correlation_id(&chain),
            )
            .await
            .unwrap();

        assert_eq!(h.mailboxes.inbox("tim").unwrap().len(), 2);
        assert_eq!(h.mailboxes.inbox("roman").unwrap().len(), 2);

        let audit = query_log(&AuditQuery::new().correlation(&chain), &h.log_dir)
            .await
            .unwrap();
        assert_eq!(audit.total_count, 4);
    }

    #[tokio::test]
    async fn test_changes_requested_needs_concerns() {
        let h = harness(None, None);
        let reviewer = agent(&h, "tim", "Reviewer");
        let sent = reviewer
            .send_review_response(SendOptions::new(
                AgentRef::new("roman", "Engineer"),
                verdict("task-002", Verdict::ChangesRequested, Some(Vec::new())),
            ))
            .await
            .unwrap();
        assert_eq!(sent.outcome.status, RouteStatus::ValidationFailed);
        assert!(sent
            .outcome
            .errors
            .iter()
            .any(|e| e.path == "/payload/unresolvedConcerns"));
    }

    #[tokio::test]
    async fn test_knowledge_share_and_broadcast() {
        let h = harness(None, None);
        let engineer = agent(&h, "roman", "Engineer");
        let ceo = agent(&h, "amadeus", "CEO");

        let shared = engineer
            .send_knowledge_share(SendOptions::new(
                AgentRef::new("amadeus", "CEO"),
                KnowledgeSharePayload {
                    topic: "Flaky CI".to_string(),
                    discovery: "Integration tests share a port".to_string(),
                    source: "ci logs".to_string(),
                    actionable: true,
                    suggested_action: Some("Use random ports".to_string()),
                    relevant_to: None,
                },
            ))
            .await
            .unwrap();
        assert!(shared.outcome.is_delivered());
        let inbox = h.mailboxes.inbox("amadeus").unwrap();
        assert_eq!(inbox[0].message_type(), MessageType::KnowledgeShare);

        let announcement = ceo
            .send_broadcast(BroadcastOptions::new(BroadcastPayload {
                scope: BroadcastScope::Org,
                topic: "Release".to_string(),
                message: "v2 ships Friday".to_string(),
                urgency: Urgency::Fyi,
            }))
            .await
            .unwrap();
        assert!(announcement.outcome.is_delivered());
        let board = h.mailboxes.inbox(BROADCAST_AGENT_ID).unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].message_type(), MessageType::Broadcast);
    }

    #[tokio::test]
    async fn test_rate_limit_trigger() {
        let h = harness(
            Some(RateLimitConfig {
                max_per_window: 5,
                window_ms: 60_000,
            }),
            None,
        );
        let chatty = agent(&h, "roman", "Engineer");
        let ceo = AgentRef::new("amadeus", "CEO");

        for i in 0..5 {
            let sent = chatty
                .send_status_update(SendOptions::new(ceo.clone(), status(&format!("step {}", i))))
                .await
                .unwrap();
            assert_eq!(sent.outcome.status, RouteStatus::Delivered);
        }
        let sent = chatty
            .send_status_update(SendOptions::new(ceo, status("one more")))
            .await
            .unwrap();
        assert_eq!(sent.outcome.status, RouteStatus::RateLimited);
        assert!(sent.outcome.error.unwrap().contains("rate limit"));
        assert_eq!(h.mailboxes.inbox("amadeus").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_circuit_breaker_on_pair_flood() {
        let h = harness(
            None,
            Some(CircuitBreakerConfig {
                max_correlation_depth: 100,
                max_pair_messages_per_window: 3,
                window_ms: 60_000,
                cooldown_ms: 60_000,
            }),
        );
        let sender = agent(&h, "roman", "Engineer");
        let tim = AgentRef::new("tim", "Reviewer");

        for _ in 0..3 {
            let sent = sender
                .send_status_update(SendOptions::new(tim.clone(), status("ping")))
                .await
                .unwrap();
            assert!(sent.outcome.is_delivered());
        }
        let sent = sender
            .send_status_update(SendOptions::new(tim, status("ping")))
            .await
            .unwrap();
        assert_eq!(sent.outcome.status, RouteStatus::CircuitOpen);
        assert!(sent.outcome.error.unwrap().contains("exceeded"));

        let audit = query_log(&AuditQuery::new(), &h.log_dir).await.unwrap();
        assert_eq!(audit.total_count, 3);
        assert_eq!(h.mailboxes.inbox("tim").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_circuit_breaker_on_correlation_depth() {
        let h = harness(
            None,
            Some(CircuitBreakerConfig {
                max_correlation_depth: 3,
                max_pair_messages_per_window: 100,
                window_ms: 60_000,
                cooldown_ms: 60_000,
            }),
        );
        let roman = agent(&h, "roman", "Engineer");
        let tim = agent(&h, "tim", "Reviewer");
        let to_tim = AgentRef::new("tim", "Reviewer");
        let to_roman = AgentRef::new("roman", "Engineer");

        let root = roman
            .send_status_update(SendOptions::new(to_tim.clone(), status("start")))
            .await
            .unwrap();
        let chain = root.reply_correlation_id();

        let reply = tim
            .send_status_update(SendOptions::new(to_roman.clone(), status("ack")).correlation_id(&chain))
            .await
            .unwrap();
        assert!(reply.outcome.is_delivered());
        let again = roman
            .send_status_update(SendOptions::new(to_tim, status("again")).correlation_id(&chain))
            .await
            .unwrap();
        assert!(again.outcome.is_delivered());

        let overflow = tim
            .send_status_update(SendOptions::new(to_roman, status("loop")).correlation_id(&chain))
            .await
            .unwrap();
        assert_eq!(overflow.outcome.status, RouteStatus::CircuitOpen);
        assert!(overflow.outcome.error.unwrap().contains("exceeded"));

        let audit = query_log(&AuditQuery::new().correlation(&chain), &h.log_dir)
            .await
            .unwrap();
        assert_eq!(audit.total_count, 3);
        assert!(audit
            .entries
            .iter()
            .all(|e| e.meta.delivery_status == DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn test_audit_trail_integrity() {
        let h = harness(None, None);
        let ceo = agent(&h, "amadeus", "CEO");
        let engineer = agent(&h, "roman", "Engineer");

        let request = ceo
            .send_task_request(SendOptions::new(AgentRef::new("roman", "Engineer"), task("task-003")))
            .await
            .unwrap();
        engineer
            .send_task_response(
                SendOptions::new(
                    AgentRef::new("amadeus", "CEO"),
                    TaskResponsePayload::new("task-003", TaskAction::Accepted),
                )
                .correlation_id(request.reply_correlation_id()),
            )
            .await
            .unwrap();

        let audit = query_log(&AuditQuery::new(), &h.log_dir).await.unwrap();
        assert_eq!(audit.total_count, 2);
        assert_eq!(audit.entries[0].message.message_type(), MessageType::TaskRequest);
        assert_eq!(audit.entries[1].message.message_type(), MessageType::TaskResponse);
        assert_eq!(audit.entries[0].message, request.message);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_audited() {
        let h = harness(None, None);
        h.mailboxes.set_offline("roman", true);
        let ceo = agent(&h, "amadeus", "CEO");

        let sent = ceo
            .send_task_request(SendOptions::new(AgentRef::new("roman", "Engineer"), task("task-004")))
            .await
            .unwrap();
        assert_eq!(sent.outcome.status, RouteStatus::Failed);

        let audit = query_log(&AuditQuery::new(), &h.log_dir).await.unwrap();
        assert_eq!(audit.total_count, 1);
        assert_eq!(audit.entries[0].meta.delivery_status, DeliveryStatus::Failed);
        assert!(audit.entries[0].meta.error.as_deref().unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_full_system_metrics() {
        let h = harness(
            Some(RateLimitConfig {
                max_per_window: 2,
                window_ms: 60_000,
            }),
            None,
        );
        let ceo = agent(&h, "amadeus", "CEO");
        let roman = AgentRef::new("roman", "Engineer");

        ceo.send_status_update(SendOptions::new(roman.clone(), status("one")))
            .await
            .unwrap();
        ceo.send_status_update(SendOptions::new(roman.clone(), status("two")))
            .await
            .unwrap();
        let limited = ceo
            .send_status_update(SendOptions::new(roman, status("three")))
            .await
            .unwrap();
        assert_eq!(limited.outcome.status, RouteStatus::RateLimited);
        let invalid = h.router.route(&serde_json::json!({"type": "nonsense"})).await;
        assert_eq!(invalid.status, RouteStatus::ValidationFailed);

        let metrics = h.router.metrics();
        assert_eq!(metrics.total_routed, 4);
        assert_eq!(metrics.total_delivered, 2);
        assert_eq!(metrics.total_rate_limited, 1);
        assert_eq!(metrics.total_validation_failed, 1);
    }
}
