//! The Agent Communication Protocol (ACP)
//!
//! A fixed set of message types agents use to delegate, acknowledge,
//! escalate and report completion. Messages are immutable once built.
//! Delivery fans a message out to both parties' recent histories, the
//! touched task's activity log, and (for subscribed event-driven agents)
//! the recipient's inbox.

use crate::ids::{AgentId, TaskId};
use crate::org::{Organization, Trigger};
use orgsim_env::OrgContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sender id used for orders submitted by the host.
pub const PRINCIPAL: &str = "principal";

/// ACP message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Ack,
    Progress,
    Escalation,
    Completion,
    Delegation,
    StatusRequest,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ack => "ack",
            MessageType::Progress => "progress",
            MessageType::Escalation => "escalation",
            MessageType::Completion => "completion",
            MessageType::Delegation => "delegation",
            MessageType::StatusRequest => "status_request",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed escalation causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    Blocked,
    OutOfDomain,
    OverBudget,
    LowConfidence,
    Timeout,
    Dependency,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::Blocked => "BLOCKED",
            EscalationReason::OutOfDomain => "OUT_OF_DOMAIN",
            EscalationReason::OverBudget => "OVER_BUDGET",
            EscalationReason::LowConfidence => "LOW_CONFIDENCE",
            EscalationReason::Timeout => "TIMEOUT",
            EscalationReason::Dependency => "DEPENDENCY",
        }
    }
    
    /// Picks a reason mentioned in free text, defaulting to `Blocked`.
    pub fn detect(text: &str) -> Self {
        let upper = text.to_uppercase().replace([' ', '-'], "_");
        [
            EscalationReason::OutOfDomain,
            EscalationReason::OverBudget,
            EscalationReason::LowConfidence,
            EscalationReason::Timeout,
            EscalationReason::Dependency,
        ]
        .into_iter()
        .find(|r| upper.contains(r.as_str()))
        .unwrap_or(EscalationReason::Blocked)
    }
}

impl FromStr for EscalationReason {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BLOCKED" => Ok(EscalationReason::Blocked),
            "OUT_OF_DOMAIN" => Ok(EscalationReason::OutOfDomain),
            "OVER_BUDGET" => Ok(EscalationReason::OverBudget),
            "LOW_CONFIDENCE" => Ok(EscalationReason::LowConfidence),
            "TIMEOUT" => Ok(EscalationReason::Timeout),
            "DEPENDENCY" => Ok(EscalationReason::Dependency),
            other => Err(format!("Unknown escalation reason: {}", other)),
        }
    }
}

/// An immutable ACP envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcpMessage {
    pub id: String,
    
    #[serde(rename = "type")]
    pub kind: MessageType,
    
    pub from: AgentId,
    pub to: AgentId,
    
    /// Empty for task-less messages
    pub task_id: Option<TaskId>,
    
    pub body: String,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EscalationReason>,
    
    /// Progress percentage for `progress` messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct: Option<u8>,
    
    /// Context clock at creation (ms)
    pub timestamp_ms: u64,
}

impl AcpMessage {
    /// Builds a message stamped with the context's clock and a minted id.
    pub fn new<Ctx: OrgContext>(
        ctx: &Ctx,
        kind: MessageType,
        from: &AgentId,
        to: &AgentId,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: ctx.mint_id("msg"),
            kind,
            from: from.clone(),
            to: to.clone(),
            task_id: None,
            body: body.into(),
            reason: None,
            pct: None,
            timestamp_ms: ctx.now().as_millis() as u64,
        }
    }
    
    pub fn with_task(mut self, task_id: &TaskId) -> Self {
        self.task_id = Some(task_id.clone());
        self
    }
    
    pub fn with_reason(mut self, reason: EscalationReason) -> Self {
        self.reason = Some(reason);
        self
    }
    
    pub fn with_pct(mut self, pct: u8) -> Self {
        self.pct = Some(pct.min(100));
        self
    }
    
    /// Short one-line rendering used in prompts and logs.
    pub fn summary(&self) -> String {
        if self.body.is_empty() {
            self.kind.to_string()
        } else {
            self.body.clone()
        }
    }
}

/// Delivers a message.
///
/// - sender's `messages_sent` is incremented (if the sender is an agent)
/// - the message is pushed to both parties' recent ring buffers
/// - it is appended to the referenced task's activity log
/// - it is enqueued to the recipient's inbox only when the recipient is
///   event-driven and subscribed to this message type
///
/// Unknown recipients are tolerated: the message is still logged on the
/// sender side and in the organization message log.
pub fn deliver(org: &mut Organization, msg: AcpMessage) {
    let cap = org.recent_cap();
    
    if let Some(sender) = org.agent_mut(&msg.from) {
        sender.stats.messages_sent += 1;
        sender.push_recent(msg.clone(), cap);
    }
    
    if msg.to != msg.from {
        if let Some(recipient) = org.agent_mut(&msg.to) {
            recipient.push_recent(msg.clone(), cap);
            if let Trigger::EventDriven { on } = &recipient.trigger {
                if on.contains(&msg.kind) {
                    recipient.inbox.push_back(msg.clone());
                }
            }
        }
    }
    
    if let Some(task_id) = &msg.task_id {
        if let Some(task) = org.task_mut(task_id) {
            task.activity_log.push(msg.clone());
        }
    }
    
    org.log_message(msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::org::{Agent, Role, Task};
    use crate::testing::TestContext;
    
    fn org_with_pair() -> Organization {
        let mut org = Organization::new();
        org.add_agent(Agent::new("mgr", "Maya", Role::Lead, 9, "engineering")).unwrap();
        org.add_agent(
            Agent::new("wrk", "Will", Role::Worker, 3, "engineering")
                .with_parent(&AgentId::new("mgr")),
        )
        .unwrap();
        org
    }
    
    #[test]
    fn test_deliver_to_polling_agent_skips_inbox() {
        let ctx = TestContext::new(1);
        let mut org = org_with_pair();
        let msg = AcpMessage::new(&ctx, MessageType::Delegation, &"mgr".into(), &"wrk".into(), "do it");
        
        deliver(&mut org, msg);
        
        let wrk = org.agent(&"wrk".into()).unwrap();
        assert!(wrk.inbox.is_empty());
        assert_eq!(wrk.recent_messages.len(), 1);
        assert_eq!(org.agent(&"mgr".into()).unwrap().stats.messages_sent, 1);
    }
    
    #[test]
    fn test_deliver_to_subscribed_event_driven_agent() {
        let ctx = TestContext::new(1);
        let mut org = org_with_pair();
        let mgr = AgentId::new("mgr");
        org.agent_mut(&mgr).unwrap().trigger = Trigger::EventDriven {
            on: vec![MessageType::Completion],
        };
        
        let done = AcpMessage::new(&ctx, MessageType::Completion, &"wrk".into(), &mgr, "done");
        let ack = AcpMessage::new(&ctx, MessageType::Ack, &"wrk".into(), &mgr, "ok");
        deliver(&mut org, done);
        deliver(&mut org, ack);
        
        let agent = org.agent(&mgr).unwrap();
        assert_eq!(agent.inbox.len(), 1);
        assert_eq!(agent.inbox[0].kind, MessageType::Completion);
        assert_eq!(agent.recent_messages.len(), 2);
    }
    
    #[test]
    fn test_recent_ring_buffer_is_bounded() {
        let ctx = TestContext::new(1);
        let mut org = org_with_pair();
        for i in 0..25 {
            let msg = AcpMessage::new(
                &ctx,
                MessageType::StatusRequest,
                &"mgr".into(),
                &"wrk".into(),
                format!("ping {}", i),
            );
            deliver(&mut org, msg);
        }
        
        let wrk = org.agent(&"wrk".into()).unwrap();
        assert_eq!(wrk.recent_messages.len(), 10);
        assert_eq!(wrk.recent_messages.back().unwrap().body, "ping 24");
        assert_eq!(org.messages().len(), 25);
    }
    
    #[test]
    fn test_deliver_appends_to_activity_log() {
        let ctx = TestContext::new(1);
        let mut org = org_with_pair();
        let task_id = TaskId::new("TASK-0001");
        org.add_task(Task::new(task_id.clone(), "Build API", &"mgr".into(), 0));
        
        let msg = AcpMessage::new(&ctx, MessageType::Progress, &"wrk".into(), &"mgr".into(), "half way")
            .with_task(&task_id)
            .with_pct(50);
        deliver(&mut org, msg);
        
        assert_eq!(org.task(&task_id).unwrap().activity_log.len(), 1);
    }
    
    #[test]
    fn test_escalation_reason_detect() {
        assert_eq!(EscalationReason::detect("this is out of domain"), EscalationReason::OutOfDomain);
        assert_eq!(EscalationReason::detect("waiting on a dependency"), EscalationReason::Dependency);
        assert_eq!(EscalationReason::detect("stuck"), EscalationReason::Blocked);
        assert_eq!("over_budget".parse::<EscalationReason>(), Ok(EscalationReason::OverBudget));
    }
}
