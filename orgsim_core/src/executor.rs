//! Decision Executor
//!
//! The single state-transition function shared by every decision source.
//! Unresolvable references are logged and dropped; nothing is mutated
//! in that case.

use crate::acp::{deliver, AcpMessage, EscalationReason, MessageType};
use crate::decision::{Action, AgentDecision};
use crate::ids::{AgentId, DecisionSource, TaskId, TaskIdAllocator};
use crate::org::{
    detect_domain, new_task_title, slugify, Agent, AgentStatus, Organization,
    Priority, Role, Task, TaskStatus,
};
use orgsim_env::OrgContext;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Progress reported when work starts.
const WORK_STARTED_PCT: u8 = 30;

/// Everything a decision may touch.
pub struct ExecutionContext<'a, Ctx: OrgContext> {
    pub org: &'a mut Organization,
    pub ids: &'a mut TaskIdAllocator,
    /// Selects the id range for tasks created by this decision
    pub source: DecisionSource,
    pub ctx: &'a Ctx,
}

/// Why a decision was dropped without effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("acting agent {0} does not exist")]
    UnknownAgent(AgentId),
    
    #[error("target {0:?} not found")]
    UnknownTarget(String),
    
    #[error("task {0:?} not found")]
    UnknownTask(String),
    
    #[error("task {0} is already closed")]
    TaskClosed(TaskId),
    
    #[error("agent has no parent to escalate to")]
    NoParent,
    
    #[error("task {0} is not being worked by the acting agent")]
    NotStarted(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// State changed
    Applied {
        action: Action,
        task_id: Option<TaskId>,
        target: Option<AgentId>,
    },
    /// Nothing to change (idle, or narrative work)
    Noop,
    /// Logged and dropped
    Dropped { action: Action, reason: DropReason },
}

impl ExecutionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ExecutionOutcome::Applied { .. })
    }
}

/// Applies `decision` on behalf of `agent_id`.
pub fn execute_decision<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> ExecutionOutcome {
    let Some(agent) = cx.org.agent(agent_id) else {
        return dropped(decision.action, DropReason::UnknownAgent(agent_id.clone()));
    };
    let actor = agent.name.clone();
    
    let outcome = match decision.action {
        Action::Delegate => delegate(agent_id, decision, cx),
        Action::Escalate => escalate(agent_id, decision, cx),
        Action::Complete => complete(agent_id, decision, cx),
        Action::Work => work(agent_id, decision, cx),
        Action::Message => message(agent_id, decision, cx),
        Action::Hire => hire(agent_id, decision, cx),
        Action::Idle => Ok(ExecutionOutcome::Noop),
    };
    
    match outcome {
        Ok(outcome) => {
            if let ExecutionOutcome::Applied { task_id, target, .. } = &outcome {
                info!(
                    "{} -> {} (task={}, target={})",
                    actor,
                    decision.action,
                    task_id.as_ref().map(|t| t.as_str()).unwrap_or("-"),
                    target.as_ref().map(|t| t.as_str()).unwrap_or("-"),
                );
            }
            outcome
        }
        Err(reason) => {
            warn!("{}: {} dropped: {}", actor, decision.action, reason);
            dropped(decision.action, reason)
        }
    }
}

fn dropped(action: Action, reason: DropReason) -> ExecutionOutcome {
    ExecutionOutcome::Dropped { action, reason }
}

fn now_ms<Ctx: OrgContext>(ctx: &Ctx) -> u64 {
    ctx.now().as_millis() as u64
}

fn delegate<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> Result<ExecutionOutcome, DropReason> {
    let target_id = cx
        .org
        .resolve_agent(&decision.target)
        .ok_or_else(|| DropReason::UnknownTarget(decision.target.clone()))?;
    
    let task_id = match cx.org.resolve_task(agent_id, &decision.task) {
        Some(id) => id,
        None => create_task(agent_id, decision, cx),
    };
    let now = now_ms(cx.ctx);
    
    let (title, previous) = {
        let task = cx
            .org
            .task_mut(&task_id)
            .ok_or_else(|| DropReason::UnknownTask(decision.task.clone()))?;
        if !task.status.is_open() {
            return Err(DropReason::TaskClosed(task_id));
        }
        let previous = task.assignee_id.replace(target_id.clone());
        task.status = TaskStatus::Assigned;
        task.updated_at_ms = now;
        (task.title.clone(), previous)
    };
    
    if let Some(prev) = previous.filter(|p| p != &target_id) {
        if let Some(prev_agent) = cx.org.agent_mut(&prev) {
            prev_agent.task_ids.retain(|t| t != &task_id);
        }
    }
    let target_name = match cx.org.agent_mut(&target_id) {
        Some(target) => {
            if !target.task_ids.contains(&task_id) {
                target.task_ids.push(task_id.clone());
            }
            target.name.clone()
        }
        None => return Err(DropReason::UnknownTarget(decision.target.clone())),
    };
    
    let body = if decision.message.is_empty() {
        format!("Delegating \"{}\" to {}", title, target_name)
    } else {
        decision.message.clone()
    };
    let delegation = AcpMessage::new(cx.ctx, MessageType::Delegation, agent_id, &target_id, body)
        .with_task(&task_id);
    deliver(cx.org, delegation);
    
    let ack = AcpMessage::new(
        cx.ctx,
        MessageType::Ack,
        &target_id,
        agent_id,
        format!("Acknowledged: \"{}\"", title),
    )
    .with_task(&task_id);
    deliver(cx.org, ack);
    
    if let Some(task) = cx.org.task_mut(&task_id) {
        task.acked = true;
    }
    
    Ok(ExecutionOutcome::Applied {
        action: Action::Delegate,
        task_id: Some(task_id),
        target: Some(target_id),
    })
}

/// Creates a task owned by `creator` from a `new: <title>` (or any
/// unresolvable) reference.
fn create_task<Ctx: OrgContext>(
    creator: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> TaskId {
    let from_ref = new_task_title(&decision.task);
    let title = if !from_ref.is_empty() {
        from_ref.to_string()
    } else if !decision.message.is_empty() {
        decision.message.chars().take(80).collect()
    } else {
        "Untitled task".to_string()
    };
    
    let id = cx.ids.next(cx.source);
    let task = Task::new(id.clone(), title, creator, now_ms(cx.ctx)).with_priority(Priority::High);
    debug!("created {} ({}) for {}", id, task.title, creator);
    cx.org.add_task(task);
    id
}

fn escalate<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> Result<ExecutionOutcome, DropReason> {
    let parent = cx
        .org
        .agent(agent_id)
        .and_then(|a| a.parent_id.clone())
        .filter(|p| cx.org.agent(p).is_some())
        .ok_or(DropReason::NoParent)?;
    
    let task_id = cx.org.resolve_task(agent_id, &decision.task);
    let body = if decision.message.is_empty() {
        format!("Escalating: {}", decision.task)
    } else {
        decision.message.clone()
    };
    
    let mut msg = AcpMessage::new(cx.ctx, MessageType::Escalation, agent_id, &parent, body)
        .with_reason(EscalationReason::detect(&decision.message));
    if let Some(id) = &task_id {
        msg = msg.with_task(id);
    }
    deliver(cx.org, msg);
    
    Ok(ExecutionOutcome::Applied {
        action: Action::Escalate,
        task_id,
        target: Some(parent),
    })
}

/// Closes a task the agent is working on.
///
/// A task the agent holds but has not started is moved through
/// `in_progress` first, so its log shows a progress report before the
/// completion. Backlog, blocked or foreign tasks are dropped.
fn complete<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> Result<ExecutionOutcome, DropReason> {
    let task_id = cx
        .org
        .resolve_task(agent_id, &decision.task)
        .ok_or_else(|| DropReason::UnknownTask(decision.task.clone()))?;
    
    let status = cx
        .org
        .task(&task_id)
        .map(|t| t.status)
        .ok_or_else(|| DropReason::UnknownTask(decision.task.clone()))?;
    match status {
        TaskStatus::Done | TaskStatus::Rejected => return Err(DropReason::TaskClosed(task_id)),
        TaskStatus::InProgress | TaskStatus::Review => {}
        TaskStatus::Assigned => {
            let started = AgentDecision::new(Action::Work).with_task(task_id.as_str());
            if !work(agent_id, &started, cx)?.is_applied() {
                return Err(DropReason::NotStarted(task_id));
            }
        }
        TaskStatus::Backlog | TaskStatus::Blocked => return Err(DropReason::NotStarted(task_id)),
    }
    
    let now = now_ms(cx.ctx);
    let (title, priority) = {
        let task = cx
            .org
            .task_mut(&task_id)
            .ok_or_else(|| DropReason::UnknownTask(decision.task.clone()))?;
        task.status = TaskStatus::Done;
        task.updated_at_ms = now;
        (task.title.clone(), task.priority)
    };
    
    let parent = match cx.org.agent_mut(agent_id) {
        Some(agent) => {
            agent.stats.tasks_completed += 1;
            agent.stats.credits_earned += priority.completion_credits();
            agent.parent_id.clone()
        }
        None => None,
    };
    
    if let Some(parent) = parent.filter(|p| cx.org.agent(p).is_some()) {
        let body = if decision.message.is_empty() {
            format!("Completed: \"{}\"", title)
        } else {
            decision.message.clone()
        };
        let msg = AcpMessage::new(cx.ctx, MessageType::Completion, agent_id, &parent, body)
            .with_task(&task_id)
            .with_pct(100);
        deliver(cx.org, msg);
    }
    
    Ok(ExecutionOutcome::Applied {
        action: Action::Complete,
        task_id: Some(task_id),
        target: None,
    })
}

/// Starts work on the agent's own assigned (or blocked) task.
///
/// Anything else is a narrative no-op.
fn work<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> Result<ExecutionOutcome, DropReason> {
    let Some(task_id) = cx.org.resolve_task(agent_id, &decision.task) else {
        return Ok(ExecutionOutcome::Noop);
    };
    let now = now_ms(cx.ctx);
    
    let title = match cx.org.task_mut(&task_id) {
        Some(task)
            if task.is_held_by(agent_id)
                && matches!(task.status, TaskStatus::Assigned | TaskStatus::Blocked) =>
        {
            task.start(now);
            task.title.clone()
        }
        _ => return Ok(ExecutionOutcome::Noop),
    };
    
    let parent = cx.org.agent(agent_id).and_then(|a| a.parent_id.clone());
    if let Some(parent) = parent.filter(|p| cx.org.agent(p).is_some()) {
        let body = if decision.message.is_empty() {
            format!("Started: \"{}\"", title)
        } else {
            decision.message.clone()
        };
        let msg = AcpMessage::new(cx.ctx, MessageType::Progress, agent_id, &parent, body)
            .with_task(&task_id)
            .with_pct(WORK_STARTED_PCT);
        deliver(cx.org, msg);
    }
    
    Ok(ExecutionOutcome::Applied {
        action: Action::Work,
        task_id: Some(task_id),
        target: None,
    })
}

fn message<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> Result<ExecutionOutcome, DropReason> {
    let target = cx
        .org
        .resolve_agent(&decision.target)
        .ok_or_else(|| DropReason::UnknownTarget(decision.target.clone()))?;
    let task_id = cx.org.resolve_task(agent_id, &decision.task);
    
    let mut msg = AcpMessage::new(
        cx.ctx,
        MessageType::StatusRequest,
        agent_id,
        &target,
        decision.message.clone(),
    );
    if let Some(id) = &task_id {
        msg = msg.with_task(id);
    }
    deliver(cx.org, msg);
    
    Ok(ExecutionOutcome::Applied {
        action: Action::Message,
        task_id,
        target: Some(target),
    })
}

/// Hires from the roster (domain match first), else synthesizes a worker.
fn hire<Ctx: OrgContext>(
    agent_id: &AgentId,
    decision: &AgentDecision,
    cx: &mut ExecutionContext<'_, Ctx>,
) -> Result<ExecutionOutcome, DropReason> {
    let (hirer_name, hirer_domain) = match cx.org.agent(agent_id) {
        Some(a) => (a.name.clone(), a.domain.clone()),
        None => return Err(DropReason::UnknownAgent(agent_id.clone())),
    };
    
    // "new: <domain>" names the domain; a bare task id does not
    let domain = match new_task_title(&decision.task) {
        d if d.is_empty() || d.to_uppercase().starts_with("TASK-") => hirer_domain,
        d => d.to_string(),
    };
    
    let hired = match cx.org.take_roster_candidate(&domain) {
        Some(mut candidate) => {
            candidate.parent_id = Some(agent_id.clone());
            candidate.status = AgentStatus::Active;
            candidate
        }
        None => {
            let name = match decision.target.trim() {
                t if t.is_empty() || t.eq_ignore_ascii_case("none") => {
                    format!("{} Worker", capitalize(&domain))
                }
                t => t.to_string(),
            };
            let id = cx.org.unique_agent_id(&slugify(&name));
            Agent::new(id.as_str(), name, Role::Worker, 4, domain.clone())
                .with_parent(agent_id)
                .with_system_prompt(format!(
                    "You are a {} worker hired by {}. Do the work you are given and report back.",
                    domain, hirer_name
                ))
        }
    };
    
    let hired_id = hired.id.clone();
    let hired_name = hired.name.clone();
    info!("{} hired {} (L{} {})", hirer_name, hired_name, hired.level, hired.domain);
    if let Err(e) = cx.org.add_agent(hired) {
        // unique ids and an existing hirer make this unreachable in practice
        warn!("hire rejected: {}", e);
        return Err(DropReason::UnknownAgent(hired_id));
    }
    
    let body = if decision.message.is_empty() {
        format!("Welcome aboard, {}!", hired_name)
    } else {
        decision.message.clone()
    };
    let welcome = AcpMessage::new(cx.ctx, MessageType::Delegation, agent_id, &hired_id, body);
    deliver(cx.org, welcome);
    
    Ok(ExecutionOutcome::Applied {
        action: Action::Hire,
        task_id: None,
        target: Some(hired_id),
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Domain to hire for when a manager has work but no reports.
pub fn hire_domain_for(task: &Task) -> String {
    if task.domain.is_empty() {
        detect_domain(&task.title).to_string()
    } else {
        task.domain.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use std::collections::HashSet;
    
    struct Fixture {
        org: Organization,
        ids: TaskIdAllocator,
        ctx: TestContext,
    }
    
    impl Fixture {
        /// One L9 manager, one L3 worker, one backlog task created by the manager.
        fn pair() -> Self {
            let mut org = Organization::new();
            org.add_agent(Agent::new("mgr", "Maya Patel", Role::Lead, 9, "engineering")).unwrap();
            org.add_agent(Agent::new("wrk", "Will Ortiz", Role::Worker, 3, "engineering").with_parent(&"mgr".into())).unwrap();
            let mut ids = TaskIdAllocator::new();
            let id = ids.next(DecisionSource::Deterministic);
            org.add_task(Task::new(id, "Build the login API", &"mgr".into(), 0));
            Self { org, ids, ctx: TestContext::new(42) }
        }
        
        fn run(&mut self, agent: &str, decision: AgentDecision, source: DecisionSource) -> ExecutionOutcome {
            let mut cx = ExecutionContext {
                org: &mut self.org,
                ids: &mut self.ids,
                source,
                ctx: &self.ctx,
            };
            execute_decision(&agent.into(), &decision, &mut cx)
        }
        
        fn exec(&mut self, agent: &str, decision: AgentDecision) -> ExecutionOutcome {
            self.run(agent, decision, DecisionSource::Deterministic)
        }
    }
    
    #[test]
    fn test_delegate_assigns_and_acks() {
        let mut f = Fixture::pair();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("Will").with_task("TASK-0001"));
        assert!(outcome.is_applied());
        
        let task = f.org.task(&"TASK-0001".into()).unwrap();
        assert_eq!(task.assignee_id, Some("wrk".into()));
        assert_eq!(task.status, TaskStatus::Assigned);
        assert!(task.acked);
        assert_eq!(task.activity_log.len(), 2);
        assert_eq!(task.activity_log[1].kind, MessageType::Ack);
        assert_eq!(task.activity_log[1].from, AgentId::new("wrk"));
        
        let worker = f.org.agent(&"wrk".into()).unwrap();
        assert_eq!(worker.task_ids, vec![TaskId::new("TASK-0001")]);
    }
    
    #[test]
    fn test_delegate_new_task_uses_source_range() {
        let mut f = Fixture::pair();
        f.run(
            "mgr",
            AgentDecision::new(Action::Delegate).with_target("wrk").with_task("new: Write onboarding docs"),
            DecisionSource::Model,
        );
        
        let task = f.org.task(&"TASK-10001".into()).unwrap();
        assert_eq!(task.title, "Write onboarding docs");
        assert_eq!(task.creator_id, AgentId::new("mgr"));
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.priority, Priority::High);
    }
    
    #[test]
    fn test_delegate_unknown_target_is_dropped() {
        let mut f = Fixture::pair();
        let before = f.org.clone();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("Nobody Known").with_task("TASK-0001"));
        
        assert!(matches!(outcome, ExecutionOutcome::Dropped { reason: DropReason::UnknownTarget(_), .. }));
        assert_eq!(f.org, before);
    }
    
    #[test]
    fn test_reassignment_moves_task_ids() {
        let mut f = Fixture::pair();
        f.org.add_agent(Agent::new("wrk2", "Zoe Park", Role::Worker, 3, "engineering").with_parent(&"mgr".into())).unwrap();
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("wrk").with_task("TASK-0001"));
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("Zoe").with_task("TASK-0001"));
        
        assert!(f.org.agent(&"wrk".into()).unwrap().task_ids.is_empty());
        assert_eq!(f.org.agent(&"wrk2".into()).unwrap().task_ids.len(), 1);
        assert_eq!(f.org.task(&"TASK-0001".into()).unwrap().assignee_id, Some("wrk2".into()));
    }
    
    #[test]
    fn test_complete_unknown_task_is_noop() {
        let mut f = Fixture::pair();
        let before = f.org.tasks().to_vec();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Complete).with_task("TASK-0777"));
        
        assert!(matches!(outcome, ExecutionOutcome::Dropped { .. }));
        assert_eq!(f.org.tasks(), before.as_slice());
    }
    
    #[test]
    fn test_work_then_complete() {
        let mut f = Fixture::pair();
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("wrk").with_task("TASK-0001"));
        
        let outcome = f.exec("wrk", AgentDecision::new(Action::Work).with_task("TASK-0001"));
        assert!(outcome.is_applied());
        assert_eq!(f.org.task(&"TASK-0001".into()).unwrap().status, TaskStatus::InProgress);
        
        f.exec("wrk", AgentDecision::new(Action::Complete).with_task("TASK-0001"));
        let task = f.org.task(&"TASK-0001".into()).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        
        let worker = f.org.agent(&"wrk".into()).unwrap();
        assert_eq!(worker.stats.tasks_completed, 1);
        assert_eq!(worker.stats.credits_earned, 25);
        
        let mgr = f.org.agent(&"mgr".into()).unwrap();
        assert!(mgr.recent_messages.iter().any(|m| m.kind == MessageType::Completion));
        // Completion is a subscribed type for an L9 agent
        assert!(mgr.inbox.iter().any(|m| m.kind == MessageType::Completion));
    }
    
    #[test]
    fn test_complete_is_not_repeatable() {
        let mut f = Fixture::pair();
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("wrk").with_task("TASK-0001"));
        f.exec("wrk", AgentDecision::new(Action::Work).with_task("TASK-0001"));
        f.exec("wrk", AgentDecision::new(Action::Complete).with_task("TASK-0001"));
        let outcome = f.exec("wrk", AgentDecision::new(Action::Complete).with_task("TASK-0001"));
        
        assert!(matches!(outcome, ExecutionOutcome::Dropped { reason: DropReason::TaskClosed(_), .. }));
        assert_eq!(f.org.agent(&"wrk".into()).unwrap().stats.tasks_completed, 1);
    }
    
    #[test]
    fn test_complete_on_backlog_task_is_dropped() {
        let mut f = Fixture::pair();
        let before = f.org.clone();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Complete).with_task("TASK-0001"));
        
        assert_eq!(
            outcome,
            ExecutionOutcome::Dropped { action: Action::Complete, reason: DropReason::NotStarted("TASK-0001".into()) }
        );
        assert_eq!(f.org, before);
    }
    
    #[test]
    fn test_complete_on_someone_elses_assigned_task_is_dropped() {
        let mut f = Fixture::pair();
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("wrk").with_task("TASK-0001"));
        let before = f.org.clone();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Complete).with_task("TASK-0001"));
        
        assert!(matches!(outcome, ExecutionOutcome::Dropped { reason: DropReason::NotStarted(_), .. }));
        assert_eq!(f.org, before);
    }
    
    #[test]
    fn test_complete_on_own_assigned_task_starts_it_first() {
        let mut f = Fixture::pair();
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("wrk").with_task("TASK-0001"));
        let outcome = f.exec("wrk", AgentDecision::new(Action::Complete).with_task("TASK-0001"));
        assert!(outcome.is_applied());
        
        let task = f.org.task(&"TASK-0001".into()).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.started);
        let kinds: Vec<MessageType> = task.activity_log.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MessageType::Delegation, MessageType::Ack, MessageType::Progress, MessageType::Completion]
        );
        assert!(f.org.check_invariants().is_ok());
    }
    
    #[test]
    fn test_complete_unknown_reference_closes_held_task() {
        let mut f = Fixture::pair();
        f.exec("mgr", AgentDecision::new(Action::Delegate).with_target("wrk").with_task("TASK-0001"));
        f.exec("wrk", AgentDecision::new(Action::Work).with_task("TASK-0001"));
        
        // a stale or invented id lands on the agent's first open task
        let outcome = f.exec("wrk", AgentDecision::new(Action::Complete).with_task("TASK-0777"));
        assert_eq!(
            outcome,
            ExecutionOutcome::Applied { action: Action::Complete, task_id: Some("TASK-0001".into()), target: None }
        );
        assert_eq!(f.org.task(&"TASK-0001".into()).unwrap().status, TaskStatus::Done);
        assert!(f.org.task(&"TASK-0777".into()).is_none());
    }
    
    #[test]
    fn test_work_on_foreign_task_is_noop() {
        let mut f = Fixture::pair();
        let outcome = f.exec("wrk", AgentDecision::new(Action::Work).with_task("TASK-0001"));
        assert_eq!(outcome, ExecutionOutcome::Noop);
        assert_eq!(f.org.task(&"TASK-0001".into()).unwrap().status, TaskStatus::Backlog);
    }
    
    #[test]
    fn test_escalate_requires_parent() {
        let mut f = Fixture::pair();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Escalate).with_message("stuck"));
        assert!(matches!(outcome, ExecutionOutcome::Dropped { reason: DropReason::NoParent, .. }));
        
        let outcome = f.exec("wrk", AgentDecision::new(Action::Escalate).with_message("stuck on a dependency"));
        assert!(outcome.is_applied());
        let last = f.org.messages().last().unwrap();
        assert_eq!(last.kind, MessageType::Escalation);
        assert_eq!(last.reason, Some(EscalationReason::Dependency));
    }
    
    #[test]
    fn test_message_sends_status_request() {
        let mut f = Fixture::pair();
        let outcome = f.exec("mgr", AgentDecision::new(Action::Message).with_target("will").with_message("How is it going?"));
        assert!(outcome.is_applied());
        
        let last = f.org.messages().last().unwrap();
        assert_eq!(last.kind, MessageType::StatusRequest);
        assert_eq!(last.body, "How is it going?");
    }
    
    #[test]
    fn test_hire_prefers_roster_domain_match() {
        let mut f = Fixture::pair();
        f.org.add_to_roster(Agent::new("designer", "Dee Lin", Role::Senior, 5, "design"));
        f.org.add_to_roster(Agent::new("fin-lead", "Fay Moss", Role::Lead, 7, "finance"));
        
        let outcome = f.exec("mgr", AgentDecision::new(Action::Hire).with_task("new: finance"));
        assert_eq!(
            outcome,
            ExecutionOutcome::Applied { action: Action::Hire, task_id: None, target: Some("fin-lead".into()) }
        );
        let hired = f.org.agent(&"fin-lead".into()).unwrap();
        assert_eq!(hired.parent_id, Some("mgr".into()));
        assert_eq!(hired.status, AgentStatus::Active);
        assert_eq!(f.org.messages().last().unwrap().kind, MessageType::Delegation);
    }
    
    #[test]
    fn test_hire_ids_stay_unique() {
        let mut f = Fixture::pair();
        for _ in 0..5 {
            f.exec("mgr", AgentDecision::new(Action::Hire).with_target("QA Worker").with_task("new: qa"));
        }
        f.exec("wrk", AgentDecision::new(Action::Hire));
        
        let ids: HashSet<_> = f.org.agents().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids.len(), f.org.agents().len());
        assert_eq!(f.org.agents().len(), 8);
        assert!(f.org.agent(&"qa-worker-5".into()).is_some());
        assert!(f.org.agent(&"engineering-worker".into()).is_some());
        
        for agent in f.org.agents().iter().filter(|a| a.id.as_str().starts_with("qa-worker")) {
            assert_eq!(agent.parent_id, Some("mgr".into()));
            assert_eq!(agent.level, 4);
        }
        assert!(f.org.check_invariants().is_ok());
    }
    
    #[test]
    fn test_idle_changes_nothing() {
        let mut f = Fixture::pair();
        let before = f.org.clone();
        assert_eq!(f.exec("wrk", AgentDecision::idle("rate limited")), ExecutionOutcome::Noop);
        assert_eq!(f.org, before);
    }
}
