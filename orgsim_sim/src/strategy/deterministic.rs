//! Rule-based decisions: a pure function of organization state.
//!
//! Rules, first match wins:
//! 1. holding in-progress work → complete it
//! 2. manager with in-scope work → delegate to the best report, or hire
//! 3. holding assigned work → complete it (the executor starts it first)
//! 4. nothing actionable, no reports, a parent → escalate, once per
//!    delegation received
//!
//! The seeded PRNG only breaks ties and picks flavor text.

use super::{Decided, DecisionStrategy, Proposal};
use async_trait::async_trait;
use orgsim_core::executor::hire_domain_for;
use orgsim_core::{
    Action, Agent, AgentDecision, AgentId, DecisionSource, MessageType, Organization, Task, TaskStatus,
};
use orgsim_env::SeededRng;

const DELEGATION_FLAVORS: &[&str] = &[
    "{to}, I'm assigning \"{task}\" to you. Make it happen.",
    "Hey {to}, take ownership of \"{task}\". Report back when done.",
    "{to}, \"{task}\" is yours. Priority.",
    "Delegating \"{task}\" to {to}. Let me know if you hit blockers.",
];

const COMPLETION_FLAVORS: &[&str] = &[
    "Done with \"{task}\". Ready for review.",
    "\"{task}\" is complete. Everything checks out.",
    "Wrapped up \"{task}\". Moving on to the next one.",
    "Finished \"{task}\". Let me know if you need changes.",
];

const ESCALATION_FLAVORS: &[&str] = &[
    "Blocked on \"{task}\": {reason}. Need your input.",
    "Can't proceed with \"{task}\": {reason}. Escalating.",
    "\"{task}\" is stuck: {reason}. Please advise.",
];

const IDLE_FLAVORS: &[&str] = &[
    "Nothing on my plate. Blocked until I get a task.",
    "Queue is empty. Send work my way.",
    "I'm free. What should I pick up next?",
];

pub struct DeterministicStrategy {
    rng: SeededRng,
}

impl DeterministicStrategy {
    pub fn new(rng: SeededRng) -> Self {
        Self { rng }
    }
    
    fn flavor(&mut self, templates: &[&str], task: &str, to: &str, reason: &str) -> String {
        let template = self.rng.pick(templates).copied().unwrap_or("{task}");
        template
            .replace("{task}", task)
            .replace("{to}", to)
            .replace("{reason}", reason)
    }
    
    /// The rule-based decision for `agent` against current state.
    pub fn decide_for(&mut self, org: &Organization, agent: &Agent) -> Option<AgentDecision> {
        let held = org.open_tasks_for(&agent.id);
        
        if let Some(task) = held
            .iter()
            .find(|t| matches!(t.status, TaskStatus::InProgress | TaskStatus::Review))
        {
            return Some(self.finish(task));
        }
        
        if agent.is_manager() {
            let mut scope = in_scope_tasks(org, agent);
            scope.sort_by(|a, b| b.priority.cmp(&a.priority));
            if let Some(task) = scope.first() {
                return Some(self.staff(org, agent, task));
            }
        }
        
        if let Some(task) = held.iter().find(|t| t.status == TaskStatus::Assigned) {
            return Some(self.finish(task));
        }
        
        let parent = agent.parent_id.as_ref()?;
        if !org.direct_reports(&agent.id).is_empty() || escalated_since_delegation(org, &agent.id) {
            return None;
        }
        let decision = match held.iter().find(|t| t.status == TaskStatus::Blocked) {
            Some(task) => {
                let reason = task.blocked_reason.clone().unwrap_or_else(|| "Unknown".to_string());
                let message = self.flavor(ESCALATION_FLAVORS, &task.title, "", &reason);
                AgentDecision::new(Action::Escalate)
                    .with_task(task.id.as_str())
                    .with_message(message)
            }
            None => {
                let message = self.flavor(IDLE_FLAVORS, "", "", "");
                AgentDecision::new(Action::Escalate).with_task("none").with_message(message)
            }
        };
        Some(decision.with_target(parent.as_str()))
    }
    
    fn finish(&mut self, task: &Task) -> AgentDecision {
        let message = self.flavor(COMPLETION_FLAVORS, &task.title, "", "");
        AgentDecision::new(Action::Complete)
            .with_task(task.id.as_str())
            .with_message(message)
    }
    
    /// Delegates `task` to the best direct report, or hires for its domain.
    fn staff(&mut self, org: &Organization, manager: &Agent, task: &Task) -> AgentDecision {
        let reports = org.direct_reports(&manager.id);
        let domain = hire_domain_for(task);
        
        // idle before busy, matching domain before not
        let rank = |a: &Agent| (org.is_loaded(&a.id), !a.domain.eq_ignore_ascii_case(&domain));
        let Some(best) = reports.iter().map(|a| rank(*a)).min() else {
            return AgentDecision::new(Action::Hire).with_task(format!("new: {}", domain));
        };
        let tied: Vec<&Agent> = reports.into_iter().filter(|a| rank(*a) == best).collect();
        let Some(target) = self.rng.pick(&tied).copied() else {
            return AgentDecision::new(Action::Hire).with_task(format!("new: {}", domain));
        };
        
        let message = self.flavor(DELEGATION_FLAVORS, &task.title, target.first_name(), "");
        AgentDecision::new(Action::Delegate)
            .with_target(target.id.as_str())
            .with_task(task.id.as_str())
            .with_message(message)
    }
}

/// Whether `agent` has escalated since it was last handed work.
fn escalated_since_delegation(org: &Organization, agent: &AgentId) -> bool {
    org.messages()
        .iter()
        .rev()
        .find_map(|m| match m.kind {
            MessageType::Escalation if &m.from == agent => Some(true),
            MessageType::Delegation if &m.to == agent => Some(false),
            _ => None,
        })
        .unwrap_or(false)
}

/// Work a manager is responsible for routing.
///
/// Its own backlog/assigned tasks, unassigned backlog it created, and
/// blocked tasks held by a direct report. Board order.
fn in_scope_tasks<'a>(org: &'a Organization, manager: &Agent) -> Vec<&'a Task> {
    let reports: Vec<&AgentId> = org.direct_reports(&manager.id).into_iter().map(|a| &a.id).collect();
    org.tasks()
        .iter()
        .filter(|t| match t.status {
            TaskStatus::Backlog | TaskStatus::Assigned if t.is_held_by(&manager.id) => true,
            TaskStatus::Backlog => t.assignee_id.is_none() && t.creator_id == manager.id,
            TaskStatus::Blocked => t.assignee_id.as_ref().is_some_and(|a| reports.contains(&a)),
            _ => false,
        })
        .collect()
}

#[async_trait]
impl DecisionStrategy for DeterministicStrategy {
    fn name(&self) -> &'static str {
        "deterministic"
    }
    
    fn source(&self) -> DecisionSource {
        DecisionSource::Deterministic
    }
    
    async fn decide(&mut self, org: &Organization, _tick: u64, agents: &[AgentId]) -> Vec<Proposal> {
        agents
            .iter()
            .filter_map(|id| {
                let agent = org.agent(id)?;
                let decision = self.decide_for(org, agent)?;
                Some(Proposal::decided(id, Decided::free(decision)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use orgsim_core::{deliver, AcpMessage, Priority, Role, TaskId};
    
    fn strategy() -> DeterministicStrategy {
        DeterministicStrategy::new(SeededRng::new(42))
    }
    
    fn org() -> Organization {
        let mut org = Organization::new();
        org.add_agent(Agent::new("mgr", "Maya Patel", Role::Lead, 9, "engineering")).unwrap();
        org.add_agent(Agent::new("dev", "Dana Wu", Role::Worker, 3, "engineering").with_parent(&"mgr".into()))
            .unwrap();
        org.add_agent(Agent::new("mkt", "Mo Reyes", Role::Worker, 3, "marketing").with_parent(&"mgr".into()))
            .unwrap();
        org
    }
    
    fn task(id: &str, title: &str, creator: &str) -> Task {
        Task::new(TaskId::new(id), title, &creator.into(), 0)
    }
    
    #[test]
    fn test_manager_delegates_highest_priority_to_matching_domain() {
        let mut org = org();
        org.add_task(task("TASK-0001", "Fix the login bug", "mgr"));
        org.add_task(task("TASK-0002", "Plan the launch campaign", "mgr").with_priority(Priority::Critical));
        
        let mgr = org.agent(&"mgr".into()).unwrap();
        let d = strategy().decide_for(&org, mgr).unwrap();
        assert_eq!(d.action, Action::Delegate);
        assert_eq!(d.task, "TASK-0002");
        assert_eq!(d.target, "mkt");
        assert!(d.message.contains("Plan the launch campaign"));
    }
    
    #[test]
    fn test_idle_report_preferred_over_matching_busy_one() {
        let mut org = org();
        org.add_task(task("TASK-0001", "Build the API", "mgr"));
        org.add_task(
            task("TASK-0002", "Deploy the server", "mgr")
                .with_assignee(&"dev".into())
                .with_status(TaskStatus::InProgress),
        );
        
        let mgr = org.agent(&"mgr".into()).unwrap();
        let d = strategy().decide_for(&org, mgr).unwrap();
        assert_eq!(d.target, "mkt");
    }
    
    #[test]
    fn test_manager_without_reports_hires_for_domain() {
        let mut org = Organization::new();
        org.add_agent(Agent::new("coo", "Sarah Chen", Role::Coo, 10, "operations")).unwrap();
        org.add_task(task("TASK-0001", "Write the pricing forecast", "coo"));
        
        let coo = org.agent(&"coo".into()).unwrap();
        let d = strategy().decide_for(&org, coo).unwrap();
        assert_eq!(d.action, Action::Hire);
        assert_eq!(d.task, "new: finance");
    }
    
    #[test]
    fn test_worker_finishes_held_work() {
        let mut org = org();
        org.add_task(task("TASK-0001", "Build the API", "mgr").with_assignee(&"dev".into()).with_status(TaskStatus::Assigned));
        let mut s = strategy();
        
        let d = s.decide_for(&org, org.agent(&"dev".into()).unwrap()).unwrap();
        assert_eq!((d.action, d.task.as_str()), (Action::Complete, "TASK-0001"));
        
        // in-progress work goes first
        org.add_task(
            task("TASK-0002", "Fix the deploy script", "mgr")
                .with_assignee(&"dev".into())
                .with_status(TaskStatus::InProgress),
        );
        let d = s.decide_for(&org, org.agent(&"dev".into()).unwrap()).unwrap();
        assert_eq!((d.action, d.task.as_str()), (Action::Complete, "TASK-0002"));
    }
    
    #[test]
    fn test_blocked_worker_escalates() {
        let mut org = org();
        let mut blocked = task("TASK-0001", "Build the API", "mgr")
            .with_assignee(&"dev".into())
            .with_status(TaskStatus::Blocked);
        blocked.blocked_reason = Some("Dependency not ready".to_string());
        org.add_task(blocked);
        
        let d = strategy().decide_for(&org, org.agent(&"dev".into()).unwrap()).unwrap();
        assert_eq!(d.action, Action::Escalate);
        assert_eq!(d.target, "mgr");
        assert!(d.message.contains("Dependency not ready"));
        
        // The manager re-routes it
        let d = strategy().decide_for(&org, org.agent(&"mgr".into()).unwrap()).unwrap();
        assert_eq!((d.action, d.task.as_str()), (Action::Delegate, "TASK-0001"));
    }
    
    #[test]
    fn test_idle_worker_escalates_once_per_delegation() {
        let ctx = SimContext::new(42);
        let mut org = org();
        let dev = AgentId::new("dev");
        let mgr = AgentId::new("mgr");
        let mut s = strategy();
        
        let d = s.decide_for(&org, org.agent(&dev).unwrap()).unwrap();
        assert_eq!(d.action, Action::Escalate);
        assert_eq!(d.target, "mgr");
        assert_eq!(d.task, "none");
        
        deliver(&mut org, AcpMessage::new(&ctx, MessageType::Escalation, &dev, &mgr, d.message));
        assert!(s.decide_for(&org, org.agent(&dev).unwrap()).is_none());
        
        deliver(&mut org, AcpMessage::new(&ctx, MessageType::Delegation, &mgr, &dev, "Welcome aboard"));
        let d = s.decide_for(&org, org.agent(&dev).unwrap()).unwrap();
        assert_eq!(d.action, Action::Escalate);
        
        // the root has nobody to escalate to
        assert!(s.decide_for(&org, org.agent(&mgr).unwrap()).is_none());
    }
    
    #[test]
    fn test_same_seed_same_choices() {
        let mut org = org();
        org.add_agent(Agent::new("dev2", "Dee Lin", Role::Worker, 3, "engineering").with_parent(&"mgr".into()))
            .unwrap();
        org.add_task(task("TASK-0001", "Build the API", "mgr"));
        let mgr = org.agent(&"mgr".into()).unwrap();
        
        let run = || {
            let mut s = strategy();
            (0..5).map(|_| s.decide_for(&org, mgr)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
