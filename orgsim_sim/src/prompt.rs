//! Bounded-size decision prompt for model-backed agents.

use orgsim_core::{Action, Agent, Organization, Task, TaskStatus};
use std::fmt::Write;

/// Caps applied when rendering a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub max_tasks: usize,
    pub inbox_window: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_tasks: 8,
            inbox_window: 5,
        }
    }
}

/// Tasks shown to `agent`: held first, then unassigned ones it created,
/// then ones it created and handed off. Closed tasks are omitted.
pub fn visible_tasks<'a>(org: &'a Organization, agent: &Agent, limit: usize) -> Vec<&'a Task> {
    let open = || org.tasks().iter().filter(|t| t.status.is_open());
    let created_by_me = |t: &&Task| t.creator_id == agent.id;
    
    open()
        .filter(|t| t.is_held_by(&agent.id))
        .chain(open().filter(|t| t.assignee_id.is_none()).filter(created_by_me))
        .chain(
            open()
                .filter(|t| t.assignee_id.is_some() && !t.is_held_by(&agent.id))
                .filter(created_by_me),
        )
        .take(limit)
        .collect()
}

/// Renders the user message for one agent's decision.
pub fn build_agent_prompt(org: &Organization, agent: &Agent, limits: PromptLimits) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} — {} ({}, L{})", agent.name, agent.role, agent.domain, agent.level);
    
    match agent.parent_id.as_ref().and_then(|p| org.agent(p)) {
        Some(manager) => {
            let _ = writeln!(out, "Manager: {} ({})", manager.name, manager.role);
        }
        None => out.push_str("Manager: none (you report to the Human Principal)\n"),
    }
    
    out.push_str("\n## Your Tasks\n");
    let tasks = visible_tasks(org, agent, limits.max_tasks);
    if tasks.is_empty() {
        out.push_str("- (no tasks yet)\n");
    }
    for task in tasks {
        let assignee = task
            .assignee_id
            .as_ref()
            .and_then(|id| org.agent(id))
            .map(|a| a.name.as_str())
            .unwrap_or("unassigned");
        let _ = writeln!(
            out,
            "- {}: {} [{}, {}] → {}",
            task.id,
            task.title,
            task.status,
            task.priority.as_str(),
            assignee
        );
    }
    
    out.push_str("\n## Your Team\n");
    let reports = org.direct_reports(&agent.id);
    if reports.is_empty() {
        out.push_str("- (no direct reports)\n");
    }
    for report in reports {
        let load = if org.is_loaded(&report.id) { "busy" } else { "idle" };
        let _ = writeln!(out, "- {} (L{} {}) — {}", report.name, report.level, report.role, load);
    }
    
    out.push_str("\n## Inbox\n");
    let inbound = agent.inbound(limits.inbox_window);
    if inbound.is_empty() {
        out.push_str("- (empty)\n");
    }
    for msg in inbound {
        let from = org.agent(&msg.from).map(|a| a.name.as_str()).unwrap_or(msg.from.as_str());
        let _ = writeln!(out, "- [From {}]: {}", from, msg.summary());
    }
    
    let actions: Vec<&str> = Action::SELECTABLE.iter().map(|a| a.as_str()).collect();
    out.push_str("\n## Decide\n");
    out.push_str("Pick ONE action and respond in this exact format:\n");
    out.push_str("## Decision\n");
    let _ = writeln!(out, "- Action: [{}]", actions.join("|"));
    out.push_str("- Target: [agent name, or none]\n");
    out.push_str("- Task: [task id, or new: <title>]\n");
    out.push_str("- Message: [one short sentence]\n");
    
    if has_startable_work(org, agent) {
        out.push_str("\nStart assigned work with `work` before you `complete` it.\n");
    }
    out
}

fn has_startable_work(org: &Organization, agent: &Agent) -> bool {
    org.tasks()
        .iter()
        .any(|t| t.is_held_by(&agent.id) && t.status == TaskStatus::Assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgsim_core::{AgentId, Priority, Role, TaskId};
    
    fn org() -> Organization {
        let mut org = Organization::new();
        org.add_agent(Agent::new("ceo", "Sarah Chen", Role::Coo, 10, "operations")).unwrap();
        org.add_agent(Agent::new("dev", "Sam Okafor", Role::Worker, 3, "engineering").with_parent(&"ceo".into()))
            .unwrap();
        org
    }
    
    #[test]
    fn test_root_prompt_sections() {
        let org = org();
        let ceo = org.agent(&"ceo".into()).unwrap();
        let prompt = build_agent_prompt(&org, ceo, PromptLimits::default());
        
        assert!(prompt.starts_with("# Sarah Chen — coo (operations, L10)\n"));
        assert!(prompt.contains("Manager: none (you report to the Human Principal)"));
        assert!(prompt.contains("- (no tasks yet)"));
        assert!(prompt.contains("- Sam Okafor (L3 worker) — idle"));
        assert!(prompt.contains("- (empty)"));
        assert!(prompt.contains("- Action: [delegate|escalate|complete|work|message|hire]"));
    }
    
    #[test]
    fn test_task_ordering_and_cap() {
        let mut org = org();
        let ceo = AgentId::new("ceo");
        let dev = AgentId::new("dev");
        for i in 1..=10 {
            let task = Task::new(TaskId::new(format!("TASK-{:04}", i)), format!("Task {}", i), &ceo, 0);
            org.add_task(if i == 7 { task.with_assignee(&dev).with_status(TaskStatus::Assigned) } else { task });
        }
        org.add_task(
            Task::new(TaskId::new("TASK-0099"), "Held", &dev, 0)
                .with_assignee(&ceo)
                .with_priority(Priority::High)
                .with_status(TaskStatus::Assigned),
        );
        
        let agent = org.agent(&ceo).unwrap();
        let visible = visible_tasks(&org, agent, 8);
        assert_eq!(visible.len(), 8);
        assert_eq!(visible[0].id.as_str(), "TASK-0099");
        assert!(visible.iter().all(|t| t.id.as_str() != "TASK-0007"));
        
        let prompt = build_agent_prompt(&org, agent, PromptLimits::default());
        assert!(prompt.contains("- TASK-0099: Held [assigned, high] → Sarah Chen"));
        assert!(prompt.contains("- TASK-0001: Task 1 [backlog, normal] → unassigned"));
        assert!(prompt.contains("Start assigned work"));
    }
}
