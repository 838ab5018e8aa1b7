//! The "ORG" Engine - in-memory organization state
//!
//! Holds the agent tree, the task board, the unhired roster and the
//! organization-wide message log. All collections are `Vec`-backed so that
//! iteration order (and therefore every scheduling decision) is stable for
//! a given seed.

use crate::acp::{AcpMessage, MessageType};
use crate::ids::{AgentId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Agents at or above this level manage others.
pub const MANAGER_LEVEL: u8 = 7;

/// Default size of each agent's recent-message ring buffer.
pub const RECENT_MESSAGE_CAP: usize = 10;

/// Errors when mutating the organization structure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrgError {
    #[error("Duplicate agent id: {0}")]
    DuplicateAgent(AgentId),
    
    #[error("Unknown parent {parent} for agent {agent}")]
    UnknownParent { agent: AgentId, parent: AgentId },
    
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),
}

/// Structural invariant violations reported by [`Organization::check_invariants`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Agent id {0} appears more than once")]
    DuplicateAgentId(AgentId),
    
    #[error("Expected exactly one root agent, found {0}")]
    RootCount(usize),
    
    #[error("Agent {agent} references missing parent {parent}")]
    MissingParent { agent: AgentId, parent: AgentId },
    
    #[error("Parent chain of {0} contains a cycle")]
    Cycle(AgentId),
    
    #[error("Task {task} assigned to missing agent {assignee}")]
    MissingAssignee { task: TaskId, assignee: AgentId },
    
    #[error("Task {task} created by missing agent {creator}")]
    MissingCreator { task: TaskId, creator: AgentId },
    
    #[error("Task id {0} appears more than once")]
    DuplicateTaskId(TaskId),
    
    #[error("Task {0} is done but was never in progress")]
    DoneWithoutStart(TaskId),
}

// =============================================================================
// AGENTS
// =============================================================================

/// Fixed role taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coo,
    Talent,
    Lead,
    Senior,
    Worker,
    Intern,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Coo => "coo",
            Role::Talent => "talent",
            Role::Lead => "lead",
            Role::Senior => "senior",
            Role::Worker => "worker",
            Role::Intern => "intern",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coo" => Ok(Role::Coo),
            "talent" => Ok(Role::Talent),
            "lead" => Ok(Role::Lead),
            "senior" => Ok(Role::Senior),
            "worker" => Ok(Role::Worker),
            "intern" => Ok(Role::Intern),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// On duty, no in-progress work
    Active,
    /// Benched or not yet hired
    Idle,
    /// On duty, holding assigned or in-progress work
    Busy,
}

/// When an agent wakes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Trigger {
    /// Wakes every scheduler pass
    Polling,
    /// Wakes only when the inbox holds a subscribed message type
    EventDriven { on: Vec<MessageType> },
}

impl Trigger {
    /// Managers listen for escalations, completions and delegations;
    /// everyone else polls.
    pub fn default_for_level(level: u8) -> Self {
        if level >= MANAGER_LEVEL {
            Trigger::EventDriven {
                on: vec![
                    MessageType::Escalation,
                    MessageType::Completion,
                    MessageType::Delegation,
                ],
            }
        } else {
            Trigger::Polling
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub messages_sent: u32,
    pub credits_earned: u64,
    pub credits_spent: u64,
}

/// A simulated agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub role: Role,
    /// Higher = more authority
    pub level: u8,
    /// Free-text specialization
    pub domain: String,
    /// `None` only for the root
    pub parent_id: Option<AgentId>,
    pub status: AgentStatus,
    pub trigger: Trigger,
    /// Pending messages (event-driven agents only)
    pub inbox: VecDeque<AcpMessage>,
    /// Most recent messages touching this agent, oldest first
    pub recent_messages: VecDeque<AcpMessage>,
    pub task_ids: Vec<TaskId>,
    pub stats: AgentStats,
    /// Persona used as the system message for model-backed decisions
    pub system_prompt: String,
    /// Last tick in which a decision of this agent was applied
    #[serde(default)]
    pub last_acted_tick: Option<u64>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: Role,
        level: u8,
        domain: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let domain = domain.into();
        let system_prompt = format!(
            "You are {}, a level {} {} working in {}.",
            name, level, role, domain
        );
        Self {
            id: AgentId::new(id),
            name,
            role,
            level,
            domain,
            parent_id: None,
            status: AgentStatus::Active,
            trigger: Trigger::default_for_level(level),
            inbox: VecDeque::new(),
            recent_messages: VecDeque::new(),
            task_ids: Vec::new(),
            stats: AgentStats::default(),
            system_prompt,
            last_acted_tick: None,
        }
    }
    
    pub fn with_parent(mut self, parent: &AgentId) -> Self {
        self.parent_id = Some(parent.clone());
        self
    }
    
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }
    
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }
    
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
    
    /// Active or busy.
    pub fn is_on_duty(&self) -> bool {
        matches!(self.status, AgentStatus::Active | AgentStatus::Busy)
    }
    
    pub fn is_manager(&self) -> bool {
        self.level >= MANAGER_LEVEL
    }
    
    /// Whether the agent's trigger wants it to act this pass.
    pub fn is_awake(&self) -> bool {
        match &self.trigger {
            Trigger::Polling => true,
            Trigger::EventDriven { on } => self.inbox.iter().any(|m| on.contains(&m.kind)),
        }
    }
    
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
    
    /// Recent messages addressed to this agent, newest last.
    pub fn inbound(&self, limit: usize) -> Vec<&AcpMessage> {
        let inbound: Vec<&AcpMessage> = self
            .recent_messages
            .iter()
            .filter(|m| m.to == self.id)
            .collect();
        let skip = inbound.len().saturating_sub(limit);
        inbound.into_iter().skip(skip).collect()
    }
    
    pub(crate) fn push_recent(&mut self, msg: AcpMessage, cap: usize) {
        self.recent_messages.push_back(msg);
        while self.recent_messages.len() > cap {
            self.recent_messages.pop_front();
        }
    }
}

// =============================================================================
// TASKS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Credits awarded on completion.
    pub fn completion_credits(&self) -> u64 {
        match self {
            Priority::Critical => 100,
            Priority::High => 50,
            Priority::Normal | Priority::Low => 25,
        }
    }
    
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Assigned,
    InProgress,
    Review,
    Done,
    Blocked,
    Rejected,
}

impl TaskStatus {
    /// Not yet done or rejected.
    pub fn is_open(&self) -> bool {
        !matches!(self, TaskStatus::Done | TaskStatus::Rejected)
    }
    
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub domain: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub assignee_id: Option<AgentId>,
    /// Immutable after creation
    pub creator_id: AgentId,
    pub activity_log: Vec<AcpMessage>,
    pub acked: bool,
    /// Set once the task has been in progress
    #[serde(default)]
    pub started: bool,
    pub blocked_reason: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    /// Creates a normal-priority backlog task.
    pub fn new(id: TaskId, title: impl Into<String>, creator: &AgentId, now_ms: u64) -> Self {
        let title = title.into();
        Self {
            id,
            description: title.clone(),
            domain: detect_domain(&title).to_string(),
            title,
            priority: Priority::Normal,
            status: TaskStatus::Backlog,
            assignee_id: None,
            creator_id: creator.clone(),
            activity_log: Vec::new(),
            acked: false,
            started: false,
            blocked_reason: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
    
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
    
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }
    
    /// Seeds the status; anything past `in_progress` counts as started.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self.started |= matches!(status, TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Done);
        self
    }
    
    /// Moves the task into `in_progress`.
    pub fn start(&mut self, now_ms: u64) {
        self.status = TaskStatus::InProgress;
        self.started = true;
        self.blocked_reason = None;
        self.updated_at_ms = now_ms;
    }
    
    pub fn with_assignee(mut self, assignee: &AgentId) -> Self {
        self.assignee_id = Some(assignee.clone());
        self
    }
    
    pub fn is_held_by(&self, agent: &AgentId) -> bool {
        self.assignee_id.as_ref() == Some(agent)
    }
}

/// Keyword table used to classify free text into a work domain.
pub const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("engineering", &["api", "backend", "frontend", "architecture", "code", "build", "develop", "bug", "fix", "deploy", "test", "database", "server", "sdk", "infrastructure"]),
    ("marketing", &["landing", "campaign", "blog", "seo", "brand", "launch", "content", "social", "press", "announce", "outreach", "website"]),
    ("finance", &["pricing", "projection", "revenue", "budget", "invoice", "financial", "cost", "billing", "model", "forecast", "report"]),
    ("sales", &["demo", "lead", "outreach", "pipeline", "prospect", "deal", "contract", "enterprise", "cold"]),
    ("support", &["ticket", "support", "customer", "help", "resolve", "backlog", "issue"]),
    ("hr", &["onboard", "hire", "recruit", "team", "culture", "training"]),
    ("security", &["security", "audit", "vulnerability", "pen-test", "compliance", "appsec"]),
];

/// All domains with at least one keyword hit, best first. Never empty.
pub fn detect_domains(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    let mut scored: Vec<(&'static str, usize)> = DOMAIN_KEYWORDS
        .iter()
        .map(|(domain, keywords)| (*domain, keywords.iter().filter(|k| lower.contains(*k)).count()))
        .filter(|(_, score)| *score > 0)
        .collect();
    // stable: ties keep table order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    
    if scored.is_empty() {
        vec!["engineering"]
    } else {
        scored.into_iter().map(|(d, _)| d).collect()
    }
}

/// The single best domain for `text` (engineering when nothing matches).
pub fn detect_domain(text: &str) -> &'static str {
    detect_domains(text)[0]
}

/// Lower-case slug: runs of non-alphanumerics collapse to `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

// =============================================================================
// ORGANIZATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    /// Defined but not yet hired
    roster: Vec<Agent>,
    messages: Vec<AcpMessage>,
    recent_cap: usize,
}

impl Default for Organization {
    fn default() -> Self {
        Self::new()
    }
}

impl Organization {
    pub fn new() -> Self {
        Self {
            agents: Vec::new(),
            tasks: Vec::new(),
            roster: Vec::new(),
            messages: Vec::new(),
            recent_cap: RECENT_MESSAGE_CAP,
        }
    }
    
    pub fn with_recent_cap(mut self, cap: usize) -> Self {
        self.recent_cap = cap.max(1);
        self
    }
    
    pub fn recent_cap(&self) -> usize {
        self.recent_cap
    }
    
    /// Adds an agent. Its parent (if any) must already exist.
    pub fn add_agent(&mut self, agent: Agent) -> Result<(), OrgError> {
        if self.agent(&agent.id).is_some() {
            return Err(OrgError::DuplicateAgent(agent.id));
        }
        if let Some(parent) = &agent.parent_id {
            if self.agent(parent).is_none() {
                return Err(OrgError::UnknownParent {
                    agent: agent.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
        self.agents.push(agent);
        Ok(())
    }
    
    /// Adds a hireable candidate. Roster entries are not part of the tree.
    pub fn add_to_roster(&mut self, candidate: Agent) {
        self.roster.push(candidate.with_status(AgentStatus::Idle));
    }
    
    /// Removes and returns the first unhired roster candidate whose domain
    /// contains `domain` (case-insensitive), else the first unhired candidate.
    pub fn take_roster_candidate(&mut self, domain: &str) -> Option<Agent> {
        self.roster.retain(|r| !self.agents.iter().any(|a| a.id == r.id));
        if self.roster.is_empty() {
            return None;
        }
        let needle = domain.to_lowercase();
        let index = self
            .roster
            .iter()
            .position(|r| r.domain.to_lowercase().contains(&needle))
            .unwrap_or(0);
        Some(self.roster.remove(index))
    }
    
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }
    
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
    
    pub fn roster(&self) -> &[Agent] {
        &self.roster
    }
    
    pub fn messages(&self) -> &[AcpMessage] {
        &self.messages
    }
    
    /// The most recent `limit` messages, oldest first.
    pub fn recent_messages(&self, limit: usize) -> &[AcpMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
    
    pub(crate) fn log_message(&mut self, msg: AcpMessage) {
        self.messages.push(msg);
    }
    
    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| &a.id == id)
    }
    
    pub fn agent_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| &a.id == id)
    }
    
    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.iter_mut()
    }
    
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }
    
    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }
    
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }
    
    /// The first agent without a parent.
    pub fn root(&self) -> Option<&Agent> {
        self.agents.iter().find(|a| a.parent_id.is_none())
    }
    
    /// On-duty agents whose parent is `manager`.
    pub fn direct_reports(&self, manager: &AgentId) -> Vec<&Agent> {
        self.agents
            .iter()
            .filter(|a| a.parent_id.as_ref() == Some(manager) && a.is_on_duty())
            .collect()
    }
    
    /// Open tasks held by `agent`, in board order.
    pub fn open_tasks_for(&self, agent: &AgentId) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.is_held_by(agent) && t.status.is_open())
            .collect()
    }
    
    /// Whether `agent` holds any assigned or in-progress work.
    pub fn is_loaded(&self, agent: &AgentId) -> bool {
        self.tasks.iter().any(|t| {
            t.is_held_by(agent)
                && matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::Review)
        })
    }
    
    /// Fuzzy agent reference resolution.
    ///
    /// Order: exact id, exact name (case-insensitive), name contains,
    /// first-name prefix (at least 2 chars), partial id.
    pub fn resolve_agent(&self, reference: &str) -> Option<AgentId> {
        let trimmed = reference.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return None;
        }
        
        if let Some(a) = self.agents.iter().find(|a| a.id.as_str() == trimmed) {
            return Some(a.id.clone());
        }
        
        let lower = trimmed.to_lowercase();
        if let Some(a) = self.agents.iter().find(|a| a.name.to_lowercase() == lower) {
            return Some(a.id.clone());
        }
        if let Some(a) = self.agents.iter().find(|a| a.name.to_lowercase().contains(&lower)) {
            return Some(a.id.clone());
        }
        
        let first = lower.split_whitespace().next().unwrap_or("");
        if first.chars().count() >= 2 {
            if let Some(a) = self.agents.iter().find(|a| a.name.to_lowercase().starts_with(first)) {
                return Some(a.id.clone());
            }
        }
        
        let dashed = lower.split_whitespace().collect::<Vec<_>>().join("-");
        self.agents
            .iter()
            .find(|a| a.id.as_str().contains(&dashed))
            .map(|a| a.id.clone())
    }
    
    /// Task reference resolution on behalf of `agent`.
    ///
    /// `none`/empty and `new: ...` references never resolve. Otherwise:
    /// exact id, upper-cased id, then the agent's first open held task, so
    /// a stale or invented id acts on whatever the agent is holding.
    /// Resolution does not mutate, so resolving twice yields the same task.
    pub fn resolve_task(&self, agent: &AgentId, reference: &str) -> Option<TaskId> {
        let trimmed = reference.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") || is_new_task_ref(trimmed) {
            return None;
        }
        
        if let Some(t) = self.tasks.iter().find(|t| t.id.as_str() == trimmed) {
            return Some(t.id.clone());
        }
        let upper = trimmed.to_uppercase();
        if let Some(t) = self.tasks.iter().find(|t| t.id.as_str() == upper) {
            return Some(t.id.clone());
        }
        self.open_tasks_for(agent).first().map(|t| t.id.clone())
    }
    
    /// Returns `base` if free, else `base-2`, `base-3`, ...
    pub fn unique_agent_id(&self, base: &str) -> AgentId {
        let base = if base.is_empty() { "agent" } else { base };
        let taken = |id: &str| {
            self.agents.iter().any(|a| a.id.as_str() == id)
                || self.roster.iter().any(|a| a.id.as_str() == id)
        };
        if !taken(base) {
            return AgentId::new(base);
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !taken(&candidate) {
                return AgentId::new(candidate);
            }
            n += 1;
        }
    }
    
    /// Sets on-duty agents to busy when they hold assigned or in-progress
    /// work, else active.
    pub fn refresh_statuses(&mut self) {
        let busy: HashSet<AgentId> = self
            .tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::Review))
            .filter_map(|t| t.assignee_id.clone())
            .collect();
        for agent in self.agents.iter_mut().filter(|a| a.is_on_duty()) {
            agent.status = if busy.contains(&agent.id) {
                AgentStatus::Busy
            } else {
                AgentStatus::Active
            };
        }
    }
    
    /// Drops every task and message and clears per-agent runtime state.
    pub fn clear_work(&mut self) {
        self.tasks.clear();
        self.messages.clear();
        for agent in &mut self.agents {
            agent.inbox.clear();
            agent.recent_messages.clear();
            agent.task_ids.clear();
            agent.stats = AgentStats::default();
            agent.last_acted_tick = None;
        }
    }
    
    /// Keeps only the root agent; everyone else goes back to the roster.
    pub fn reset_to_root(&mut self) {
        let Some(root_index) = self.agents.iter().position(|a| a.parent_id.is_none()) else {
            return;
        };
        let root = self.agents.remove(root_index);
        let benched: Vec<Agent> = self.agents.drain(..).collect();
        self.agents.push(root);
        for mut agent in benched {
            agent.parent_id = None;
            self.add_to_roster(agent);
        }
    }
    
    /// Verifies the structural invariants of the tree and the task board.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(&agent.id) {
                return Err(InvariantViolation::DuplicateAgentId(agent.id.clone()));
            }
        }
        
        let roots = self.agents.iter().filter(|a| a.parent_id.is_none()).count();
        if !self.agents.is_empty() && roots != 1 {
            return Err(InvariantViolation::RootCount(roots));
        }
        
        for agent in &self.agents {
            if let Some(parent) = &agent.parent_id {
                if self.agent(parent).is_none() {
                    return Err(InvariantViolation::MissingParent {
                        agent: agent.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            
            // Walk up; a chain longer than the population is a cycle.
            let mut cursor = agent.parent_id.as_ref();
            let mut steps = 0;
            while let Some(p) = cursor {
                steps += 1;
                if steps > self.agents.len() {
                    return Err(InvariantViolation::Cycle(agent.id.clone()));
                }
                cursor = self.agent(p).and_then(|a| a.parent_id.as_ref());
            }
        }
        
        let mut task_ids = HashSet::new();
        for task in &self.tasks {
            if !task_ids.insert(&task.id) {
                return Err(InvariantViolation::DuplicateTaskId(task.id.clone()));
            }
            if let Some(assignee) = &task.assignee_id {
                if self.agent(assignee).is_none() {
                    return Err(InvariantViolation::MissingAssignee {
                        task: task.id.clone(),
                        assignee: assignee.clone(),
                    });
                }
            }
            if task.creator_id.as_str() != crate::acp::PRINCIPAL && self.agent(&task.creator_id).is_none() {
                return Err(InvariantViolation::MissingCreator {
                    task: task.id.clone(),
                    creator: task.creator_id.clone(),
                });
            }
            if task.status == TaskStatus::Done && !task.started {
                return Err(InvariantViolation::DoneWithoutStart(task.id.clone()));
            }
        }
        
        Ok(())
    }
}

/// Whether a task reference asks for creation (`new: <title>`).
pub fn is_new_task_ref(reference: &str) -> bool {
    reference.trim_start().to_lowercase().starts_with("new:")
}

/// Title carried by a `new: <title>` reference (or the reference itself).
pub fn new_task_title(reference: &str) -> &str {
    let trimmed = reference.trim();
    if is_new_task_ref(trimmed) {
        trimmed[4..].trim()
    } else {
        trimmed
    }
}
