//! Built-in organizations.

use orgsim_core::{Agent, AgentId, OrgError, Organization, Priority, Role, Task, TaskId, TaskStatus};
use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// One manager, one worker, one backlog task
    Pair,
    
    /// A COO and a roster of hireable candidates
    Startup,
    
    /// A fully staffed 14-agent company with work in flight
    Acme,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Pair, ScenarioId::Startup, ScenarioId::Acme]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Pair => "pair",
            ScenarioId::Startup => "startup",
            ScenarioId::Acme => "acme",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Pair => "L9 manager and L3 worker with one backlog task",
            ScenarioId::Startup => "COO alone; leads and workers are hired from the roster on demand",
            ScenarioId::Acme => "14 agents across engineering, marketing, finance and support",
        }
    }
    
    /// Order submitted before the first tick when the caller gives none.
    pub fn default_order(&self) -> Option<&'static str> {
        match self {
            ScenarioId::Startup => Some(
                "1) Build the public API for the beta. 2) Launch the marketing landing page. 3) Prepare the pricing model and revenue forecast.",
            ),
            ScenarioId::Pair | ScenarioId::Acme => None,
        }
    }
    
    pub fn build(&self) -> Result<Organization, OrgError> {
        match self {
            ScenarioId::Pair => pair(),
            ScenarioId::Startup => startup(),
            ScenarioId::Acme => acme(),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pair" => Ok(ScenarioId::Pair),
            "startup" | "organic" => Ok(ScenarioId::Startup),
            "acme" | "full" => Ok(ScenarioId::Acme),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

// Seeded tasks use their own prefix so they never collide with allocated ids.
fn seed_task(n: u32, title: &str, creator: &str) -> Task {
    Task::new(TaskId::new(format!("SEED-{:02}", n)), title, &AgentId::new(creator), 0)
}

fn pair() -> Result<Organization, OrgError> {
    let mut org = Organization::new();
    org.add_agent(Agent::new("maya", "Maya Patel", Role::Lead, 9, "engineering"))?;
    org.add_agent(Agent::new("will", "Will Ortiz", Role::Worker, 3, "engineering").with_parent(&"maya".into()))?;
    org.add_task(seed_task(1, "Build the login API", "maya").with_priority(Priority::High));
    Ok(org)
}

fn startup() -> Result<Organization, OrgError> {
    let mut org = Organization::new();
    org.add_agent(
        Agent::new("ava", "Ava Chen", Role::Coo, 10, "operations").with_system_prompt(
            "You are Ava Chen, the COO. You build the organization by hiring department leads first, then delegate work to them.",
        ),
    )?;
    
    let candidates = [
        ("eng-lead", "Marcus Rivera", Role::Lead, 8, "engineering"),
        ("mkt-lead", "Priya Shah", Role::Lead, 8, "marketing"),
        ("fin-lead", "Daniel Kim", Role::Lead, 8, "finance"),
        ("sales-lead", "Hana Sato", Role::Lead, 7, "sales"),
        ("support-lead", "Grace Liu", Role::Lead, 7, "support"),
        ("backend-dev", "Sam Okafor", Role::Worker, 4, "engineering"),
        ("content-writer", "Nora Quinn", Role::Worker, 4, "marketing"),
        ("analyst", "Rosa Medina", Role::Worker, 4, "finance"),
    ];
    for (id, name, role, level, domain) in candidates {
        org.add_to_roster(Agent::new(id, name, role, level, domain));
    }
    Ok(org)
}

fn acme() -> Result<Organization, OrgError> {
    let mut org = Organization::new();
    
    let staff = [
        ("ava", "Ava Chen", Role::Coo, 10, "operations", None),
        ("eng-lead", "Marcus Rivera", Role::Lead, 8, "engineering", Some("ava")),
        ("mkt-lead", "Priya Shah", Role::Lead, 8, "marketing", Some("ava")),
        ("fin-lead", "Daniel Kim", Role::Lead, 8, "finance", Some("ava")),
        ("support-lead", "Grace Liu", Role::Lead, 7, "support", Some("ava")),
        ("backend-dev", "Sam Okafor", Role::Senior, 6, "engineering", Some("eng-lead")),
        ("frontend-dev", "Lena Fischer", Role::Worker, 4, "engineering", Some("eng-lead")),
        ("qa-engineer", "Omar Haddad", Role::Worker, 4, "engineering", Some("eng-lead")),
        ("copywriter", "Nora Quinn", Role::Senior, 5, "marketing", Some("mkt-lead")),
        ("seo-specialist", "Theo Park", Role::Worker, 3, "marketing", Some("mkt-lead")),
        ("analyst", "Rosa Medina", Role::Senior, 5, "finance", Some("fin-lead")),
        ("bookkeeper", "Ivan Petrov", Role::Worker, 3, "finance", Some("fin-lead")),
        ("tier1-support", "Jade Morgan", Role::Worker, 3, "support", Some("support-lead")),
        ("intern", "Kai Brooks", Role::Intern, 1, "engineering", Some("backend-dev")),
    ];
    for (id, name, role, level, domain, parent) in staff {
        let mut agent = Agent::new(id, name, role, level, domain);
        if let Some(parent) = parent {
            agent = agent.with_parent(&parent.into());
        }
        org.add_agent(agent)?;
    }
    
    org.add_to_roster(Agent::new("security-lead", "Elena Volkova", Role::Lead, 7, "security"));
    org.add_to_roster(Agent::new("recruiter", "Leo Grant", Role::Worker, 4, "hr"));
    
    let mut blocked = seed_task(1, "Fix flaky checkout tests", "eng-lead")
        .with_status(TaskStatus::Blocked)
        .with_assignee(&"qa-engineer".into());
    blocked.blocked_reason = Some("Dependency not ready".to_string());
    org.add_task(blocked);
    if let Some(qa) = org.agent_mut(&"qa-engineer".into()) {
        qa.task_ids.push(TaskId::new("SEED-01"));
    }
    
    org.add_task(seed_task(2, "Draft the Q3 revenue forecast", "fin-lead").with_priority(Priority::High));
    org.add_task(seed_task(3, "Refresh the landing page copy", "mkt-lead"));
    Ok(org)
}
