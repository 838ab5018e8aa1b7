//! Simulation - the tick scheduler.
//!
//! One `run_tick` call is one full scheduling round:
//!
//! 1. each active strategy (replay, then model) decides for the agents it
//!    is eligible for and nobody has decided for yet this tick
//! 2. the rule-based pass covers every remaining on-duty agent
//! 3. the optional router hook, status refresh, invariant check and
//!    metrics snapshot
//!
//! Decisions always execute one at a time against the live organization.

use crate::orders::parse_order_into_tasks;
use crate::prompt::PromptLimits;
use crate::recorder::DecisionRecorder;
use crate::strategy::{Decided, DecisionStrategy, DeterministicStrategy, PassMode, Proposal};
use crate::error::SimError;

use chrono::{DateTime, Utc};
use orgsim_core::org::MANAGER_LEVEL;
use orgsim_core::{
    deliver, execute_decision, AcpMessage, Action, Agent, AgentId, DecisionSource, ExecutionContext,
    ExecutionOutcome, InvariantViolation, MessageType, ModelRouter, Organization, RouteRequest, Role,
    Task, TaskId, TaskIdAllocator, TaskStatus, TaskType, PRINCIPAL,
};
use orgsim_env::{OrgContext, SeededRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// PRNG stream of the rule-based strategy.
const RULES_STREAM: u64 = 0x5275_6c65;

/// PRNG stream of the router hook.
const HOOK_STREAM: u64 = 0x486f_6f6b;

/// Agents routed per tick by the router hook.
const ROUTED_PER_TICK: usize = 3;

/// Agents at or below this level ask the router for a local model.
const LOCAL_LEVEL: u8 = 4;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,
    
    /// Ticks run by `run` and the scenario runner
    pub max_ticks: u64,
    
    /// Virtual time slept between ticks
    pub tick_interval: Duration,
    
    /// Per-agent recent-message ring size
    pub recent_cap: usize,
    
    /// Inbox messages shown in model prompts
    pub inbox_window: usize,
    
    /// Tasks shown in model prompts
    pub task_cap: usize,
    
    /// Minimum level for model-backed decisions
    pub manager_level: u8,
    
    /// Replay tick axis stretch factor
    pub replay_stretch: f64,
    
    /// Minimum replay match score (exclusive)
    pub replay_threshold: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_ticks: 30,
            tick_interval: Duration::ZERO,
            recent_cap: 10,
            inbox_window: 5,
            task_cap: 8,
            manager_level: MANAGER_LEVEL,
            replay_stretch: 2.5,
            replay_threshold: 0.3,
        }
    }
}

impl SimConfig {
    pub fn prompt_limits(&self) -> PromptLimits {
        PromptLimits {
            max_tasks: self.task_cap,
            inbox_window: self.inbox_window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEventKind {
    System,
    AgentAction,
    RouterDecision,
    TickComplete,
}

/// One line of the host-facing event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    pub message: String,
    pub timestamp_ms: u64,
}

/// Organization-wide counters after a tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    pub tick: u64,
    pub active_agents: usize,
    pub tasks_by_status: BTreeMap<String, usize>,
    pub credits_earned: u64,
    pub credits_spent: u64,
    pub messages_sent: usize,
}

impl TickMetrics {
    fn snapshot(tick: u64, org: &Organization) -> Self {
        let mut tasks_by_status = BTreeMap::new();
        for task in org.tasks() {
            *tasks_by_status.entry(task.status.as_str().to_string()).or_insert(0) += 1;
        }
        Self {
            tick,
            active_agents: org.agents().iter().filter(|a| a.is_on_duty()).count(),
            tasks_by_status,
            credits_earned: org.agents().iter().map(|a| a.stats.credits_earned).sum(),
            credits_spent: org.agents().iter().map(|a| a.stats.credits_spent).sum(),
            messages_sent: org.messages().len(),
        }
    }
    
    pub fn tasks_in(&self, status: TaskStatus) -> usize {
        self.tasks_by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// A decision that reached the executor this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickDecision {
    pub agent: AgentId,
    pub strategy: &'static str,
    pub action: Action,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub decisions: Vec<TickDecision>,
    /// Strategy failures deferred to the rule-based pass
    pub failures: usize,
    pub metrics: TickMetrics,
    pub violation: Option<InvariantViolation>,
}

impl TickReport {
    pub fn applied(&self) -> usize {
        self.decisions.iter().filter(|d| d.outcome.is_applied()).count()
    }
}

/// The organization plus everything that drives it.
pub struct Simulation<Ctx: OrgContext> {
    config: SimConfig,
    ctx: Arc<Ctx>,
    org: Organization,
    /// Organization as constructed, for restarts
    initial: Organization,
    ids: TaskIdAllocator,
    tick: u64,
    /// Tried in order before the rule-based pass
    strategies: Vec<Box<dyn DecisionStrategy>>,
    rules: DeterministicStrategy,
    router: Option<ModelRouter<Ctx>>,
    hook_rng: SeededRng,
    recorder: Option<DecisionRecorder>,
    events: Vec<SimEvent>,
    history: Vec<TickMetrics>,
    violations: Vec<(u64, InvariantViolation)>,
}

impl<Ctx: OrgContext> Simulation<Ctx> {
    pub fn new(config: SimConfig, ctx: Arc<Ctx>, org: Organization) -> Self {
        let org = org.with_recent_cap(config.recent_cap);
        let rules = DeterministicStrategy::new(ctx.derive_rng(RULES_STREAM));
        let hook_rng = ctx.derive_rng(HOOK_STREAM);
        
        info!(
            "simulation ready: seed={} agents={} tasks={}",
            config.seed,
            org.agents().len(),
            org.tasks().len()
        );
        
        Self {
            config,
            ctx,
            initial: org.clone(),
            org,
            ids: TaskIdAllocator::new(),
            tick: 0,
            strategies: Vec::new(),
            rules,
            router: None,
            hook_rng,
            recorder: None,
            events: Vec::new(),
            history: Vec::new(),
            violations: Vec::new(),
        }
    }
    
    /// Appends a strategy. Earlier strategies get first pick of agents.
    pub fn with_strategy(mut self, strategy: Box<dyn DecisionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }
    
    /// Enables the router hook over the default providers.
    pub fn with_router(mut self) -> Self {
        self.router = Some(ModelRouter::new(self.ctx.clone()));
        self
    }
    
    pub fn with_recorder(mut self, recorder: DecisionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
    
    // =========================================================================
    // SNAPSHOTS
    // =========================================================================
    
    pub fn config(&self) -> &SimConfig {
        &self.config
    }
    
    pub fn tick(&self) -> u64 {
        self.tick
    }
    
    pub fn org(&self) -> &Organization {
        &self.org
    }
    
    pub fn agents(&self) -> &[Agent] {
        self.org.agents()
    }
    
    pub fn tasks(&self) -> &[Task] {
        self.org.tasks()
    }
    
    pub fn recent_messages(&self, limit: usize) -> &[AcpMessage] {
        self.org.recent_messages(limit)
    }
    
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }
    
    pub fn metrics_history(&self) -> &[TickMetrics] {
        &self.history
    }
    
    pub fn violations(&self) -> &[(u64, InvariantViolation)] {
        &self.violations
    }
    
    pub fn router(&self) -> Option<&ModelRouter<Ctx>> {
        self.router.as_ref()
    }
    
    pub fn router_mut(&mut self) -> Option<&mut ModelRouter<Ctx>> {
        self.router.as_mut()
    }
    
    pub fn recorder(&self) -> Option<&DecisionRecorder> {
        self.recorder.as_ref()
    }
    
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
    
    // =========================================================================
    // HOST ENTRY POINTS
    // =========================================================================
    
    /// Turns a free-text order into backlog work for the root agent.
    ///
    /// Returns the ids of the created tasks.
    pub fn submit_order(&mut self, order: &str) -> Vec<TaskId> {
        let Some(root) = self.org.root().map(|a| a.id.clone()) else {
            warn!("order ignored: organization has no root agent");
            return Vec::new();
        };
        
        let now = self.now_ms();
        let mut created = Vec::new();
        for def in parse_order_into_tasks(order) {
            let id = self.ids.next(DecisionSource::Deterministic);
            let task = Task::new(id.clone(), def.title, &root, now)
                .with_priority(def.priority)
                .with_domain(def.domain);
            self.org.add_task(task);
            created.push(id);
        }
        
        let mut notice = AcpMessage::new(
            self.ctx.as_ref(),
            MessageType::Delegation,
            &AgentId::new(PRINCIPAL),
            &root,
            format!("Order: {}", order.trim()),
        );
        if let Some(first) = created.first() {
            notice = notice.with_task(first);
        }
        deliver(&mut self.org, notice);
        
        for strategy in &mut self.strategies {
            strategy.on_order(order, self.tick);
        }
        if let Some(recorder) = self.recorder.as_mut() {
            if recorder.is_empty() {
                recorder.set_scenario(order.trim());
            }
        }
        
        info!("order received: {} task(s) created", created.len());
        self.log_event(
            SimEventKind::System,
            Some(root),
            format!("Order received ({} tasks): {}", created.len(), order.trim()),
        );
        created
    }
    
    /// Back to tick 0 with no work. `full` keeps the whole initial
    /// organization; otherwise only the root stays and everyone else
    /// returns to the roster.
    pub fn restart(&mut self, full: bool) {
        self.org = self.initial.clone();
        self.org.clear_work();
        if !full {
            self.org.reset_to_root();
        }
        self.ids.reset();
        self.tick = 0;
        self.events.clear();
        self.history.clear();
        self.violations.clear();
        self.rules = DeterministicStrategy::new(self.ctx.derive_rng(RULES_STREAM));
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.clear();
        }
        
        let mode = if full { "full" } else { "organic" };
        info!("simulation restarted ({})", mode);
        self.log_event(SimEventKind::System, None, format!("Simulation restarted ({})", mode));
    }
    
    /// Writes the recorded decisions to `dir`. `None` when nothing was recorded.
    pub fn save_recording(&self, dir: &Path) -> Result<Option<PathBuf>, SimError> {
        let Some(recorder) = self.recorder.as_ref().filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        let recorded = DateTime::<Utc>::from(self.ctx.system_time());
        let path = recorder.save(dir, recorded)?;
        info!("recording saved: {} ({} decisions)", path.display(), recorder.len());
        Ok(Some(path))
    }
    
    // =========================================================================
    // SCHEDULER
    // =========================================================================
    
    /// Runs `ticks` ticks, sleeping `tick_interval` between them.
    pub async fn run(&mut self, ticks: u64) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(ticks as usize);
        for _ in 0..ticks {
            reports.push(self.run_tick().await);
            if !self.config.tick_interval.is_zero() {
                self.ctx.sleep(self.config.tick_interval).await;
            }
        }
        reports
    }
    
    pub async fn run_tick(&mut self) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        let mut handled: HashSet<AgentId> = HashSet::new();
        let mut decisions = Vec::new();
        let mut failures = 0;
        // The rules read tick-start state so work handed out this tick
        // waits for the next one
        let start = self.org.clone();
        
        let mut strategies = std::mem::take(&mut self.strategies);
        for strategy in strategies.iter_mut() {
            if !strategy.is_active(tick) || !strategy.prepare().await {
                continue;
            }
            let candidates = self.candidates(|a| strategy.eligible(a), &handled);
            
            let proposals = match strategy.mode() {
                PassMode::Batch => strategy.decide(&self.org, tick, &candidates).await,
                PassMode::Sequential => {
                    // each agent sees the effects of the previous one
                    for id in &candidates {
                        for proposal in strategy.decide(&self.org, tick, std::slice::from_ref(id)).await {
                            if let Some(done) = self.apply(proposal, &**strategy, &mut handled, &mut failures) {
                                decisions.push(done);
                            }
                        }
                    }
                    Vec::new()
                }
            };
            for proposal in proposals {
                if let Some(done) = self.apply(proposal, &**strategy, &mut handled, &mut failures) {
                    decisions.push(done);
                }
            }
        }
        self.strategies = strategies;
        
        // Rule-based pass over everyone left; agents hired this tick sit it out
        for id in self.candidates(Agent::is_on_duty, &handled) {
            let decision = match start.agent(&id) {
                Some(agent) => self.rules.decide_for(&start, agent),
                None => None,
            };
            match decision {
                Some(decision) => {
                    let proposal = Proposal::decided(&id, Decided::free(decision));
                    if let Some(done) = self.apply_as(proposal, "deterministic", DecisionSource::Deterministic, &mut handled, &mut failures) {
                        decisions.push(done);
                    }
                }
                None => self.end_turn(&id, None),
            }
        }
        
        self.route_busy_agents(tick);
        self.org.refresh_statuses();
        
        let violation = self.org.check_invariants().err();
        if let Some(v) = &violation {
            error!("tick {}: invariant violated: {}", tick, v);
            self.violations.push((tick, v.clone()));
        }
        
        let metrics = TickMetrics::snapshot(tick, &self.org);
        self.history.push(metrics.clone());
        
        let applied = decisions.iter().filter(|d: &&TickDecision| d.outcome.is_applied()).count();
        debug!("tick {}: {} decisions ({} applied), {} deferred", tick, decisions.len(), applied, failures);
        self.log_event(
            SimEventKind::TickComplete,
            None,
            format!("Tick {} complete: {} decisions, {} applied", tick, decisions.len(), applied),
        );
        
        TickReport {
            tick,
            decisions,
            failures,
            metrics,
            violation,
        }
    }
    
    /// On-duty agents matching `eligible`, level descending then id ascending.
    fn candidates<F>(&self, eligible: F, handled: &HashSet<AgentId>) -> Vec<AgentId>
    where
        F: Fn(&Agent) -> bool,
    {
        let mut agents: Vec<&Agent> = self
            .org
            .agents()
            .iter()
            .filter(|a| a.is_on_duty() && !handled.contains(&a.id) && eligible(a))
            .collect();
        agents.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id)));
        agents.into_iter().map(|a| a.id.clone()).collect()
    }
    
    fn apply(
        &mut self,
        proposal: Proposal,
        strategy: &dyn DecisionStrategy,
        handled: &mut HashSet<AgentId>,
        failures: &mut usize,
    ) -> Option<TickDecision> {
        self.apply_as(proposal, strategy.name(), strategy.source(), handled, failures)
    }
    
    fn apply_as(
        &mut self,
        proposal: Proposal,
        strategy: &'static str,
        source: DecisionSource,
        handled: &mut HashSet<AgentId>,
        failures: &mut usize,
    ) -> Option<TickDecision> {
        let agent_id = proposal.agent;
        let decided = match proposal.result {
            Ok(decided) => decided,
            Err(e) => {
                warn!("{}: {} decision failed, deferring: {}", agent_id, strategy, e);
                *failures += 1;
                return None;
            }
        };
        if !handled.insert(agent_id.clone()) {
            debug!("{}: second {} decision this tick ignored", agent_id, strategy);
            return None;
        }
        
        let decision = decided.decision;
        let outcome = {
            let mut cx = ExecutionContext {
                org: &mut self.org,
                ids: &mut self.ids,
                source,
                ctx: self.ctx.as_ref(),
            };
            execute_decision(&agent_id, &decision, &mut cx)
        };
        
        if source == DecisionSource::Model && decision.action != Action::Idle {
            if let (Some(recorder), Some(agent)) = (self.recorder.as_mut(), self.org.agent(&agent_id)) {
                recorder.record(agent, &decision, self.tick, decided.tokens, decided.duration_ms);
            }
        }
        
        if let Some(agent) = self.org.agent_mut(&agent_id) {
            agent.stats.credits_spent += decided.tokens;
        }
        self.end_turn(&agent_id, Some(&outcome));
        
        let name = self
            .org
            .agent(&agent_id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| agent_id.to_string());
        let summary = match &outcome {
            ExecutionOutcome::Dropped { reason, .. } => format!("{} [{}] {} dropped: {}", name, strategy, decision.action, reason),
            _ if decision.message.is_empty() => format!("{} [{}] {}", name, strategy, decision.action),
            _ => format!("{} [{}] {}: {}", name, strategy, decision.action, decision.message),
        };
        self.log_event(SimEventKind::AgentAction, Some(agent_id.clone()), summary);
        
        Some(TickDecision {
            agent: agent_id,
            strategy,
            action: decision.action,
            outcome,
        })
    }
    
    /// Drains the agent's inbox; stamps the tick when something was applied.
    fn end_turn(&mut self, agent_id: &AgentId, outcome: Option<&ExecutionOutcome>) {
        let tick = self.tick;
        if let Some(agent) = self.org.agent_mut(agent_id) {
            agent.inbox.clear();
            if outcome.is_some_and(ExecutionOutcome::is_applied) {
                agent.last_acted_tick = Some(tick);
            }
        }
    }
    
    /// Routes a few agents holding assigned or in-progress work through the model router.
    fn route_busy_agents(&mut self, tick: u64) {
        let Some(router) = self.router.as_mut() else {
            return;
        };
        
        let busy: Vec<(AgentId, Role, u8)> = self
            .org
            .agents()
            .iter()
            .filter(|a| a.is_on_duty() && self.org.is_loaded(&a.id))
            .take(ROUTED_PER_TICK)
            .map(|a| (a.id.clone(), a.role, a.level))
            .collect();
        
        let mut routed = Vec::new();
        for (id, role, level) in busy {
            let task_type = match role {
                Role::Coo => TaskType::Delegation,
                Role::Lead => TaskType::Analysis,
                _ => self.hook_rng.pick(&TaskType::ALL).copied().unwrap_or(TaskType::Simple),
            };
            let request = RouteRequest::new(&id, level, task_type).prefer_local(level <= LOCAL_LEVEL);
            let decision = router.route(&request);
            routed.push((
                id,
                format!(
                    "{} -> {}/{} ({}): {}",
                    task_type.as_str(),
                    decision.provider,
                    decision.model,
                    decision.latency_estimate_ms,
                    decision.reason
                ),
            ));
        }
        
        for (id, message) in routed {
            debug!("tick {}: routed {}: {}", tick, id, message);
            self.log_event(SimEventKind::RouterDecision, Some(id), message);
        }
    }
    
    fn now_ms(&self) -> u64 {
        self.ctx.now().as_millis() as u64
    }
    
    fn log_event(&mut self, kind: SimEventKind, agent: Option<AgentId>, message: String) {
        let timestamp_ms = self.now_ms();
        self.events.push(SimEvent {
            tick: self.tick,
            kind,
            agent,
            message,
            timestamp_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::strategy::StrategyError;
    use async_trait::async_trait;
    use orgsim_core::{AgentDecision, Priority};
    use std::sync::Mutex;
    
    fn pair_org() -> Organization {
        let mut org = Organization::new();
        org.add_agent(Agent::new("maya", "Maya Patel", Role::Lead, 9, "engineering")).unwrap();
        org.add_agent(Agent::new("will", "Will Ortiz", Role::Worker, 3, "engineering").with_parent(&"maya".into()))
            .unwrap();
        org.add_task(
            Task::new(TaskId::new("TASK-0900"), "Build the login API", &"maya".into(), 0).with_priority(Priority::High),
        );
        org
    }
    
    fn sim(org: Organization) -> Simulation<SimContext> {
        Simulation::new(SimConfig::default(), SimContext::shared(42), org)
    }
    
    /// Returns the same decision for every agent it is handed.
    struct Fixed {
        source: DecisionSource,
        decision: Option<AgentDecision>,
        min_level: u8,
        orders: Arc<Mutex<Vec<(String, u64)>>>,
        /// (tick, agents handed over) per decide call
        calls: Arc<Mutex<Vec<(u64, usize)>>>,
    }
    
    impl Fixed {
        fn new(source: DecisionSource, decision: Option<AgentDecision>, min_level: u8) -> Self {
            Self {
                source,
                decision,
                min_level,
                orders: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }
    
    #[async_trait]
    impl DecisionStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        
        fn source(&self) -> DecisionSource {
            self.source
        }
        
        fn mode(&self) -> PassMode {
            PassMode::Batch
        }
        
        fn eligible(&self, agent: &Agent) -> bool {
            agent.level >= self.min_level
        }
        
        fn on_order(&mut self, order: &str, tick: u64) {
            self.orders.lock().unwrap().push((order.to_string(), tick));
        }
        
        async fn decide(&mut self, _org: &Organization, tick: u64, agents: &[AgentId]) -> Vec<Proposal> {
            self.calls.lock().unwrap().push((tick, agents.len()));
            agents
                .iter()
                .map(|id| match &self.decision {
                    Some(d) => Proposal::decided(
                        id,
                        Decided {
                            decision: d.clone(),
                            tokens: 50,
                            duration_ms: 120,
                        },
                    ),
                    None => Proposal::failed(id, StrategyError::Unavailable),
                })
                .collect()
        }
    }
    
    #[tokio::test]
    async fn test_rules_move_work_through_the_pair() {
        let mut sim = sim(pair_org());
        let task = TaskId::new("TASK-0900");
        
        let first = sim.run_tick().await;
        let actions: Vec<(&str, Action)> = first.decisions.iter().map(|d| (d.agent.as_str(), d.action)).collect();
        // will decides on tick-start state, where it holds nothing yet
        assert_eq!(actions, vec![("maya", Action::Delegate), ("will", Action::Escalate)]);
        assert_eq!(sim.org().task(&task).unwrap().status, TaskStatus::Assigned);
        assert_eq!(sim.org().agent(&"will".into()).unwrap().status, orgsim_core::AgentStatus::Busy);
        
        let second = sim.run_tick().await;
        assert_eq!(second.decisions.len(), 1);
        assert_eq!(second.decisions[0].action, Action::Complete);
        let done = sim.org().task(&task).unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert!(done.started);
        assert_eq!(second.metrics.tasks_in(TaskStatus::Done), 1);
        assert_eq!(sim.metrics_history().len(), 2);
        
        // will already reported in since its last delegation
        let third = sim.run_tick().await;
        assert!(third.decisions.is_empty());
        assert!(sim.violations().is_empty());
    }
    
    #[tokio::test]
    async fn test_task_handed_out_mid_tick_waits_for_next_tick() {
        let delegate = AgentDecision::new(Action::Delegate).with_target("will").with_task("TASK-0900");
        let mut sim = sim(pair_org()).with_strategy(Box::new(Fixed::new(DecisionSource::Model, Some(delegate), 7)));
        
        let report = sim.run_tick().await;
        let will = report.decisions.iter().find(|d| d.agent == AgentId::new("will")).unwrap();
        assert_eq!(will.strategy, "deterministic");
        assert_eq!(will.action, Action::Escalate);
        assert_eq!(sim.org().task(&TaskId::new("TASK-0900")).unwrap().status, TaskStatus::Assigned);
    }
    
    #[tokio::test]
    async fn test_failed_strategy_defers_to_rules() {
        let mut sim = sim(pair_org()).with_strategy(Box::new(Fixed::new(DecisionSource::Model, None, 7)));
        let report = sim.run_tick().await;
        
        assert_eq!(report.failures, 1);
        assert_eq!(report.decisions[0].strategy, "deterministic");
        assert_eq!(report.decisions[0].action, Action::Delegate);
    }
    
    #[tokio::test]
    async fn test_strategy_decision_skips_rules_and_is_recorded() {
        let ping = AgentDecision::new(Action::Message).with_target("Will").with_message("status?");
        let mut sim = sim(pair_org())
            .with_strategy(Box::new(Fixed::new(DecisionSource::Model, Some(ping), 7)))
            .with_recorder(DecisionRecorder::new("pair", "test-model"));
        
        let report = sim.run_tick().await;
        let maya = AgentId::new("maya");
        
        assert_eq!(report.decisions[0].strategy, "fixed");
        assert_eq!(report.decisions[0].action, Action::Message);
        // maya did not also delegate, so will only reports in
        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.decisions[1].strategy, "deterministic");
        assert_eq!(report.decisions[1].action, Action::Escalate);
        assert_eq!(sim.org().task(&TaskId::new("TASK-0900")).unwrap().status, TaskStatus::Backlog);
        assert_eq!(sim.org().agent(&maya).unwrap().stats.credits_spent, 50);
        assert_eq!(sim.org().agent(&maya).unwrap().last_acted_tick, Some(1));
        
        let recorder = sim.recorder().unwrap();
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.records()[0].entry.agent_name, "Maya Patel");
    }
    
    #[tokio::test]
    async fn test_submit_order_creates_root_backlog() {
        let fixed = Fixed::new(DecisionSource::Replay, None, 99);
        let orders = fixed.orders.clone();
        let mut sim = sim(pair_org()).with_strategy(Box::new(fixed));
        sim.run_tick().await;
        
        let created = sim.submit_order("1) Write the pricing report. 2) Launch the landing page.");
        assert_eq!(created, vec![TaskId::new("TASK-0001"), TaskId::new("TASK-0002")]);
        
        let task = sim.org().task(&created[0]).unwrap();
        assert_eq!(task.creator_id, AgentId::new("maya"));
        assert_eq!(task.status, TaskStatus::Backlog);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.domain, "finance");
        
        // the order notice wakes the event-driven root
        assert!(sim.org().agent(&"maya".into()).unwrap().is_awake());
        assert_eq!(orders.lock().unwrap().as_slice(), &[("1) Write the pricing report. 2) Launch the landing page.".to_string(), 1)]);
        assert_eq!(sim.events().last().unwrap().kind, SimEventKind::System);
    }
    
    #[tokio::test]
    async fn test_batch_strategy_called_without_candidates() {
        let nobody = Fixed::new(DecisionSource::Replay, None, 99);
        let calls = nobody.calls.clone();
        let mut sim = sim(pair_org()).with_strategy(Box::new(nobody));
        sim.run(2).await;
        
        assert_eq!(calls.lock().unwrap().as_slice(), &[(1, 0), (2, 0)]);
    }
    
    #[tokio::test]
    async fn test_inbox_drained_after_turn() {
        let mut sim = sim(pair_org());
        sim.submit_order("Fix the checkout bug");
        assert!(!sim.org().agent(&"maya".into()).unwrap().inbox.is_empty());
        
        sim.run_tick().await;
        assert!(sim.org().agent(&"maya".into()).unwrap().inbox.is_empty());
    }
    
    #[tokio::test]
    async fn test_restart_modes() {
        let mut sim = sim(pair_org());
        sim.run(3).await;
        assert_eq!(sim.tick(), 3);
        
        sim.restart(true);
        assert_eq!(sim.tick(), 0);
        assert!(sim.tasks().is_empty());
        assert_eq!(sim.agents().len(), 2);
        assert!(sim.metrics_history().is_empty());
        
        sim.restart(false);
        assert_eq!(sim.agents().len(), 1);
        assert_eq!(sim.org().roster().len(), 1);
        assert_eq!(sim.submit_order("Fix the checkout bug"), vec![TaskId::new("TASK-0001")]);
    }
    
    #[tokio::test]
    async fn test_router_hook_logs_routes() {
        let mut sim = sim(pair_org()).with_router();
        sim.run_tick().await;
        
        let routed: Vec<&SimEvent> = sim
            .events()
            .iter()
            .filter(|e| e.kind == SimEventKind::RouterDecision)
            .collect();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].agent, Some(AgentId::new("will")));
        assert_eq!(sim.router().unwrap().metrics().total_requests, 1);
        // level 3 asks for local
        assert!(routed[0].message.contains("ollama"));
    }
    
    #[tokio::test]
    async fn test_save_recording_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sim = sim(pair_org()).with_recorder(DecisionRecorder::new("pair", "m"));
        assert_eq!(sim.save_recording(dir.path()).unwrap(), None);
    }
}
