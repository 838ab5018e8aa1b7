//! Scenario runner - builds a simulation from a built-in scenario, feeds
//! it orders, runs it and summarizes the outcome.

use crate::context::SimContext;
use crate::error::SimError;
use crate::recorder::DecisionRecorder;
use crate::scenarios::ScenarioId;
use crate::strategy::DecisionStrategy;
use crate::world::{SimConfig, Simulation, TickMetrics};

use orgsim_core::{ExecutionOutcome, RouterMetrics};
use orgsim_env::OrgContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether the organization invariants held after every tick
    pub passed: bool,
    
    /// Total ticks executed
    pub total_ticks: u64,
    
    /// First invariant violation, if any
    pub failure_reason: Option<String>,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
    
    /// Transcript written at the end of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<PathBuf>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Decisions that reached the executor
    pub decisions: usize,
    
    pub applied: usize,
    
    /// Decisions the executor logged and dropped
    pub dropped: usize,
    
    /// Strategy failures handed to the rule-based pass
    pub deferred: usize,
    
    /// Decisions per strategy name
    pub by_strategy: BTreeMap<String, usize>,
    
    /// Counters after the last tick
    pub last_tick: TickMetrics,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterMetrics>,
}

/// Runs built-in scenarios.
pub struct ScenarioRunner<Ctx: OrgContext> {
    config: SimConfig,
    ctx: Arc<Ctx>,
    orders: Vec<String>,
    strategies: Vec<Box<dyn DecisionStrategy>>,
    router: bool,
    recorder: Option<(DecisionRecorder, PathBuf)>,
}

impl ScenarioRunner<SimContext> {
    /// Creates a runner on a virtual clock seeded from the config.
    pub fn simulated(config: SimConfig) -> Self {
        let ctx = SimContext::shared(config.seed);
        Self::new(config, ctx)
    }
}

impl<Ctx: OrgContext> ScenarioRunner<Ctx> {
    pub fn new(config: SimConfig, ctx: Arc<Ctx>) -> Self {
        Self {
            config,
            ctx,
            orders: Vec::new(),
            strategies: Vec::new(),
            router: false,
            recorder: None,
        }
    }
    
    /// Context shared with strategies built by the caller.
    pub fn ctx(&self) -> Arc<Ctx> {
        self.ctx.clone()
    }
    
    pub fn config(&self) -> &SimConfig {
        &self.config
    }
    
    /// Queues an order submitted before the first tick.
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.orders.push(order.into());
        self
    }
    
    pub fn with_strategy(mut self, strategy: Box<dyn DecisionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }
    
    pub fn with_router(mut self, enabled: bool) -> Self {
        self.router = enabled;
        self
    }
    
    /// Records model decisions and saves them into `dir` after the run.
    pub fn with_recording(mut self, recorder: DecisionRecorder, dir: impl Into<PathBuf>) -> Self {
        self.recorder = Some((recorder, dir.into()));
        self
    }
    
    /// Runs a scenario and returns the result.
    pub async fn run(self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let seed = self.config.seed;
        let ticks = self.config.max_ticks;
        info!("Starting scenario: {} (seed={}, ticks={})", scenario.name(), seed, ticks);
        
        let org = scenario
            .build()
            .map_err(|e| SimError::Config(format!("scenario {}: {}", scenario, e)))?;
        let mut sim = Simulation::new(self.config, self.ctx, org);
        for strategy in self.strategies {
            sim = sim.with_strategy(strategy);
        }
        if self.router {
            sim = sim.with_router();
        }
        let record_dir = match self.recorder {
            Some((recorder, dir)) => {
                sim = sim.with_recorder(recorder);
                Some(dir)
            }
            None => None,
        };
        
        let orders: Vec<String> = if self.orders.is_empty() {
            scenario.default_order().map(str::to_string).into_iter().collect()
        } else {
            self.orders
        };
        for order in &orders {
            sim.submit_order(order);
        }
        
        let reports = sim.run(ticks).await;
        
        let mut metrics = ScenarioMetrics::default();
        for report in &reports {
            metrics.deferred += report.failures;
            for decision in &report.decisions {
                metrics.decisions += 1;
                match decision.outcome {
                    ExecutionOutcome::Applied { .. } => metrics.applied += 1,
                    ExecutionOutcome::Dropped { .. } => metrics.dropped += 1,
                    ExecutionOutcome::Noop => {}
                }
                *metrics.by_strategy.entry(decision.strategy.to_string()).or_insert(0) += 1;
            }
        }
        metrics.last_tick = sim.metrics_history().last().cloned().unwrap_or_default();
        metrics.router = sim.router().map(|r| r.metrics());
        
        let recording = match record_dir {
            Some(dir) => sim.save_recording(&dir)?,
            None => None,
        };
        
        let failure_reason = sim
            .violations()
            .first()
            .map(|(tick, v)| format!("tick {}: {}", tick, v));
        if let Some(reason) = &failure_reason {
            warn!("{} failed: {}", scenario.name(), reason);
        }
        
        Ok(ScenarioResult {
            scenario,
            seed,
            passed: failure_reason.is_none(),
            total_ticks: sim.tick(),
            failure_reason,
            metrics,
            recording,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn config(ticks: u64) -> SimConfig {
        SimConfig {
            max_ticks: ticks,
            ..Default::default()
        }
    }
    
    #[tokio::test]
    async fn test_pair_passes() {
        let result = ScenarioRunner::simulated(config(2)).run(ScenarioId::Pair).await.unwrap();
        
        assert!(result.passed);
        assert_eq!(result.total_ticks, 2);
        assert_eq!(result.metrics.decisions, 3);
        assert_eq!(result.metrics.by_strategy.get("deterministic"), Some(&3));
        assert_eq!(result.metrics.last_tick.tasks_in(orgsim_core::TaskStatus::Done), 1);
    }
    
    #[tokio::test]
    async fn test_startup_hires_for_default_order() {
        let result = ScenarioRunner::simulated(config(12))
            .with_router(true)
            .run(ScenarioId::Startup)
            .await
            .unwrap();
        
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.last_tick.active_agents > 1);
        assert!(result.metrics.last_tick.tasks_in(orgsim_core::TaskStatus::Done) > 0);
        assert!(result.metrics.router.is_some());
    }
    
    #[tokio::test]
    async fn test_every_scenario_holds_invariants() {
        for scenario in ScenarioId::all() {
            let result = ScenarioRunner::simulated(config(20))
                .with_order("Fix the checkout bug and publish a blog post")
                .run(scenario)
                .await
                .unwrap();
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert!(result.metrics.applied > 0);
        }
    }
}
