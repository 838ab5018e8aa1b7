//! Interchangeable decision sources.
//!
//! The scheduler only sees [`DecisionStrategy`]. It hands each strategy the
//! agents nobody has decided for yet this tick and executes whatever comes
//! back; agents a strategy skips or fails on fall through to the next one.

mod deterministic;
mod model;
mod replay;

pub use deterministic::DeterministicStrategy;
pub use model::ModelStrategy;
pub use replay::{tokenize, ReplayLibrary, ReplayStrategy, ScenarioMatch};

use crate::llm::LlmError;
use async_trait::async_trait;
use orgsim_core::{Agent, AgentDecision, AgentId, DecisionSource, Organization, ParseError};
use thiserror::Error;

/// How the scheduler feeds a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// One agent at a time, each seeing the effects of the previous one
    Sequential,
    /// All eligible agents at once against the tick-start state
    Batch,
}

/// Failure of one agent's decision. Never fatal to the tick.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("inference failed: {0}")]
    Llm(#[from] LlmError),
    
    #[error("unparseable response: {0}")]
    Parse(#[from] ParseError),
    
    #[error("provider unavailable")]
    Unavailable,
}

/// A decision plus what it cost to obtain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decided {
    pub decision: AgentDecision,
    pub tokens: u64,
    pub duration_ms: u64,
}

impl Decided {
    pub fn free(decision: AgentDecision) -> Self {
        Self {
            decision,
            tokens: 0,
            duration_ms: 0,
        }
    }
}

/// One agent's result from a strategy.
#[derive(Debug)]
pub struct Proposal {
    pub agent: AgentId,
    pub result: Result<Decided, StrategyError>,
}

impl Proposal {
    pub fn decided(agent: &AgentId, decided: Decided) -> Self {
        Self {
            agent: agent.clone(),
            result: Ok(decided),
        }
    }
    
    pub fn failed(agent: &AgentId, error: StrategyError) -> Self {
        Self {
            agent: agent.clone(),
            result: Err(error),
        }
    }
}

#[async_trait]
pub trait DecisionStrategy: Send {
    fn name(&self) -> &'static str;
    
    /// Id range for tasks this strategy's decisions create.
    fn source(&self) -> DecisionSource;
    
    fn mode(&self) -> PassMode {
        PassMode::Sequential
    }
    
    /// Whether `agent` may be handed to this strategy.
    fn eligible(&self, agent: &Agent) -> bool {
        agent.is_on_duty()
    }
    
    /// Whether the strategy has anything to do at `tick`.
    fn is_active(&self, _tick: u64) -> bool {
        true
    }
    
    /// One-time readiness check, cached by the strategy.
    async fn prepare(&mut self) -> bool {
        true
    }
    
    /// A free-text order was submitted at `tick`.
    fn on_order(&mut self, _order: &str, _tick: u64) {}
    
    /// Decides for (a subset of) `agents`. Agents with no proposal fall
    /// through to later strategies.
    ///
    /// Batch strategies are called every active tick, with an empty slice
    /// when nobody is eligible, so time-driven state can move on.
    async fn decide(&mut self, org: &Organization, tick: u64, agents: &[AgentId]) -> Vec<Proposal>;
}
