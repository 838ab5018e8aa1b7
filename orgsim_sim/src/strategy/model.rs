//! Model-backed decisions through the unified LM client.

use super::{Decided, DecisionStrategy, PassMode, Proposal, StrategyError};
use crate::llm::UnifiedClient;
use crate::prompt::{build_agent_prompt, PromptLimits};
use async_trait::async_trait;
use orgsim_core::org::MANAGER_LEVEL;
use orgsim_core::{parse_decision, Agent, AgentDecision, AgentId, DecisionSource, Organization};
use orgsim_env::{InferenceTransport, OrgContext};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ModelStrategy<Ctx: OrgContext, T: InferenceTransport> {
    client: Arc<UnifiedClient<Ctx, T>>,
    /// Agents below this level are left to the rules
    min_level: u8,
    limits: PromptLimits,
    /// Cached reachability probe
    reachable: Option<bool>,
    /// Last order received, used to name recordings
    last_order: Option<String>,
}

impl<Ctx: OrgContext, T: InferenceTransport> ModelStrategy<Ctx, T> {
    pub fn new(client: Arc<UnifiedClient<Ctx, T>>) -> Self {
        Self {
            client,
            min_level: MANAGER_LEVEL,
            limits: PromptLimits::default(),
            reachable: None,
            last_order: None,
        }
    }
    
    pub fn with_min_level(mut self, level: u8) -> Self {
        self.min_level = level;
        self
    }
    
    pub fn with_limits(mut self, limits: PromptLimits) -> Self {
        self.limits = limits;
        self
    }
    
    pub fn last_order(&self) -> Option<&str> {
        self.last_order.as_deref()
    }
    
    /// Model name reported in recordings.
    pub fn model_name(&self) -> String {
        self.client.model_for(self.min_level).to_string()
    }
}

#[async_trait]
impl<Ctx: OrgContext, T: InferenceTransport> DecisionStrategy for ModelStrategy<Ctx, T> {
    fn name(&self) -> &'static str {
        "model"
    }
    
    fn source(&self) -> DecisionSource {
        DecisionSource::Model
    }
    
    fn mode(&self) -> PassMode {
        PassMode::Batch
    }
    
    fn eligible(&self, agent: &Agent) -> bool {
        agent.is_on_duty() && agent.is_awake() && agent.level >= self.min_level
    }
    
    fn is_active(&self, _tick: u64) -> bool {
        self.reachable != Some(false)
    }
    
    async fn prepare(&mut self) -> bool {
        if let Some(reachable) = self.reachable {
            return reachable;
        }
        let reachable = self.client.probe().await;
        if reachable {
            info!("LLM provider ready: {}", self.client.config().describe());
        } else {
            warn!(
                "LLM provider unreachable ({}), rules only",
                self.client.config().describe()
            );
        }
        self.reachable = Some(reachable);
        reachable
    }
    
    fn on_order(&mut self, order: &str, _tick: u64) {
        self.last_order = Some(order.to_string());
    }
    
    async fn decide(&mut self, org: &Organization, _tick: u64, agents: &[AgentId]) -> Vec<Proposal> {
        if self.reachable == Some(false) {
            return Vec::new();
        }
        
        // Prompts are built against the tick-start state
        let requests: Vec<(AgentId, String, u8, String, String)> = agents
            .iter()
            .filter_map(|id| org.agent(id))
            .map(|a| {
                let prompt = build_agent_prompt(org, a, self.limits);
                (a.id.clone(), a.name.clone(), a.level, a.system_prompt.clone(), prompt)
            })
            .collect();
        
        let client = &self.client;
        let calls = requests.iter().map(|(_, name, level, system, prompt)| {
            client.chat(name, *level, system, prompt)
        });
        let replies = futures::future::join_all(calls).await;
        
        requests
            .iter()
            .zip(replies)
            .map(|((id, _, _, _, _), reply)| match reply {
                Ok(reply) if reply.rate_limited => {
                    Proposal::decided(id, Decided::free(AgentDecision::idle("rate limited")))
                }
                Ok(reply) => match parse_decision(&reply.content) {
                    Ok(decision) => Proposal::decided(
                        id,
                        Decided {
                            decision,
                            tokens: reply.tokens,
                            duration_ms: reply.duration_ms,
                        },
                    ),
                    Err(e) => Proposal::failed(id, StrategyError::Parse(e)),
                },
                Err(e) => Proposal::failed(id, StrategyError::Llm(e)),
            })
            .collect()
    }
}
