//! The "ROUTER" Engine - simulated provider/model selection
//!
//! Picks an inference provider and model for an agent according to a
//! three-tier policy keyed on agent level, then charges a simulated cost
//! and latency. This is a cost/latency simulator; it never calls out.
//!
//! # Tiers
//! ```text
//! level >= 9   executive  premium flagship, else best remaining
//! level >= 7   lead       budget flagship unless rate-limited, else premium
//! level <  7   worker     local (preferred or 60%), budget base model, local
//! ```

use crate::ids::AgentId;
use orgsim_env::{OrgContext, SeededRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// How many route decisions are kept for inspection.
const RECENT_DECISIONS: usize = 50;

/// Rate-limit buckets older than this many minutes are pruned.
const RATE_WINDOW_RETENTION_MIN: u64 = 5;

/// Share of unpinned worker traffic sent to the local provider.
const WORKER_LOCAL_SHARE: f64 = 0.6;

/// Per-1k input/output cost of the cloud baseline used for savings.
const CLOUD_BASELINE_COST: (f64, f64) = (0.05, 0.08);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    /// Zero-cost, on-box
    Local,
    /// Cheap cloud with a tight rate limit
    Budget,
    /// Most capable, most expensive
    Premium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
    pub context_window: u32,
    pub max_tokens: u32,
    /// The provider's best model
    pub flagship: bool,
}

impl ModelConfig {
    fn new(id: &str, name: &str, input: f64, output: f64, context_window: u32, max_tokens: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cost_per_1k_input: input,
            cost_per_1k_output: output,
            context_window,
            max_tokens,
            flagship: false,
        }
    }
    
    fn flagship(mut self) -> Self {
        self.flagship = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests per minute
    pub rpm: u32,
    /// Tokens per minute
    pub tpm: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub tier: ProviderTier,
    pub models: Vec<ModelConfig>,
    pub rate_limit: Option<RateLimit>,
    pub enabled: bool,
    /// Lower sorts first
    pub priority: u32,
    /// Simulated latency range in ms (inclusive)
    pub latency_ms: (u64, u64),
}

impl ProviderConfig {
    fn base_model(&self) -> Option<&ModelConfig> {
        self.models.first()
    }
    
    fn flagship_model(&self) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.flagship).or_else(|| self.models.first())
    }
    
    fn last_model(&self) -> Option<&ModelConfig> {
        self.models.last()
    }
}

/// The stock provider set: local Ollama, budget Groq, premium OpenRouter.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "ollama".to_string(),
            name: "Ollama (Local)".to_string(),
            base_url: "http://localhost:11434".to_string(),
            tier: ProviderTier::Local,
            models: vec![ModelConfig::new("qwen2.5:7b", "Qwen 2.5 7B", 0.0, 0.0, 32_768, 4_096)],
            rate_limit: None,
            enabled: true,
            priority: 1,
            latency_ms: (40, 150),
        },
        ProviderConfig {
            id: "groq".to_string(),
            name: "Groq".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            tier: ProviderTier::Budget,
            models: vec![
                ModelConfig::new("llama-3.1-8b-instant", "Llama 3.1 8B", 0.05, 0.08, 131_072, 8_192),
                ModelConfig::new("llama-3.1-70b-versatile", "Llama 3.1 70B", 0.59, 0.79, 131_072, 8_192).flagship(),
            ],
            rate_limit: Some(RateLimit { rpm: 30, tpm: 6_000 }),
            enabled: true,
            priority: 2,
            latency_ms: (80, 300),
        },
        ProviderConfig {
            id: "openrouter".to_string(),
            name: "OpenRouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            tier: ProviderTier::Premium,
            models: vec![
                ModelConfig::new("anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet", 3.0, 15.0, 200_000, 8_192).flagship(),
                ModelConfig::new("openai/gpt-4o", "GPT-4o", 2.5, 10.0, 128_000, 4_096),
            ],
            rate_limit: None,
            enabled: true,
            priority: 3,
            latency_ms: (200, 800),
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Delegation,
    Analysis,
    Coding,
    Simple,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Delegation,
        TaskType::Analysis,
        TaskType::Coding,
        TaskType::Simple,
    ];
    
    /// Estimated (input, output) size in thousands of tokens.
    pub fn token_estimate_k(&self) -> (f64, f64) {
        match self {
            TaskType::Analysis => (1.2, 0.2),
            TaskType::Coding => (0.8, 0.5),
            TaskType::Delegation | TaskType::Simple => (0.5, 0.2),
        }
    }
    
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Delegation => "delegation",
            TaskType::Analysis => "analysis",
            TaskType::Coding => "coding",
            TaskType::Simple => "simple",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub agent_id: AgentId,
    pub agent_level: u8,
    pub task_type: TaskType,
    pub prefer_local: bool,
    /// Downgrade to local when the estimate exceeds this
    pub max_cost: Option<f64>,
}

impl RouteRequest {
    pub fn new(agent_id: &AgentId, agent_level: u8, task_type: TaskType) -> Self {
        Self {
            agent_id: agent_id.clone(),
            agent_level,
            task_type,
            prefer_local: false,
            max_cost: None,
        }
    }
    
    pub fn prefer_local(mut self, prefer: bool) -> Self {
        self.prefer_local = prefer;
        self
    }
    
    pub fn with_max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub provider: String,
    pub model: String,
    pub reason: String,
    /// `provider/model` pairs not chosen, in provider priority order
    pub fallback_chain: Vec<String>,
    pub estimated_cost: f64,
    pub latency_estimate_ms: u64,
    pub timestamp_ms: u64,
    pub agent_id: AgentId,
    pub task_type: TaskType,
}

/// Cumulative router metrics. Reset only by constructing a new router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterMetrics {
    pub total_requests: u64,
    pub total_cost: f64,
    pub requests_by_provider: BTreeMap<String, u64>,
    pub cost_by_provider: BTreeMap<String, f64>,
    pub avg_latency_by_provider: BTreeMap<String, f64>,
    pub failures_by_provider: BTreeMap<String, u64>,
    pub fallbacks_triggered: u64,
    pub local_routed_count: u64,
    /// What the same traffic would have cost on the cloud baseline
    pub cloud_only_cost_estimate: f64,
}

impl RouterMetrics {
    /// Counterfactual savings versus routing everything to the cloud baseline.
    pub fn savings(&self) -> f64 {
        self.cloud_only_cost_estimate - self.total_cost
    }
}

/// Simulated multi-provider router.
pub struct ModelRouter<Ctx: OrgContext> {
    ctx: Arc<Ctx>,
    providers: Vec<ProviderConfig>,
    metrics: RouterMetrics,
    recent: VecDeque<RouteDecision>,
    /// (provider, minute) -> requests routed
    requests_by_minute: BTreeMap<(String, u64), u32>,
    rng: SeededRng,
}

impl<Ctx: OrgContext> ModelRouter<Ctx> {
    /// Creates a router over the default providers.
    pub fn new(ctx: Arc<Ctx>) -> Self {
        Self::with_providers(ctx, default_providers())
    }
    
    pub fn with_providers(ctx: Arc<Ctx>, providers: Vec<ProviderConfig>) -> Self {
        let rng = ctx.derive_rng(0x526f_7574);
        Self {
            ctx,
            providers,
            metrics: RouterMetrics::default(),
            recent: VecDeque::new(),
            requests_by_minute: BTreeMap::new(),
            rng,
        }
    }
    
    fn current_minute(&self) -> u64 {
        self.ctx.now().as_secs() / 60
    }
    
    fn is_rate_limited(&self, provider: &ProviderConfig) -> bool {
        let Some(limit) = provider.rate_limit else {
            return false;
        };
        let key = (provider.id.clone(), self.current_minute());
        self.requests_by_minute.get(&key).copied().unwrap_or(0) >= limit.rpm
    }
    
    /// Routes one request and records it in the metrics.
    pub fn route(&mut self, req: &RouteRequest) -> RouteDecision {
        let mut enabled: Vec<ProviderConfig> =
            self.providers.iter().filter(|p| p.enabled).cloned().collect();
        enabled.sort_by_key(|p| p.priority);
        
        let now_ms = self.ctx.now().as_millis() as u64;
        if enabled.is_empty() {
            warn!("route for {}: no providers enabled", req.agent_id);
            return RouteDecision {
                provider: "none".to_string(),
                model: "none".to_string(),
                reason: "No providers enabled".to_string(),
                fallback_chain: Vec::new(),
                estimated_cost: 0.0,
                latency_estimate_ms: 0,
                timestamp_ms: now_ms,
                agent_id: req.agent_id.clone(),
                task_type: req.task_type,
            };
        }
        
        let find = |tier: ProviderTier| enabled.iter().find(|p| p.tier == tier);
        let local = find(ProviderTier::Local);
        let budget = find(ProviderTier::Budget);
        let premium = find(ProviderTier::Premium);
        let first = &enabled[0];
        let level = req.agent_level;
        let mut fallback = false;
        
        let (provider, model, mut reason) = if level >= 9 {
            match premium {
                Some(p) => (p, p.flagship_model(), format!("L{} executive → premium model", level)),
                None => {
                    fallback = true;
                    let p = budget.unwrap_or(first);
                    (p, p.flagship_model(), format!("L{} executive → best available (premium unavailable)", level))
                }
            }
        } else if level >= 7 {
            match budget.filter(|p| !self.is_rate_limited(p)) {
                Some(p) => (p, p.flagship_model(), format!("L{} lead → mid-tier model", level)),
                None => {
                    fallback = true;
                    let p = premium.unwrap_or(first);
                    (p, p.last_model(), format!("L{} lead → fallback (budget rate-limited)", level))
                }
            }
        } else if req.prefer_local {
            match local {
                Some(p) => (p, p.base_model(), format!("L{} worker → local (preferred)", level)),
                None => {
                    fallback = true;
                    let p = budget.unwrap_or(first);
                    (p, p.base_model(), format!("L{} worker → cheapest cloud (local unavailable)", level))
                }
            }
        } else {
            let roll_local = local.is_some() && self.rng.chance(WORKER_LOCAL_SHARE);
            match (local, budget.filter(|p| !self.is_rate_limited(p))) {
                (Some(p), _) if roll_local => (p, p.base_model(), format!("L{} worker → local ($0)", level)),
                (_, Some(p)) => (p, p.base_model(), format!("L{} worker → budget base model (fast)", level)),
                (Some(p), None) => {
                    fallback = true;
                    (p, p.base_model(), format!("L{} worker → local (budget rate-limited)", level))
                }
                (None, None) => (first, first.base_model(), format!("L{} worker → only available provider", level)),
            }
        };
        
        let (input_k, output_k) = req.task_type.token_estimate_k();
        let cost_of = |m: Option<&ModelConfig>| {
            m.map(|m| m.cost_per_1k_input * input_k + m.cost_per_1k_output * output_k)
                .unwrap_or(0.0)
        };
        
        let (mut provider, mut model) = (provider, model);
        if let (Some(max_cost), Some(l)) = (req.max_cost, local) {
            if cost_of(model) > max_cost && provider.id != l.id {
                fallback = true;
                reason.push_str(" (downgraded to local: over max cost)");
                provider = l;
                model = l.base_model();
            }
        }
        
        let estimated_cost = cost_of(model);
        let (lo, hi) = provider.latency_ms;
        let latency_estimate_ms = self.rng.range_inclusive(lo, hi);
        
        let fallback_chain = enabled
            .iter()
            .filter(|p| p.id != provider.id)
            .flat_map(|p| p.models.iter().map(move |m| format!("{}/{}", p.id, m.id)))
            .collect();
        
        let decision = RouteDecision {
            provider: provider.id.clone(),
            model: model.map(|m| m.id.clone()).unwrap_or_else(|| "none".to_string()),
            reason,
            fallback_chain,
            estimated_cost,
            latency_estimate_ms,
            timestamp_ms: now_ms,
            agent_id: req.agent_id.clone(),
            task_type: req.task_type,
        };
        let tier = provider.tier;
        
        if fallback {
            self.metrics.fallbacks_triggered += 1;
        }
        self.record(&decision, tier, input_k, output_k);
        debug!("routed {} → {}/{} ({})", req.agent_id, decision.provider, decision.model, decision.reason);
        decision
    }
    
    fn record(&mut self, decision: &RouteDecision, tier: ProviderTier, input_k: f64, output_k: f64) {
        let m = &mut self.metrics;
        m.total_requests += 1;
        m.total_cost += decision.estimated_cost;
        
        let count = m.requests_by_provider.entry(decision.provider.clone()).or_insert(0);
        *count += 1;
        let n = *count as f64;
        *m.cost_by_provider.entry(decision.provider.clone()).or_insert(0.0) += decision.estimated_cost;
        
        // incremental mean
        let avg = m.avg_latency_by_provider.entry(decision.provider.clone()).or_insert(0.0);
        *avg += (decision.latency_estimate_ms as f64 - *avg) / n;
        
        if tier == ProviderTier::Local {
            m.local_routed_count += 1;
        }
        m.cloud_only_cost_estimate += CLOUD_BASELINE_COST.0 * input_k + CLOUD_BASELINE_COST.1 * output_k;
        
        let minute = self.current_minute();
        *self
            .requests_by_minute
            .entry((decision.provider.clone(), minute))
            .or_insert(0) += 1;
        self.requests_by_minute
            .retain(|(_, key_minute), _| minute.saturating_sub(*key_minute) <= RATE_WINDOW_RETENTION_MIN);
        
        self.recent.push_back(decision.clone());
        while self.recent.len() > RECENT_DECISIONS {
            self.recent.pop_front();
        }
    }
    
    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }
    
    /// Snapshot of cumulative metrics.
    pub fn metrics(&self) -> RouterMetrics {
        self.metrics.clone()
    }
    
    /// Up to `limit` most recent decisions, oldest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<RouteDecision> {
        let skip = self.recent.len().saturating_sub(limit);
        self.recent.iter().skip(skip).cloned().collect()
    }
    
    /// Enables/disables or re-prioritizes a provider. Returns false if unknown.
    pub fn update_provider(&mut self, id: &str, enabled: Option<bool>, priority: Option<u32>) -> bool {
        let Some(provider) = self.providers.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        if let Some(enabled) = enabled {
            provider.enabled = enabled;
        }
        if let Some(priority) = priority {
            provider.priority = priority;
        }
        true
    }
    
    /// Counts a failure against a provider (fault injection).
    pub fn simulate_failure(&mut self, id: &str) {
        *self.metrics.failures_by_provider.entry(id.to_string()).or_insert(0) += 1;
    }
}
