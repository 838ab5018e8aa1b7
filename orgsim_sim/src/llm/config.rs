//! LM provider configuration, read from the environment.

use super::error::RetryConfig;
use orgsim_core::org::MANAGER_LEVEL;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Inference backends the unified client can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
    OpenRouter,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenRouter => "openrouter",
            Provider::Ollama => "ollama",
        }
    }
    
    pub fn is_cloud(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "openrouter" => Ok(Provider::OpenRouter),
            "ollama" => Ok(Provider::Ollama),
            other => Err(format!("unknown LLM provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    
    pub groq_api_key: Option<String>,
    pub groq_url: String,
    pub groq_model: String,
    
    pub openrouter_api_key: Option<String>,
    pub openrouter_url: String,
    pub openrouter_model: String,
    /// Used for agents at manager level and above
    pub openrouter_manager_model: String,
    
    pub ollama_url: String,
    pub ollama_model: String,
    
    /// Hard per-call timeout
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Concurrency gate width when running against Ollama
    pub max_concurrent_local: usize,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl LlmConfig {
    /// Reads `LLM_PROVIDER`, `GROQ_*`, `OPENROUTER_*`, `OLLAMA_URL`,
    /// `SANDBOX_MODEL` and `LLM_*` tuning variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
    
    /// Builds a config from an arbitrary key lookup.
    ///
    /// Provider priority: explicit `LLM_PROVIDER`, then a Groq key, then an
    /// OpenRouter key, then local Ollama.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        
        let groq_api_key = get("GROQ_API_KEY");
        let openrouter_api_key = get("OPENROUTER_API_KEY");
        let provider = get("LLM_PROVIDER")
            .and_then(|p| p.parse().ok())
            .unwrap_or(if groq_api_key.is_some() {
                Provider::Groq
            } else if openrouter_api_key.is_some() {
                Provider::OpenRouter
            } else {
                Provider::Ollama
            });
        
        let openrouter_model = get("OPENROUTER_MODEL").unwrap_or_else(|| "google/gemma-3n-e2b-it:free".to_string());
        let default_timeout_ms = if provider.is_cloud() { 30_000 } else { 10_000 };
        
        Self {
            provider,
            groq_api_key,
            groq_url: "https://api.groq.com/openai/v1".to_string(),
            groq_model: get("GROQ_MODEL").unwrap_or_else(|| "llama-3.1-8b-instant".to_string()),
            openrouter_api_key,
            openrouter_url: get("OPENROUTER_URL").unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            openrouter_manager_model: get("OPENROUTER_MANAGER_MODEL").unwrap_or_else(|| openrouter_model.clone()),
            openrouter_model,
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string()),
            ollama_model: get("SANDBOX_MODEL").unwrap_or_else(|| "qwen2.5:7b".to_string()),
            timeout: Duration::from_millis(
                get("LLM_TIMEOUT_MS").and_then(|v| v.parse().ok()).unwrap_or(default_timeout_ms),
            ),
            max_tokens: get("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()).unwrap_or(256),
            temperature: get("LLM_TEMPERATURE").and_then(|v| v.parse().ok()).unwrap_or(0.7),
            max_concurrent_local: 8,
            retry: RetryConfig::default(),
        }
    }
    
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }
    
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
    
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
    
    /// Concurrency gate width: narrower for rate-limited cloud providers.
    pub fn gate_width(&self) -> usize {
        match self.provider {
            Provider::Groq => 4,
            Provider::OpenRouter => 2,
            Provider::Ollama => self.max_concurrent_local.max(1),
        }
    }
    
    /// Model used for an agent at `level`.
    pub fn model_for(&self, level: u8) -> &str {
        match self.provider {
            Provider::Groq => &self.groq_model,
            Provider::OpenRouter if level >= MANAGER_LEVEL => &self.openrouter_manager_model,
            Provider::OpenRouter => &self.openrouter_model,
            Provider::Ollama => &self.ollama_model,
        }
    }
    
    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::Groq => self.groq_api_key.as_deref(),
            Provider::OpenRouter => self.openrouter_api_key.as_deref(),
            Provider::Ollama => None,
        }
    }
    
    /// One-line description for startup logs.
    pub fn describe(&self) -> String {
        match self.provider {
            Provider::Groq => format!("Groq (model: {})", self.groq_model),
            Provider::OpenRouter => format!(
                "OpenRouter (workers: {}, managers: {})",
                self.openrouter_model, self.openrouter_manager_model
            ),
            Provider::Ollama => format!("Ollama (local, model: {})", self.ollama_model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    
    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }
    
    #[test]
    fn test_defaults_to_local() {
        let c = LlmConfig::default();
        assert_eq!(c.provider, Provider::Ollama);
        assert_eq!(c.gate_width(), 8);
        assert_eq!(c.timeout, Duration::from_millis(10_000));
        assert_eq!(c.retry.max_retries, 3);
    }
    
    #[test]
    fn test_provider_priority() {
        let c = LlmConfig::from_lookup(lookup(&[("GROQ_API_KEY", "g"), ("OPENROUTER_API_KEY", "o")]));
        assert_eq!(c.provider, Provider::Groq);
        assert_eq!(c.gate_width(), 4);
        
        let c = LlmConfig::from_lookup(lookup(&[("OPENROUTER_API_KEY", "o")]));
        assert_eq!(c.provider, Provider::OpenRouter);
        assert_eq!(c.gate_width(), 2);
        
        let c = LlmConfig::from_lookup(lookup(&[("GROQ_API_KEY", "g"), ("LLM_PROVIDER", "ollama")]));
        assert_eq!(c.provider, Provider::Ollama);
    }
    
    #[test]
    fn test_manager_model_split() {
        let c = LlmConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "o"),
            ("OPENROUTER_MODEL", "small"),
            ("OPENROUTER_MANAGER_MODEL", "big"),
            ("LLM_TIMEOUT_MS", "1500"),
        ]));
        assert_eq!(c.model_for(3), "small");
        assert_eq!(c.model_for(9), "big");
        assert_eq!(c.timeout, Duration::from_millis(1500));
    }
}
