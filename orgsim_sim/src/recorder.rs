//! Decision recorder.
//!
//! Collects model-backed decisions during a run and writes them out in the
//! transcript format the replay library reads back.

use crate::error::SimError;
use chrono::{DateTime, Utc};
use orgsim_core::org::slugify;
use orgsim_core::{Agent, AgentDecision, AgentId, Transcript, TranscriptEntry};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const FILE_SLUG_CHARS: usize = 50;

/// A single recorded decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDecision {
    pub agent_id: AgentId,
    pub entry: TranscriptEntry,
    pub tokens: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DecisionRecorder {
    scenario: String,
    model: String,
    records: Vec<RecordedDecision>,
}

impl DecisionRecorder {
    pub fn new(scenario: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            model: model.into(),
            records: Vec::new(),
        }
    }
    
    pub fn scenario(&self) -> &str {
        &self.scenario
    }
    
    pub fn model(&self) -> &str {
        &self.model
    }
    
    /// Renames the recording (the first order of a run names it).
    pub fn set_scenario(&mut self, scenario: impl Into<String>) {
        self.scenario = scenario.into();
    }
    
    pub fn record(&mut self, agent: &Agent, decision: &AgentDecision, tick: u64, tokens: u64, duration_ms: u64) {
        self.records.push(RecordedDecision {
            agent_id: agent.id.clone(),
            entry: TranscriptEntry {
                tick,
                agent_name: agent.name.clone(),
                agent_role: agent.role.as_str().to_uppercase(),
                agent_level: agent.level,
                decision: decision.clone(),
            },
            tokens,
            duration_ms,
        });
    }
    
    /// Drops every record, keeping the name and model.
    pub fn clear(&mut self) {
        self.records.clear();
    }
    
    pub fn records(&self) -> &[RecordedDecision] {
        &self.records
    }
    
    pub fn len(&self) -> usize {
        self.records.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    
    pub fn total_tokens(&self) -> u64 {
        self.records.iter().map(|r| r.tokens).sum()
    }
    
    /// Mean decision latency, `None` before the first record.
    pub fn avg_latency_ms(&self) -> Option<u64> {
        if self.records.is_empty() {
            return None;
        }
        let total: u64 = self.records.iter().map(|r| r.duration_ms).sum();
        Some((total as f64 / self.records.len() as f64).round() as u64)
    }
    
    pub fn to_transcript(&self, recorded: DateTime<Utc>) -> Transcript {
        let mut transcript = Transcript::new(&self.scenario, &self.model).with_recorded(recorded);
        if let Some(avg) = self.avg_latency_ms() {
            transcript = transcript.with_avg_latency_ms(avg);
        }
        for record in &self.records {
            transcript.push(record.entry.clone());
        }
        transcript
    }
    
    /// `<timestamp>-<slug>.md`, e.g. `2024-01-01T00-00-00-launch-the-app.md`.
    pub fn file_name(&self, recorded: DateTime<Utc>) -> String {
        let mut slug: String = slugify(&self.scenario).chars().take(FILE_SLUG_CHARS).collect();
        if slug.is_empty() {
            slug.push_str("scenario");
        }
        format!("{}-{}.md", recorded.format("%Y-%m-%dT%H-%M-%S"), slug)
    }
    
    /// Writes the transcript into `dir` (created if missing).
    pub fn save(&self, dir: &Path, recorded: DateTime<Utc>) -> Result<PathBuf, SimError> {
        std::fs::create_dir_all(dir).map_err(|e| SimError::io(dir, e))?;
        let path = dir.join(self.file_name(recorded));
        
        let mut file = File::create(&path).map_err(|e| SimError::io(&path, e))?;
        file.write_all(self.to_transcript(recorded).serialize().as_bytes())
            .map_err(|e| SimError::io(&path, e))?;
        
        Ok(path)
    }
}
