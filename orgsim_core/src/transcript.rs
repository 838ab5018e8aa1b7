//! Recorded transcript format.
//!
//! A transcript is a markdown document: a `key: value` frontmatter block,
//! a `# Scenario:` title, then one heading plus four field lines per
//! decision.
//!
//! ```text
//! ---
//! scenario: Launch the mobile app
//! recorded: 2024-01-01T00:00:00Z
//! model: qwen2.5:7b
//! ticks: 4
//! agents: 2
//! decisions: 3
//! actions: delegate 33%, work 33%, complete 33%
//! ---
//!
//! # Scenario: Launch the mobile app
//!
//! ## Tick 1 — Sarah Chen (CEO, L10)
//! - Action: delegate
//! - Target: Marcus Webb
//! - Task: new: Build the mobile app
//! - Message: Please own the launch.
//! ```
//!
//! Parsing is line-oriented with typed failures. `ticks`, `agents`,
//! `decisions` and `actions` are derived from the entries when
//! serializing and only validated when parsing.

use crate::decision::{split_field, Action, AgentDecision};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

const FRONTMATTER_FENCE: &str = "---";
const TICK_HEADING: &str = "## Tick ";
const SCENARIO_TITLE: &str = "# Scenario:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Missing frontmatter block")]
    MissingFrontmatter,
    
    #[error("Missing frontmatter key: {0}")]
    MissingKey(&'static str),
    
    #[error("Malformed heading on line {line}: {text}")]
    MalformedHeading { line: usize, text: String },
    
    #[error("Tick {tick}: missing field {field}")]
    MissingField { tick: u64, field: &'static str },
    
    #[error("Tick {tick}: invalid action '{action}'")]
    InvalidAction { tick: u64, action: String },
    
    #[error("Invalid number for {key}: {value}")]
    InvalidNumber { key: String, value: String },
    
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    
    #[error("Transcript has no decisions")]
    NoDecisions,
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub tick: u64,
    pub agent_name: String,
    /// Role label as rendered, e.g. `CEO`
    pub agent_role: String,
    pub agent_level: u8,
    pub decision: AgentDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub scenario: String,
    pub recorded: Option<DateTime<Utc>>,
    pub model: String,
    /// Extra matching keywords, beyond those derived from the content
    pub keywords: Vec<String>,
    pub avg_latency_ms: Option<u64>,
    pub entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(scenario: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            scenario: one_line(&scenario.into()),
            recorded: None,
            model: one_line(&model.into()),
            keywords: Vec::new(),
            avg_latency_ms: None,
            entries: Vec::new(),
        }
    }
    
    pub fn with_recorded(mut self, at: DateTime<Utc>) -> Self {
        // the format stores whole seconds
        self.recorded = DateTime::from_timestamp(at.timestamp(), 0);
        self
    }
    
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords
            .iter()
            .map(|k| one_line(k).replace(',', " ").to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }
    
    pub fn with_avg_latency_ms(mut self, ms: u64) -> Self {
        self.avg_latency_ms = Some(ms);
        self
    }
    
    /// Appends an entry, normalizing it to what the format can hold.
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(normalize(entry));
    }
    
    /// Highest recorded tick (0 when empty).
    pub fn max_tick(&self) -> u64 {
        self.entries.iter().map(|e| e.tick).max().unwrap_or(0)
    }
    
    pub fn agent_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.agent_name.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
    
    /// `delegate 40%, work 30%, ...`, most frequent first.
    pub fn action_distribution(&self) -> String {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.decision.action.as_str()).or_insert(0) += 1;
        }
        let total = self.entries.len().max(1) as f64;
        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked
            .iter()
            .map(|(action, n)| format!("{} {}%", action, ((*n as f64 / total) * 100.0).round()))
            .collect::<Vec<_>>()
            .join(", ")
    }
    
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("scenario: {}\n", self.scenario));
        if let Some(at) = self.recorded {
            out.push_str(&format!("recorded: {}\n", at.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        out.push_str(&format!("model: {}\n", self.model));
        out.push_str(&format!("ticks: {}\n", self.max_tick()));
        out.push_str(&format!("agents: {}\n", self.agent_count()));
        out.push_str(&format!("decisions: {}\n", self.entries.len()));
        out.push_str(&format!("actions: {}\n", self.action_distribution()));
        if let Some(ms) = self.avg_latency_ms {
            out.push_str(&format!("avg_latency_ms: {}\n", ms));
        }
        if !self.keywords.is_empty() {
            out.push_str(&format!("keywords: {}\n", self.keywords.join(", ")));
        }
        out.push_str("---\n\n");
        out.push_str(&format!("{} {}\n", SCENARIO_TITLE, self.scenario));
        
        for e in &self.entries {
            let d = &e.decision;
            out.push_str(&format!(
                "\n{}{} — {} ({}, L{})\n",
                TICK_HEADING, e.tick, e.agent_name, e.agent_role, e.agent_level
            ));
            out.push_str(&format!("- Action: {}\n", d.action));
            out.push_str(&format!("- Target: {}\n", d.target));
            out.push_str(&format!("- Task: {}\n", d.task));
            out.push_str(&format!("- Message: {}\n", d.message));
        }
        out
    }
    
    pub fn parse(text: &str) -> Result<Self, TranscriptError> {
        let lines: Vec<&str> = text.lines().collect();
        let (meta, body_start) = parse_frontmatter(&lines)?;
        
        let mut title = None;
        let mut entries: Vec<TranscriptEntry> = Vec::new();
        let mut current: Option<(Header, [Option<String>; 4])> = None;
        
        for (i, raw) in lines.iter().enumerate().skip(body_start) {
            let line = raw.trim();
            if let Some(rest) = line.strip_prefix(SCENARIO_TITLE) {
                title.get_or_insert_with(|| rest.trim().to_string());
            } else if line.starts_with(TICK_HEADING) {
                if let Some((header, fields)) = current.take() {
                    entries.push(build_entry(header, fields)?);
                }
                let header = parse_heading(line).ok_or_else(|| TranscriptError::MalformedHeading {
                    line: i + 1,
                    text: line.to_string(),
                })?;
                current = Some((header, Default::default()));
            } else if let Some((_, fields)) = current.as_mut() {
                if let Some((key, value)) = split_field(line) {
                    if let Some(slot) = crate::decision::FIELDS.iter().position(|f| *f == key) {
                        fields[slot].get_or_insert_with(|| value.to_string());
                    }
                }
            }
        }
        if let Some((header, fields)) = current.take() {
            entries.push(build_entry(header, fields)?);
        }
        
        if entries.is_empty() {
            return Err(TranscriptError::NoDecisions);
        }
        
        let scenario = meta
            .get("scenario")
            .cloned()
            .or(title)
            .filter(|s| !s.is_empty())
            .ok_or(TranscriptError::MissingKey("scenario"))?;
        
        let recorded = match meta.get("recorded") {
            Some(v) => Some(
                DateTime::parse_from_rfc3339(v)
                    .map_err(|_| TranscriptError::InvalidTimestamp(v.clone()))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        for key in ["ticks", "agents", "decisions"] {
            if let Some(v) = meta.get(key) {
                parse_number(key, v)?;
            }
        }
        let avg_latency_ms = meta
            .get("avg_latency_ms")
            .map(|v| parse_number("avg_latency_ms", v))
            .transpose()?;
        let keywords = meta
            .get("keywords")
            .map(|v| {
                v.split(',')
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        
        Ok(Self {
            scenario,
            recorded,
            model: meta.get("model").cloned().unwrap_or_else(|| "unknown".to_string()),
            keywords,
            avg_latency_ms,
            entries,
        })
    }
}

struct Header {
    tick: u64,
    name: String,
    role: String,
    level: u8,
}

fn parse_number(key: &str, value: &str) -> Result<u64, TranscriptError> {
    value.trim().parse().map_err(|_| TranscriptError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_frontmatter(lines: &[&str]) -> Result<(BTreeMap<String, String>, usize), TranscriptError> {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .ok_or(TranscriptError::MissingFrontmatter)?;
    if lines[start].trim() != FRONTMATTER_FENCE {
        return Err(TranscriptError::MissingFrontmatter);
    }
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.trim() == FRONTMATTER_FENCE)
        .map(|p| start + 1 + p)
        .ok_or(TranscriptError::MissingFrontmatter)?;
    
    let mut meta = BTreeMap::new();
    for line in &lines[start + 1..end] {
        if let Some((key, value)) = line.split_once(':') {
            meta.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    Ok((meta, end + 1))
}

/// `## Tick <n> — <Name> (<ROLE>, L<level>)`, trailing text ignored.
fn parse_heading(line: &str) -> Option<Header> {
    let rest = line.strip_prefix(TICK_HEADING)?;
    let digits = rest.find(|c: char| !c.is_ascii_digit())?;
    let tick = rest[..digits].parse().ok()?;
    let rest = rest[digits..].trim_start();
    let rest = rest
        .strip_prefix('—')
        .or_else(|| rest.strip_prefix("--"))
        .or_else(|| rest.strip_prefix('-'))?
        .trim_start();
    
    let close = rest.rfind(')')?;
    let open = rest[..close].rfind(" (")?;
    let name = rest[..open].trim();
    let (role, level) = rest[open + 2..close].split_once(',')?;
    let role = role.trim();
    let level = level.trim().strip_prefix('L')?.parse().ok()?;
    
    if name.is_empty() || role.is_empty() || !role.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(Header {
        tick,
        name: name.to_string(),
        role: role.to_string(),
        level,
    })
}

fn build_entry(header: Header, fields: [Option<String>; 4]) -> Result<TranscriptEntry, TranscriptError> {
    let [action, target, task, message] = fields;
    let tick = header.tick;
    let action_text = action.ok_or(TranscriptError::MissingField { tick, field: "Action" })?;
    // idle is a legitimate recorded outcome, unlike in model responses
    let action: Action = action_text
        .parse()
        .map_err(|_| TranscriptError::InvalidAction { tick, action: action_text.clone() })?;
    
    let decision = AgentDecision::new(action)
        .with_target(target.filter(|t| !t.is_empty()).unwrap_or_else(|| "none".to_string()))
        .with_task(task.unwrap_or_default())
        .with_message(message.unwrap_or_default());
    
    Ok(TranscriptEntry {
        tick,
        agent_name: header.name,
        agent_role: header.role,
        agent_level: header.level,
        decision,
    })
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Brings an entry into the shape `parse` produces.
fn normalize(mut entry: TranscriptEntry) -> TranscriptEntry {
    entry.agent_name = one_line(&entry.agent_name);
    entry.agent_role = entry
        .agent_role
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_uppercase();
    let d = &mut entry.decision;
    d.target = match one_line(&d.target) {
        t if t.is_empty() => "none".to_string(),
        t => t,
    };
    d.task = one_line(&d.task);
    d.message = one_line(&d.message);
    d.raw.clear();
    entry
}
