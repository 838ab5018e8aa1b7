//! Transcript playback matched to free-text orders.

use super::{Decided, DecisionStrategy, PassMode, Proposal};
use crate::error::SimError;
use async_trait::async_trait;
use orgsim_core::{AgentId, DecisionSource, Organization, Transcript, TranscriptEntry};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Containment of the order in the scenario name (or vice versa).
const NAME_MATCH_SCORE: f64 = 0.8;

/// Weight of the reverse keyword hit rate in the blended score.
const REVERSE_BONUS: f64 = 0.3;

/// Message tokens contributing to a scenario's keywords.
const MESSAGE_KEYWORD_LIMIT: usize = 30;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "for", "our", "my", "your", "their", "his", "her", "its",
    "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "at", "by", "with", "from",
    "and", "or", "but", "not", "no", "so", "if", "then",
    "i", "we", "you", "they", "he", "she", "it",
    "do", "does", "did", "will", "would", "can", "could", "should",
    "have", "has", "had", "get", "got",
    "that", "this", "these", "those", "what", "which", "who",
    "more", "some", "any", "all", "each", "every",
    "up", "out", "about", "into", "over", "just", "also",
    "need", "want", "run", "make",
];

/// Lowercased alphanumeric words longer than one char, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// A transcript ready for matching.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub transcript: Transcript,
    pub keywords: Vec<String>,
    pub path: Option<PathBuf>,
}

impl LibraryEntry {
    fn new(transcript: Transcript, path: Option<PathBuf>) -> Self {
        let mut keywords: Vec<String> = Vec::new();
        let message_tokens = transcript
            .entries
            .iter()
            .flat_map(|e| tokenize(&e.decision.message))
            .take(MESSAGE_KEYWORD_LIMIT);
        for k in transcript
            .keywords
            .iter()
            .cloned()
            .chain(tokenize(&transcript.scenario))
            .chain(message_tokens)
        {
            if !keywords.contains(&k) {
                keywords.push(k);
            }
        }
        Self {
            transcript,
            keywords,
            path,
        }
    }
    
    /// Match score of `order` against this scenario, in `[0, ~1.3]`.
    pub fn score(&self, order: &str) -> f64 {
        let order_lower = order.trim().to_lowercase();
        let name_lower = self.transcript.scenario.to_lowercase();
        
        let mut score: f64 = 0.0;
        if !order_lower.is_empty() && (order_lower.contains(&name_lower) || name_lower.contains(&order_lower)) {
            score = NAME_MATCH_SCORE;
        }
        
        let order_tokens = tokenize(order);
        let forward = order_tokens.iter().filter(|t| self.keywords.contains(t)).count() as f64
            / order_tokens.len().max(1) as f64;
        let reverse = self.keywords.iter().filter(|k| order_tokens.contains(k)).count() as f64
            / self.keywords.len().max(1) as f64;
        
        score
            .max(forward)
            .max((forward + reverse) / 2.0 + reverse * REVERSE_BONUS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioMatch {
    pub index: usize,
    pub scenario: String,
    pub score: f64,
}

/// Loaded transcripts.
#[derive(Debug, Clone, Default)]
pub struct ReplayLibrary {
    entries: Vec<LibraryEntry>,
}

impl ReplayLibrary {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn add(&mut self, transcript: Transcript) {
        self.entries.push(LibraryEntry::new(transcript, None));
    }
    
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.add(transcript);
        self
    }
    
    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }
    
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    
    /// Loads every `.md` file in `dir` and its `recorded/` subdirectory.
    ///
    /// Malformed files are skipped and returned alongside the library.
    pub fn load_dir(dir: &Path) -> Result<(Self, Vec<SimError>), SimError> {
        let mut library = Self::new();
        let mut failures = Vec::new();
        
        let mut dirs = vec![dir.to_path_buf()];
        let recorded = dir.join("recorded");
        if recorded.is_dir() {
            dirs.push(recorded);
        }
        
        for d in dirs {
            let listing = std::fs::read_dir(&d).map_err(|e| SimError::io(&d, e))?;
            let mut files: Vec<PathBuf> = listing
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
                .collect();
            files.sort();
            
            for path in files {
                match read_transcript(&path) {
                    Ok(transcript) => {
                        debug!("loaded \"{}\" ({} decisions)", transcript.scenario, transcript.entries.len());
                        library.entries.push(LibraryEntry::new(transcript, Some(path)));
                    }
                    Err(e) => {
                        warn!("skipping transcript: {}", e);
                        failures.push(e);
                    }
                }
            }
        }
        
        info!("loaded {} scenario(s) from {}", library.len(), dir.display());
        Ok((library, failures))
    }
    
    /// Loads exactly one transcript; a malformed file is an error.
    pub fn load_file(path: &Path) -> Result<Self, SimError> {
        let transcript = read_transcript(path)?;
        let mut library = Self::new();
        library.entries.push(LibraryEntry::new(transcript, Some(path.to_path_buf())));
        Ok(library)
    }
    
    /// Highest-scoring scenario strictly above `threshold`. Ties keep the
    /// first loaded.
    pub fn best_match(&self, order: &str, threshold: f64) -> Option<ScenarioMatch> {
        let mut best: Option<ScenarioMatch> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let score = entry.score(order);
            if best.as_ref().map_or(score > 0.0, |b| score > b.score) {
                best = Some(ScenarioMatch {
                    index,
                    scenario: entry.transcript.scenario.clone(),
                    score,
                });
            }
        }
        best.filter(|b| b.score > threshold)
    }
}

fn read_transcript(path: &Path) -> Result<Transcript, SimError> {
    let text = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    Transcript::parse(&text).map_err(|e| SimError::transcript(path, e))
}

/// Maps recorded ticks onto a stretched axis starting after `offset`.
///
/// Returns the queue and the last tick of the new axis.
pub fn rescale(entries: &[TranscriptEntry], stretch: f64, offset: u64) -> (BTreeMap<u64, VecDeque<TranscriptEntry>>, u64) {
    let max_tick = entries.iter().map(|e| e.tick).max().unwrap_or(1).max(1) as f64;
    let span = (max_tick * stretch).ceil() as u64;
    
    let mut queue: BTreeMap<u64, VecDeque<TranscriptEntry>> = BTreeMap::new();
    for entry in entries {
        let at = ((entry.tick as f64 / max_tick) * span as f64).round().max(1.0) as u64;
        queue.entry(offset + at).or_default().push_back(entry.clone());
    }
    (queue, offset + span)
}

pub struct ReplayStrategy {
    library: ReplayLibrary,
    threshold: f64,
    stretch: f64,
    queue: BTreeMap<u64, VecDeque<TranscriptEntry>>,
    horizon: u64,
    playing: Option<String>,
}

impl ReplayStrategy {
    pub fn new(library: ReplayLibrary) -> Self {
        Self {
            library,
            threshold: 0.3,
            stretch: 2.5,
            queue: BTreeMap::new(),
            horizon: 0,
            playing: None,
        }
    }
    
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
    
    pub fn with_stretch(mut self, stretch: f64) -> Self {
        self.stretch = stretch;
        self
    }
    
    pub fn library(&self) -> &ReplayLibrary {
        &self.library
    }
    
    /// Scenario currently being played back.
    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }
    
    pub fn horizon(&self) -> u64 {
        self.horizon
    }
    
    /// Decisions still queued, by tick.
    pub fn pending(&self) -> usize {
        self.queue.values().map(VecDeque::len).sum()
    }
    
    fn finish_if_done(&mut self, tick: u64) {
        if self.playing.is_some() && self.queue.is_empty() && tick >= self.horizon {
            info!("replay of \"{}\" finished at tick {}", self.playing.as_deref().unwrap_or(""), tick);
            self.playing = None;
        }
    }
}

#[async_trait]
impl DecisionStrategy for ReplayStrategy {
    fn name(&self) -> &'static str {
        "replay"
    }
    
    fn source(&self) -> DecisionSource {
        DecisionSource::Replay
    }
    
    fn mode(&self) -> PassMode {
        PassMode::Batch
    }
    
    fn is_active(&self, _tick: u64) -> bool {
        self.playing.is_some()
    }
    
    fn on_order(&mut self, order: &str, tick: u64) {
        let Some(found) = self.library.best_match(order, self.threshold) else {
            info!("no scenario matched order \"{}\"", order.chars().take(60).collect::<String>());
            return;
        };
        let Some(entry) = self.library.entries.get(found.index) else {
            return;
        };
        
        let (queue, horizon) = rescale(&entry.transcript.entries, self.stretch, tick);
        info!(
            "matched \"{}\" (score {:.2}); {} decisions queued through tick {}",
            found.scenario,
            found.score,
            entry.transcript.entries.len(),
            horizon
        );
        self.queue = queue;
        self.horizon = horizon;
        self.playing = Some(found.scenario);
    }
    
    async fn decide(&mut self, org: &Organization, tick: u64, agents: &[AgentId]) -> Vec<Proposal> {
        // anything queued for an earlier tick missed its turn
        let later = self.queue.split_off(&(tick + 1));
        let mut due = VecDeque::new();
        for (at, entries) in std::mem::replace(&mut self.queue, later) {
            if at < tick {
                warn!("replay: {} decisions due at tick {} went unplayed", entries.len(), at);
            } else {
                due = entries;
            }
        }
        let mut acted: HashSet<AgentId> = HashSet::new();
        let mut slid: Vec<TranscriptEntry> = Vec::new();
        let mut proposals = Vec::new();
        
        for entry in due {
            let Some(id) = org.resolve_agent(&entry.agent_name) else {
                warn!("replay: agent \"{}\" not found, skipping", entry.agent_name);
                continue;
            };
            if !agents.contains(&id) {
                warn!("replay: {} cannot act this tick, skipping", id);
                continue;
            }
            if !acted.insert(id.clone()) {
                slid.push(entry);
                continue;
            }
            proposals.push(Proposal::decided(&id, Decided::free(entry.decision)));
        }
        
        if !slid.is_empty() {
            let next = self.queue.entry(tick + 1).or_default();
            for entry in slid.into_iter().rev() {
                next.push_front(entry);
            }
            self.horizon = self.horizon.max(tick + 1);
        }
        
        self.finish_if_done(tick);
        proposals
    }
}
