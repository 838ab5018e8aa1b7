//! Identifier newtypes and the per-source task id allocator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable agent identifier (slug form, e.g. `eng-lead`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Task identifier, rendered `TASK-0001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which decision source produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Rule-based strategy and order intake
    Deterministic,
    /// Language-model-backed strategy
    Model,
    /// Transcript playback
    Replay,
}

impl DecisionSource {
    pub fn name(&self) -> &'static str {
        match self {
            DecisionSource::Deterministic => "deterministic",
            DecisionSource::Model => "model",
            DecisionSource::Replay => "replay",
        }
    }
    
    /// First number of this source's id range (exclusive).
    fn base(&self) -> u64 {
        match self {
            DecisionSource::Deterministic => 0,
            DecisionSource::Model => 10_000,
            DecisionSource::Replay => 20_000,
        }
    }
    
    fn slot(&self) -> usize {
        match self {
            DecisionSource::Deterministic => 0,
            DecisionSource::Model => 1,
            DecisionSource::Replay => 2,
        }
    }
}

/// Width of each source's id range.
pub const TASK_ID_RANGE: u64 = 10_000;

/// Ids past every range are striped across sources from here.
const OVERFLOW_BASE: u64 = 3 * TASK_ID_RANGE;

/// Hands out task ids from disjoint per-source ranges.
///
/// Deterministic ids start at `TASK-0001`, model ids at `TASK-10001`,
/// replay ids at `TASK-20001`. Once a source has used up its range it
/// continues past `TASK-30000`, where each source takes every third
/// number, so ids never repeat and never cross sources.
#[derive(Debug, Clone, Default)]
pub struct TaskIdAllocator {
    issued: [u64; 3],
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Allocates the next id for `source`.
    pub fn next(&mut self, source: DecisionSource) -> TaskId {
        let slot = source.slot();
        self.issued[slot] += 1;
        let n = self.issued[slot];
        let number = if n < TASK_ID_RANGE {
            source.base() + n
        } else {
            OVERFLOW_BASE + (n - TASK_ID_RANGE) * 3 + slot as u64 + 1
        };
        TaskId(format!("TASK-{:04}", number))
    }
    
    /// Number of ids issued so far for `source`.
    pub fn issued(&self, source: DecisionSource) -> u64 {
        self.issued[source.slot()]
    }
    
    pub fn reset(&mut self) {
        self.issued = [0; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    
    #[test]
    fn test_ranges_are_disjoint() {
        let mut ids = TaskIdAllocator::new();
        
        assert_eq!(ids.next(DecisionSource::Deterministic).as_str(), "TASK-0001");
        assert_eq!(ids.next(DecisionSource::Model).as_str(), "TASK-10001");
        assert_eq!(ids.next(DecisionSource::Replay).as_str(), "TASK-20001");
        assert_eq!(ids.next(DecisionSource::Deterministic).as_str(), "TASK-0002");
        assert_eq!(ids.issued(DecisionSource::Model), 1);
    }
    
    #[test]
    fn test_allocators_are_independent() {
        let mut a = TaskIdAllocator::new();
        let mut b = TaskIdAllocator::new();
        
        a.next(DecisionSource::Deterministic);
        a.next(DecisionSource::Deterministic);
        
        assert_eq!(b.next(DecisionSource::Deterministic).as_str(), "TASK-0001");
    }
    
    #[test]
    fn test_exhausted_range_never_repeats() {
        let mut ids = TaskIdAllocator::new();
        let mut seen = HashSet::new();
        for _ in 0..TASK_ID_RANGE + 50 {
            for source in [DecisionSource::Deterministic, DecisionSource::Model, DecisionSource::Replay] {
                let id = ids.next(source);
                assert!(seen.insert(id.clone()), "{} issued twice", id);
            }
        }
        assert_eq!(seen.len(), 3 * (TASK_ID_RANGE as usize + 50));
        
        let mut fresh = TaskIdAllocator::new();
        let mut last = TaskId::new("");
        for _ in 0..TASK_ID_RANGE {
            last = fresh.next(DecisionSource::Deterministic);
        }
        // the 10 000th deterministic id leaves the model range alone
        assert_eq!(last.as_str(), "TASK-30001");
        assert_eq!(fresh.next(DecisionSource::Model).as_str(), "TASK-10001");
        
        fresh.reset();
        assert_eq!(fresh.next(DecisionSource::Deterministic).as_str(), "TASK-0001");
    }
}
