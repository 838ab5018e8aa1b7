//! Structured agent decisions and the five-field response grammar.
//!
//! Every decision source (rules, language model, transcript playback)
//! produces an [`AgentDecision`]. Free-text model output is parsed with a
//! small line-oriented parser rather than pattern matching over the whole
//! response, so each failure mode is distinguishable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decision verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Delegate,
    Escalate,
    Complete,
    Work,
    Message,
    Hire,
    Idle,
}

impl Action {
    /// Actions a model response may choose (everything but `idle`).
    pub const SELECTABLE: [Action; 6] = [
        Action::Delegate,
        Action::Escalate,
        Action::Complete,
        Action::Work,
        Action::Message,
        Action::Hire,
    ];
    
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Delegate => "delegate",
            Action::Escalate => "escalate",
            Action::Complete => "complete",
            Action::Work => "work",
            Action::Message => "message",
            Action::Hire => "hire",
            Action::Idle => "idle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delegate" => Ok(Action::Delegate),
            "escalate" => Ok(Action::Escalate),
            "complete" => Ok(Action::Complete),
            "work" => Ok(Action::Work),
            "message" => Ok(Action::Message),
            "hire" => Ok(Action::Hire),
            "idle" => Ok(Action::Idle),
            other => Err(other.to_string()),
        }
    }
}

/// Strategy-agnostic structured decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDecision {
    pub action: Action,
    /// Agent reference, or `none`
    pub target: String,
    /// Task id, or `new: <title>`
    pub task: String,
    pub message: String,
    /// Source output kept for audit
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl AgentDecision {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            target: "none".to_string(),
            task: String::new(),
            message: String::new(),
            raw: String::new(),
        }
    }
    
    pub fn idle(reason: impl Into<String>) -> Self {
        Self::new(Action::Idle).with_message(reason)
    }
    
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
    
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }
    
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
    
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }
}

/// Failure modes of the response grammar.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty response")]
    Empty,
    
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    
    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

/// The four grammar keys, in canonical order.
pub const FIELDS: [&str; 4] = ["Action", "Target", "Task", "Message"];

/// Removes ``` fences and `<think>...</think>` blocks.
pub fn strip_noise(response: &str) -> String {
    let mut out = String::with_capacity(response.len());
    let mut rest = response;
    
    // Drop think blocks (an unterminated block swallows the remainder)
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    
    out.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `- Key: value` (bullet optional) into a known key and its value.
///
/// Keys match case-insensitively; `**Key:**` and `**Key**:` emphasis is
/// tolerated. Only the label's markers are removed, so a value may itself
/// start with bold text.
pub fn split_field(line: &str) -> Option<(&'static str, &str)> {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
        .trim_start();
    let (line, bold) = match line.strip_prefix("**") {
        Some(rest) => (rest, true),
        None => (line, false),
    };
    
    let colon = line.find(':')?;
    let raw_key = line[..colon].trim();
    let key = raw_key.trim_end_matches("**").trim();
    let field = FIELDS.iter().find(|f| f.eq_ignore_ascii_case(key))?;
    
    let mut value = line[colon + 1..].trim_start();
    // `**Key:**` closes its emphasis after the colon
    if bold && !raw_key.ends_with("**") {
        value = value.strip_prefix("**").unwrap_or(value);
    }
    Some((field, value.trim()))
}

/// Parses a free-text model response.
///
/// The first occurrence of each key wins. `Action` is required and must be
/// one of the six selectable actions; the other fields default to
/// `none` / empty.
pub fn parse_decision(response: &str) -> Result<AgentDecision, ParseError> {
    let cleaned = strip_noise(response);
    if cleaned.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    
    let mut values: [Option<String>; 4] = Default::default();
    for line in cleaned.lines() {
        if let Some((key, value)) = split_field(line) {
            if let Some(i) = FIELDS.iter().position(|f| *f == key) {
                if values[i].is_none() {
                    values[i] = Some(value.to_string());
                }
            }
        }
    }
    
    let [action, target, task, message] = values;
    let action_text = action.ok_or(ParseError::MissingField("Action"))?;
    // first word only: "delegate (to Sam)" still counts
    let token = action_text
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|s| !s.is_empty())
        .unwrap_or("");
    let action = token
        .parse::<Action>()
        .ok()
        .filter(|a| Action::SELECTABLE.contains(a))
        .ok_or_else(|| ParseError::InvalidAction(action_text.clone()))?;
    
    let target = target.filter(|t| !t.is_empty()).unwrap_or_else(|| "none".to_string());
    
    Ok(AgentDecision {
        action,
        target,
        task: task.unwrap_or_default(),
        message: message.unwrap_or_default(),
        raw: response.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_parse_full_decision() {
        let response = "## Decision\n- Action: delegate\n- Target: Sam Okafor\n- Task: TASK-0003\n- Message: Please take the API work.";
        let d = parse_decision(response).unwrap();
        
        assert_eq!(d.action, Action::Delegate);
        assert_eq!(d.target, "Sam Okafor");
        assert_eq!(d.task, "TASK-0003");
        assert_eq!(d.message, "Please take the API work.");
        assert_eq!(d.raw, response);
    }
    
    #[test]
    fn test_parse_strips_fences_and_thinking() {
        let response = "<think>\nAction: hire\nlots of musing\n</think>\n```markdown\n* **Action:** Complete\n* **Task:** task-0001\n```";
        let d = parse_decision(response).unwrap();
        
        assert_eq!(d.action, Action::Complete);
        assert_eq!(d.task, "task-0001");
        assert_eq!(d.target, "none");
        assert_eq!(d.message, "");
    }
    
    #[test]
    fn test_first_occurrence_wins() {
        let d = parse_decision("Action: work\nAction: hire\nTask: A\nTask: B").unwrap();
        assert_eq!(d.action, Action::Work);
        assert_eq!(d.task, "A");
    }
    
    #[test]
    fn test_typed_failures() {
        assert_eq!(parse_decision("   \n"), Err(ParseError::Empty));
        assert_eq!(parse_decision("<think>only thoughts</think>"), Err(ParseError::Empty));
        assert_eq!(
            parse_decision("Target: Sam\nMessage: hi"),
            Err(ParseError::MissingField("Action"))
        );
        assert_eq!(
            parse_decision("Action: dance"),
            Err(ParseError::InvalidAction("dance".to_string()))
        );
        // idle is a valid decision but not a selectable response
        assert!(matches!(parse_decision("Action: idle"), Err(ParseError::InvalidAction(_))));
    }
    
    #[test]
    fn test_action_token_tolerates_trailing_text() {
        let d = parse_decision("- Action: Escalate (blocked on vendor)").unwrap();
        assert_eq!(d.action, Action::Escalate);
    }
    
    #[test]
    fn test_bold_survives_in_values() {
        assert_eq!(split_field("- Message: **bold** x"), Some(("Message", "**bold** x")));
        assert_eq!(split_field("* **Message:** **bold** x"), Some(("Message", "**bold** x")));
        assert_eq!(split_field("**Message**: **urgent** ship it"), Some(("Message", "**urgent** ship it")));
        assert_eq!(split_field("**Task:**TASK-0001"), Some(("Task", "TASK-0001")));
        
        let d = parse_decision("- Action: message\n- Target: Ava\n- Message: **heads up** the demo moved").unwrap();
        assert_eq!(d.message, "**heads up** the demo moved");
    }
    
    #[test]
    fn test_unrelated_colon_lines_are_ignored() {
        let d = parse_decision("Note: read carefully\nAction: message\nTarget: Ava").unwrap();
        assert_eq!(d.action, Action::Message);
        assert_eq!(d.target, "Ava");
    }
}
