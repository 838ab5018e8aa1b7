//! Free-text order intake.
//!
//! Turns a host order into backlog task definitions: numbered items,
//! then bullets, else one task per detected domain.

use orgsim_core::org::{detect_domain, detect_domains};
use orgsim_core::Priority;

/// Items this short are noise ("1) ok").
const MIN_ITEM_CHARS: usize = 5;

/// Prefix compared when deduplicating bullets against numbered items.
const DEDUP_PREFIX_CHARS: usize = 20;

const DOMAIN_TITLE_CHARS: usize = 60;
const PLAIN_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDef {
    pub title: String,
    pub domain: String,
    pub priority: Priority,
}

impl TaskDef {
    fn new(title: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            domain: domain.into(),
            priority: Priority::High,
        }
    }
}

/// Splits `order` into task definitions. Never empty for a non-blank order.
pub fn parse_order_into_tasks(order: &str) -> Vec<TaskDef> {
    let mut tasks: Vec<TaskDef> = Vec::new();
    
    for item in numbered_items(order) {
        let clean = item.trim().trim_end_matches(['.', '!', '?']).trim();
        if clean.chars().count() > MIN_ITEM_CHARS {
            tasks.push(TaskDef::new(clean, detect_domain(clean)));
        }
    }
    
    for item in bullet_items(order) {
        let clean = item.trim();
        if clean.chars().count() <= MIN_ITEM_CHARS {
            continue;
        }
        let prefix: String = clean.to_lowercase().chars().take(DEDUP_PREFIX_CHARS).collect();
        if tasks.iter().any(|t| t.title.to_lowercase().contains(&prefix)) {
            continue;
        }
        tasks.push(TaskDef::new(clean, detect_domain(clean)));
    }
    
    if tasks.is_empty() {
        let trimmed = order.trim();
        if trimmed.is_empty() {
            return tasks;
        }
        let domains = detect_domains(trimmed);
        if domains.len() > 1 {
            let head = take_chars(trimmed, DOMAIN_TITLE_CHARS);
            for domain in domains {
                tasks.push(TaskDef::new(format!("{} work for: {}", capitalize(domain), head), domain));
            }
        } else {
            tasks.push(TaskDef::new(take_chars(trimmed, PLAIN_TITLE_CHARS), domains[0]));
        }
    }
    
    tasks
}

/// Bodies of `N) text` items. A body ends after the first `.`/`!`/`?`,
/// before the next digit, or at the end of the order.
fn numbered_items(order: &str) -> Vec<&str> {
    let bytes = order.as_bytes();
    let mut items = Vec::new();
    let mut i = 0;
    
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b')' {
            i = j;
            continue;
        }
        let mut start = j + 1;
        while start < bytes.len() && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        let mut end = start;
        while end < bytes.len() && !bytes[end].is_ascii_digit() {
            let b = bytes[end];
            end += 1;
            if matches!(b, b'.' | b'!' | b'?') {
                // the terminator is part of the match; empty bodies are not
                if end - start == 1 {
                    end = start;
                }
                break;
            }
        }
        if end > start {
            items.push(&order[start..end]);
            i = end;
        } else {
            i = j + 1;
        }
    }
    items
}

/// Text after `- ` or `• ` up to the end of the line.
fn bullet_items(order: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut rest = order;
    
    while let Some(pos) = rest.find(['-', '•']) {
        let marker_len = rest[pos..].chars().next().map_or(1, char::len_utf8);
        let after = &rest[pos + marker_len..];
        let body = after.trim_start();
        let gap = after.len() - body.len();
        if gap == 0 {
            rest = after;
            continue;
        }
        let line = body.split('\n').next().unwrap_or("");
        if line.is_empty() {
            rest = body;
            continue;
        }
        items.push(line);
        rest = &body[line.len()..];
    }
    items
}

fn take_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_numbered_items() {
        let tasks = parse_order_into_tasks("Please: 1) Build the public API. 2) Write launch blog post! 3) ok");
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Build the public API", "Write launch blog post"]);
        assert_eq!(tasks[0].domain, "engineering");
        assert_eq!(tasks[1].domain, "marketing");
        assert!(tasks.iter().all(|t| t.priority == Priority::High));
    }
    
    #[test]
    fn test_bullets_skip_numbered_duplicates() {
        let order = "1) Prepare revenue forecast.\n- Prepare revenue forecast for next quarter\n- Resolve customer tickets\n- tiny";
        let tasks = parse_order_into_tasks(order);
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Prepare revenue forecast", "Resolve customer tickets"]);
        assert_eq!(tasks[1].domain, "support");
    }
    
    #[test]
    fn test_hyphenated_words_are_not_bullets() {
        let tasks = parse_order_into_tasks("Plan a follow-up with the security audit team");
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| !t.title.starts_with("up ")));
    }
    
    #[test]
    fn test_unstructured_order_splits_by_domain() {
        let tasks = parse_order_into_tasks("Ship the new billing API and announce it on the blog");
        let domains: Vec<&str> = tasks.iter().map(|t| t.domain.as_str()).collect();
        assert!(domains.contains(&"engineering"));
        assert!(domains.contains(&"marketing"));
        assert!(tasks[0].title.contains(" work for: Ship the new billing"));
    }
    
    #[test]
    fn test_single_domain_order_is_one_task() {
        let long = "Fix the login bug ".repeat(10);
        let tasks = parse_order_into_tasks(&long);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title.chars().count(), 100);
        assert_eq!(tasks[0].domain, "engineering");
        
        assert!(parse_order_into_tasks("   ").is_empty());
    }
}
