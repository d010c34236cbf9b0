// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History-priority budgeting for prompt assembly.
//!
//! When a step runs without a ContextPack, previous step outputs are admitted
//! into the prompt by priority class, not blind recency. Critical-path items
//! (gating decisions, critics, implementations) are preserved; utility and
//! post-flight outputs are dropped first when the budget is tight.

use crate::models::{HistoryEntry, HistoryTruncationInfo};
use std::collections::BTreeMap;

/// Priority levels for history items. Higher = kept longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HistoryPriority {
    /// Drop first: utility, communication, post-flight
    Low = 0,
    /// Consider dropping: preprocessing, shaping, supplementary
    Medium = 1,
    /// Usually keep: foundation specs, core path agents
    High = 2,
    /// Always keep: final decisions, critics, core implementations
    Critical = 3,
}

impl HistoryPriority {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryPriority::Low => "LOW",
            HistoryPriority::Medium => "MEDIUM",
            HistoryPriority::High => "HIGH",
            HistoryPriority::Critical => "CRITICAL",
        }
    }
}

/// Character budgets for history admission.
#[derive(Debug, Clone, Copy)]
pub struct HistoryBudget {
    /// Global cap across all admitted items.
    pub context_budget_chars: usize,
    /// Per-item cap for CRITICAL items and the most recent step.
    pub recent_max_chars: usize,
    /// Per-item cap for older items.
    pub older_max_chars: usize,
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self {
            context_budget_chars: 24_000,
            recent_max_chars: 6_000,
            older_max_chars: 2_000,
        }
    }
}

const CRITICAL_MARKERS: &[&str] = &[
    "critic",
    "decision",
    "implement",
    "gate",
    "verdict",
    "navigator",
];
const HIGH_MARKERS: &[&str] = &[
    "requirement",
    "design",
    "spec",
    "adr",
    "architect",
    "verification",
    "author_tests",
    "test-author",
];
const MEDIUM_MARKERS: &[&str] = &[
    "analysis",
    "context",
    "risk",
    "research",
    "triage",
];

/// Classify a history item by agent, step id and role keywords.
pub fn classify_history_item(entry: &HistoryEntry) -> HistoryPriority {
    let mut haystack = entry.step_id.as_str().to_ascii_lowercase();
    if let Some(agent) = &entry.agent_key {
        haystack.push(' ');
        haystack.push_str(&agent.as_str().to_ascii_lowercase());
    }
    if let Some(role) = &entry.role {
        haystack.push(' ');
        haystack.push_str(&role.to_ascii_lowercase());
    }

    if CRITICAL_MARKERS.iter().any(|m| haystack.contains(m)) {
        return HistoryPriority::Critical;
    }
    if HIGH_MARKERS.iter().any(|m| haystack.contains(m)) {
        return HistoryPriority::High;
    }
    if MEDIUM_MARKERS.iter().any(|m| haystack.contains(m)) {
        return HistoryPriority::Medium;
    }
    HistoryPriority::Low
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn render_entry(entry: &HistoryEntry, max_chars: usize) -> String {
    let body = entry.summary.as_deref().unwrap_or(&entry.output);
    let body = truncate_chars(body, max_chars);
    let mut text = format!("### Step {} ({})\n{}", entry.step_id, entry.status, body);
    if !entry.artifacts.is_empty() {
        let names: Vec<&str> = entry.artifacts.keys().map(String::as_str).collect();
        text.push_str(&format!("\nArtifacts: {}", names.join(", ")));
    }
    text.push('\n');
    text
}

/// Build the history section of a prompt under a character budget.
///
/// Items are sorted by priority descending (ties broken by recency,
/// oldest first), truncated per item, and admitted until the global budget
/// would be exceeded. Returns the rendered section plus truncation metadata
/// for the receipt.
pub fn build_history_section(
    history: &[HistoryEntry],
    budget: &HistoryBudget,
) -> (String, HistoryTruncationInfo) {
    if history.is_empty() {
        return (String::new(), HistoryTruncationInfo::default());
    }

    let last_index = history.len() - 1;

    // (original position, priority)
    let mut ranked: Vec<(usize, HistoryPriority)> = history
        .iter()
        .enumerate()
        .map(|(i, e)| (i, classify_history_item(e)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut admitted: Vec<usize> = Vec::new();
    let mut rendered: BTreeMap<usize, String> = BTreeMap::new();
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut chars_used = 0usize;
    let mut truncated = false;

    for (index, priority) in &ranked {
        let per_item_cap = if *priority == HistoryPriority::Critical || *index == last_index {
            budget.recent_max_chars
        } else {
            budget.older_max_chars
        };
        let text = render_entry(&history[*index], per_item_cap);

        if chars_used + text.len() > budget.context_budget_chars {
            truncated = true;
            continue;
        }

        chars_used += text.len();
        admitted.push(*index);
        *distribution.entry(priority.label().to_string()).or_insert(0) += 1;
        rendered.insert(*index, text);
    }

    // Emit admitted items in original flow order
    let section: String = rendered.into_values().collect::<Vec<_>>().join("\n");

    let info = HistoryTruncationInfo {
        steps_included: admitted.len(),
        steps_total: history.len(),
        chars_used,
        budget_chars: budget.context_budget_chars,
        truncated,
        priority_aware: true,
        priority_distribution: Some(distribution),
    };

    (section, info)
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
