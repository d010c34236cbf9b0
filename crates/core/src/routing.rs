// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing decisions and signals.
//!
//! A [`RoutingSignal`] is the decision record telling the orchestrator what
//! to do after a step completes. [`parse_routing_decision`] is the single
//! vocabulary table for mapping router output (including aliases) onto the
//! canonical decisions.

use crate::id::StepId;
use serde::{Deserialize, Serialize};

/// Canonical routing decision vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    Advance,
    Loop,
    Terminate,
    Branch,
}

impl RoutingDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingDecision::Advance => "advance",
            RoutingDecision::Loop => "loop",
            RoutingDecision::Terminate => "terminate",
            RoutingDecision::Branch => "branch",
        }
    }
}

impl std::fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a routing decision string, accepting router aliases.
///
/// Unknown words map to `Advance` so a confused router can never wedge a flow.
pub fn parse_routing_decision(s: &str) -> RoutingDecision {
    match s.trim().to_ascii_lowercase().as_str() {
        "advance" | "proceed" | "continue" | "next" => RoutingDecision::Advance,
        "loop" | "rerun" | "retry" | "repeat" => RoutingDecision::Loop,
        "terminate" | "blocked" | "stop" | "end" | "exit" => RoutingDecision::Terminate,
        "branch" | "route" | "switch" | "redirect" => RoutingDecision::Branch,
        _ => RoutingDecision::Advance,
    }
}

/// One option considered by a routing decision, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingCandidate {
    pub id: String,
    /// "advance" | "loop" | "terminate" | "branch"
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node: Option<StepId>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub priority: i32,
    /// Where this candidate came from ("routing_config", "router_llm", "stall_detector")
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub is_default: bool,
}

/// The routing decision record attached to a committed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSignal {
    pub decision: RoutingDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<StepId>,
    /// Branch label when `decision == Branch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub needs_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_candidate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing_candidates: Vec<RoutingCandidate>,
}

impl RoutingSignal {
    pub fn advance(next: Option<StepId>, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            decision: RoutingDecision::Advance,
            next_step_id: next,
            route: None,
            reason: reason.into(),
            confidence,
            needs_human: false,
            routing_source: None,
            chosen_candidate_id: None,
            routing_candidates: Vec::new(),
        }
    }

    pub fn loop_to(target: StepId, reason: impl Into<String>) -> Self {
        Self {
            decision: RoutingDecision::Loop,
            next_step_id: Some(target),
            route: None,
            reason: reason.into(),
            confidence: 1.0,
            needs_human: false,
            routing_source: None,
            chosen_candidate_id: None,
            routing_candidates: Vec::new(),
        }
    }

    pub fn terminate(reason: impl Into<String>) -> Self {
        Self {
            decision: RoutingDecision::Terminate,
            next_step_id: None,
            route: None,
            reason: reason.into(),
            confidence: 1.0,
            needs_human: false,
            routing_source: None,
            chosen_candidate_id: None,
            routing_candidates: Vec::new(),
        }
    }

    pub fn branch(target: StepId, route: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            decision: RoutingDecision::Branch,
            next_step_id: Some(target),
            route: Some(route.into()),
            reason: reason.into(),
            confidence: 1.0,
            needs_human: false,
            routing_source: None,
            chosen_candidate_id: None,
            routing_candidates: Vec::new(),
        }
    }

    pub fn with_needs_human(mut self, needs_human: bool) -> Self {
        self.needs_human = needs_human;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.routing_source = Some(source.into());
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<RoutingCandidate>) -> Self {
        self.routing_candidates = candidates;
        self
    }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;
