// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic routing from step configuration, with router-LLM parsing.
//!
//! [`route_from_routing_config`] decides in-process whenever the routing
//! config is sufficient. [`parse_router_response`] converts a router
//! session's JSON (possibly fenced in markdown) into a RoutingSignal, and
//! [`generate_routing_candidates`] records the option set for audit.

use serde::Deserialize;
use swarm_core::{
    parse_routing_decision, RoutingCandidate, RoutingSignal,
};
use swarm_registry::StepRouting;
use tracing::debug;

/// Deterministic routing per the step's routing configuration.
///
/// Returns `None` when the decision genuinely needs the router resolver
/// (ambiguous branch, fork/join, or no config at all).
pub fn route_from_routing_config(
    routing: &StepRouting,
    handoff_status: &str,
    can_further_help: Option<bool>,
    iteration: u32,
) -> Option<RoutingSignal> {
    let normalized_status = handoff_status.to_ascii_uppercase();

    match routing {
        StepRouting::Terminal {} => Some(RoutingSignal::terminate("spec_terminal")),

        StepRouting::Linear { next } => match next {
            Some(next) => Some(RoutingSignal::advance(
                Some(next.clone()),
                "spec_linear",
                1.0,
            )),
            // Linear with no next step means the flow is complete
            None => Some(RoutingSignal::terminate("spec_linear_no_next")),
        },

        StepRouting::Microloop {
            loop_target,
            loop_success_values,
            max_iterations,
            next,
            ..
        } => {
            let success = loop_success_values
                .iter()
                .any(|v| v.to_ascii_uppercase() == normalized_status);

            if success {
                return Some(RoutingSignal::advance(
                    next.clone(),
                    "spec_microloop_verified",
                    1.0,
                ));
            }
            if iteration >= *max_iterations {
                return Some(
                    RoutingSignal::advance(next.clone(), "spec_microloop_max_iterations", 0.7)
                        .with_needs_human(true),
                );
            }
            if can_further_help == Some(false) {
                return Some(
                    RoutingSignal::advance(next.clone(), "spec_microloop_no_further_help", 0.8)
                        .with_needs_human(true),
                );
            }
            Some(RoutingSignal::loop_to(
                loop_target.clone(),
                "spec_microloop_continue",
            ))
        }

        StepRouting::Branch { branches, next } => {
            // Exact match first, then case-insensitive
            if let Some(target) = branches.get(handoff_status) {
                return Some(RoutingSignal::branch(
                    target.clone(),
                    handoff_status,
                    "spec_branch",
                ));
            }
            for (label, target) in branches {
                if label.to_ascii_uppercase() == normalized_status {
                    return Some(RoutingSignal::branch(
                        target.clone(),
                        label.clone(),
                        "spec_branch",
                    ));
                }
            }
            if let Some(next) = next {
                return Some(RoutingSignal::advance(
                    Some(next.clone()),
                    "spec_branch_default",
                    0.8,
                ));
            }
            // Ambiguous: no matching branch and no default
            None
        }

        // Fork/join dispatch belongs to the orchestrator, not the driver
        StepRouting::Fork { .. } | StepRouting::Join { .. } => None,
    }
}

/// Candidate set for a routing decision, recorded in the signal for audit.
pub fn generate_routing_candidates(
    routing: &StepRouting,
    handoff_status: &str,
) -> Vec<RoutingCandidate> {
    let mut candidates = Vec::new();
    let mut push = |action: &str, target: Option<&swarm_core::StepId>, reason: String, priority: i32, is_default: bool| {
        let id = format!("c{}", candidates.len() + 1);
        candidates.push(RoutingCandidate {
            id,
            action: action.to_string(),
            target_node: target.cloned(),
            reason,
            priority,
            source: "routing_config".to_string(),
            is_default,
        });
    };

    match routing {
        StepRouting::Terminal {} => {
            push("terminate", None, "terminal step".to_string(), 10, true);
        }
        StepRouting::Linear { next } => {
            match next {
                Some(next) => push("advance", Some(next), "linear next".to_string(), 10, true),
                None => push("terminate", None, "linear end of flow".to_string(), 10, true),
            };
        }
        StepRouting::Microloop {
            loop_target, next, ..
        } => {
            push(
                "loop",
                Some(loop_target),
                "iterate until success condition".to_string(),
                5,
                false,
            );
            if let Some(next) = next {
                push("advance", Some(next), "exit loop".to_string(), 10, true);
            } else {
                push("terminate", None, "exit loop at end of flow".to_string(), 10, true);
            }
        }
        StepRouting::Branch { branches, next } => {
            for (label, target) in branches {
                let matches = label.eq_ignore_ascii_case(handoff_status);
                push(
                    "branch",
                    Some(target),
                    format!("status {label}"),
                    if matches { 10 } else { 1 },
                    false,
                );
            }
            if let Some(next) = next {
                push("advance", Some(next), "default branch".to_string(), 2, true);
            }
        }
        StepRouting::Fork { fork_targets } => {
            for target in fork_targets {
                push("branch", Some(target), "fork target".to_string(), 5, false);
            }
        }
        StepRouting::Join { .. } => {
            push("advance", None, "join point".to_string(), 5, true);
        }
    }

    candidates
}

#[derive(Debug, Deserialize)]
struct RawRouterResponse {
    #[serde(default)]
    decision: String,
    #[serde(default)]
    next_step_id: Option<String>,
    #[serde(default)]
    route: Option<String>,
    #[serde(default)]
    reason: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    needs_human: bool,
}

fn default_confidence() -> f64 {
    0.7
}

/// Extract the JSON payload from a router response, stripping markdown fences.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        let end = body.find("```")?;
        return Some(body[..end].trim());
    }
    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        let end = body.find("```")?;
        return Some(body[..end].trim());
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Parse a router session's response into a RoutingSignal.
///
/// Decision words go through the canonical alias table; unparseable
/// responses return `None` so the caller can fall back.
pub fn parse_router_response(text: &str) -> Option<RoutingSignal> {
    let json = extract_json(text)?;
    let raw: RawRouterResponse = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "router response was not valid JSON");
            return None;
        }
    };

    Some(RoutingSignal {
        decision: parse_routing_decision(&raw.decision),
        next_step_id: raw.next_step_id.map(swarm_core::StepId::new),
        route: raw.route,
        reason: raw.reason,
        confidence: raw.confidence.clamp(0.0, 1.0),
        needs_human: raw.needs_human,
        routing_source: Some("router_llm".to_string()),
        chosen_candidate_id: None,
        routing_candidates: Vec::new(),
    })
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
