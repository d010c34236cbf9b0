// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event stream contract validation ("doctor").
//!
//! Checks a run's event stream against the journal contract: monotonic seq
//! ordering, required lifecycle events, step start/end pairing and tool
//! pairing. Kind comparisons go through the canonical table in
//! `swarm_core::event::normalize_kind`.

use crate::journal::read_events;
use crate::paths::events_path;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use swarm_core::{normalize_kind, RunEvent, RunId, StepId};

/// Category of a contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Ordering,
    MissingEvent,
    Pairing,
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A violation of the event contract.
#[derive(Debug, Clone, Serialize)]
pub struct EventContractViolation {
    pub run_id: RunId,
    pub kind: ViolationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub severity: Severity,
}

impl EventContractViolation {
    fn new(run_id: &RunId, kind: ViolationKind, message: String, severity: Severity) -> Self {
        Self {
            run_id: run_id.clone(),
            kind,
            message,
            event_id: None,
            seq: None,
            severity,
        }
    }
}

fn escalate(strict: bool) -> Severity {
    if strict {
        Severity::Error
    } else {
        Severity::Warning
    }
}

/// Validate an event stream against the contract.
///
/// Returns all violations found; empty means valid. With `strict`, the
/// warning-level anomalies become errors.
pub fn validate_event_stream(
    run_id: &RunId,
    events: &[RunEvent],
    strict: bool,
) -> Vec<EventContractViolation> {
    let mut violations = Vec::new();
    if events.is_empty() {
        return violations;
    }

    // === 1. Monotonic seq ordering ===
    let mut seen_seqs: HashSet<u64> = HashSet::new();
    let mut prev_seq: Option<u64> = None;

    for event in events {
        if !seen_seqs.insert(event.seq) {
            let mut v = EventContractViolation::new(
                run_id,
                ViolationKind::Ordering,
                format!("Duplicate seq: {}", event.seq),
                Severity::Error,
            );
            v.event_id = Some(event.event_id.clone());
            v.seq = Some(event.seq);
            violations.push(v);
        }

        if let Some(prev) = prev_seq {
            if event.seq < prev {
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Ordering,
                    format!("Seq regression: {} -> {}", prev, event.seq),
                    Severity::Error,
                );
                v.event_id = Some(event.event_id.clone());
                v.seq = Some(event.seq);
                violations.push(v);
            } else if event.seq > prev + 1 {
                // Gaps can happen on crash recovery
                let gap = event.seq - prev - 1;
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Ordering,
                    format!(
                        "Seq gap: expected {}, got {} (gap of {gap})",
                        prev + 1,
                        event.seq
                    ),
                    escalate(strict),
                );
                v.seq = Some(event.seq);
                violations.push(v);
            }
        }
        prev_seq = Some(event.seq);
    }

    // === 2. Required lifecycle events ===
    let kinds: HashSet<&str> = events
        .iter()
        .map(|e| normalize_kind(e.kind.as_str()))
        .collect();

    if !kinds.contains("run_created") && !kinds.contains("run_started") {
        violations.push(EventContractViolation::new(
            run_id,
            ViolationKind::MissingEvent,
            "Missing run_created/run_started event".to_string(),
            escalate(strict),
        ));
    }

    // === 3. Step lifecycle pairing ===
    let mut step_starts: HashMap<StepId, &RunEvent> = HashMap::new();
    let mut step_ends: HashSet<StepId> = HashSet::new();

    for event in events {
        let kind = normalize_kind(event.kind.as_str());
        let Some(step_id) = &event.step_id else {
            continue;
        };

        if kind == "step_start" {
            if step_starts.contains_key(step_id) && !step_ends.contains(step_id) {
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Pairing,
                    format!("step_start for '{step_id}' without prior step_end"),
                    Severity::Error,
                );
                v.event_id = Some(event.event_id.clone());
                violations.push(v);
            }
            // Membership in step_ends is permanent: a step that completed
            // once is never an orphan, even mid-way through a later
            // microloop iteration.
            step_starts.insert(step_id.clone(), event);
        } else if kind == "step_end" {
            if !step_starts.contains_key(step_id) {
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Pairing,
                    format!("step_end for '{step_id}' without step_start"),
                    Severity::Error,
                );
                v.event_id = Some(event.event_id.clone());
                violations.push(v);
            }
            step_ends.insert(step_id.clone());
        }
    }

    // Orphan starts only matter once the run is complete
    let run_complete = kinds.contains("run_completed");
    if run_complete {
        for (step_id, start_event) in &step_starts {
            if !step_ends.contains(step_id) {
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Pairing,
                    format!("step_start for '{step_id}' without step_end (run is complete)"),
                    escalate(strict),
                );
                v.event_id = Some(start_event.event_id.clone());
                violations.push(v);
            }
        }
    }

    // === 4. Tool pairing (only when tool_use_id is available) ===
    let mut tool_starts: HashMap<String, &RunEvent> = HashMap::new();
    let mut tool_ends: HashSet<String> = HashSet::new();

    for event in events {
        let kind = normalize_kind(event.kind.as_str());
        let Some(tool_use_id) = event.tool_use_id() else {
            continue;
        };

        if kind == "tool_start" {
            tool_starts.insert(tool_use_id.to_string(), event);
        } else if kind == "tool_end" {
            tool_ends.insert(tool_use_id.to_string());
            if !tool_starts.contains_key(tool_use_id) {
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Pairing,
                    format!("tool_end for '{tool_use_id}' without tool_start"),
                    Severity::Warning,
                );
                v.event_id = Some(event.event_id.clone());
                violations.push(v);
            }
        }
    }

    if run_complete {
        for (tool_use_id, start_event) in &tool_starts {
            if !tool_ends.contains(tool_use_id) {
                let mut v = EventContractViolation::new(
                    run_id,
                    ViolationKind::Pairing,
                    format!("tool_start for '{tool_use_id}' without tool_end (run is complete)"),
                    Severity::Warning,
                );
                v.event_id = Some(start_event.event_id.clone());
                violations.push(v);
            }
        }
    }

    violations
}

/// Validate a run's events from disk.
pub fn doctor(runs_root: &Path, run_id: &RunId, strict: bool) -> Vec<EventContractViolation> {
    let path = events_path(runs_root, run_id);
    if !path.exists() {
        return vec![EventContractViolation::new(
            run_id,
            ViolationKind::Schema,
            format!("events.jsonl not found: {}", path.display()),
            Severity::Error,
        )];
    }
    match read_events(&path) {
        Ok(events) => validate_event_stream(run_id, &events, strict),
        Err(e) => vec![EventContractViolation::new(
            run_id,
            ViolationKind::Schema,
            format!("Failed to read events.jsonl: {e}"),
            Severity::Error,
        )],
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
