// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run events and the canonical event-kind table.
//!
//! Every significant transition in a run appends a [`RunEvent`] to the run's
//! `events.jsonl`. The [`EventKind`] table here is the single source of truth
//! for kind names; both the event validator and the projection reference it
//! via [`normalize_kind`].

use crate::id::{AgentKey, FlowKey, RunId, StepId};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical event kinds appended to `events.jsonl`.
///
/// Unknown kinds round-trip through [`EventKind::Other`] so journals written
/// by newer producers stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    // -- run lifecycle --
    RunCreated,
    RunStarted,
    RunCompleted,
    RunCanceled,
    // -- step lifecycle --
    StepStart,
    StepEnd,
    StepError,
    // -- tools & forensics --
    ToolStart,
    ToolEnd,
    FileChanges,
    // -- misc --
    BackendInit,
    Log,
    Error,
    // -- autopilot --
    AutopilotStarted,
    AutopilotFlowStarted,
    AutopilotFlowCompleted,
    AutopilotFlowFailed,
    AutopilotPausing,
    AutopilotPaused,
    AutopilotResumed,
    AutopilotStopping,
    AutopilotStopped,
    AutopilotCanceled,
    AutopilotCompleted,
    // -- evolution --
    EvolutionProcessingStarted,
    EvolutionProcessingCompleted,
    EvolutionApplied,
    EvolutionSuggested,
    EvolutionRejected,
    /// Catch-all for unknown kinds (extensibility)
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::RunCreated => "run_created",
            EventKind::RunStarted => "run_started",
            EventKind::RunCompleted => "run_completed",
            EventKind::RunCanceled => "run_canceled",
            EventKind::StepStart => "step_start",
            EventKind::StepEnd => "step_end",
            EventKind::StepError => "step_error",
            EventKind::ToolStart => "tool_start",
            EventKind::ToolEnd => "tool_end",
            EventKind::FileChanges => "file_changes",
            EventKind::BackendInit => "backend_init",
            EventKind::Log => "log",
            EventKind::Error => "error",
            EventKind::AutopilotStarted => "autopilot_started",
            EventKind::AutopilotFlowStarted => "autopilot_flow_started",
            EventKind::AutopilotFlowCompleted => "autopilot_flow_completed",
            EventKind::AutopilotFlowFailed => "autopilot_flow_failed",
            EventKind::AutopilotPausing => "autopilot_pausing",
            EventKind::AutopilotPaused => "autopilot_paused",
            EventKind::AutopilotResumed => "autopilot_resumed",
            EventKind::AutopilotStopping => "autopilot_stopping",
            EventKind::AutopilotStopped => "autopilot_stopped",
            EventKind::AutopilotCanceled => "autopilot_canceled",
            EventKind::AutopilotCompleted => "autopilot_completed",
            EventKind::EvolutionProcessingStarted => "evolution_processing_started",
            EventKind::EvolutionProcessingCompleted => "evolution_processing_completed",
            EventKind::EvolutionApplied => "evolution_applied",
            EventKind::EvolutionSuggested => "evolution_suggested",
            EventKind::EvolutionRejected => "evolution_rejected",
            EventKind::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "run_created" => EventKind::RunCreated,
            "run_started" => EventKind::RunStarted,
            "run_completed" => EventKind::RunCompleted,
            "run_canceled" => EventKind::RunCanceled,
            "step_start" => EventKind::StepStart,
            "step_end" => EventKind::StepEnd,
            "step_error" => EventKind::StepError,
            "tool_start" => EventKind::ToolStart,
            "tool_end" => EventKind::ToolEnd,
            "file_changes" => EventKind::FileChanges,
            "backend_init" => EventKind::BackendInit,
            "log" => EventKind::Log,
            "error" => EventKind::Error,
            "autopilot_started" => EventKind::AutopilotStarted,
            "autopilot_flow_started" => EventKind::AutopilotFlowStarted,
            "autopilot_flow_completed" => EventKind::AutopilotFlowCompleted,
            "autopilot_flow_failed" => EventKind::AutopilotFlowFailed,
            "autopilot_pausing" => EventKind::AutopilotPausing,
            "autopilot_paused" => EventKind::AutopilotPaused,
            "autopilot_resumed" => EventKind::AutopilotResumed,
            "autopilot_stopping" => EventKind::AutopilotStopping,
            "autopilot_stopped" => EventKind::AutopilotStopped,
            "autopilot_canceled" => EventKind::AutopilotCanceled,
            "autopilot_completed" => EventKind::AutopilotCompleted,
            "evolution_processing_started" => EventKind::EvolutionProcessingStarted,
            "evolution_processing_completed" => EventKind::EvolutionProcessingCompleted,
            "evolution_applied" => EventKind::EvolutionApplied,
            "evolution_suggested" => EventKind::EvolutionSuggested,
            "evolution_rejected" => EventKind::EvolutionRejected,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// True for kinds that end a run (`run_completed` / `run_canceled`).
    pub fn is_run_terminal(&self) -> bool {
        matches!(self, EventKind::RunCompleted | EventKind::RunCanceled)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("event kind must be non-empty"));
        }
        Ok(EventKind::parse(&s))
    }
}

/// Normalize an event kind string to its canonical form.
///
/// `step_error` collapses to `step_end` for lifecycle pairing; legacy
/// producer aliases collapse to the canonical names. Unknown kinds pass
/// through unchanged.
pub fn normalize_kind(kind: &str) -> &str {
    match kind {
        "step_error" | "step_complete" | "step_completed" => "step_end",
        "run_complete" => "run_completed",
        "run_cancelled" => "run_canceled",
        other => other,
    }
}

/// A single entry in a run's append-only event journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    /// Wall-clock timestamp, ISO-8601 UTC with `Z` suffix. Advisory.
    #[serde(default)]
    pub ts: String,
    /// Monotonic sequence per run, assigned at append time. 1-based.
    #[serde(default)]
    pub seq: u64,
    /// Globally unique event identifier, assigned at append time.
    #[serde(default)]
    pub event_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub flow_key: FlowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_key: Option<AgentKey>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl RunEvent {
    pub fn new(run_id: impl Into<RunId>, kind: EventKind, flow_key: impl Into<FlowKey>) -> Self {
        Self {
            run_id: run_id.into(),
            ts: String::new(),
            seq: 0,
            event_id: String::new(),
            kind,
            flow_key: flow_key.into(),
            step_id: None,
            agent_key: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<StepId>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_agent(mut self, agent_key: impl Into<AgentKey>) -> Self {
        self.agent_key = Some(agent_key.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// `tool_use_id` from the payload, when present. Used for tool pairing.
    pub fn tool_use_id(&self) -> Option<&str> {
        self.payload.get("tool_use_id").and_then(|v| v.as_str())
    }

    pub fn log_summary(&self) -> String {
        let t = self.kind.as_str();
        match (&self.step_id, &self.agent_key) {
            (Some(step), Some(agent)) => {
                format!("{t} run={} flow={} step={step} agent={agent}", self.run_id, self.flow_key)
            }
            (Some(step), None) => {
                format!("{t} run={} flow={} step={step}", self.run_id, self.flow_key)
            }
            _ => format!("{t} run={} flow={}", self.run_id, self.flow_key),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
