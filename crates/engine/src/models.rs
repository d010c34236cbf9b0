// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data models for the step engine abstraction.
//!
//! Pure data: everything an engine needs to execute a step, and everything
//! it hands back. No dependencies on engine implementations.

use crate::context_pack::ContextPack;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use swarm_core::{AgentKey, FlowKey, HandoffEnvelope, RunEvent, RunId, RunSpec, StepId};
use swarm_registry::{EngineProfile, StepRouting, TeachingNotes};

/// Execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing metadata carried into a step for microloop awareness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Current iteration count for the microloop (0 on first pass).
    #[serde(default)]
    pub loop_iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// "linear" | "microloop" | "branch" | "terminal" | "fork" | "join"
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_target: Option<StepId>,
}

/// A prior step's outcome, admitted into later prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step_id: StepId,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_key: Option<AgentKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Context provided to an engine for executing a single step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub repo_root: PathBuf,
    pub runs_root: PathBuf,
    pub run_id: RunId,
    pub flow_key: FlowKey,
    pub step_id: StepId,
    /// 1-based step index within the flow.
    pub step_index: u32,
    pub total_steps: u32,
    pub spec: RunSpec,
    pub flow_title: String,
    pub step_role: String,
    pub step_agents: Vec<AgentKey>,
    pub history: Vec<HistoryEntry>,
    pub teaching_notes: Option<TeachingNotes>,
    pub routing: RoutingContext,
    pub routing_config: Option<StepRouting>,
    pub engine_profile: EngineProfile,
    /// Pre-assembled context; attached during hydrate when absent.
    pub context_pack: Option<ContextPack>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StepContext {
    /// Base directory for this step's artifacts:
    /// `<runs_root>/<run_id>/<flow_key>`.
    pub fn run_base(&self) -> PathBuf {
        self.runs_root
            .join(self.run_id.as_str())
            .join(self.flow_key.as_str())
    }

    /// First assigned agent, or a generic fallback.
    pub fn primary_agent(&self) -> AgentKey {
        self.step_agents
            .first()
            .cloned()
            .unwrap_or_else(|| AgentKey::new("agent"))
    }

    pub fn is_terminal_step(&self) -> bool {
        matches!(self.routing_config, Some(StepRouting::Terminal {}))
    }
}

/// Result of executing a single step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub status: StepStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<BTreeMap<String, String>>,
}

impl StepResult {
    pub fn succeeded(step_id: StepId, output: impl Into<String>) -> Self {
        Self {
            step_id,
            status: StepStatus::Succeeded,
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn failed(step_id: StepId, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            step_id,
            status: StepStatus::Failed,
            output: String::new(),
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Result of the finalization phase.
#[derive(Debug, Clone, Default)]
pub struct FinalizationResult {
    /// Structured envelope, when finalization produced one.
    pub envelope: Option<HandoffEnvelope>,
    pub work_summary: String,
    pub events: Vec<RunEvent>,
}

/// Metadata about history truncation during prompt building.
///
/// The same shape is produced whether hydration came from a ContextPack or
/// the raw-history fallback, so receipts stay comparable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTruncationInfo {
    pub steps_included: usize,
    pub steps_total: usize,
    pub chars_used: usize,
    pub budget_chars: usize,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub priority_aware: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_distribution: Option<BTreeMap<String, usize>>,
}

impl HistoryTruncationInfo {
    /// Machine-readable truncation note, empty when nothing was dropped.
    pub fn truncation_note(&self) -> String {
        if !self.truncated {
            return String::new();
        }
        let omitted = self.steps_total - self.steps_included;
        let mut note = format!(
            "[CONTEXT_TRUNCATED] Included {} of {} history steps ({} omitted, budget: {}/{} chars)",
            self.steps_included, self.steps_total, omitted, self.chars_used, self.budget_chars
        );
        if self.priority_aware {
            if let Some(dist) = &self.priority_distribution {
                let get = |k: &str| dist.get(k).copied().unwrap_or(0);
                note.push_str(&format!(
                    " [Priority: CRITICAL={}, HIGH={}, MEDIUM={}, LOW={}]",
                    get("CRITICAL"),
                    get("HIGH"),
                    get("MEDIUM"),
                    get("LOW")
                ));
            }
        }
        note
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
pub(crate) mod tests;
