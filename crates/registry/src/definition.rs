// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow and step definitions, immutable after load.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use swarm_core::{AgentKey, FlowKey, StepId};

/// Default microloop iteration cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default per-step engine timeout (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 300_000;

/// Teaching metadata scoping what a step reads, writes and emphasizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingNotes {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub emphasizes: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// Context budget overrides resolved through the cascade
/// step > flow > profile > global defaults. `None` means inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudgetOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_budget_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_max_recent_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_max_older_chars: Option<usize>,
}

impl ContextBudgetOverride {
    /// Merge with a parent level, preferring values set on `self`.
    pub fn merge_with(&self, parent: &ContextBudgetOverride) -> ContextBudgetOverride {
        ContextBudgetOverride {
            context_budget_chars: self.context_budget_chars.or(parent.context_budget_chars),
            history_max_recent_chars: self
                .history_max_recent_chars
                .or(parent.history_max_recent_chars),
            history_max_older_chars: self
                .history_max_older_chars
                .or(parent.history_max_older_chars),
        }
    }
}

/// Per-step engine configuration override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineProfile {
    #[serde(default = "default_engine")]
    pub engine: String,
    /// "stub" | "sdk" | "cli"
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_budgets: Option<ContextBudgetOverride>,
}

fn default_engine() -> String {
    "session".to_string()
}

fn default_mode() -> String {
    "stub".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            mode: default_mode(),
            model: None,
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            context_budgets: None,
        }
    }
}

/// Post-step verification: artifact existence plus small command checks.
/// A failing check demotes the envelope status to `gate_status_on_fail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepVerification {
    #[serde(default)]
    pub required_artifacts: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default = "default_gate_status")]
    pub gate_status_on_fail: String,
}

fn default_gate_status() -> String {
    "UNVERIFIED".to_string()
}

impl Default for StepVerification {
    fn default() -> Self {
        Self {
            required_artifacts: Vec::new(),
            commands: Vec::new(),
            gate_status_on_fail: default_gate_status(),
        }
    }
}

fn default_condition_field() -> String {
    "status".to_string()
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

/// Routing configuration for a step.
///
/// Controls how the orchestrator picks the next step after this one
/// completes. Cycles are expressed as `microloop` with a target step id and
/// a counter in run state, not as graph edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepRouting {
    Linear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<StepId>,
    },
    Microloop {
        loop_target: StepId,
        #[serde(default = "default_condition_field")]
        loop_condition_field: String,
        #[serde(default)]
        loop_success_values: Vec<String>,
        #[serde(default = "default_max_iterations")]
        max_iterations: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<StepId>,
    },
    Branch {
        /// Status value → step id. YAML order preserved.
        #[serde(default)]
        branches: IndexMap<String, StepId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<StepId>,
    },
    Terminal {},
    Fork {
        #[serde(default)]
        fork_targets: Vec<StepId>,
    },
    Join {
        #[serde(default)]
        join_point: bool,
    },
}

impl StepRouting {
    pub fn kind_str(&self) -> &'static str {
        match self {
            StepRouting::Linear { .. } => "linear",
            StepRouting::Microloop { .. } => "microloop",
            StepRouting::Branch { .. } => "branch",
            StepRouting::Terminal {} => "terminal",
            StepRouting::Fork { .. } => "fork",
            StepRouting::Join { .. } => "join",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepRouting::Terminal {})
    }

    /// The step to advance to once this step (and any loop) is done.
    pub fn next_step(&self) -> Option<&StepId> {
        match self {
            StepRouting::Linear { next }
            | StepRouting::Microloop { next, .. }
            | StepRouting::Branch { next, .. } => next.as_ref(),
            _ => None,
        }
    }
}

/// A single step within a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    /// 1-based position within the flow, assigned at load.
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub agents: Vec<AgentKey>,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teaching_notes: Option<TeachingNotes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<StepRouting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_profile: Option<EngineProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<StepVerification>,
}

impl StepDefinition {
    /// First agent assigned to this step, if any.
    pub fn primary_agent(&self) -> Option<&AgentKey> {
        self.agents.first()
    }
}

/// A flow definition from the registry. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub key: FlowKey,
    /// 1-based position in the global flow order.
    pub index: u32,
    pub title: String,
    #[serde(default)]
    pub short_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Agents not pinned to a single step.
    #[serde(default)]
    pub cross_cutting: Vec<AgentKey>,
    /// Core SDLC flow vs demo/utility.
    #[serde(default = "default_true")]
    pub is_sdlc: bool,
    /// Utility flows can be injected mid-run by trigger.
    #[serde(default)]
    pub is_utility_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_trigger: Option<String>,
}

fn default_true() -> bool {
    true
}

impl FlowDefinition {
    pub fn get_step(&self, step_id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
