// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step receipts: one audit record per `(step, agent)` per execution.
//!
//! Every engine invocation writes exactly one receipt, including stub mode
//! and failures. The receipt records how the LLM call was made and what it
//! cost; fallback tracking captures when the effective execution mode
//! differed from the requested one.

use crate::paths::{ensure_receipts_dir, receipt_path};
use crate::store::write_json_atomic;
use crate::HandoffError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use swarm_core::{AgentKey, FlowKey, RoutingSignal, RunId, StepId};
use tracing::debug;

/// Token accounting for one LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    #[serde(default)]
    pub prompt: u64,
    #[serde(default)]
    pub completion: u64,
    #[serde(default)]
    pub total: u64,
}

/// Per-step audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReceipt {
    pub engine: String,
    /// "stub" | "sdk" | "cli"
    pub mode: String,
    /// "legacy" | "session"
    pub execution_mode: String,
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,

    pub step_id: StepId,
    pub flow_key: FlowKey,
    pub run_id: RunId,
    pub agent_key: AgentKey,

    pub started_at: String,
    pub completed_at: String,
    pub duration_ms: u64,

    /// "succeeded" | "failed"
    pub status: String,
    #[serde(default)]
    pub tokens: TokenCounts,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_envelope_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_signal: Option<RoutingSignal>,

    // Fallback tracking: what was asked for vs what actually ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode_requested: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode_effective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_truncation: Option<serde_json::Value>,

    /// Engine-specific extras (e.g. prompt hash, priority distribution).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_model() -> String {
    "unknown".to_string()
}

impl StepReceipt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: impl Into<String>,
        mode: impl Into<String>,
        execution_mode: impl Into<String>,
        provider: impl Into<String>,
        step_id: StepId,
        flow_key: FlowKey,
        run_id: RunId,
        agent_key: AgentKey,
    ) -> Self {
        Self {
            engine: engine.into(),
            mode: mode.into(),
            execution_mode: execution_mode.into(),
            provider: provider.into(),
            model: default_model(),
            step_id,
            flow_key,
            run_id,
            agent_key,
            started_at: String::new(),
            completed_at: String::new(),
            duration_ms: 0,
            status: "succeeded".to_string(),
            tokens: TokenCounts::default(),
            transcript_path: None,
            handoff_envelope_path: None,
            routing_signal: None,
            execution_mode_requested: None,
            execution_mode_effective: None,
            fallback_reason: None,
            error: None,
            context_truncation: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Write a step receipt. The single entry point for all execution paths.
pub fn write_step_receipt(run_base: &Path, receipt: &StepReceipt) -> Result<PathBuf, HandoffError> {
    ensure_receipts_dir(run_base)?;
    let path = receipt_path(run_base, &receipt.step_id, &receipt.agent_key);
    write_json_atomic(&path, receipt)?;
    debug!(
        step_id = %receipt.step_id,
        agent_key = %receipt.agent_key,
        path = %path.display(),
        "wrote step receipt"
    );
    Ok(path)
}

/// Read a receipt back, `None` when missing or unparseable.
pub fn read_step_receipt(
    run_base: &Path,
    step_id: &StepId,
    agent_key: &AgentKey,
) -> Option<StepReceipt> {
    let path = receipt_path(run_base, step_id, agent_key);
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
#[path = "receipt_tests.rs"]
mod tests;
