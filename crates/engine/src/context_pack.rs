// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ContextPack hydration: structured context from committed envelopes.
//!
//! The preferred hydration strategy. Prior steps' committed envelopes are
//! distilled into summaries + artifact pointers; the raw-history prompt path
//! is the fallback when no envelopes can be read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use swarm_core::{EnvelopeStatus, StepId};
use swarm_storage::read_handoff_envelope;
use tracing::debug;

/// One prior step distilled for downstream context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPackEntry {
    pub step_id: StepId,
    pub status: EnvelopeStatus,
    pub summary: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
}

/// Pre-assembled context attached to a step before execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    pub entries: Vec<ContextPackEntry>,
}

impl ContextPack {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the pack as a prompt section.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "### {} [{}]\n{}\n",
                entry.step_id, entry.status, entry.summary
            ));
            if !entry.artifacts.is_empty() {
                for (name, path) in &entry.artifacts {
                    out.push_str(&format!("- {name}: {path}\n"));
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Build a ContextPack from the committed envelopes of prior steps.
///
/// Returns `None` when no prior envelope is readable, signalling the caller
/// to fall back to the raw-history prompt.
pub fn build_context_pack(run_base: &Path, prior_steps: &[StepId]) -> Option<ContextPack> {
    let mut entries = Vec::new();
    for step_id in prior_steps {
        if let Some(envelope) = read_handoff_envelope(run_base, step_id, false) {
            entries.push(ContextPackEntry {
                step_id: step_id.clone(),
                status: envelope.status,
                summary: envelope.summary,
                artifacts: envelope.artifacts,
            });
        }
    }
    if entries.is_empty() {
        debug!(run_base = %run_base.display(), "no prior envelopes; falling back to raw history");
        return None;
    }
    Some(ContextPack { entries })
}

#[cfg(test)]
#[path = "context_pack_tests.rs"]
mod tests;
