// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stub step engine: the full lifecycle without an LLM.
//!
//! Used by the autopilot default and by orchestration tests. Each step can
//! be scripted with a plan controlling the envelope status, loop hints and
//! failure modes; unscripted steps succeed with VERIFIED envelopes.

use crate::engine::{StepEngine, WorkOutput};
use crate::models::{FinalizationResult, StepContext, StepResult, StepStatus};
use crate::router::{generate_routing_candidates, route_from_routing_config};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use swarm_adapters::{append_transcript, scan_file_changes, TranscriptEntry};
use swarm_core::{
    utc_now_iso, EnvelopeSource, EnvelopeStatus, HandoffEnvelope, RoutingSignal,
};
use swarm_storage::{
    paths, write_handoff_envelope, write_step_receipt, StepReceipt, WriteOptions,
};
use tracing::{debug, warn};

/// Scripted behavior for one execution of a step.
#[derive(Debug, Clone)]
pub struct StubStepPlan {
    pub status: EnvelopeStatus,
    pub can_further_iteration_help: Option<bool>,
    /// Fail the work phase.
    pub fail: bool,
    /// Leave no envelope behind, exercising the orchestrator fallback.
    pub skip_envelope: bool,
    /// Leave no routing signal behind, exercising envelope-first fallback.
    pub skip_routing: bool,
    /// Forensic evidence to attach to the envelope.
    pub file_changes: Option<swarm_core::FileChanges>,
    /// Extra envelope fields (e.g. a `test_summary` for stall detection).
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for StubStepPlan {
    fn default() -> Self {
        Self {
            status: EnvelopeStatus::Verified,
            can_further_iteration_help: None,
            fail: false,
            skip_envelope: false,
            skip_routing: false,
            file_changes: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl StubStepPlan {
    pub fn with_status(status: EnvelopeStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Step engine that simulates agent work deterministically.
#[derive(Default)]
pub struct StubStepEngine {
    plans: Mutex<HashMap<String, VecDeque<StubStepPlan>>>,
    active: Mutex<HashMap<String, StubStepPlan>>,
    scan_diffs: bool,
}

impl StubStepEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the repository for file changes during finalize.
    pub fn with_diff_scan(mut self, scan: bool) -> Self {
        self.scan_diffs = scan;
        self
    }

    /// Queue a plan for the next execution of `step_id`.
    pub fn plan_step(&self, step_id: impl Into<String>, plan: StubStepPlan) {
        self.plans
            .lock()
            .entry(step_id.into())
            .or_default()
            .push_back(plan);
    }

    fn take_plan(&self, step_id: &str) -> StubStepPlan {
        let plan = self
            .plans
            .lock()
            .get_mut(step_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        self.active.lock().insert(step_id.to_string(), plan.clone());
        plan
    }

    fn active_plan(&self, step_id: &str) -> StubStepPlan {
        self.active.lock().get(step_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl StepEngine for StubStepEngine {
    fn id(&self) -> &str {
        "stub"
    }

    async fn run_worker(&self, ctx: &StepContext) -> WorkOutput {
        let started = Instant::now();
        let plan = self.take_plan(ctx.step_id.as_str());

        let transcript_path = paths::transcript_path(
            &ctx.run_base(),
            &ctx.step_id,
            &ctx.primary_agent(),
            self.id(),
        );
        let entries = [
            TranscriptEntry::message("user", format!("Execute step {}: {}", ctx.step_id, ctx.step_role)),
            TranscriptEntry::message(
                "assistant",
                format!("Stub execution of step {}", ctx.step_id),
            ),
        ];
        if let Err(e) = append_transcript(&transcript_path, &entries) {
            warn!(error = %e, "failed to write stub transcript");
        }

        let work_summary = format!("Stub execution of step {} ({})", ctx.step_id, ctx.step_role);
        let mut result = if plan.fail {
            StepResult::failed(ctx.step_id.clone(), "stub step failure")
        } else {
            StepResult::succeeded(ctx.step_id.clone(), work_summary.clone())
        };
        result.duration_ms = started.elapsed().as_millis() as u64;

        WorkOutput {
            result,
            events: Vec::new(),
            work_summary,
        }
    }

    async fn finalize_step(
        &self,
        ctx: &StepContext,
        result: &StepResult,
        work_summary: &str,
    ) -> FinalizationResult {
        let plan = self.active_plan(ctx.step_id.as_str());
        let run_base = ctx.run_base();
        let agent = ctx.primary_agent();

        let mut receipt = StepReceipt::new(
            self.id(),
            "stub",
            "session",
            "stub",
            ctx.step_id.clone(),
            ctx.flow_key.clone(),
            ctx.run_id.clone(),
            agent.clone(),
        );
        receipt.started_at = utc_now_iso();
        receipt.duration_ms = result.duration_ms;
        receipt.status = match result.status {
            StepStatus::Failed => "failed".to_string(),
            _ => "succeeded".to_string(),
        };
        receipt.error = result.error.clone();
        receipt.transcript_path = Some(format!(
            "{}/{}-{}-{}.jsonl",
            paths::LLM_DIR,
            ctx.step_id,
            agent,
            self.id()
        ));

        if plan.skip_envelope {
            debug!(step_id = %ctx.step_id, "stub plan skips envelope");
            receipt.completed_at = utc_now_iso();
            if let Err(e) = write_step_receipt(&run_base, &receipt) {
                warn!(error = %e, "failed to write stub receipt");
            }
            return FinalizationResult {
                envelope: None,
                work_summary: work_summary.to_string(),
                events: Vec::new(),
            };
        }

        let status = if result.status == StepStatus::Failed {
            EnvelopeStatus::Unverified
        } else {
            plan.status
        };

        let mut envelope =
            HandoffEnvelope::new(ctx.step_id.clone(), ctx.flow_key.clone(), ctx.run_id.clone(), status)
                .with_summary(work_summary)
                .with_duration_ms(result.duration_ms)
                .with_source(EnvelopeSource::Lifecycle);
        envelope.error = result.error.clone();
        envelope.can_further_iteration_help = plan.can_further_iteration_help;
        envelope.file_changes = plan.file_changes.clone();
        envelope.extra = plan.extra.clone();

        if self.scan_diffs && envelope.file_changes.is_none() {
            envelope.file_changes = Some(scan_file_changes(&ctx.repo_root, true, true).await);
        }

        if let Err(e) = write_handoff_envelope(&run_base, &mut envelope, WriteOptions::default()) {
            warn!(error = %e, "failed to write stub envelope");
            receipt.completed_at = utc_now_iso();
            if let Err(e) = write_step_receipt(&run_base, &receipt) {
                warn!(error = %e, "failed to write stub receipt");
            }
            return FinalizationResult {
                envelope: None,
                work_summary: work_summary.to_string(),
                events: Vec::new(),
            };
        }

        receipt.handoff_envelope_path = Some(format!(
            "{}/{}.json",
            paths::HANDOFF_DIR,
            ctx.step_id
        ));
        receipt.completed_at = utc_now_iso();
        if let Err(e) = write_step_receipt(&run_base, &receipt) {
            warn!(error = %e, "failed to write stub receipt");
        }

        FinalizationResult {
            envelope: Some(envelope),
            work_summary: work_summary.to_string(),
            events: Vec::new(),
        }
    }

    async fn route_step(
        &self,
        ctx: &StepContext,
        envelope: &HandoffEnvelope,
    ) -> Option<RoutingSignal> {
        let plan = self.active_plan(ctx.step_id.as_str());
        if plan.skip_routing {
            return None;
        }
        let routing = ctx.routing_config.as_ref()?;
        let signal = route_from_routing_config(
            routing,
            envelope.status.as_str(),
            envelope.can_further_iteration_help,
            ctx.routing.loop_iteration,
        )?;
        let candidates = generate_routing_candidates(routing, envelope.status.as_str());
        Some(
            signal
                .with_source("routing_config")
                .with_candidates(candidates),
        )
    }
}

#[cfg(test)]
#[path = "stub_tests.rs"]
mod tests;
