// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session step engine: one LLM session carries work → finalize → route.
//!
//! The preferred execution pattern. A single adapter session keeps the hot
//! context across all three prompts; the tool guard screens destructive
//! commands; every invocation leaves a transcript and a receipt.

use crate::engine::{StepEngine, WorkOutput};
use crate::models::{FinalizationResult, StepContext, StepResult, StepStatus};
use crate::prompt::{build_finalize_prompt, build_router_prompt, build_work_prompt};
use crate::router::{
    generate_routing_candidates, parse_router_response, route_from_routing_config,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarm_adapters::{
    append_transcript, scan_file_changes, LlmAdapter, LlmError, LlmRequest, TokenUsage, ToolGuard,
    TranscriptEntry,
};
use swarm_core::{
    utc_now_iso, EnvelopeSource, EnvelopeStatus, EventKind, HandoffEnvelope, RoutingSignal,
    RunEvent,
};
use swarm_storage::{
    paths, write_handoff_envelope, write_step_receipt, StepReceipt, TokenCounts, WriteOptions,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
struct SessionScratch {
    tokens: TokenUsage,
    model: String,
    prompt_hash: String,
    truncation: Option<serde_json::Value>,
}

/// Engine executing each step inside one per-step LLM session.
pub struct SessionStepEngine<L> {
    adapter: Arc<L>,
    guard: ToolGuard,
    scratch: Mutex<HashMap<String, SessionScratch>>,
}

impl<L: LlmAdapter + 'static> SessionStepEngine<L> {
    pub fn new(adapter: Arc<L>) -> Self {
        Self {
            adapter,
            guard: ToolGuard::new(),
            scratch: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_guard(mut self, guard: ToolGuard) -> Self {
        self.guard = guard;
        self
    }

    fn timeout(ctx: &StepContext) -> Duration {
        Duration::from_millis(ctx.engine_profile.timeout_ms)
    }

    async fn send_with_timeout(
        &self,
        ctx: &StepContext,
        request: LlmRequest,
    ) -> Result<swarm_adapters::LlmOutcome, LlmError> {
        let limit = Self::timeout(ctx);
        match tokio::time::timeout(limit, self.adapter.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(LlmError::Timeout(limit.as_millis() as u64)),
        }
    }

    fn transcript_path(&self, ctx: &StepContext) -> std::path::PathBuf {
        paths::transcript_path(
            &ctx.run_base(),
            &ctx.step_id,
            &ctx.primary_agent(),
            self.adapter.id(),
        )
    }

    fn tool_events(&self, ctx: &StepContext, entries: &[TranscriptEntry]) -> Vec<RunEvent> {
        let mut events = Vec::new();
        for entry in entries {
            let Some(tool_use_id) = &entry.tool_use_id else {
                continue;
            };
            let kind = match entry.role.as_str() {
                "tool_use" => EventKind::ToolStart,
                "tool_result" => EventKind::ToolEnd,
                _ => continue,
            };
            let mut payload = serde_json::json!({ "tool_use_id": tool_use_id });
            if let Some(tool_name) = &entry.tool_name {
                payload["tool"] = serde_json::json!(tool_name);
            }
            if kind == EventKind::ToolEnd {
                payload["success"] = serde_json::json!(entry.succeeded());
            }
            events.push(
                RunEvent::new(ctx.run_id.clone(), kind, ctx.flow_key.clone())
                    .with_step(ctx.step_id.clone())
                    .with_agent(ctx.primary_agent())
                    .with_payload(payload),
            );

            // Guard screening mirrors the adapter's pre-tool hook
            if entry.role == "tool_use" {
                if let Err(violation) = self.guard.check_command(&entry.content) {
                    warn!(step_id = %ctx.step_id, %violation, "tool guard violation");
                    events.push(
                        RunEvent::new(ctx.run_id.clone(), EventKind::Error, ctx.flow_key.clone())
                            .with_step(ctx.step_id.clone())
                            .with_payload(serde_json::json!({
                                "reason": "guard_rejected",
                                "pattern": violation.pattern,
                                "tool_use_id": tool_use_id,
                            })),
                    );
                }
            }
        }
        events
    }

    fn write_receipt(
        &self,
        ctx: &StepContext,
        result: &StepResult,
        envelope_written: bool,
        routing_signal: Option<&RoutingSignal>,
    ) {
        let scratch = self
            .scratch
            .lock()
            .get(ctx.step_id.as_str())
            .cloned()
            .unwrap_or_default();
        let agent = ctx.primary_agent();

        let mut receipt = StepReceipt::new(
            self.id(),
            ctx.engine_profile.mode.clone(),
            "session",
            self.adapter.provider(),
            ctx.step_id.clone(),
            ctx.flow_key.clone(),
            ctx.run_id.clone(),
            agent.clone(),
        );
        receipt.model = if scratch.model.is_empty() {
            ctx.engine_profile.model.clone().unwrap_or_else(|| "unknown".to_string())
        } else {
            scratch.model
        };
        receipt.started_at = utc_now_iso();
        receipt.completed_at = utc_now_iso();
        receipt.duration_ms = result.duration_ms;
        receipt.status = match result.status {
            StepStatus::Failed => "failed".to_string(),
            _ => "succeeded".to_string(),
        };
        receipt.error = result.error.clone();
        receipt.tokens = TokenCounts {
            prompt: scratch.tokens.prompt,
            completion: scratch.tokens.completion,
            total: scratch.tokens.total,
        };
        receipt.transcript_path = Some(format!(
            "{}/{}-{}-{}.jsonl",
            paths::LLM_DIR,
            ctx.step_id,
            agent,
            self.adapter.id()
        ));
        if envelope_written {
            receipt.handoff_envelope_path =
                Some(format!("{}/{}.json", paths::HANDOFF_DIR, ctx.step_id));
        }
        receipt.routing_signal = routing_signal.cloned();
        if !scratch.prompt_hash.is_empty() {
            receipt.extra.insert(
                "prompt_hash".to_string(),
                serde_json::json!(scratch.prompt_hash),
            );
        }
        receipt.context_truncation = scratch.truncation;

        if let Err(e) = write_step_receipt(&ctx.run_base(), &receipt) {
            warn!(error = %e, "failed to write session receipt");
        }
    }
}

/// Parse an envelope from session output, filling identity fields from the
/// context and tolerating fenced or slightly off-shape JSON.
fn parse_envelope_response(ctx: &StepContext, text: &str) -> Option<HandoffEnvelope> {
    let json = extract_json_object(text)?;
    let mut value: serde_json::Value = serde_json::from_str(json).ok()?;
    let obj = value.as_object_mut()?;

    obj.entry("step_id")
        .or_insert_with(|| serde_json::json!(ctx.step_id.as_str()));
    obj.entry("flow_key")
        .or_insert_with(|| serde_json::json!(ctx.flow_key.as_str()));
    obj.entry("run_id")
        .or_insert_with(|| serde_json::json!(ctx.run_id.as_str()));

    let status = obj
        .get("status")
        .and_then(|v| v.as_str())
        .map(EnvelopeStatus::parse_lenient)
        .unwrap_or(EnvelopeStatus::Unverified);
    obj.insert("status".to_string(), serde_json::json!(status.as_str()));

    serde_json::from_value(value).ok()
}

fn extract_json_object(text: &str) -> Option<&str> {
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
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].trim())
}

#[async_trait]
impl<L: LlmAdapter + 'static> StepEngine for SessionStepEngine<L> {
    fn id(&self) -> &str {
        "session"
    }

    async fn run_worker(&self, ctx: &StepContext) -> WorkOutput {
        let started = Instant::now();
        let plan = build_work_prompt(ctx);

        let mut scratch = SessionScratch {
            prompt_hash: plan.prompt_hash.clone(),
            ..SessionScratch::default()
        };
        if plan.truncation.truncated {
            scratch.truncation = serde_json::to_value(&plan.truncation).ok();
        }

        let request = LlmRequest {
            system_prompt: Some(plan.system_prompt.clone()),
            prompt: plan.prompt.clone(),
            model: ctx.engine_profile.model.clone(),
            cwd: Some(ctx.repo_root.clone()),
            ..LlmRequest::default()
        };

        let transcript_path = self.transcript_path(ctx);
        let mut entries = vec![TranscriptEntry::message("user", plan.prompt)];

        let (result, events, work_summary) = match self.send_with_timeout(ctx, request).await {
            Ok(outcome) => {
                entries.extend(outcome.transcript.iter().cloned());
                if outcome.transcript.is_empty() {
                    entries.push(TranscriptEntry::message("assistant", outcome.text.clone()));
                }
                let events = self.tool_events(ctx, &outcome.transcript);

                scratch.tokens = outcome.tokens;
                scratch.model = outcome.model.clone();

                let mut result = StepResult::succeeded(ctx.step_id.clone(), outcome.text.clone());
                result.duration_ms = started.elapsed().as_millis() as u64;
                (result, events, outcome.text)
            }
            Err(LlmError::Timeout(ms)) => {
                let mut result = StepResult::failed(ctx.step_id.clone(), "timeout");
                result.duration_ms = ms;
                (result, Vec::new(), String::new())
            }
            Err(e) => {
                let mut result = StepResult::failed(ctx.step_id.clone(), e.to_string());
                result.duration_ms = started.elapsed().as_millis() as u64;
                (result, Vec::new(), String::new())
            }
        };

        if let Err(e) = append_transcript(&transcript_path, &entries) {
            warn!(error = %e, "failed to write session transcript");
        }
        self.scratch
            .lock()
            .insert(ctx.step_id.as_str().to_string(), scratch);

        WorkOutput {
            result,
            events,
            work_summary,
        }
    }

    async fn finalize_step(
        &self,
        ctx: &StepContext,
        result: &StepResult,
        work_summary: &str,
    ) -> FinalizationResult {
        let run_base = ctx.run_base();

        if result.status == StepStatus::Failed {
            // Engine failure: the orchestrator writes the fallback envelope
            self.write_receipt(ctx, result, false, None);
            return FinalizationResult {
                envelope: None,
                work_summary: work_summary.to_string(),
                events: Vec::new(),
            };
        }

        // Inline finalization: the agent may have written a draft during work
        let draft_path = paths::handoff_draft_path(&run_base, &ctx.step_id);
        let mut envelope = if draft_path.exists() {
            debug!(step_id = %ctx.step_id, "inline finalization: committing agent draft");
            swarm_storage::read_handoff_envelope(&run_base, &ctx.step_id, true)
        } else {
            // JIT finalization: ask the session for a structured envelope
            let request = LlmRequest::new(build_finalize_prompt(ctx));
            match self.send_with_timeout(ctx, request).await {
                Ok(outcome) => {
                    let _ = append_transcript(
                        &self.transcript_path(ctx),
                        &[TranscriptEntry::message("assistant", outcome.text.clone())],
                    );
                    parse_envelope_response(ctx, &outcome.text)
                }
                Err(e) => {
                    warn!(step_id = %ctx.step_id, error = %e, "finalization session failed");
                    None
                }
            }
        };

        let Some(envelope_ref) = envelope.as_mut() else {
            self.write_receipt(ctx, result, false, None);
            return FinalizationResult {
                envelope: None,
                work_summary: work_summary.to_string(),
                events: Vec::new(),
            };
        };

        // Forensic diff scan rides along in the committed envelope
        let changes = scan_file_changes(&ctx.repo_root, true, true).await;
        let file_changes_event = RunEvent::new(
            ctx.run_id.clone(),
            EventKind::FileChanges,
            ctx.flow_key.clone(),
        )
        .with_step(ctx.step_id.clone())
        .with_agent(ctx.primary_agent())
        .with_payload(serde_json::to_value(&changes).unwrap_or_default());
        envelope_ref.file_changes = Some(changes);
        envelope_ref.duration_ms = result.duration_ms;
        envelope_ref.envelope_source = Some(EnvelopeSource::Lifecycle);

        let events = vec![file_changes_event];

        if let Err(e) = write_handoff_envelope(&run_base, envelope_ref, WriteOptions::default()) {
            warn!(step_id = %ctx.step_id, error = %e, "failed to commit envelope");
            self.write_receipt(ctx, result, false, None);
            return FinalizationResult {
                envelope: None,
                work_summary: work_summary.to_string(),
                events,
            };
        }

        self.write_receipt(ctx, result, true, None);

        FinalizationResult {
            envelope,
            work_summary: work_summary.to_string(),
            events,
        }
    }

    async fn route_step(
        &self,
        ctx: &StepContext,
        envelope: &HandoffEnvelope,
    ) -> Option<RoutingSignal> {
        let routing = ctx.routing_config.as_ref()?;

        // Deterministic first; the router session is the fallback
        if let Some(signal) = route_from_routing_config(
            routing,
            envelope.status.as_str(),
            envelope.can_further_iteration_help,
            ctx.routing.loop_iteration,
        ) {
            let candidates = generate_routing_candidates(routing, envelope.status.as_str());
            return Some(
                signal
                    .with_source("routing_config")
                    .with_candidates(candidates),
            );
        }

        let handoff_json = serde_json::to_string_pretty(envelope).ok()?;
        let request = LlmRequest::new(build_router_prompt(ctx, &handoff_json));
        match self.send_with_timeout(ctx, request).await {
            Ok(outcome) => {
                let _ = append_transcript(
                    &self.transcript_path(ctx),
                    &[TranscriptEntry::message("assistant", outcome.text.clone())],
                );
                let signal = parse_router_response(&outcome.text)?;
                let candidates = generate_routing_candidates(routing, envelope.status.as_str());
                Some(signal.with_candidates(candidates))
            }
            Err(e) => {
                warn!(step_id = %ctx.step_id, error = %e, "router session failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
