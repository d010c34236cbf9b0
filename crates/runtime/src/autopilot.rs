// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Autopilot: autonomous flow chaining for end-to-end SDLC execution.
//!
//! Flows run sequentially in SDLC order with no mid-flow human intervention.
//! `stop` and `pause` are cooperative: the current flow finishes, then the
//! controller transitions at the boundary. Evolution patches from the Wisdom
//! flow are processed at a configured boundary under an apply policy.

use crate::evolution::{
    apply_evolution_patch, generate_evolution_patches, validate_evolution_patch,
    EvolutionSuggestion,
};
use crate::orchestrator::{OrchestratorError, StepwiseOrchestrator};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use swarm_core::{
    generate_run_id, utc_now_iso, Clock, EventKind, FlowKey, RunEvent, RunId, RunSpec, RunSummary,
    SystemClock,
};
use swarm_engine::StepEngine;
use tracing::{info, warn};

/// Status of an autopilot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutopilotStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    /// Graceful shutdown in progress
    Stopping,
    /// Clean stop with savepoint (distinct from failed)
    Stopped,
    /// Waiting for the current flow to complete before pause
    Pausing,
    /// Paused at a clean boundary, resumable
    Paused,
}

impl AutopilotStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AutopilotStatus::Succeeded
                | AutopilotStatus::Failed
                | AutopilotStatus::Canceled
                | AutopilotStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutopilotStatus::Pending => "pending",
            AutopilotStatus::Running => "running",
            AutopilotStatus::Succeeded => "succeeded",
            AutopilotStatus::Failed => "failed",
            AutopilotStatus::Canceled => "canceled",
            AutopilotStatus::Stopping => "stopping",
            AutopilotStatus::Stopped => "stopped",
            AutopilotStatus::Pausing => "pausing",
            AutopilotStatus::Paused => "paused",
        }
    }
}

/// Policy controlling when evolution patches are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionApplyPolicy {
    /// Record suggestions, never auto-apply.
    #[default]
    SuggestOnly,
    /// Auto-apply low-risk, high-confidence patches with no review flag.
    AutoApplySafe,
    /// Auto-apply every valid patch.
    AutoApplyAll,
}

impl EvolutionApplyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionApplyPolicy::SuggestOnly => "suggest_only",
            EvolutionApplyPolicy::AutoApplySafe => "auto_apply_safe",
            EvolutionApplyPolicy::AutoApplyAll => "auto_apply_all",
        }
    }
}

/// When evolution patches are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionBoundary {
    #[default]
    RunEnd,
    FlowEnd,
    Never,
}

/// Configuration for autopilot behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutopilotConfig {
    pub evolution_apply_policy: EvolutionApplyPolicy,
    pub evolution_boundary: EvolutionBoundary,
}

/// Summary of evolution processing at a boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WisdomApplyResult {
    pub patches_processed: usize,
    pub patches_applied: usize,
    pub patches_rejected: usize,
    pub patches_skipped: usize,
    pub patches_suggested: usize,
    pub applied_patch_ids: Vec<String>,
    pub rejected_patch_ids: Vec<(String, String)>,
    pub suggestions: Vec<EvolutionSuggestion>,
}

/// Result of an autopilot run.
#[derive(Debug, Clone)]
pub struct AutopilotResult {
    pub run_id: RunId,
    pub status: AutopilotStatus,
    pub flows_completed: Vec<FlowKey>,
    pub flows_failed: Vec<FlowKey>,
    pub current_flow: Option<FlowKey>,
    pub error: Option<String>,
    pub wisdom_artifacts: BTreeMap<String, String>,
    pub duration_ms: u64,
    pub wisdom_apply_result: Option<WisdomApplyResult>,
}

struct AutopilotState {
    spec: RunSpec,
    config: AutopilotConfig,
    status: AutopilotStatus,
    current_flow_index: usize,
    flows_to_execute: Vec<FlowKey>,
    flows_completed: Vec<FlowKey>,
    flows_failed: Vec<FlowKey>,
    started_at_ms: Option<u64>,
    completed_at_ms: Option<u64>,
    error: Option<String>,
    wisdom_apply_result: Option<WisdomApplyResult>,
}

impl AutopilotState {
    fn current_flow(&self) -> Option<&FlowKey> {
        self.flows_to_execute.get(self.current_flow_index)
    }

    fn current_flow_key_str(&self) -> String {
        self.current_flow()
            .map(|f| f.to_string())
            .unwrap_or_default()
    }
}

/// Controller for autonomous flow chaining.
pub struct AutopilotController<E> {
    orchestrator: StepwiseOrchestrator<E>,
    repo_root: PathBuf,
    states: Mutex<HashMap<RunId, AutopilotState>>,
    clock: SystemClock,
}

impl<E: StepEngine + 'static> AutopilotController<E> {
    pub fn new(orchestrator: StepwiseOrchestrator<E>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            repo_root: repo_root.into(),
            states: Mutex::new(HashMap::new()),
            clock: SystemClock,
        }
    }

    pub fn orchestrator(&self) -> &StepwiseOrchestrator<E> {
        &self.orchestrator
    }

    /// Start an autopilot run over the given flows (default: all SDLC flows).
    pub fn start(
        &self,
        issue_ref: Option<&str>,
        flow_keys: Option<Vec<FlowKey>>,
        config: AutopilotConfig,
    ) -> Result<RunId, OrchestratorError> {
        let run_id = generate_run_id();
        let flows = flow_keys.unwrap_or_else(|| self.orchestrator.registry().sdlc_flow_keys());

        let mut spec = RunSpec::new(flows.clone(), "stepwise-autopilot", "autopilot");
        spec.no_human_mid_flow = true;
        spec.params
            .insert("autopilot".to_string(), serde_json::json!(true));
        if let Some(issue_ref) = issue_ref {
            spec.params
                .insert("issue_ref".to_string(), serde_json::json!(issue_ref));
        }

        let store = self.orchestrator.store();
        store.write_spec(&run_id, &spec)?;
        store.write_summary(&RunSummary::new(run_id.clone(), spec.clone(), utc_now_iso()))?;

        store.append_event(
            RunEvent::new(
                run_id.clone(),
                EventKind::AutopilotStarted,
                flows.first().cloned().unwrap_or_default(),
            )
            .with_payload(serde_json::json!({
                "flows": flows.iter().map(FlowKey::as_str).collect::<Vec<_>>(),
                "issue_ref": issue_ref,
                "no_human_mid_flow": true,
            })),
        )?;

        self.states.lock().insert(
            run_id.clone(),
            AutopilotState {
                spec,
                config,
                status: AutopilotStatus::Pending,
                current_flow_index: 0,
                flows_to_execute: flows.clone(),
                flows_completed: Vec::new(),
                flows_failed: Vec::new(),
                started_at_ms: None,
                completed_at_ms: None,
                error: None,
                wisdom_apply_result: None,
            },
        );

        info!(%run_id, flows = ?flows, "autopilot run started");
        Ok(run_id)
    }

    /// Advance the run by executing exactly one flow.
    ///
    /// Returns true when more work remains.
    pub async fn tick(&self, run_id: &RunId) -> bool {
        let (flow_key, spec) = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return false;
            };

            if state.status.is_terminal() {
                return false;
            }
            match state.status {
                AutopilotStatus::Stopping => {
                    drop(states);
                    self.finalize_stop(run_id);
                    return false;
                }
                AutopilotStatus::Pausing => {
                    drop(states);
                    self.finalize_pause(run_id);
                    return false;
                }
                AutopilotStatus::Paused => return false,
                AutopilotStatus::Pending => {
                    state.status = AutopilotStatus::Running;
                    state.started_at_ms = Some(self.clock.epoch_ms());
                }
                _ => {}
            }

            if state.current_flow_index >= state.flows_to_execute.len() {
                drop(states);
                self.finalize_run(run_id, true);
                return false;
            }

            let flow_key = state.flows_to_execute[state.current_flow_index].clone();
            (flow_key, state.spec.clone())
        };

        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotFlowStarted,
            &flow_key,
            serde_json::json!({}),
        );

        let outcome = self
            .orchestrator
            .run_flow(&flow_key, &spec, run_id, None, None)
            .await;

        match outcome {
            Ok(result) if result.succeeded() => {
                self.append_autopilot_event(
                    run_id,
                    EventKind::AutopilotFlowCompleted,
                    &flow_key,
                    serde_json::json!({"status": "succeeded"}),
                );
                let flow_end_evolution = {
                    let mut states = self.states.lock();
                    let Some(state) = states.get_mut(run_id) else {
                        return false;
                    };
                    state.flows_completed.push(flow_key.clone());
                    state.current_flow_index += 1;
                    flow_key.as_str() == "wisdom"
                        && state.config.evolution_boundary == EvolutionBoundary::FlowEnd
                };
                if flow_end_evolution {
                    let evolution = self.process_evolution(run_id, "flow_end");
                    if let Some(state) = self.states.lock().get_mut(run_id) {
                        state.wisdom_apply_result = Some(evolution);
                    }
                }
                true
            }
            Ok(result) => {
                let error = result
                    .error
                    .unwrap_or_else(|| format!("flow {flow_key} did not succeed"));
                self.record_flow_failure(run_id, &flow_key, &error);
                false
            }
            Err(e) => {
                self.record_flow_failure(run_id, &flow_key, &e.to_string());
                false
            }
        }
    }

    fn record_flow_failure(&self, run_id: &RunId, flow_key: &FlowKey, error: &str) {
        warn!(%run_id, %flow_key, %error, "autopilot flow failed");
        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotFlowFailed,
            flow_key,
            serde_json::json!({"error": error}),
        );
        {
            let mut states = self.states.lock();
            if let Some(state) = states.get_mut(run_id) {
                state.flows_failed.push(flow_key.clone());
                state.error = Some(error.to_string());
            }
        }
        self.finalize_run(run_id, false);
    }

    /// Run all flows to completion.
    pub async fn run_to_completion(&self, run_id: &RunId) -> AutopilotResult {
        while !self.is_complete(run_id) {
            if !self.tick(run_id).await {
                break;
            }
        }
        self.get_result(run_id)
    }

    pub fn is_complete(&self, run_id: &RunId) -> bool {
        self.states
            .lock()
            .get(run_id)
            .map(|s| s.status.is_terminal())
            .unwrap_or(true)
    }

    pub fn is_paused(&self, run_id: &RunId) -> bool {
        self.status(run_id) == Some(AutopilotStatus::Paused)
    }

    pub fn is_resumable(&self, run_id: &RunId) -> bool {
        matches!(
            self.status(run_id),
            Some(AutopilotStatus::Paused) | Some(AutopilotStatus::Stopped)
        )
    }

    pub fn status(&self, run_id: &RunId) -> Option<AutopilotStatus> {
        self.states.lock().get(run_id).map(|s| s.status)
    }

    /// Hard cancel: takes effect immediately, not resumable.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        let flow_key = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return false;
            };
            if state.status.is_terminal() {
                return false;
            }
            state.status = AutopilotStatus::Canceled;
            state.completed_at_ms = Some(self.clock.epoch_ms());
            state.current_flow_key_str()
        };
        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotCanceled,
            &FlowKey::new(flow_key),
            serde_json::json!({}),
        );
        info!(%run_id, "autopilot run canceled");
        true
    }

    /// Graceful stop: the current flow completes, then a savepoint is written.
    pub fn stop(&self, run_id: &RunId, reason: &str) -> bool {
        let flow_key = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return false;
            };
            if state.status.is_terminal() {
                return false;
            }
            state.status = AutopilotStatus::Stopping;
            state.error = Some(format!("Stop requested: {reason}"));
            state.current_flow_key_str()
        };
        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotStopping,
            &FlowKey::new(flow_key),
            serde_json::json!({"reason": reason}),
        );
        info!(%run_id, %reason, "autopilot run stopping");
        true
    }

    /// Pause at the next flow boundary. Resumable.
    pub fn pause(&self, run_id: &RunId) -> bool {
        let flow_key = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return false;
            };
            if !matches!(
                state.status,
                AutopilotStatus::Running | AutopilotStatus::Pending
            ) {
                return false;
            }
            state.status = AutopilotStatus::Pausing;
            state.current_flow_key_str()
        };
        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotPausing,
            &FlowKey::new(flow_key),
            serde_json::json!({}),
        );
        true
    }

    /// Resume a paused or stopped run from the saved flow index.
    pub fn resume(&self, run_id: &RunId) -> bool {
        let (flow_key, previous) = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return false;
            };
            if !matches!(
                state.status,
                AutopilotStatus::Paused | AutopilotStatus::Stopped
            ) {
                return false;
            }
            let previous = state.status;
            state.status = AutopilotStatus::Running;
            (state.current_flow_key_str(), previous)
        };
        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotResumed,
            &FlowKey::new(flow_key),
            serde_json::json!({"previous_status": previous.as_str()}),
        );
        info!(%run_id, from = previous.as_str(), "autopilot run resumed");
        true
    }

    pub fn get_result(&self, run_id: &RunId) -> AutopilotResult {
        let states = self.states.lock();
        let Some(state) = states.get(run_id) else {
            return AutopilotResult {
                run_id: run_id.clone(),
                status: AutopilotStatus::Failed,
                flows_completed: Vec::new(),
                flows_failed: Vec::new(),
                current_flow: None,
                error: Some("Unknown autopilot run".to_string()),
                wisdom_artifacts: BTreeMap::new(),
                duration_ms: 0,
                wisdom_apply_result: None,
            };
        };

        let duration_ms = match (state.started_at_ms, state.completed_at_ms) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            (Some(start), None) => self.clock.epoch_ms().saturating_sub(start),
            _ => 0,
        };

        let mut wisdom_artifacts = BTreeMap::new();
        if state.flows_completed.iter().any(|f| f == "wisdom") {
            let wisdom_dir = self
                .orchestrator
                .store()
                .run_path(run_id)
                .join("wisdom");
            if let Ok(entries) = std::fs::read_dir(&wisdom_dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().map(|e| e == "md").unwrap_or(false) {
                        if let Some(stem) = path.file_stem() {
                            wisdom_artifacts.insert(
                                stem.to_string_lossy().into_owned(),
                                path.to_string_lossy().into_owned(),
                            );
                        }
                    }
                }
            }
        }

        AutopilotResult {
            run_id: run_id.clone(),
            status: state.status,
            flows_completed: state.flows_completed.clone(),
            flows_failed: state.flows_failed.clone(),
            current_flow: state.current_flow().cloned(),
            error: state.error.clone(),
            wisdom_artifacts,
            duration_ms,
            wisdom_apply_result: state.wisdom_apply_result.clone(),
        }
    }

    fn append_autopilot_event(
        &self,
        run_id: &RunId,
        kind: EventKind,
        flow_key: &FlowKey,
        payload: serde_json::Value,
    ) {
        let event = RunEvent::new(run_id.clone(), kind, flow_key.clone()).with_payload(payload);
        if let Err(e) = self.orchestrator.store().append_event(event) {
            warn!(%run_id, error = %e, "failed to append autopilot event");
        }
    }

    fn finalize_stop(&self, run_id: &RunId) {
        let (flow_key, payload) = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return;
            };
            state.status = AutopilotStatus::Stopped;
            state.completed_at_ms = Some(self.clock.epoch_ms());
            let remaining: Vec<&str> = state.flows_to_execute[state.current_flow_index..]
                .iter()
                .map(FlowKey::as_str)
                .collect();
            let payload = serde_json::json!({
                "flows_completed": state.flows_completed.iter().map(FlowKey::as_str).collect::<Vec<_>>(),
                "flows_remaining": remaining,
                "reason": state.error.clone().unwrap_or_else(|| "unknown".to_string()),
            });
            (state.current_flow_key_str(), payload)
        };

        self.write_stop_report(run_id);
        self.append_autopilot_event(run_id, EventKind::AutopilotStopped, &FlowKey::new(flow_key), payload);
        info!(%run_id, "autopilot run stopped");
    }

    fn finalize_pause(&self, run_id: &RunId) {
        let (flow_key, payload) = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return;
            };
            state.status = AutopilotStatus::Paused;
            let remaining: Vec<&str> = state.flows_to_execute[state.current_flow_index..]
                .iter()
                .map(FlowKey::as_str)
                .collect();
            let payload = serde_json::json!({
                "flows_completed": state.flows_completed.iter().map(FlowKey::as_str).collect::<Vec<_>>(),
                "flows_remaining": remaining,
            });
            (state.current_flow_key_str(), payload)
        };
        self.append_autopilot_event(run_id, EventKind::AutopilotPaused, &FlowKey::new(flow_key), payload);
        info!(%run_id, "autopilot run paused");
    }

    fn finalize_run(&self, run_id: &RunId, success: bool) {
        let should_process_evolution = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(run_id) else {
                return;
            };
            state.status = if success {
                AutopilotStatus::Succeeded
            } else {
                AutopilotStatus::Failed
            };
            state.completed_at_ms = Some(self.clock.epoch_ms());
            success
                && state.flows_completed.iter().any(|f| f == "wisdom")
                && state.config.evolution_boundary == EvolutionBoundary::RunEnd
        };

        if should_process_evolution {
            let result = self.process_evolution(run_id, "run_end");
            if let Some(state) = self.states.lock().get_mut(run_id) {
                state.wisdom_apply_result = Some(result);
            }
        }

        let (flow_key, payload) = {
            let states = self.states.lock();
            let Some(state) = states.get(run_id) else {
                return;
            };
            let evolution_summary = state.wisdom_apply_result.as_ref().map(|r| {
                serde_json::json!({
                    "policy": state.config.evolution_apply_policy.as_str(),
                    "patches_processed": r.patches_processed,
                    "patches_applied": r.patches_applied,
                    "patches_suggested": r.patches_suggested,
                    "patches_rejected": r.patches_rejected,
                    "patches_skipped": r.patches_skipped,
                    "applied_patch_ids": r.applied_patch_ids,
                })
            });
            let payload = serde_json::json!({
                "status": state.status.as_str(),
                "flows_completed": state.flows_completed.iter().map(FlowKey::as_str).collect::<Vec<_>>(),
                "flows_failed": state.flows_failed.iter().map(FlowKey::as_str).collect::<Vec<_>>(),
                "error": state.error,
                "evolution_summary": evolution_summary,
            });
            (
                state
                    .flows_completed
                    .last()
                    .map(|f| f.to_string())
                    .unwrap_or_default(),
                payload,
            )
        };

        self.append_autopilot_event(
            run_id,
            EventKind::AutopilotCompleted,
            &FlowKey::new(flow_key),
            payload,
        );
        info!(%run_id, success, "autopilot run finalized");
    }

    fn write_stop_report(&self, run_id: &RunId) {
        let states = self.states.lock();
        let Some(state) = states.get(run_id) else {
            return;
        };

        let remaining = &state.flows_to_execute[state.current_flow_index..];
        let mut lines = vec![
            "# Autopilot Stop Report".to_string(),
            String::new(),
            format!("**Run ID:** {run_id}"),
            format!("**Stopped At:** {}", utc_now_iso()),
            format!(
                "**Reason:** {}",
                state.error.as_deref().unwrap_or("Unknown")
            ),
            String::new(),
            "## Execution State".to_string(),
            String::new(),
            format!("- **Current Flow Index:** {}", state.current_flow_index),
            format!(
                "- **Current Flow:** {}",
                state
                    .current_flow()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "None".to_string())
            ),
            format!("- **Total Flows:** {}", state.flows_to_execute.len()),
            String::new(),
            "## Completed Flows".to_string(),
            String::new(),
        ];
        if state.flows_completed.is_empty() {
            lines.push("- None".to_string());
        } else {
            lines.extend(state.flows_completed.iter().map(|f| format!("- {f}")));
        }
        lines.extend([
            String::new(),
            "## Remaining Flows (not executed)".to_string(),
            String::new(),
        ]);
        if remaining.is_empty() {
            lines.push("- None (all flows completed)".to_string());
        } else {
            lines.extend(remaining.iter().map(|f| format!("- {f}")));
        }
        lines.extend([
            String::new(),
            "## Resume Instructions".to_string(),
            String::new(),
            "Call `resume(run_id)` to continue from the current flow.".to_string(),
            String::new(),
        ]);

        let report_path = self.orchestrator.store().run_path(run_id).join("stop_report.md");
        if let Err(e) = std::fs::write(&report_path, lines.join("\n")) {
            warn!(%run_id, error = %e, "failed to write stop report");
        }
    }

    /// Policy-gated evolution processing at a flow or run boundary.
    fn process_evolution(&self, run_id: &RunId, boundary: &str) -> WisdomApplyResult {
        let policy = {
            let states = self.states.lock();
            let Some(state) = states.get(run_id) else {
                return WisdomApplyResult::default();
            };
            state.config.evolution_apply_policy
        };

        let mut result = WisdomApplyResult::default();
        let wisdom_dir = self.orchestrator.store().run_path(run_id).join("wisdom");
        if !wisdom_dir.exists() {
            warn!(%run_id, "wisdom directory missing, skipping evolution");
            return result;
        }

        self.append_autopilot_event(
            run_id,
            EventKind::EvolutionProcessingStarted,
            &FlowKey::new("wisdom"),
            serde_json::json!({"policy": policy.as_str(), "boundary": boundary}),
        );

        for patch in generate_evolution_patches(&wisdom_dir) {
            result.patches_processed += 1;

            let applied_marker = wisdom_dir.join(format!(".applied_{}", patch.id));
            let rejected_marker = wisdom_dir.join(format!(".rejected_{}", patch.id));
            if applied_marker.exists() || rejected_marker.exists() {
                result.patches_skipped += 1;
                continue;
            }

            let mut suggestion = EvolutionSuggestion::from_patch(&patch, run_id);
            let validation = validate_evolution_patch(&patch, &self.repo_root);

            if !validation.valid {
                let reason = validation.errors.join("; ");
                suggestion.action_taken = "rejected".to_string();
                suggestion.rejection_reason = Some(reason.clone());
                result.patches_rejected += 1;
                result.rejected_patch_ids.push((patch.id.clone(), reason.clone()));
                let _ = std::fs::write(
                    &rejected_marker,
                    serde_json::json!({
                        "rejected_at": utc_now_iso(),
                        "patch_id": patch.id,
                        "reason": reason,
                        "policy": policy.as_str(),
                    })
                    .to_string(),
                );
                self.append_autopilot_event(
                    run_id,
                    EventKind::EvolutionRejected,
                    &FlowKey::new("wisdom"),
                    serde_json::json!({
                        "patch_id": patch.id,
                        "target_file": patch.target_file,
                        "reason": reason,
                        "policy": policy.as_str(),
                    }),
                );
                result.suggestions.push(suggestion);
                continue;
            }

            let should_apply = match policy {
                EvolutionApplyPolicy::AutoApplyAll => true,
                EvolutionApplyPolicy::AutoApplySafe => patch.is_safe(),
                EvolutionApplyPolicy::SuggestOnly => false,
            };

            if !should_apply {
                result.patches_suggested += 1;
                let suggestion_marker = wisdom_dir.join(format!(".suggested_{}", patch.id));
                let _ = std::fs::write(
                    &suggestion_marker,
                    serde_json::json!({
                        "suggested_at": utc_now_iso(),
                        "patch_id": patch.id,
                        "target_file": patch.target_file,
                        "confidence": patch.confidence.as_str(),
                        "risk": patch.risk.as_str(),
                        "policy": policy.as_str(),
                        "boundary": boundary,
                    })
                    .to_string(),
                );
                self.append_autopilot_event(
                    run_id,
                    EventKind::EvolutionSuggested,
                    &FlowKey::new("wisdom"),
                    serde_json::json!({
                        "patch_id": patch.id,
                        "target_file": patch.target_file,
                        "confidence": patch.confidence.as_str(),
                        "risk": patch.risk.as_str(),
                        "policy": policy.as_str(),
                        "boundary": boundary,
                    }),
                );
                result.suggestions.push(suggestion);
                continue;
            }

            let apply = apply_evolution_patch(&patch, &self.repo_root, false, true);
            if apply.success {
                let now = utc_now_iso();
                suggestion.action_taken = "applied".to_string();
                suggestion.applied_at = Some(now.clone());
                result.patches_applied += 1;
                result.applied_patch_ids.push(patch.id.clone());
                let _ = std::fs::write(
                    &applied_marker,
                    serde_json::json!({
                        "applied_at": now,
                        "patch_id": patch.id,
                        "changes_made": apply.changes_made,
                        "backup_path": apply.backup_path,
                        "policy": policy.as_str(),
                        "boundary": boundary,
                    })
                    .to_string(),
                );
                self.append_autopilot_event(
                    run_id,
                    EventKind::EvolutionApplied,
                    &FlowKey::new("wisdom"),
                    serde_json::json!({
                        "patch_id": patch.id,
                        "target_file": patch.target_file,
                        "changes_made": apply.changes_made,
                        "backup_path": apply.backup_path,
                        "policy": policy.as_str(),
                        "boundary": boundary,
                    }),
                );
            } else {
                let reason = apply.errors.join("; ");
                suggestion.action_taken = "rejected".to_string();
                suggestion.rejection_reason = Some(reason.clone());
                result.patches_rejected += 1;
                result.rejected_patch_ids.push((patch.id.clone(), reason.clone()));
                self.append_autopilot_event(
                    run_id,
                    EventKind::EvolutionRejected,
                    &FlowKey::new("wisdom"),
                    serde_json::json!({
                        "patch_id": patch.id,
                        "target_file": patch.target_file,
                        "reason": reason,
                        "policy": policy.as_str(),
                    }),
                );
            }
            result.suggestions.push(suggestion);
        }

        // Persist the full suggestion list alongside the wisdom artifacts
        let summary_path = wisdom_dir.join("evolution_summary.json");
        let summary = serde_json::json!({
            "policy": policy.as_str(),
            "boundary": boundary,
            "patches_processed": result.patches_processed,
            "patches_applied": result.patches_applied,
            "patches_suggested": result.patches_suggested,
            "patches_rejected": result.patches_rejected,
            "patches_skipped": result.patches_skipped,
            "suggestions": result.suggestions,
        });
        if let Err(e) = std::fs::write(&summary_path, serde_json::to_string_pretty(&summary).unwrap_or_default()) {
            warn!(%run_id, error = %e, "failed to write evolution summary");
        }

        self.append_autopilot_event(
            run_id,
            EventKind::EvolutionProcessingCompleted,
            &FlowKey::new("wisdom"),
            serde_json::json!({
                "policy": policy.as_str(),
                "boundary": boundary,
                "patches_processed": result.patches_processed,
                "patches_applied": result.patches_applied,
                "patches_suggested": result.patches_suggested,
                "patches_rejected": result.patches_rejected,
                "patches_skipped": result.patches_skipped,
                "applied_patch_ids": result.applied_patch_ids,
            }),
        );

        info!(
            %run_id,
            processed = result.patches_processed,
            applied = result.patches_applied,
            suggested = result.patches_suggested,
            rejected = result.patches_rejected,
            skipped = result.patches_skipped,
            "evolution processing complete"
        );

        result
    }
}

#[cfg(test)]
#[path = "autopilot_tests.rs"]
mod tests;
