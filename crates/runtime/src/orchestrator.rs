// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stepwise orchestrator: drives one flow step by step.
//!
//! Per step: build the transaction input, invoke the engine's four-phase
//! lifecycle, enforce the envelope invariant, resolve routing envelope-first,
//! apply the decision, and append journal events. Engine failures never
//! unwind out of a step; they become envelopes and events.

use crate::injection::{UtilityFlowInjector, UtilityFlowRegistry, STALL_TRIGGER};
use crate::parallel::{aggregate_join, ForkConfig, JoinConfig, ParallelExecutor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use swarm_core::{
    utc_now_iso, EnvelopeSource, EnvelopeStatus, EventKind, FlowKey, HandoffEnvelope,
    RoutingDecision, RoutingSignal, RunEvent, RunId, RunSpec, RunState, RunStatus, StepId,
    TestSummary, VerificationCheck, VerificationResult,
};
use swarm_engine::{
    create_stall_routing_signal, detect_stall, route_from_routing_config, HistoryEntry,
    ProgressEvidence, RoutingContext, StepContext, StepEngine, StepResult, StepStatus,
    DEFAULT_STALL_ITERATIONS,
};
use swarm_registry::{EngineProfile, FlowDefinition, FlowRegistry, StepDefinition, StepRouting};
use swarm_storage::{
    read_handoff_envelope, read_routing_from_envelope, update_envelope_routing,
    write_handoff_envelope, RunStore, StoreError, WriteOptions,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hard ceiling on step executions per flow, against runaway routing.
const MAX_STEP_EXECUTIONS: usize = 200;

/// Errors that abort a flow before it can run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown flow: {0}")]
    UnknownFlow(FlowKey),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of driving one flow to termination.
#[derive(Debug, Clone)]
pub struct FlowRunResult {
    pub run_id: RunId,
    pub flow_key: FlowKey,
    pub status: RunStatus,
    pub steps_executed: Vec<StepId>,
    pub needs_human: bool,
    pub error: Option<String>,
}

impl FlowRunResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Enforce the envelope invariant: every completed step has exactly one
/// committed envelope. Writes a minimal `orchestrator_fallback` envelope
/// when the engine left none; never overwrites an engine-written envelope.
///
/// Returns true when a fallback envelope was created.
pub fn ensure_step_envelope(
    run_base: &Path,
    flow_key: &FlowKey,
    run_id: &RunId,
    result: &StepResult,
) -> bool {
    if read_handoff_envelope(run_base, &result.step_id, false).is_some() {
        return false;
    }

    let status = if result.status == StepStatus::Succeeded {
        EnvelopeStatus::Verified
    } else {
        EnvelopeStatus::Unverified
    };
    let summary = if result.output.is_empty() {
        format!("Step {} completed", result.step_id)
    } else {
        result.output.chars().take(500).collect()
    };

    let mut envelope = HandoffEnvelope::new(
        result.step_id.clone(),
        flow_key.clone(),
        run_id.clone(),
        status,
    )
    .with_summary(summary)
    .with_duration_ms(result.duration_ms)
    .with_source(EnvelopeSource::OrchestratorFallback);
    envelope.error = result.error.clone();
    envelope.timestamp = Some(utc_now_iso());

    match write_handoff_envelope(
        run_base,
        &mut envelope,
        WriteOptions {
            write_draft: true,
            validate: false,
        },
    ) {
        Ok(()) => {
            debug!(step_id = %result.step_id, "created fallback envelope");
            true
        }
        Err(e) => {
            warn!(step_id = %result.step_id, error = %e, "failed to create fallback envelope");
            false
        }
    }
}

/// Drives a single flow for a run. One orchestrator owns a run's writes.
pub struct StepwiseOrchestrator<E> {
    engine: Arc<E>,
    registry: Arc<FlowRegistry>,
    store: Arc<RunStore>,
    repo_root: PathBuf,
    utility_flows: Arc<UtilityFlowRegistry>,
    executor: ParallelExecutor,
    fork_config: ForkConfig,
    join_config: JoinConfig,
    stall_threshold: usize,
}

impl<E: StepEngine + 'static> StepwiseOrchestrator<E> {
    pub fn new(
        engine: Arc<E>,
        registry: Arc<FlowRegistry>,
        store: Arc<RunStore>,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        let utility_flows = Arc::new(UtilityFlowRegistry::from_registry(&registry));
        Self {
            engine,
            registry,
            store,
            repo_root: repo_root.into(),
            utility_flows,
            executor: ParallelExecutor::default(),
            fork_config: ForkConfig::default(),
            join_config: JoinConfig::default(),
            stall_threshold: DEFAULT_STALL_ITERATIONS,
        }
    }

    pub fn with_fork_config(mut self, config: ForkConfig) -> Self {
        self.fork_config = config;
        self
    }

    pub fn with_join_config(mut self, config: JoinConfig) -> Self {
        self.join_config = config;
        self
    }

    pub fn store(&self) -> Arc<RunStore> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<FlowRegistry> {
        Arc::clone(&self.registry)
    }

    /// Execute a flow until a terminate decision or end of flow.
    pub async fn run_flow(
        &self,
        flow_key: &FlowKey,
        spec: &RunSpec,
        run_id: &RunId,
        start_step: Option<StepId>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<FlowRunResult, OrchestratorError> {
        let flow = self
            .registry
            .get_flow(flow_key)
            .ok_or_else(|| OrchestratorError::UnknownFlow(flow_key.clone()))?
            .clone();

        let mut state = self
            .store
            .read_state(run_id, flow_key)?
            .unwrap_or_else(|| RunState::new(run_id.clone(), flow_key.clone()));
        state.status = RunStatus::Running;
        state.timestamp = utc_now_iso();

        let mut result = FlowRunResult {
            run_id: run_id.clone(),
            flow_key: flow_key.clone(),
            status: RunStatus::Succeeded,
            steps_executed: Vec::new(),
            needs_human: false,
            error: None,
        };

        // Choose start step: explicit, resumed, or first
        let mut current: Option<StepDefinition> = start_step
            .or_else(|| state.current_step.clone())
            .and_then(|id| flow.get_step(&id).cloned())
            .or_else(|| flow.first_step().cloned());

        // Per-loop stall evidence, keyed like loop_state
        let mut stall_evidence: HashMap<String, Vec<ProgressEvidence>> = HashMap::new();

        while let Some(step) = current.take() {
            if result.steps_executed.len() >= MAX_STEP_EXECUTIONS {
                warn!(%flow_key, "step execution ceiling reached, terminating flow");
                result.status = RunStatus::Failed;
                result.error = Some("step execution ceiling reached".to_string());
                break;
            }

            // Cooperative cancellation between steps
            if cancel
                .as_ref()
                .map(|c| c.load(Ordering::SeqCst))
                .unwrap_or(false)
            {
                info!(%run_id, %flow_key, "cancellation requested, stopping flow");
                self.append(
                    RunEvent::new(run_id.clone(), EventKind::RunCanceled, flow_key.clone()),
                )?;
                result.status = RunStatus::Canceled;
                break;
            }

            // Fork nodes dispatch branches instead of running work themselves
            if let Some(StepRouting::Fork { fork_targets }) = &step.routing {
                let targets = fork_targets.clone();
                current = self
                    .run_fork(&flow, &step, &targets, spec, run_id, &mut state, &mut result)
                    .await?;
                self.persist_state(&mut state, &current)?;
                continue;
            }

            state.current_step = Some(step.id.clone());
            let routing = effective_routing(&flow, &step);
            let iteration = loop_iteration(&state, &step, &routing);

            self.append(
                RunEvent::new(run_id.clone(), EventKind::StepStart, flow_key.clone())
                    .with_step(step.id.clone())
                    .with_agent(primary_agent(&step)),
            )?;

            let mut ctx = self.build_context(&flow, &step, spec, run_id, &state, &routing, iteration);
            let run_base = ctx.run_base();

            let (step_result, engine_events) = self.engine.run_step(&mut ctx).await;
            for event in engine_events {
                self.append(event)?;
            }
            result.steps_executed.push(step.id.clone());

            // Envelope invariant
            ensure_step_envelope(&run_base, flow_key, run_id, &step_result);

            // Envelope-first routing, fallback driver otherwise
            let envelope = read_handoff_envelope(&run_base, &step.id, false);
            let signal = match read_routing_from_envelope(&run_base, &step.id) {
                Some(signal) => signal,
                None => {
                    let signal = self
                        .fallback_route(&ctx, &routing, envelope.as_ref())
                        .await;
                    update_envelope_routing(&run_base, &step.id, &signal);
                    signal
                }
            };

            // Stall detection may promote a loop into termination/injection
            let signal = if signal.decision == RoutingDecision::Loop {
                self.check_stall(&run_base, &step, &routing, envelope.as_ref(), iteration, &mut stall_evidence)
                    .map(|promoted| {
                        update_envelope_routing(&run_base, &step.id, &promoted);
                        promoted
                    })
                    .unwrap_or(signal)
            } else {
                signal
            };

            // Optional verification: artifact existence + command checks,
            // gate on failure
            let verification = envelope
                .as_ref()
                .map(|env| self.verify_step(&run_base, &step, env))
                .unwrap_or_default();

            // step_end / step_error, envelope write happens-before this append
            let envelope_status = envelope
                .as_ref()
                .map(|e| e.status)
                .unwrap_or(EnvelopeStatus::Unverified);
            let (end_kind, payload) = if step_result.status == StepStatus::Failed {
                (
                    EventKind::StepError,
                    serde_json::json!({
                        "error": step_result.error,
                        "duration_ms": step_result.duration_ms,
                    }),
                )
            } else {
                (
                    EventKind::StepEnd,
                    serde_json::json!({
                        "status": envelope_status.as_str(),
                        "duration_ms": step_result.duration_ms,
                        "decision": signal.decision.as_str(),
                    }),
                )
            };
            self.append(
                RunEvent::new(run_id.clone(), end_kind, flow_key.clone())
                    .with_step(step.id.clone())
                    .with_agent(primary_agent(&step))
                    .with_payload(payload),
            )?;

            // Record history for downstream context assembly
            let history_entry = HistoryEntry {
                step_id: step.id.clone(),
                status: step_result.status.to_string(),
                output: step_result.output.clone(),
                duration_ms: step_result.duration_ms,
                summary: envelope.as_ref().map(|e| e.summary.clone()),
                artifacts: envelope
                    .as_ref()
                    .map(|e| e.artifacts.clone())
                    .unwrap_or_default(),
                agent_key: step.primary_agent().cloned(),
                role: Some(step.role.clone()),
            };
            if let Ok(value) = serde_json::to_value(&history_entry) {
                state.push_history(value);
            }
            if !verification.passed {
                debug!(step_id = %step.id, "verification failed, envelope status demoted");
            }

            // Apply the routing decision
            if signal.needs_human {
                result.needs_human = true;
            }
            current = match self.apply_decision(&flow, &step, &routing, &signal, &mut state) {
                Decision::Continue(next) => next,
                Decision::Inject(utility_flow) => {
                    self.run_injection(&flow, &step, &utility_flow, spec, run_id, &mut state, cancel.clone())
                        .await?;
                    // Resume the interrupted step after the utility flow
                    flow.get_step(&step.id).cloned()
                }
                Decision::Stop => None,
                Decision::Abort(message) => {
                    result.status = RunStatus::Failed;
                    result.error = Some(message);
                    result.needs_human = true;
                    None
                }
            };

            self.persist_state(&mut state, &current)?;
        }

        state.status = result.status;
        state.current_step = None;
        self.store.write_state(&state)?;

        info!(
            %run_id,
            %flow_key,
            status = %result.status,
            steps = result.steps_executed.len(),
            "flow complete"
        );

        Ok(result)
    }

    fn append(&self, event: RunEvent) -> Result<RunEvent, OrchestratorError> {
        Ok(self.store.append_event(event)?)
    }

    fn persist_state(
        &self,
        state: &mut RunState,
        current: &Option<StepDefinition>,
    ) -> Result<(), OrchestratorError> {
        state.current_step = current.as_ref().map(|s| s.id.clone());
        state.timestamp = utc_now_iso();
        self.store.write_state(state)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_context(
        &self,
        flow: &FlowDefinition,
        step: &StepDefinition,
        spec: &RunSpec,
        run_id: &RunId,
        state: &RunState,
        routing: &StepRouting,
        iteration: u32,
    ) -> StepContext {
        let history: Vec<HistoryEntry> = state
            .history
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();

        let routing_ctx = RoutingContext {
            loop_iteration: iteration,
            max_iterations: match routing {
                StepRouting::Microloop { max_iterations, .. } => Some(*max_iterations),
                _ => None,
            },
            kind: routing.kind_str().to_string(),
            next_step_id: routing.next_step().cloned(),
            loop_target: match routing {
                StepRouting::Microloop { loop_target, .. } => Some(loop_target.clone()),
                _ => None,
            },
        };

        StepContext {
            repo_root: self.repo_root.clone(),
            runs_root: self.store.runs_root().to_owned(),
            run_id: run_id.clone(),
            flow_key: flow.key.clone(),
            step_id: step.id.clone(),
            step_index: step.index,
            total_steps: flow.steps.len() as u32,
            spec: spec.clone(),
            flow_title: flow.title.clone(),
            step_role: step.role.clone(),
            step_agents: step.agents.clone(),
            history,
            teaching_notes: step.teaching_notes.clone(),
            routing: routing_ctx,
            routing_config: Some(routing.clone()),
            engine_profile: step.engine_profile.clone().unwrap_or_else(EngineProfile::default),
            context_pack: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Fallback routing driver: the engine decides if it can, then the
    /// deterministic table, then the error policy (§7).
    async fn fallback_route(
        &self,
        ctx: &StepContext,
        routing: &StepRouting,
        envelope: Option<&HandoffEnvelope>,
    ) -> RoutingSignal {
        if let Some(envelope) = envelope {
            if let Some(signal) = self.engine.route_step(ctx, envelope).await {
                return signal;
            }
            if let Some(signal) = route_from_routing_config(
                routing,
                envelope.status.as_str(),
                envelope.can_further_iteration_help,
                ctx.routing.loop_iteration,
            ) {
                return signal.with_source("routing_config");
            }
        }

        // Unresolved: linear-with-no-next terminates, anything else
        // terminates for human review
        match routing {
            StepRouting::Linear { next: None } | StepRouting::Terminal {} => {
                RoutingSignal::terminate("flow_complete").with_source("orchestrator")
            }
            _ => {
                warn!(step_id = %ctx.step_id, "routing unresolved, terminating for human review");
                RoutingSignal::terminate("routing_unresolved")
                    .with_needs_human(true)
                    .with_source("orchestrator")
            }
        }
    }

    fn check_stall(
        &self,
        run_base: &Path,
        step: &StepDefinition,
        routing: &StepRouting,
        envelope: Option<&HandoffEnvelope>,
        iteration: u32,
        evidence_map: &mut HashMap<String, Vec<ProgressEvidence>>,
    ) -> Option<RoutingSignal> {
        let StepRouting::Microloop { loop_target, .. } = routing else {
            return None;
        };
        let key = swarm_core::loop_key(&step.id, loop_target);

        let tests: Option<TestSummary> = envelope
            .and_then(|e| e.extra.get("test_summary"))
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let evidence = ProgressEvidence::from_scan(
            iteration,
            envelope.and_then(|e| e.file_changes.as_ref()),
            tests.as_ref(),
        );

        let history = evidence_map.entry(key).or_default();
        history.push(evidence);

        let analysis = detect_stall(history, self.stall_threshold);
        if !analysis.stalled {
            return None;
        }

        warn!(step_id = %step.id, reason = %analysis.reason, "stall detected, promoting loop decision");
        let utility_flow = self.utility_flows.flow_for_trigger(STALL_TRIGGER);
        let signal = create_stall_routing_signal(utility_flow);
        debug!(run_base = %run_base.display(), "stall signal persisted over loop decision");
        Some(signal)
    }

    fn verify_step(
        &self,
        run_base: &Path,
        step: &StepDefinition,
        envelope: &HandoffEnvelope,
    ) -> VerificationResult {
        let mut verification = VerificationResult::default();
        let config = step.verification.clone().unwrap_or_default();
        verification.gate_status_on_fail =
            EnvelopeStatus::parse_lenient(&config.gate_status_on_fail);

        let claimed = envelope
            .artifacts
            .iter()
            .map(|(name, relpath)| (name.clone(), relpath.clone()));
        let required = config
            .required_artifacts
            .iter()
            .map(|relpath| (relpath.clone(), relpath.clone()));
        for (name, relpath) in claimed.chain(required) {
            let exists = self.repo_root.join(&relpath).exists() || run_base.join(&relpath).exists();
            verification.record(VerificationCheck {
                check_type: swarm_core::CheckType::Artifact,
                name,
                passed: exists,
                output: if exists {
                    String::new()
                } else {
                    format!("artifact missing: {relpath}")
                },
            });
        }

        for command in &config.commands {
            let outcome = swarm_adapters::run_sync("bash", &["-c", command], &self.repo_root);
            let (passed, output) = match outcome {
                Ok(out) if out.success => (true, String::new()),
                Ok(out) => (false, format!("exit {}: {}", out.exit_code, out.stderr.trim())),
                Err(e) => (false, format!("spawn failed: {e}")),
            };
            verification.record(VerificationCheck {
                check_type: swarm_core::CheckType::Command,
                name: command.clone(),
                passed,
                output,
            });
        }

        if !verification.passed {
            // Gate: demote the committed envelope's status
            if let Some(mut current) = read_handoff_envelope(run_base, &envelope.step_id, false) {
                if current.status.rank() > verification.gate_status_on_fail.rank() {
                    current.status = verification.gate_status_on_fail;
                    let _ = write_handoff_envelope(
                        run_base,
                        &mut current,
                        WriteOptions {
                            write_draft: false,
                            validate: false,
                        },
                    );
                }
            }
        }

        verification
    }

    fn apply_decision(
        &self,
        flow: &FlowDefinition,
        step: &StepDefinition,
        routing: &StepRouting,
        signal: &RoutingSignal,
        state: &mut RunState,
    ) -> Decision {
        match signal.decision {
            RoutingDecision::Terminate => {
                // A stall promotion may carry a utility flow to inject
                if signal.reason == "stall_detected" {
                    if let Some(flow_key) = signal.route.as_deref() {
                        return Decision::Inject(FlowKey::new(flow_key));
                    }
                }
                Decision::Stop
            }
            RoutingDecision::Advance => {
                let next = signal
                    .next_step_id
                    .clone()
                    .or_else(|| routing.next_step().cloned());
                match next {
                    Some(next_id) => match flow.get_step(&next_id) {
                        Some(def) => Decision::Continue(Some(def.clone())),
                        None => Decision::Abort(format!("unknown next step: {next_id}")),
                    },
                    None => Decision::Stop,
                }
            }
            RoutingDecision::Loop => {
                let target = signal.next_step_id.clone().or_else(|| match routing {
                    StepRouting::Microloop { loop_target, .. } => Some(loop_target.clone()),
                    _ => None,
                });
                match target {
                    Some(target_id) => match flow.get_step(&target_id) {
                        Some(def) => {
                            // Counter increments before the target re-executes
                            let count = state.increment_loop(&step.id, &target_id);
                            debug!(step_id = %step.id, target = %target_id, count, "microloop iteration");
                            Decision::Continue(Some(def.clone()))
                        }
                        None => Decision::Abort(format!("unknown loop target: {target_id}")),
                    },
                    None => Decision::Abort("loop decision without target".to_string()),
                }
            }
            RoutingDecision::Branch => {
                let target = signal.next_step_id.clone().or_else(|| {
                    let StepRouting::Branch { branches, next } = routing else {
                        return None;
                    };
                    signal
                        .route
                        .as_ref()
                        .and_then(|label| {
                            branches.get(label.as_str()).cloned().or_else(|| {
                                branches
                                    .iter()
                                    .find(|(k, _)| k.eq_ignore_ascii_case(label))
                                    .map(|(_, v)| v.clone())
                            })
                        })
                        .or_else(|| next.clone())
                });
                match target {
                    Some(target_id) => match flow.get_step(&target_id) {
                        Some(def) => Decision::Continue(Some(def.clone())),
                        None => Decision::Abort(format!("unknown branch target: {target_id}")),
                    },
                    None => Decision::Abort("branch decision without target".to_string()),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_injection(
        &self,
        flow: &FlowDefinition,
        step: &StepDefinition,
        utility_flow: &FlowKey,
        spec: &RunSpec,
        run_id: &RunId,
        state: &mut RunState,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<(), OrchestratorError> {
        let injector = UtilityFlowInjector::new(Arc::clone(&self.utility_flows));
        if injector
            .inject(state, utility_flow, Some(step.id.clone()), STALL_TRIGGER)
            .is_none()
        {
            warn!(%utility_flow, "utility flow has no steps, skipping injection");
            return Ok(());
        }
        self.store.write_state(state)?;
        self.append(
            RunEvent::new(run_id.clone(), EventKind::Log, flow.key.clone())
                .with_step(step.id.clone())
                .with_payload(serde_json::json!({
                    "message": "utility_flow_injected",
                    "injected_flow": utility_flow.as_str(),
                    "trigger": STALL_TRIGGER,
                })),
        )?;

        // Run the injected flow, then pop the frame and resume
        let injected = Box::pin(self.run_flow(utility_flow, spec, run_id, None, cancel)).await?;
        debug!(status = %injected.status, "injected utility flow finished");
        injector.resume_from_interruption(state);
        self.store.write_state(state)?;
        Ok(())
    }

    /// Dispatch fork branches, aggregate at the join point, and return the
    /// step that follows the join.
    #[allow(clippy::too_many_arguments)]
    async fn run_fork(
        &self,
        flow: &FlowDefinition,
        fork_step: &StepDefinition,
        targets: &[StepId],
        spec: &RunSpec,
        run_id: &RunId,
        state: &mut RunState,
        result: &mut FlowRunResult,
    ) -> Result<Option<StepDefinition>, OrchestratorError> {
        let mut contexts = Vec::new();
        for target in targets {
            let Some(target_def) = flow.get_step(target) else {
                warn!(%target, "fork target missing, skipping");
                continue;
            };
            let routing = effective_routing(flow, target_def);
            contexts.push(self.build_context(flow, target_def, spec, run_id, state, &routing, 0));
        }

        for ctx in &contexts {
            self.append(
                RunEvent::new(run_id.clone(), EventKind::StepStart, flow.key.clone())
                    .with_step(ctx.step_id.clone()),
            )?;
        }

        let outcomes = self
            .executor
            .execute(Arc::clone(&self.engine), contexts, &self.fork_config)
            .await;

        for outcome in &outcomes {
            for event in outcome.events.clone() {
                self.append(event)?;
            }
            let kind = if outcome.result.status == StepStatus::Failed {
                EventKind::StepError
            } else {
                EventKind::StepEnd
            };
            self.append(
                RunEvent::new(run_id.clone(), kind, flow.key.clone())
                    .with_step(outcome.step_id.clone())
                    .with_payload(serde_json::json!({
                        "duration_ms": outcome.result.duration_ms,
                        "branch_of": fork_step.id.as_str(),
                    })),
            )?;
            result.steps_executed.push(outcome.step_id.clone());
        }

        // Reach the matching join point (first join step after the fork)
        let join_step = flow
            .steps
            .iter()
            .filter(|s| s.index > fork_step.index)
            .find(|s| matches!(s.routing, Some(StepRouting::Join { join_point: true })));

        let join = aggregate_join(&outcomes, &self.join_config);
        if !join.satisfied {
            result.needs_human = true;
        }

        let Some(join_step) = join_step else {
            // No join point declared: the fork ends the flow
            return Ok(None);
        };

        let run_base = self.store.flow_base(run_id, &flow.key);
        let mut envelope = HandoffEnvelope::new(
            join_step.id.clone(),
            flow.key.clone(),
            run_id.clone(),
            join.status,
        )
        .with_summary(format!(
            "Joined {} branches of {}",
            outcomes.len(),
            fork_step.id
        ))
        .with_source(EnvelopeSource::Lifecycle);
        envelope.artifacts = join.merged_artifacts.clone();
        if !join.merged_concerns.is_empty() {
            envelope.extra.insert(
                "concerns".to_string(),
                serde_json::json!(join.merged_concerns),
            );
        }
        if let Err(e) = write_handoff_envelope(&run_base, &mut envelope, WriteOptions::default()) {
            warn!(error = %e, "failed to write join envelope");
        }
        self.append(
            RunEvent::new(run_id.clone(), EventKind::StepEnd, flow.key.clone())
                .with_step(join_step.id.clone())
                .with_payload(serde_json::json!({
                    "status": join.status.as_str(),
                    "join_satisfied": join.satisfied,
                })),
        )?;
        result.steps_executed.push(join_step.id.clone());

        // Continue after the join
        let next = flow
            .steps
            .iter()
            .find(|s| s.index == join_step.index + 1)
            .cloned();
        Ok(next)
    }
}

enum Decision {
    Continue(Option<StepDefinition>),
    Inject(FlowKey),
    Stop,
    Abort(String),
}

/// A step's routing config, defaulting to linear-to-next-by-index.
fn effective_routing(flow: &FlowDefinition, step: &StepDefinition) -> StepRouting {
    if let Some(routing) = &step.routing {
        return routing.clone();
    }
    let next = flow
        .steps
        .iter()
        .find(|s| s.index == step.index + 1)
        .map(|s| s.id.clone());
    StepRouting::Linear { next }
}

fn loop_iteration(state: &RunState, step: &StepDefinition, routing: &StepRouting) -> u32 {
    match routing {
        StepRouting::Microloop { loop_target, .. } => state.loop_count(&step.id, loop_target),
        _ => 0,
    }
}

fn primary_agent(step: &StepDefinition) -> swarm_core::AgentKey {
    step.primary_agent()
        .cloned()
        .unwrap_or_else(|| swarm_core::AgentKey::new("agent"))
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
pub(crate) mod tests;
