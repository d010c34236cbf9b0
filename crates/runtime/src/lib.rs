// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-runtime: stepwise orchestrator, fork/join, autopilot, backends

mod autopilot;
mod backend;
mod evolution;
mod injection;
mod orchestrator;
mod parallel;

pub use autopilot::{
    AutopilotConfig, AutopilotController, AutopilotResult, AutopilotStatus, EvolutionBoundary,
    EvolutionApplyPolicy, WisdomApplyResult,
};
pub use backend::{
    BackendCapabilities, BackendError, BackendRegistry, RunBackend, StepwiseBackend,
};
pub use evolution::{
    apply_evolution_patch, generate_evolution_patches, validate_evolution_patch, ApplyResult,
    Confidence, EvolutionPatch, EvolutionSuggestion, PatchType, PatchValidation, Risk,
};
pub use injection::{
    InjectionTriggerDetector, UtilityFlowInjector, UtilityFlowRegistry, STALL_TRIGGER,
};
pub use orchestrator::{
    ensure_step_envelope, FlowRunResult, OrchestratorError, StepwiseOrchestrator,
};
pub use parallel::{
    aggregate_join, AggregateStatus, BranchOutcome, ExecutionPolicy, FailurePolicy, ForkConfig,
    JoinConfig, JoinOutcome, JoinStrategy, ParallelExecutor,
};
