// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Utility-flow injection: interrupt the main flow, run a utility flow,
//! return to where execution left off.
//!
//! Utility flows declare `is_utility_flow: true` and an `injection_trigger`
//! in their per-flow YAML. When a trigger fires (e.g. the routing driver's
//! stall path), the injector pushes an interruption frame onto run state;
//! when the injected flow terminates, the frame is popped and execution
//! resumes at the recorded step.

use std::collections::HashMap;
use std::sync::Arc;
use swarm_core::{utc_now_iso, FlowKey, InterruptionFrame, RunState, StepId};
use swarm_registry::FlowRegistry;
use tracing::info;

/// Trigger name used by the routing driver's stall promotion.
pub const STALL_TRIGGER: &str = "stall_detected";

/// Index of utility flows by their injection trigger.
#[derive(Debug, Clone, Default)]
pub struct UtilityFlowRegistry {
    by_trigger: HashMap<String, FlowKey>,
    first_steps: HashMap<FlowKey, StepId>,
}

impl UtilityFlowRegistry {
    pub fn from_registry(registry: &FlowRegistry) -> Self {
        let mut by_trigger = HashMap::new();
        let mut first_steps = HashMap::new();
        for flow in registry.utility_flows() {
            if let Some(trigger) = &flow.injection_trigger {
                by_trigger.insert(trigger.clone(), flow.key.clone());
            }
            if let Some(step) = flow.first_step() {
                first_steps.insert(flow.key.clone(), step.id.clone());
            }
        }
        Self {
            by_trigger,
            first_steps,
        }
    }

    pub fn flow_for_trigger(&self, trigger: &str) -> Option<&FlowKey> {
        self.by_trigger.get(trigger)
    }

    pub fn first_step(&self, flow_key: &FlowKey) -> Option<&StepId> {
        self.first_steps.get(flow_key)
    }

    pub fn is_empty(&self) -> bool {
        self.by_trigger.is_empty()
    }
}

/// Resolves trigger names fired by routing decisions to utility flows.
#[derive(Debug, Clone)]
pub struct InjectionTriggerDetector {
    registry: Arc<UtilityFlowRegistry>,
}

impl InjectionTriggerDetector {
    pub fn new(registry: Arc<UtilityFlowRegistry>) -> Self {
        Self { registry }
    }

    /// The utility flow registered for a trigger, if any.
    pub fn detect(&self, trigger: &str) -> Option<FlowKey> {
        self.registry.flow_for_trigger(trigger).cloned()
    }
}

/// Performs the stack-frame bookkeeping for an injection.
#[derive(Debug, Clone)]
pub struct UtilityFlowInjector {
    registry: Arc<UtilityFlowRegistry>,
}

impl UtilityFlowInjector {
    pub fn new(registry: Arc<UtilityFlowRegistry>) -> Self {
        Self { registry }
    }

    /// Push an interruption frame and return the utility flow's first step.
    pub fn inject(
        &self,
        state: &mut RunState,
        utility_flow: &FlowKey,
        return_step: Option<StepId>,
        reason: impl Into<String>,
    ) -> Option<StepId> {
        let first = self.registry.first_step(utility_flow)?.clone();
        let reason = reason.into();
        info!(
            flow = %utility_flow,
            return_flow = %state.flow_key,
            %reason,
            "injecting utility flow"
        );
        state.push_interruption(InterruptionFrame {
            return_flow: state.flow_key.clone(),
            return_step,
            injected_flow: utility_flow.clone(),
            reason,
            ts: utc_now_iso(),
        });
        Some(first)
    }

    /// Pop the top frame when an injected flow terminates ("return").
    pub fn resume_from_interruption(&self, state: &mut RunState) -> Option<InterruptionFrame> {
        state.pop_interruption()
    }
}

#[cfg(test)]
#[path = "injection_tests.rs"]
mod tests;
