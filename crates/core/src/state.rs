// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-flow run state: microloop counters, history, interruption stack.

use crate::id::{FlowKey, RunId, StepId};
use crate::spec::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key for a microloop counter: `"<step>:<loop_target>"`.
pub fn loop_key(step_id: &StepId, loop_target: &StepId) -> String {
    format!("{step_id}:{loop_target}")
}

/// Stack frame recorded when a utility flow interrupts the main flow.
/// Popped when the injected flow terminates, resuming at `return_step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptionFrame {
    pub return_flow: FlowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_step: Option<StepId>,
    pub injected_flow: FlowKey,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub ts: String,
}

/// Scratchpad state for one flow of a run, persisted to `<flow>/state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub flow_key: FlowKey,
    pub status: RunStatus,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepId>,
    /// Microloop counters keyed `"step:target"`. Strictly non-decreasing
    /// within a run; incremented before re-execution of the target.
    #[serde(default)]
    pub loop_state: BTreeMap<String, u32>,
    /// History entries from completed steps, oldest first.
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interruption_stack: Vec<InterruptionFrame>,
}

impl RunState {
    pub fn new(run_id: impl Into<RunId>, flow_key: impl Into<FlowKey>) -> Self {
        Self {
            run_id: run_id.into(),
            flow_key: flow_key.into(),
            status: RunStatus::Running,
            timestamp: String::new(),
            current_step: None,
            loop_state: BTreeMap::new(),
            history: Vec::new(),
            interruption_stack: Vec::new(),
        }
    }

    /// Current iteration count for a `(step, loop_target)` microloop.
    pub fn loop_count(&self, step_id: &StepId, loop_target: &StepId) -> u32 {
        self.loop_state
            .get(&loop_key(step_id, loop_target))
            .copied()
            .unwrap_or(0)
    }

    /// Increment the microloop counter and return the new value.
    pub fn increment_loop(&mut self, step_id: &StepId, loop_target: &StepId) -> u32 {
        let counter = self
            .loop_state
            .entry(loop_key(step_id, loop_target))
            .or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn push_history(&mut self, entry: serde_json::Value) {
        self.history.push(entry);
    }

    pub fn push_interruption(&mut self, frame: InterruptionFrame) {
        self.interruption_stack.push(frame);
    }

    pub fn pop_interruption(&mut self) -> Option<InterruptionFrame> {
        self.interruption_stack.pop()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
