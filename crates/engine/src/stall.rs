// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stall detection across microloop iterations.
//!
//! Before a routing driver decides `loop`, it can compare evidence between
//! iterations: activity without changing error signatures means the loop is
//! churning, not converging. Detected stalls promote the decision to
//! terminate (or a utility-flow injection) with `needs_human=true`.

use serde::{Deserialize, Serialize};
use swarm_core::{FileChanges, FlowKey, RoutingSignal, TestSummary};

/// Consecutive iterations with identical failures required to call a stall.
pub const DEFAULT_STALL_ITERATIONS: usize = 2;

/// Forensic evidence captured after one loop iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvidence {
    pub iteration: u32,
    pub files_changed: usize,
    pub insertions: u64,
    pub deletions: u64,
    /// Sorted, deduplicated error signatures from the test run.
    pub error_signatures: Vec<String>,
}

impl ProgressEvidence {
    pub fn from_scan(
        iteration: u32,
        changes: Option<&FileChanges>,
        tests: Option<&TestSummary>,
    ) -> Self {
        let mut signatures = tests
            .map(|t| t.error_signatures.clone())
            .unwrap_or_default();
        signatures.sort();
        signatures.dedup();

        Self {
            iteration,
            files_changed: changes.map(FileChanges::file_count).unwrap_or(0),
            insertions: changes.map(|c| c.total_insertions).unwrap_or(0),
            deletions: changes.map(|c| c.total_deletions).unwrap_or(0),
            error_signatures: signatures,
        }
    }

    /// Whether this iteration touched anything at all.
    pub fn has_activity(&self) -> bool {
        self.files_changed > 0 || self.insertions > 0 || self.deletions > 0
    }
}

/// Comparison between two consecutive iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressDelta {
    pub activity: bool,
    pub signatures_identical: bool,
    pub signature_count: usize,
}

impl ProgressDelta {
    pub fn between(prev: &ProgressEvidence, curr: &ProgressEvidence) -> Self {
        Self {
            activity: curr.has_activity(),
            signatures_identical: prev.error_signatures == curr.error_signatures
                && !curr.error_signatures.is_empty(),
            signature_count: curr.error_signatures.len(),
        }
    }

    /// A stalled delta: the iteration did work, yet failed identically.
    pub fn is_stall_indicator(&self) -> bool {
        self.activity && self.signatures_identical
    }
}

/// Outcome of analyzing an evidence sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallAnalysis {
    pub stalled: bool,
    pub reason: String,
    pub iterations_compared: usize,
}

/// Analyze the trailing iterations of an evidence sequence.
///
/// A stall is `threshold` trailing iterations that each show activity while
/// failing with identical, non-empty error signatures.
pub fn detect_stall(evidence: &[ProgressEvidence], threshold: usize) -> StallAnalysis {
    let threshold = threshold.max(2);
    if evidence.len() < threshold {
        return StallAnalysis {
            stalled: false,
            reason: "insufficient iterations".to_string(),
            iterations_compared: evidence.len(),
        };
    }

    // Count consecutive stall deltas ending at the most recent pair
    let needed = threshold - 1;
    let mut consecutive = 0;
    for pair in evidence.windows(2).rev() {
        if ProgressDelta::between(&pair[0], &pair[1]).is_stall_indicator() {
            consecutive += 1;
            if consecutive >= needed {
                break;
            }
        } else {
            break;
        }
    }

    if consecutive >= needed {
        StallAnalysis {
            stalled: true,
            reason: format!(
                "identical error signatures across {threshold} iterations with ongoing activity"
            ),
            iterations_compared: threshold,
        }
    } else {
        StallAnalysis {
            stalled: false,
            reason: "progress observed".to_string(),
            iterations_compared: consecutive + 1,
        }
    }
}

/// Build the promoted routing signal for a detected stall.
///
/// When a utility flow is registered for the `stall_detected` trigger, the
/// signal's `route` carries its key so the orchestrator can inject it;
/// otherwise the flow terminates for human review.
pub fn create_stall_routing_signal(utility_flow: Option<&FlowKey>) -> RoutingSignal {
    let mut signal = RoutingSignal::terminate("stall_detected").with_needs_human(true);
    signal.confidence = 0.8;
    signal.routing_source = Some("stall_detector".to_string());
    if let Some(flow) = utility_flow {
        signal.route = Some(flow.to_string());
    }
    signal
}

#[cfg(test)]
#[path = "stall_tests.rs"]
mod tests;
