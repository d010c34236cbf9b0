// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fork/join execution of concurrent branches.
//!
//! A bounded worker pool runs branch contexts through the engine. Branch
//! ordering is not guaranteed; event `seq` is assigned at append time by
//! the single-run writer. Join aggregation computes status on the total
//! order `BLOCKED < UNVERIFIED < PARTIAL < VERIFIED`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use swarm_core::{EnvelopeStatus, HandoffEnvelope, RunEvent, StepId};
use swarm_engine::{StepContext, StepEngine, StepResult, StepStatus};
use swarm_storage::read_handoff_envelope;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPolicy {
    Concurrent,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Wait for every branch regardless of failures.
    ContinueAll,
    /// Cancel outstanding branches on the first failure.
    FailFast,
    /// Collect whatever finishes; failures are kept, not fatal.
    BestEffort,
}

/// Configuration for dispatching fork branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkConfig {
    pub execution_policy: ExecutionPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    pub failure_policy: FailurePolicy,
    /// Run each branch against an isolated working directory.
    #[serde(default)]
    pub isolation: bool,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            execution_policy: ExecutionPolicy::Concurrent,
            batch_size: None,
            failure_policy: FailurePolicy::ContinueAll,
            isolation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    AllComplete,
    AllVerified,
    AnyVerified,
    Quorum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Worst,
    Best,
    Strict,
}

/// Configuration for merging branch results at the join point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub strategy: JoinStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum_count: Option<usize>,
    pub merge_artifacts: bool,
    pub merge_concerns: bool,
    pub aggregate_status: AggregateStatus,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            strategy: JoinStrategy::AllComplete,
            quorum_count: None,
            merge_artifacts: true,
            merge_concerns: true,
            aggregate_status: AggregateStatus::Worst,
        }
    }
}

/// Result of one executed branch.
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub step_id: StepId,
    pub result: StepResult,
    pub envelope: Option<HandoffEnvelope>,
    pub events: Vec<RunEvent>,
}

/// Aggregated join view over all branch outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub status: EnvelopeStatus,
    /// Whether the join strategy's condition is met.
    pub satisfied: bool,
    pub merged_artifacts: BTreeMap<String, String>,
    pub merged_concerns: Vec<String>,
}

/// Bounded worker pool for concurrent branch execution.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    max_workers: usize,
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

impl ParallelExecutor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Execute branch contexts per the fork configuration.
    ///
    /// Outcomes are returned in the original branch order regardless of
    /// completion order. With `fail_fast`, branches that never ran are
    /// reported as skipped.
    pub async fn execute<E: StepEngine + 'static>(
        &self,
        engine: Arc<E>,
        contexts: Vec<StepContext>,
        config: &ForkConfig,
    ) -> Vec<BranchOutcome> {
        match config.execution_policy {
            ExecutionPolicy::Concurrent => {
                self.execute_wave(engine, contexts, config.failure_policy).await
            }
            ExecutionPolicy::Batch => {
                let batch_size = config.batch_size.unwrap_or(self.max_workers).max(1);
                let mut outcomes = Vec::new();
                let mut remaining = contexts;
                while !remaining.is_empty() {
                    let rest = remaining.split_off(batch_size.min(remaining.len()));
                    let batch = std::mem::replace(&mut remaining, rest);
                    let mut batch_outcomes = self
                        .execute_wave(Arc::clone(&engine), batch, config.failure_policy)
                        .await;
                    let failed = batch_outcomes
                        .iter()
                        .any(|o| o.result.status == StepStatus::Failed);
                    outcomes.append(&mut batch_outcomes);
                    if failed && config.failure_policy == FailurePolicy::FailFast {
                        // Remaining batches are skipped
                        for ctx in remaining {
                            outcomes.push(skipped_outcome(ctx.step_id));
                        }
                        return outcomes;
                    }
                }
                outcomes
            }
        }
    }

    async fn execute_wave<E: StepEngine + 'static>(
        &self,
        engine: Arc<E>,
        contexts: Vec<StepContext>,
        failure_policy: FailurePolicy,
    ) -> Vec<BranchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set: JoinSet<(usize, BranchOutcome)> = JoinSet::new();
        let total = contexts.len();

        for (index, mut ctx) in contexts.into_iter().enumerate() {
            let engine = Arc::clone(&engine);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let step_id = ctx.step_id.clone();
                let run_base = ctx.run_base();
                let (result, events) = engine.run_step(&mut ctx).await;
                let envelope = read_handoff_envelope(&run_base, &step_id, false);
                (
                    index,
                    BranchOutcome {
                        step_id,
                        result,
                        envelope,
                        events,
                    },
                )
            });
        }

        let mut slots: Vec<Option<BranchOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    let failed = outcome.result.status == StepStatus::Failed;
                    slots[index] = Some(outcome);
                    if failed && failure_policy == FailurePolicy::FailFast {
                        join_set.abort_all();
                        while let Some(rest) = join_set.join_next().await {
                            if let Ok((index, outcome)) = rest {
                                slots[index] = Some(outcome);
                            }
                        }
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "branch task failed to join"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| skipped_outcome(StepId::new(format!("branch_{index}"))))
            })
            .collect()
    }
}

fn skipped_outcome(step_id: StepId) -> BranchOutcome {
    BranchOutcome {
        result: StepResult {
            step_id: step_id.clone(),
            status: StepStatus::Skipped,
            ..StepResult::default()
        },
        step_id,
        envelope: None,
        events: Vec::new(),
    }
}

/// Aggregate branch outcomes at the join point.
pub fn aggregate_join(outcomes: &[BranchOutcome], config: &JoinConfig) -> JoinOutcome {
    let statuses: Vec<EnvelopeStatus> = outcomes
        .iter()
        .map(|o| o.envelope.as_ref().map(|e| e.status).unwrap_or(EnvelopeStatus::Blocked))
        .collect();

    let verified_count = statuses
        .iter()
        .filter(|s| **s == EnvelopeStatus::Verified)
        .count();
    let all_complete = outcomes
        .iter()
        .all(|o| o.result.status != StepStatus::Skipped);

    let satisfied = match config.strategy {
        JoinStrategy::AllComplete => all_complete,
        JoinStrategy::AllVerified => !outcomes.is_empty() && verified_count == outcomes.len(),
        JoinStrategy::AnyVerified => verified_count > 0,
        JoinStrategy::Quorum => verified_count >= config.quorum_count.unwrap_or(outcomes.len()),
    };

    let status = match config.aggregate_status {
        AggregateStatus::Worst => {
            EnvelopeStatus::worst(statuses.iter().copied()).unwrap_or(EnvelopeStatus::Blocked)
        }
        AggregateStatus::Best => {
            EnvelopeStatus::best(statuses.iter().copied()).unwrap_or(EnvelopeStatus::Blocked)
        }
        AggregateStatus::Strict => {
            if !statuses.is_empty() && verified_count == statuses.len() {
                EnvelopeStatus::Verified
            } else {
                EnvelopeStatus::Blocked
            }
        }
    };

    let mut merged_artifacts = BTreeMap::new();
    let mut merged_concerns = Vec::new();
    for outcome in outcomes {
        let Some(envelope) = &outcome.envelope else {
            continue;
        };
        if config.merge_artifacts {
            for (name, path) in &envelope.artifacts {
                merged_artifacts.insert(format!("{}:{name}", outcome.step_id), path.clone());
            }
        }
        if config.merge_concerns {
            if let Some(concerns) = envelope.extra.get("concerns").and_then(|v| v.as_array()) {
                for concern in concerns {
                    if let Some(text) = concern.as_str() {
                        merged_concerns.push(format!("{}: {text}", outcome.step_id));
                    }
                }
            }
        }
    }

    JoinOutcome {
        status,
        satisfied,
        merged_artifacts,
        merged_concerns,
    }
}

#[cfg(test)]
#[path = "parallel_tests.rs"]
mod tests;
