// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use swarm_core::{AgentKey, FlowKey, RunId, RunSpec};
use swarm_engine::{RoutingContext, StubStepEngine, StubStepPlan};
use swarm_registry::EngineProfile;
use tempfile::TempDir;

fn branch_ctx(dir: &TempDir, step_id: &str) -> StepContext {
    StepContext {
        repo_root: dir.path().to_owned(),
        runs_root: dir.path().join("runs"),
        run_id: RunId::new("run-1"),
        flow_key: FlowKey::new("review"),
        step_id: StepId::new(step_id),
        step_index: 1,
        total_steps: 3,
        spec: RunSpec::new(vec![FlowKey::new("review")], "stepwise", "test"),
        flow_title: "Review".to_string(),
        step_role: "review a dimension".to_string(),
        step_agents: vec![AgentKey::new("reviewer")],
        history: Vec::new(),
        teaching_notes: None,
        routing: RoutingContext::default(),
        routing_config: None,
        engine_profile: EngineProfile::default(),
        context_pack: None,
        extra: serde_json::Map::new(),
    }
}

fn envelope_status(outcome: &BranchOutcome) -> Option<EnvelopeStatus> {
    outcome.envelope.as_ref().map(|e| e.status)
}

#[tokio::test]
async fn concurrent_branches_all_complete_in_order() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(StubStepEngine::new());
    let executor = ParallelExecutor::new(2);

    let contexts = vec![
        branch_ctx(&dir, "review_security"),
        branch_ctx(&dir, "review_perf"),
        branch_ctx(&dir, "review_style"),
    ];
    let outcomes = executor
        .execute(engine, contexts, &ForkConfig::default())
        .await;

    assert_eq!(outcomes.len(), 3);
    let ids: Vec<&str> = outcomes.iter().map(|o| o.step_id.as_str()).collect();
    assert_eq!(ids, ["review_security", "review_perf", "review_style"]);
    assert!(outcomes
        .iter()
        .all(|o| envelope_status(o) == Some(EnvelopeStatus::Verified)));
}

#[tokio::test]
async fn fail_fast_skips_unfinished_batches() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(StubStepEngine::new());
    let mut failing = StubStepPlan::default();
    failing.fail = true;
    engine.plan_step("review_security", failing);

    let executor = ParallelExecutor::new(1);
    let config = ForkConfig {
        execution_policy: ExecutionPolicy::Batch,
        batch_size: Some(1),
        failure_policy: FailurePolicy::FailFast,
        isolation: false,
    };
    let contexts = vec![
        branch_ctx(&dir, "review_security"),
        branch_ctx(&dir, "review_perf"),
    ];
    let outcomes = executor.execute(engine, contexts, &config).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result.status, swarm_engine::StepStatus::Failed);
    assert_eq!(outcomes[1].result.status, swarm_engine::StepStatus::Skipped);
}

#[tokio::test]
async fn continue_all_keeps_failures_and_successes() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(StubStepEngine::new());
    let mut failing = StubStepPlan::default();
    failing.fail = true;
    engine.plan_step("review_perf", failing);

    let executor = ParallelExecutor::new(4);
    let contexts = vec![
        branch_ctx(&dir, "review_security"),
        branch_ctx(&dir, "review_perf"),
    ];
    let outcomes = executor
        .execute(engine, contexts, &ForkConfig::default())
        .await;

    assert_eq!(outcomes[0].result.status, swarm_engine::StepStatus::Succeeded);
    assert_eq!(outcomes[1].result.status, swarm_engine::StepStatus::Failed);
}

fn outcome_with_status(step: &str, status: EnvelopeStatus) -> BranchOutcome {
    let mut envelope = swarm_core::HandoffEnvelope::new(step, "review", "run-1", status);
    envelope
        .artifacts
        .insert("report".to_string(), format!("reports/{step}.md"));
    envelope.extra.insert(
        "concerns".to_string(),
        serde_json::json!([format!("{step} concern")]),
    );
    BranchOutcome {
        step_id: StepId::new(step),
        result: swarm_engine::StepResult::succeeded(StepId::new(step), "done"),
        envelope: Some(envelope),
        events: Vec::new(),
    }
}

#[test]
fn join_aggregates_worst_status() {
    let outcomes = vec![
        outcome_with_status("a", EnvelopeStatus::Verified),
        outcome_with_status("b", EnvelopeStatus::Partial),
        outcome_with_status("c", EnvelopeStatus::Unverified),
    ];
    let join = aggregate_join(&outcomes, &JoinConfig::default());
    assert_eq!(join.status, EnvelopeStatus::Unverified);
    assert!(join.satisfied, "all branches completed");
    assert_eq!(join.merged_artifacts.len(), 3);
    assert!(join.merged_artifacts.contains_key("a:report"));
    assert_eq!(join.merged_concerns.len(), 3);
}

#[test]
fn join_strategies() {
    let mixed = vec![
        outcome_with_status("a", EnvelopeStatus::Verified),
        outcome_with_status("b", EnvelopeStatus::Unverified),
    ];

    let all_verified = JoinConfig {
        strategy: JoinStrategy::AllVerified,
        ..JoinConfig::default()
    };
    assert!(!aggregate_join(&mixed, &all_verified).satisfied);

    let any_verified = JoinConfig {
        strategy: JoinStrategy::AnyVerified,
        ..JoinConfig::default()
    };
    assert!(aggregate_join(&mixed, &any_verified).satisfied);

    let quorum = JoinConfig {
        strategy: JoinStrategy::Quorum,
        quorum_count: Some(2),
        ..JoinConfig::default()
    };
    assert!(!aggregate_join(&mixed, &quorum).satisfied);
    let quorum_one = JoinConfig {
        strategy: JoinStrategy::Quorum,
        quorum_count: Some(1),
        ..JoinConfig::default()
    };
    assert!(aggregate_join(&mixed, &quorum_one).satisfied);
}

#[test]
fn strict_aggregate_demands_unanimous_verification() {
    let unanimous = vec![
        outcome_with_status("a", EnvelopeStatus::Verified),
        outcome_with_status("b", EnvelopeStatus::Verified),
    ];
    let strict = JoinConfig {
        aggregate_status: AggregateStatus::Strict,
        ..JoinConfig::default()
    };
    assert_eq!(aggregate_join(&unanimous, &strict).status, EnvelopeStatus::Verified);

    let mixed = vec![
        outcome_with_status("a", EnvelopeStatus::Verified),
        outcome_with_status("b", EnvelopeStatus::Partial),
    ];
    assert_eq!(aggregate_join(&mixed, &strict).status, EnvelopeStatus::Blocked);
}

#[test]
fn missing_envelope_counts_as_blocked() {
    let mut outcome = outcome_with_status("a", EnvelopeStatus::Verified);
    outcome.envelope = None;
    let join = aggregate_join(&[outcome], &JoinConfig::default());
    assert_eq!(join.status, EnvelopeStatus::Blocked);
}
