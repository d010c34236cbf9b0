// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::models::RoutingContext;
use swarm_core::{AgentKey, FlowKey, RoutingDecision, RunId, RunSpec, StepId};
use swarm_registry::{EngineProfile, StepRouting};
use swarm_storage::{read_handoff_envelope, read_step_receipt, read_routing_from_envelope};
use tempfile::TempDir;

fn context(dir: &TempDir, step_id: &str, routing: Option<StepRouting>) -> StepContext {
    StepContext {
        repo_root: dir.path().to_owned(),
        runs_root: dir.path().join("runs"),
        run_id: RunId::new("run-1"),
        flow_key: FlowKey::new("build"),
        step_id: StepId::new(step_id),
        step_index: 1,
        total_steps: 3,
        spec: RunSpec::new(vec![FlowKey::new("build")], "stepwise", "test"),
        flow_title: "Build".to_string(),
        step_role: "author failing tests".to_string(),
        step_agents: vec![AgentKey::new("test-author")],
        history: Vec::new(),
        teaching_notes: None,
        routing: RoutingContext::default(),
        routing_config: routing,
        engine_profile: EngineProfile::default(),
        context_pack: None,
        extra: serde_json::Map::new(),
    }
}

#[tokio::test]
async fn default_plan_writes_verified_envelope_receipt_and_transcript() {
    let dir = TempDir::new().unwrap();
    let engine = StubStepEngine::new();
    let mut ctx = context(
        &dir,
        "author_tests",
        Some(StepRouting::Linear {
            next: Some(StepId::new("critique_tests")),
        }),
    );

    let (result, _events) = engine.run_step(&mut ctx).await;
    assert_eq!(result.status, StepStatus::Succeeded);

    let envelope = read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Verified);
    assert_eq!(envelope.envelope_source, Some(EnvelopeSource::Lifecycle));
    assert!(envelope.summary.contains("author_tests"));

    let receipt = read_step_receipt(&ctx.run_base(), &ctx.step_id, &AgentKey::new("test-author")).unwrap();
    assert_eq!(receipt.mode, "stub");
    assert_eq!(receipt.execution_mode, "session");
    assert_eq!(receipt.status, "succeeded");

    let transcript = ctx
        .run_base()
        .join("llm/author_tests-test-author-stub.jsonl");
    assert!(transcript.exists());
}

#[tokio::test]
async fn planned_status_flows_into_envelope_and_routing() {
    let dir = TempDir::new().unwrap();
    let engine = StubStepEngine::new();
    engine.plan_step("critique_tests", {
        let mut plan = StubStepPlan::with_status(EnvelopeStatus::Unverified);
        plan.can_further_iteration_help = Some(true);
        plan
    });

    let mut ctx = context(
        &dir,
        "critique_tests",
        Some(StepRouting::Microloop {
            loop_target: StepId::new("author_tests"),
            loop_condition_field: "status".to_string(),
            loop_success_values: vec!["VERIFIED".to_string()],
            max_iterations: 3,
            next: Some(StepId::new("implement")),
        }),
    );

    engine.run_step(&mut ctx).await;

    let signal = read_routing_from_envelope(&ctx.run_base(), &ctx.step_id).unwrap();
    assert_eq!(signal.decision, RoutingDecision::Loop);
    assert_eq!(signal.next_step_id, Some(StepId::new("author_tests")));
    assert!(!signal.routing_candidates.is_empty(), "audit candidates recorded");
    assert_eq!(signal.routing_source.as_deref(), Some("routing_config"));
}

#[tokio::test]
async fn skip_envelope_plan_leaves_no_envelope_but_writes_receipt() {
    let dir = TempDir::new().unwrap();
    let engine = StubStepEngine::new();
    let mut plan = StubStepPlan::default();
    plan.skip_envelope = true;
    engine.plan_step("author_tests", plan);

    let mut ctx = context(&dir, "author_tests", None);
    let (result, _) = engine.run_step(&mut ctx).await;

    assert_eq!(result.status, StepStatus::Succeeded);
    assert!(read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).is_none());
    assert!(
        read_step_receipt(&ctx.run_base(), &ctx.step_id, &AgentKey::new("test-author")).is_some(),
        "receipt written even without an envelope"
    );
}

#[tokio::test]
async fn skip_routing_plan_leaves_envelope_without_signal() {
    let dir = TempDir::new().unwrap();
    let engine = StubStepEngine::new();
    let mut plan = StubStepPlan::default();
    plan.skip_routing = true;
    engine.plan_step("author_tests", plan);

    let mut ctx = context(
        &dir,
        "author_tests",
        Some(StepRouting::Linear {
            next: Some(StepId::new("critique_tests")),
        }),
    );
    engine.run_step(&mut ctx).await;

    let envelope = read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).unwrap();
    assert!(envelope.routing_signal.is_none());
}

#[tokio::test]
async fn failing_plan_produces_failed_result_and_unverified_envelope() {
    let dir = TempDir::new().unwrap();
    let engine = StubStepEngine::new();
    let mut plan = StubStepPlan::default();
    plan.fail = true;
    engine.plan_step("author_tests", plan);

    let mut ctx = context(&dir, "author_tests", None);
    let (result, _) = engine.run_step(&mut ctx).await;

    assert_eq!(result.status, StepStatus::Failed);
    let envelope = read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).unwrap();
    assert_eq!(envelope.status, EnvelopeStatus::Unverified);
    assert_eq!(envelope.error.as_deref(), Some("stub step failure"));

    let receipt = read_step_receipt(&ctx.run_base(), &ctx.step_id, &AgentKey::new("test-author")).unwrap();
    assert_eq!(receipt.status, "failed");
}

#[tokio::test]
async fn plans_are_consumed_in_order() {
    let dir = TempDir::new().unwrap();
    let engine = StubStepEngine::new();
    engine.plan_step("critique_tests", StubStepPlan::with_status(EnvelopeStatus::Unverified));
    engine.plan_step("critique_tests", StubStepPlan::with_status(EnvelopeStatus::Verified));

    let mut ctx = context(&dir, "critique_tests", None);
    engine.run_step(&mut ctx).await;
    let first = read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).unwrap();
    assert_eq!(first.status, EnvelopeStatus::Unverified);

    engine.run_step(&mut ctx).await;
    let second = read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).unwrap();
    assert_eq!(second.status, EnvelopeStatus::Verified);

    // Queue exhausted: back to the default plan
    engine.run_step(&mut ctx).await;
    let third = read_handoff_envelope(&ctx.run_base(), &ctx.step_id, false).unwrap();
    assert_eq!(third.status, EnvelopeStatus::Verified);
}
