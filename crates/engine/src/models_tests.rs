// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use swarm_core::FlowKey;

pub(crate) fn test_context(step_id: &str) -> StepContext {
    StepContext {
        repo_root: PathBuf::from("/repo"),
        runs_root: PathBuf::from("/repo/runs"),
        run_id: RunId::new("run-1"),
        flow_key: FlowKey::new("build"),
        step_id: StepId::new(step_id),
        step_index: 1,
        total_steps: 5,
        spec: RunSpec::new(vec![FlowKey::new("build")], "stepwise", "test"),
        flow_title: "Build".to_string(),
        step_role: "Implement against tests".to_string(),
        step_agents: vec![AgentKey::new("code-implementer")],
        history: Vec::new(),
        teaching_notes: None,
        routing: RoutingContext::default(),
        routing_config: None,
        engine_profile: EngineProfile::default(),
        context_pack: None,
        extra: serde_json::Map::new(),
    }
}

#[test]
fn run_base_layout() {
    let ctx = test_context("implement");
    assert_eq!(ctx.run_base(), PathBuf::from("/repo/runs/run-1/build"));
}

#[test]
fn primary_agent_falls_back() {
    let mut ctx = test_context("implement");
    assert_eq!(ctx.primary_agent(), "code-implementer");
    ctx.step_agents.clear();
    assert_eq!(ctx.primary_agent(), "agent");
}

#[test]
fn terminal_step_detection() {
    let mut ctx = test_context("commit");
    assert!(!ctx.is_terminal_step());
    ctx.routing_config = Some(StepRouting::Terminal {});
    assert!(ctx.is_terminal_step());
}

#[test]
fn step_result_constructors() {
    let ok = StepResult::succeeded(StepId::new("implement"), "done");
    assert_eq!(ok.status, StepStatus::Succeeded);
    assert!(ok.error.is_none());

    let failed = StepResult::failed(StepId::new("implement"), "boom");
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("boom"));
}

#[test]
fn truncation_note_shape() {
    let info = HistoryTruncationInfo {
        steps_included: 3,
        steps_total: 5,
        chars_used: 9000,
        budget_chars: 10000,
        truncated: true,
        priority_aware: true,
        priority_distribution: Some(
            [("CRITICAL".to_string(), 2), ("HIGH".to_string(), 1)]
                .into_iter()
                .collect(),
        ),
    };
    let note = info.truncation_note();
    assert!(note.starts_with("[CONTEXT_TRUNCATED]"));
    assert!(note.contains("3 of 5"));
    assert!(note.contains("2 omitted"));
    assert!(note.contains("CRITICAL=2"));
    assert!(note.contains("LOW=0"));

    let untruncated = HistoryTruncationInfo::default();
    assert!(untruncated.truncation_note().is_empty());
}
