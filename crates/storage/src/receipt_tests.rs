// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn receipt() -> StepReceipt {
    let mut receipt = StepReceipt::new(
        "session",
        "stub",
        "session",
        "anthropic",
        StepId::new("implement"),
        FlowKey::new("build"),
        RunId::new("run-1"),
        AgentKey::new("code-implementer"),
    );
    receipt.started_at = "2026-01-01T00:00:00.000Z".to_string();
    receipt.completed_at = "2026-01-01T00:00:05.000Z".to_string();
    receipt.duration_ms = 5000;
    receipt.tokens = TokenCounts {
        prompt: 1200,
        completion: 300,
        total: 1500,
    };
    receipt
}

#[test]
fn write_then_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let mut r = receipt();
    r.transcript_path = Some("llm/implement-code-implementer-stub.jsonl".to_string());
    r.extra.insert(
        "prompt_hash".to_string(),
        serde_json::json!("deadbeefdeadbeef"),
    );

    let path = write_step_receipt(dir.path(), &r).unwrap();
    assert_eq!(
        path,
        dir.path().join("receipts/implement-code-implementer.json")
    );

    let loaded = read_step_receipt(
        dir.path(),
        &StepId::new("implement"),
        &AgentKey::new("code-implementer"),
    )
    .unwrap();
    assert_eq!(loaded, r);
    assert_eq!(loaded.extra["prompt_hash"], "deadbeefdeadbeef");
}

#[test]
fn fallback_fields_only_serialized_when_set() {
    let r = receipt();
    let json = serde_json::to_value(&r).unwrap();
    assert!(json.get("fallback_reason").is_none());
    assert!(json.get("execution_mode_requested").is_none());

    let mut with_fallback = receipt();
    with_fallback.execution_mode_requested = Some("session".to_string());
    with_fallback.execution_mode_effective = Some("legacy".to_string());
    with_fallback.fallback_reason = Some("session adapter unavailable".to_string());
    let json = serde_json::to_value(&with_fallback).unwrap();
    assert_eq!(json["fallback_reason"], "session adapter unavailable");
}

#[test]
fn missing_receipt_reads_none() {
    let dir = TempDir::new().unwrap();
    assert!(read_step_receipt(
        dir.path(),
        &StepId::new("nope"),
        &AgentKey::new("ghost")
    )
    .is_none());
}

#[test]
fn model_defaults_to_unknown() {
    let json = r#"{
        "engine": "session", "mode": "stub", "execution_mode": "session",
        "provider": "anthropic", "step_id": "s", "flow_key": "f", "run_id": "r",
        "agent_key": "a", "started_at": "t", "completed_at": "t",
        "duration_ms": 0, "status": "succeeded"
    }"#;
    let receipt: StepReceipt = serde_json::from_str(json).unwrap();
    assert_eq!(receipt.model, "unknown");
}
