// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    run_created = { EventKind::RunCreated, "run_created" },
    step_start = { EventKind::StepStart, "step_start" },
    step_error = { EventKind::StepError, "step_error" },
    tool_end = { EventKind::ToolEnd, "tool_end" },
    autopilot_paused = { EventKind::AutopilotPaused, "autopilot_paused" },
    evolution_applied = { EventKind::EvolutionApplied, "evolution_applied" },
)]
fn kind_round_trips_through_str(kind: EventKind, s: &str) {
    assert_eq!(kind.as_str(), s);
    assert_eq!(EventKind::parse(s), kind);
}

#[test]
fn unknown_kind_is_preserved() {
    let kind = EventKind::parse("detour_started");
    assert_eq!(kind, EventKind::Other("detour_started".to_string()));
    assert_eq!(kind.as_str(), "detour_started");
}

#[parameterized(
    step_error = { "step_error", "step_end" },
    step_complete = { "step_complete", "step_end" },
    run_complete = { "run_complete", "run_completed" },
    canonical_passthrough = { "tool_start", "tool_start" },
    unknown_passthrough = { "detour_started", "detour_started" },
)]
fn normalize_kind_table(input: &str, expected: &str) {
    assert_eq!(normalize_kind(input), expected);
}

#[test]
fn event_serializes_kind_as_string() {
    let event = RunEvent::new("run-1", EventKind::StepStart, "build")
        .with_step("implement")
        .with_agent("code-implementer");
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "step_start");
    assert_eq!(json["step_id"], "implement");
    assert_eq!(json["agent_key"], "code-implementer");
    // Null payload is omitted entirely
    assert!(json.get("payload").is_none());
}

#[test]
fn event_round_trip_preserves_fields() {
    let mut event = RunEvent::new("run-1", EventKind::ToolStart, "build")
        .with_step("implement")
        .with_payload(serde_json::json!({"tool_use_id": "tu-9", "tool": "bash"}));
    event.seq = 7;
    event.event_id = "ev-7".to_string();
    event.ts = "2026-01-01T00:00:00.000Z".to_string();

    let line = serde_json::to_string(&event).unwrap();
    let back: RunEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(back, event);
    assert_eq!(back.tool_use_id(), Some("tu-9"));
}

#[test]
fn event_with_unknown_kind_round_trips() {
    let line = r#"{"run_id":"r","ts":"t","seq":1,"event_id":"e","kind":"detour_started","flow_key":"build"}"#;
    let event: RunEvent = serde_json::from_str(line).unwrap();
    assert_eq!(event.kind.as_str(), "detour_started");
    let back = serde_json::to_value(&event).unwrap();
    assert_eq!(back["kind"], "detour_started");
}

#[test]
fn empty_kind_is_rejected() {
    let line = r#"{"run_id":"r","kind":""}"#;
    assert!(serde_json::from_str::<RunEvent>(line).is_err());
}

#[test]
fn terminal_kinds() {
    assert!(EventKind::RunCompleted.is_run_terminal());
    assert!(EventKind::RunCanceled.is_run_terminal());
    assert!(!EventKind::StepEnd.is_run_terminal());
}

#[test]
fn log_summary_includes_identifiers() {
    let event = RunEvent::new("run-1", EventKind::StepEnd, "build").with_step("commit");
    assert_eq!(event.log_summary(), "step_end run=run-1 flow=build step=commit");
}
