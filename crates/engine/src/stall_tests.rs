// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn evidence(iteration: u32, files: usize, signatures: &[&str]) -> ProgressEvidence {
    ProgressEvidence {
        iteration,
        files_changed: files,
        insertions: files as u64 * 10,
        deletions: files as u64,
        error_signatures: signatures.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn delta_flags_activity_and_identical_signatures() {
    let prev = evidence(1, 3, &["sig-a", "sig-b"]);
    let curr = evidence(2, 2, &["sig-a", "sig-b"]);
    let delta = ProgressDelta::between(&prev, &curr);
    assert!(delta.activity);
    assert!(delta.signatures_identical);
    assert!(delta.is_stall_indicator());
}

#[test]
fn delta_with_changed_signatures_is_progress() {
    let prev = evidence(1, 3, &["sig-a", "sig-b"]);
    let curr = evidence(2, 2, &["sig-a"]);
    let delta = ProgressDelta::between(&prev, &curr);
    assert!(!delta.signatures_identical);
    assert!(!delta.is_stall_indicator());
}

#[test]
fn empty_signatures_never_indicate_stall() {
    // No failures at all means the loop is converging, not stalling
    let prev = evidence(1, 3, &[]);
    let curr = evidence(2, 2, &[]);
    assert!(!ProgressDelta::between(&prev, &curr).is_stall_indicator());
}

#[test]
fn no_activity_is_not_a_stall_indicator() {
    let prev = evidence(1, 3, &["sig-a"]);
    let curr = evidence(2, 0, &["sig-a"]);
    let delta = ProgressDelta::between(&prev, &curr);
    assert!(!delta.activity);
    assert!(!delta.is_stall_indicator());
}

#[test]
fn detect_stall_needs_enough_iterations() {
    let analysis = detect_stall(&[evidence(1, 2, &["sig-a"])], DEFAULT_STALL_ITERATIONS);
    assert!(!analysis.stalled);
    assert_eq!(analysis.reason, "insufficient iterations");
}

#[test]
fn two_identical_failing_iterations_stall_at_default_threshold() {
    let history = vec![
        evidence(1, 2, &["sig-a", "sig-b"]),
        evidence(2, 3, &["sig-a", "sig-b"]),
    ];
    let analysis = detect_stall(&history, DEFAULT_STALL_ITERATIONS);
    assert!(analysis.stalled);
    assert!(analysis.reason.contains("2 iterations"));
}

#[test]
fn progress_on_latest_iteration_resets_stall() {
    let history = vec![
        evidence(1, 2, &["sig-a"]),
        evidence(2, 2, &["sig-a"]),
        evidence(3, 2, &["sig-c"]),
    ];
    let analysis = detect_stall(&history, DEFAULT_STALL_ITERATIONS);
    assert!(!analysis.stalled);
    assert_eq!(analysis.reason, "progress observed");
}

#[test]
fn higher_threshold_requires_longer_stall() {
    let history = vec![
        evidence(1, 2, &["sig-a"]),
        evidence(2, 2, &["sig-a"]),
        evidence(3, 2, &["sig-a"]),
    ];
    assert!(detect_stall(&history, 3).stalled);
    assert!(!detect_stall(&history[1..], 3).stalled);
}

#[test]
fn evidence_from_scan_normalizes_signatures() {
    let tests = TestSummary {
        total: 3,
        failed: 2,
        error_signatures: vec!["b".to_string(), "a".to_string(), "b".to_string()],
        ..TestSummary::default()
    };
    let changes = FileChanges {
        total_insertions: 5,
        ..FileChanges::default()
    };
    let ev = ProgressEvidence::from_scan(2, Some(&changes), Some(&tests));
    assert_eq!(ev.error_signatures, ["a", "b"]);
    assert!(ev.has_activity());
}

#[test]
fn stall_signal_carries_injection_route() {
    let plain = create_stall_routing_signal(None);
    assert_eq!(plain.reason, "stall_detected");
    assert!(plain.needs_human);
    assert!(plain.route.is_none());
    assert_eq!(plain.routing_source.as_deref(), Some("stall_detector"));

    let inject = create_stall_routing_signal(Some(&FlowKey::new("reset")));
    assert_eq!(inject.route.as_deref(), Some("reset"));
}
