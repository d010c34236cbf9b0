// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn patch(id: &str, risk: Risk, confidence: Confidence) -> EvolutionPatch {
    EvolutionPatch {
        id: id.to_string(),
        target_file: "specs/build.md".to_string(),
        patch_type: PatchType::FlowSpec,
        reasoning: "tighten the loop cap".to_string(),
        confidence,
        risk,
        human_review_required: false,
        find: Some("max_iterations: 5".to_string()),
        replace: Some("max_iterations: 3".to_string()),
    }
}

fn repo_with_spec(dir: &TempDir) {
    std::fs::create_dir_all(dir.path().join("specs")).unwrap();
    std::fs::write(
        dir.path().join("specs/build.md"),
        "loop policy\nmax_iterations: 5\n",
    )
    .unwrap();
}

#[test]
fn safety_gate() {
    assert!(patch("p1", Risk::Low, Confidence::High).is_safe());
    assert!(!patch("p2", Risk::High, Confidence::High).is_safe());
    assert!(!patch("p3", Risk::Low, Confidence::Medium).is_safe());

    let mut reviewed = patch("p4", Risk::Low, Confidence::High);
    reviewed.human_review_required = true;
    assert!(!reviewed.is_safe());
}

#[test]
fn generate_reads_wisdom_artifact() {
    let dir = TempDir::new().unwrap();
    assert!(generate_evolution_patches(dir.path()).is_empty());

    let patches = vec![
        patch("p1", Risk::Low, Confidence::High),
        patch("p2", Risk::High, Confidence::Medium),
    ];
    std::fs::write(
        dir.path().join("evolution_patches.json"),
        serde_json::to_string(&patches).unwrap(),
    )
    .unwrap();

    let loaded = generate_evolution_patches(dir.path());
    assert_eq!(loaded, patches);
}

#[test]
fn generate_tolerates_malformed_artifact() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("evolution_patches.json"), "not json").unwrap();
    assert!(generate_evolution_patches(dir.path()).is_empty());
}

#[test]
fn validate_checks_target_and_find() {
    let dir = TempDir::new().unwrap();
    repo_with_spec(&dir);

    let ok = validate_evolution_patch(&patch("p1", Risk::Low, Confidence::High), dir.path());
    assert!(ok.valid, "{:?}", ok.errors);

    let mut missing_target = patch("p2", Risk::Low, Confidence::High);
    missing_target.target_file = "specs/ghost.md".to_string();
    let result = validate_evolution_patch(&missing_target, dir.path());
    assert!(!result.valid);
    assert!(result.errors[0].contains("not found"));

    let mut bad_find = patch("p3", Risk::Low, Confidence::High);
    bad_find.find = Some("nonexistent text".to_string());
    let result = validate_evolution_patch(&bad_find, dir.path());
    assert!(!result.valid);

    let mut escape = patch("p4", Risk::Low, Confidence::High);
    escape.target_file = "../outside.md".to_string();
    assert!(!validate_evolution_patch(&escape, dir.path()).valid);
}

#[test]
fn dry_run_validates_without_writing() {
    let dir = TempDir::new().unwrap();
    repo_with_spec(&dir);

    let result = apply_evolution_patch(
        &patch("p1", Risk::Low, Confidence::High),
        dir.path(),
        true,
        true,
    );
    assert!(result.success);
    assert_eq!(result.changes_made, 0);

    let content = std::fs::read_to_string(dir.path().join("specs/build.md")).unwrap();
    assert!(content.contains("max_iterations: 5"), "dry run left file alone");
}

#[test]
fn apply_rewrites_with_backup() {
    let dir = TempDir::new().unwrap();
    repo_with_spec(&dir);

    let result = apply_evolution_patch(
        &patch("p1", Risk::Low, Confidence::High),
        dir.path(),
        false,
        true,
    );
    assert!(result.success);
    assert_eq!(result.changes_made, 1);

    let content = std::fs::read_to_string(dir.path().join("specs/build.md")).unwrap();
    assert!(content.contains("max_iterations: 3"));

    let backup = result.backup_path.unwrap();
    let backup_content = std::fs::read_to_string(&backup).unwrap();
    assert!(backup_content.contains("max_iterations: 5"));
}

#[test]
fn apply_invalid_patch_fails_without_touching_disk() {
    let dir = TempDir::new().unwrap();
    repo_with_spec(&dir);

    let mut bad = patch("p1", Risk::Low, Confidence::High);
    bad.find = Some("missing".to_string());
    let result = apply_evolution_patch(&bad, dir.path(), false, true);
    assert!(!result.success);

    let content = std::fs::read_to_string(dir.path().join("specs/build.md")).unwrap();
    assert!(content.contains("max_iterations: 5"));
}

#[test]
fn suggestion_from_patch_defaults_to_suggested() {
    let p = patch("p1", Risk::Low, Confidence::High);
    let suggestion = EvolutionSuggestion::from_patch(&p, &RunId::new("run-1"));
    assert_eq!(suggestion.action_taken, "suggested");
    assert_eq!(suggestion.patch_id, "p1");
    assert_eq!(suggestion.source_run_id, Some(RunId::new("run-1")));
}
