//! Autopilot pause/resume and evolution-policy scenarios.

use crate::prelude::{harness, write_flow_config};
use std::sync::Arc;
use swarm_core::FlowKey;
use swarm_engine::StubStepEngine;
use swarm_registry::FlowRegistry;
use swarm_runtime::{
    AutopilotConfig, AutopilotController, AutopilotStatus, Confidence, EvolutionApplyPolicy,
    EvolutionBoundary, EvolutionPatch, PatchType, Risk, StepwiseOrchestrator,
};
use swarm_storage::RunStore;
use tempfile::TempDir;

fn controller_with_wisdom() -> (TempDir, AutopilotController<StubStepEngine>) {
    let dir = TempDir::new().unwrap();
    let config_root = dir.path().join("config");
    std::fs::create_dir_all(&config_root).unwrap();
    write_flow_config(&config_root);

    // Add a wisdom flow for evolution scenarios
    let mut flows = std::fs::read_to_string(config_root.join("flows.yaml")).unwrap();
    flows.push_str(
        r#"  - key: wisdom
    index: 4
    title: Wisdom
    short_title: Wisdom
    description: Post-run learning
"#,
    );
    std::fs::write(config_root.join("flows.yaml"), flows).unwrap();
    std::fs::write(
        config_root.join("flows/wisdom.yaml"),
        r#"
steps:
  - id: distill
    agents: [wisdom-agent]
    role: Distill lessons from the run
    routing:
      kind: terminal
"#,
    )
    .unwrap();

    let registry = Arc::new(FlowRegistry::load_root(&config_root).unwrap());
    let store = Arc::new(RunStore::new(dir.path().join("runs")));
    let engine = Arc::new(StubStepEngine::new());
    let orchestrator =
        StepwiseOrchestrator::new(engine, registry, store, dir.path().to_owned());
    let controller = AutopilotController::new(orchestrator, dir.path().to_owned());
    (dir, controller)
}

#[tokio::test]
async fn pause_then_resume_across_flow_boundary() {
    let hx = harness();
    let controller = AutopilotController::new(hx.orchestrator, hx.dir.path().to_owned());

    let run_id = controller
        .start(
            None,
            Some(vec![FlowKey::new("signal"), FlowKey::new("plan")]),
            AutopilotConfig::default(),
        )
        .unwrap();

    // signal completes, then a pause request lands
    assert!(controller.tick(&run_id).await);
    assert!(controller.pause(&run_id));

    // Next tick transitions PAUSING -> PAUSED
    assert!(!controller.tick(&run_id).await);
    assert_eq!(controller.status(&run_id), Some(AutopilotStatus::Paused));

    assert!(controller.resume(&run_id));
    let result = controller.run_to_completion(&run_id).await;
    assert_eq!(result.status, AutopilotStatus::Succeeded);
    let completed: Vec<&str> = result.flows_completed.iter().map(|f| f.as_str()).collect();
    assert_eq!(completed, ["signal", "plan"]);

    // autopilot_paused and autopilot_resumed appear in order
    let events = controller.orchestrator().store().get_events(&run_id).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    let paused = kinds.iter().position(|k| *k == "autopilot_paused").unwrap();
    let resumed = kinds.iter().position(|k| *k == "autopilot_resumed").unwrap();
    assert!(paused < resumed);
}

fn patch(id: &str, risk: Risk, confidence: Confidence) -> EvolutionPatch {
    EvolutionPatch {
        id: id.to_string(),
        target_file: "specs/build.md".to_string(),
        patch_type: PatchType::FlowSpec,
        reasoning: "tighten iteration budget".to_string(),
        confidence,
        risk,
        human_review_required: false,
        find: Some("max_iterations: 5".to_string()),
        replace: Some("max_iterations: 3".to_string()),
    }
}

#[tokio::test]
async fn evolution_policy_safe_applies_one_suggests_other() {
    let (dir, controller) = controller_with_wisdom();
    std::fs::create_dir_all(dir.path().join("specs")).unwrap();
    std::fs::write(dir.path().join("specs/build.md"), "max_iterations: 5\n").unwrap();

    let run_id = controller
        .start(
            None,
            Some(vec![FlowKey::new("wisdom")]),
            AutopilotConfig {
                evolution_apply_policy: EvolutionApplyPolicy::AutoApplySafe,
                evolution_boundary: EvolutionBoundary::RunEnd,
            },
        )
        .unwrap();

    // Wisdom emits one safe and one risky candidate patch
    let wisdom_dir = controller
        .orchestrator()
        .store()
        .run_path(&run_id)
        .join("wisdom");
    std::fs::create_dir_all(&wisdom_dir).unwrap();
    // The risky patch finds text the safe patch leaves untouched
    let mut risky = patch("risky-1", Risk::High, Confidence::Medium);
    risky.find = Some("max_iterations".to_string());
    risky.replace = Some("loop_budget".to_string());
    std::fs::write(
        wisdom_dir.join("evolution_patches.json"),
        serde_json::to_string(&[patch("safe-1", Risk::Low, Confidence::High), risky]).unwrap(),
    )
    .unwrap();

    let result = controller.run_to_completion(&run_id).await;
    assert_eq!(result.status, AutopilotStatus::Succeeded);

    let apply = result.wisdom_apply_result.unwrap();
    assert_eq!(apply.patches_applied, 1);
    assert_eq!(apply.patches_suggested, 1);
    assert_eq!(apply.applied_patch_ids, ["safe-1"]);

    // evolution_summary.json lists both with matching action_taken
    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(wisdom_dir.join("evolution_summary.json")).unwrap(),
    )
    .unwrap();
    let by_id: Vec<(&str, &str)> = summary["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["patch_id"].as_str().unwrap(),
                s["action_taken"].as_str().unwrap(),
            )
        })
        .collect();
    assert!(by_id.contains(&("safe-1", "applied")));
    assert!(by_id.contains(&("risky-1", "suggested")));

    // Events agree
    let events = controller.orchestrator().store().get_events(&run_id).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert!(kinds.contains(&"evolution_applied"));
    assert!(kinds.contains(&"evolution_suggested"));
}
