//! Shared fixtures for behavioral specs.

use std::path::Path;
use std::sync::Arc;
use swarm_engine::StubStepEngine;
use swarm_registry::FlowRegistry;
use swarm_runtime::StepwiseOrchestrator;
use swarm_storage::RunStore;
use tempfile::TempDir;

/// Write a registry config with the canonical build flow (two microloops,
/// terminal commit) plus single-step signal and plan flows.
pub fn write_flow_config(root: &Path) {
    std::fs::write(
        root.join("flows.yaml"),
        r#"
flows:
  - key: signal
    index: 1
    title: Signal Intake
    short_title: Signal
    description: Turn raw signals into a scoped requirement
  - key: plan
    index: 2
    title: Plan
    short_title: Plan
    description: Plan the work
  - key: build
    index: 3
    title: Build
    short_title: Build
    description: Implement against authored tests
"#,
    )
    .unwrap();

    let flows = root.join("flows");
    std::fs::create_dir_all(&flows).unwrap();
    for (key, step) in [("signal", "ingest"), ("plan", "draft_plan")] {
        std::fs::write(
            flows.join(format!("{key}.yaml")),
            format!(
                r#"
steps:
  - id: {step}
    agents: [{key}-agent]
    role: Do the {key} work
    routing:
      kind: terminal
"#
            ),
        )
        .unwrap();
    }
    std::fs::write(
        flows.join("build.yaml"),
        r#"
steps:
  - id: author_tests
    agents: [test-author]
    role: Author failing tests
  - id: critique_tests
    agents: [test-critic]
    role: Critique test coverage
    routing:
      kind: microloop
      loop_target: author_tests
      loop_success_values: [VERIFIED]
      max_iterations: 3
      next: implement
  - id: implement
    agents: [code-implementer]
    role: Make the tests pass
  - id: critique_code
    agents: [code-critic]
    role: Critique the implementation
    routing:
      kind: microloop
      loop_target: implement
      loop_success_values: [VERIFIED]
      max_iterations: 3
      next: commit
  - id: commit
    agents: [committer]
    role: Commit the verified work
    routing:
      kind: terminal
"#,
    )
    .unwrap();
}

pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<StubStepEngine>,
    pub orchestrator: StepwiseOrchestrator<StubStepEngine>,
}

pub fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let config_root = dir.path().join("config");
    std::fs::create_dir_all(&config_root).unwrap();
    write_flow_config(&config_root);

    let registry = Arc::new(FlowRegistry::load_root(&config_root).unwrap());
    let store = Arc::new(RunStore::new(dir.path().join("runs")));
    let engine = Arc::new(StubStepEngine::new());
    let orchestrator = StepwiseOrchestrator::new(
        Arc::clone(&engine),
        registry,
        store,
        dir.path().to_owned(),
    );

    Harness {
        dir,
        engine,
        orchestrator,
    }
}
