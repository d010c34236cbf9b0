//! Tailer crash-safety and projection rebuild scenarios.

use crate::prelude::harness;
use std::io::Write as _;
use std::sync::Arc;
use parking_lot::Mutex;
use swarm_core::{EventKind, FlowKey, RunEvent, RunId, RunSpec};
use swarm_projection::{ProjectionDb, ResilientProjection, RunTailer};

#[test]
fn tailer_stops_at_partial_line_and_resumes() {
    let dir = tempfile::TempDir::new().unwrap();
    let runs_dir = dir.path().join("runs");
    std::fs::create_dir_all(runs_dir.join("run-1")).unwrap();
    let events_path = runs_dir.join("run-1/events.jsonl");

    // Nine complete events, then a tenth cut off mid-write
    let mut file = std::fs::File::create(&events_path).unwrap();
    for seq in 1..=9u64 {
        writeln!(
            file,
            r#"{{"run_id":"run-1","ts":"t","seq":{seq},"event_id":"ev-{seq}","kind":"log","flow_key":"build"}}"#
        )
        .unwrap();
    }
    write!(
        file,
        r#"{{"run_id":"run-1","ts":"t","seq":10,"event_id":"ev-10","kind":"log","flow_key":"build""#
    )
    .unwrap();
    file.flush().unwrap();

    let db = Arc::new(Mutex::new(
        ProjectionDb::open(&dir.path().join("projection.db")).unwrap(),
    ));
    let tailer = RunTailer::new(Arc::clone(&db), &runs_dir);
    let run_id = RunId::new("run-1");

    // Events 1-9 ingest; the offset stays at the start of the partial line
    assert_eq!(tailer.tail_run(&run_id).unwrap(), 9);
    assert_eq!(db.lock().event_count(&run_id).unwrap(), 9);

    // Completing the line makes exactly the 10th event visible
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&events_path)
        .unwrap();
    file.write_all(b"}\n").unwrap();
    file.flush().unwrap();

    assert_eq!(tailer.tail_run(&run_id).unwrap(), 1);
    assert_eq!(db.lock().event_count(&run_id).unwrap(), 10);
}

#[test]
fn tailer_is_idempotent_over_static_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let runs_dir = dir.path().join("runs");
    let store = swarm_storage::RunStore::new(&runs_dir);
    let run_id = RunId::new("run-1");
    for kind in [EventKind::RunCreated, EventKind::RunStarted, EventKind::RunCompleted] {
        store
            .append_event(RunEvent::new(run_id.clone(), kind, "build"))
            .unwrap();
    }

    let db = Arc::new(Mutex::new(
        ProjectionDb::open(&dir.path().join("projection.db")).unwrap(),
    ));
    let tailer = RunTailer::new(Arc::clone(&db), &runs_dir);

    assert_eq!(tailer.tail_run(&run_id).unwrap(), 3);
    for _ in 0..3 {
        assert_eq!(tailer.tail_run(&run_id).unwrap(), 0);
    }
    // Even after a forced offset reset, event_id dedupe holds
    db.lock().set_ingestion_offset(&run_id, 0, 0).unwrap();
    assert_eq!(tailer.tail_run(&run_id).unwrap(), 0);
    assert_eq!(db.lock().event_count(&run_id).unwrap(), 3);
}

#[tokio::test]
async fn projection_of_a_real_run_matches_rebuild() {
    let hx = harness();
    let spec = RunSpec::new(vec![FlowKey::new("build")], "stepwise", "specs");
    let run_id = RunId::new("run-projected");
    hx.orchestrator
        .run_flow(&FlowKey::new("build"), &spec, &run_id, None, None)
        .await
        .unwrap();

    let runs_dir = hx.dir.path().join("runs");
    let projection =
        ResilientProjection::open(hx.dir.path().join("projection.db"), &runs_dir).unwrap();

    let steps = projection.get_step_rows_safe(&run_id);
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.status == "VERIFIED"));

    // Rebuilding from events.jsonl twice yields identical projections
    projection.tailer().rebuild_all().unwrap();
    let first = projection.get_step_rows_safe(&run_id);
    projection.tailer().rebuild_all().unwrap();
    let second = projection.get_step_rows_safe(&run_id);
    assert_eq!(first, second);
}

#[tokio::test]
async fn watch_run_stops_after_terminal_event() {
    let dir = tempfile::TempDir::new().unwrap();
    let runs_dir = dir.path().join("runs");
    let store = swarm_storage::RunStore::new(&runs_dir);
    let run_id = RunId::new("run-1");
    for kind in [EventKind::RunCreated, EventKind::RunStarted] {
        store
            .append_event(RunEvent::new(run_id.clone(), kind, "build"))
            .unwrap();
    }
    store
        .append_event(
            RunEvent::new(run_id.clone(), EventKind::RunCompleted, "build")
                .with_payload(serde_json::json!({"status": "succeeded"})),
        )
        .unwrap();

    let db = Arc::new(Mutex::new(
        ProjectionDb::open(&dir.path().join("projection.db")).unwrap(),
    ));
    let tailer = RunTailer::new(db, &runs_dir);

    let total = tailer
        .watch_run(&run_id, std::time::Duration::from_millis(10), true, |_| {})
        .await;
    assert_eq!(total, 3);
}
