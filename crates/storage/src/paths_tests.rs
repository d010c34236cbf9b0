// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[test]
fn layout_paths() {
    let root = Path::new("/runs");
    let run_id = RunId::new("abc");
    let flow = FlowKey::new("build");
    let base = flow_base(root, &run_id, &flow);

    assert_eq!(base, Path::new("/runs/abc/build"));
    assert_eq!(spec_path(root, &run_id), Path::new("/runs/abc/spec.json"));
    assert_eq!(meta_path(root, &run_id), Path::new("/runs/abc/meta.json"));
    assert_eq!(events_path(root, &run_id), Path::new("/runs/abc/events.jsonl"));
    assert_eq!(
        handoff_envelope_path(&base, &StepId::new("implement")),
        Path::new("/runs/abc/build/handoff/implement.json")
    );
    assert_eq!(
        handoff_draft_path(&base, &StepId::new("implement")),
        Path::new("/runs/abc/build/handoff/implement.draft.json")
    );
    assert_eq!(
        transcript_path(&base, &StepId::new("implement"), &AgentKey::new("code-implementer"), "claude"),
        Path::new("/runs/abc/build/llm/implement-code-implementer-claude.jsonl")
    );
    assert_eq!(
        receipt_path(&base, &StepId::new("implement"), &AgentKey::new("code-implementer")),
        Path::new("/runs/abc/build/receipts/implement-code-implementer.json")
    );
    assert_eq!(
        file_changes_path(&base, &StepId::new("implement")),
        Path::new("/runs/abc/build/forensics/file_changes_implement.json")
    );
}

#[parameterized(
    simple = { "implement-code-implementer-claude.jsonl", Some(("implement", "code-implementer", "claude")) },
    underscore_step = { "author_tests-test-author-gemini.jsonl", Some(("author_tests", "test-author", "gemini")) },
    not_jsonl = { "invalid.txt", None },
    no_parts = { "noparts.jsonl", None },
)]
fn transcript_filename_parsing(name: &str, expected: Option<(&str, &str, &str)>) {
    let parsed = parse_transcript_filename(name);
    match expected {
        Some((step, agent, engine)) => {
            let (s, a, e) = parsed.unwrap();
            assert_eq!(s, step);
            assert_eq!(a, agent);
            assert_eq!(e, engine);
        }
        None => assert!(parsed.is_none()),
    }
}

#[parameterized(
    simple = { "implement-code-implementer.json", Some(("implement", "code-implementer")) },
    underscore_step = { "author_tests-test-author.json", Some(("author_tests", "test-author")) },
    invalid = { "invalid.txt", None },
)]
fn receipt_filename_parsing(name: &str, expected: Option<(&str, &str)>) {
    let parsed = parse_receipt_filename(name);
    match expected {
        Some((step, agent)) => {
            let (s, a) = parsed.unwrap();
            assert_eq!(s, step);
            assert_eq!(a, agent);
        }
        None => assert!(parsed.is_none()),
    }
}

#[test]
fn list_transcripts_filters_by_engine() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();
    ensure_llm_dir(base).unwrap();
    for name in [
        "author_tests-test-author-claude.jsonl",
        "implement-code-implementer-gemini.jsonl",
        "notes.txt",
    ] {
        std::fs::write(base.join(LLM_DIR).join(name), "{}\n").unwrap();
    }

    assert_eq!(list_transcripts(base, None).len(), 2);
    let claude_only = list_transcripts(base, Some("claude"));
    assert_eq!(claude_only.len(), 1);
    assert!(claude_only[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("claude"));
}

#[test]
fn list_receipts_on_missing_dir_is_empty() {
    let dir = TempDir::new().unwrap();
    assert!(list_receipts(dir.path()).is_empty());
}
