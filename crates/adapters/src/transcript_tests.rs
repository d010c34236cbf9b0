// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn append_and_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("llm/implement-code-implementer-stub.jsonl");

    let entries = vec![
        TranscriptEntry::message("user", "do the work"),
        TranscriptEntry {
            role: "tool_use".to_string(),
            content: "cargo test".to_string(),
            tool_name: Some("bash".to_string()),
            tool_use_id: Some("tu-1".to_string()),
            ..TranscriptEntry::default()
        },
        TranscriptEntry::message("assistant", "done"),
    ];
    append_transcript(&path, &entries).unwrap();

    // Appending again extends the file
    append_transcript(&path, &[TranscriptEntry::message("user", "finalize")]).unwrap();

    let read = read_transcript(&path);
    assert_eq!(read.len(), 4);
    assert_eq!(read[0].content, "do the work");
    assert_eq!(read[1].tool_use_id.as_deref(), Some("tu-1"));
    assert_eq!(read[3].content, "finalize");
}

#[test]
fn missing_success_flag_counts_as_success() {
    let entry = TranscriptEntry {
        role: "tool_result".to_string(),
        ..TranscriptEntry::default()
    };
    assert!(entry.succeeded());

    let failed = TranscriptEntry {
        role: "tool_result".to_string(),
        success: Some(false),
        ..TranscriptEntry::default()
    };
    assert!(!failed.succeeded());
}

#[test]
fn read_missing_transcript_is_empty() {
    let dir = TempDir::new().unwrap();
    assert!(read_transcript(&dir.path().join("nope.jsonl")).is_empty());
}

#[test]
fn malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.jsonl");
    std::fs::write(&path, "{\"role\":\"user\",\"content\":\"hi\"}\nnot json\n").unwrap();
    let read = read_transcript(&path);
    assert_eq!(read.len(), 1);
}
