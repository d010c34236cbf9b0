// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn run_sync_captures_stdout_and_exit() {
    let dir = TempDir::new().unwrap();
    let out = run_sync("echo", &["hello"], dir.path()).unwrap();
    assert!(out.success);
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout.trim(), "hello");
}

#[tokio::test]
async fn run_shell_captures_output() {
    let dir = TempDir::new().unwrap();
    let out = run_shell("echo shell-works", dir.path(), &HashMap::new(), None)
        .await
        .unwrap();
    assert!(out.success);
    assert_eq!(out.stdout.trim(), "shell-works");
}

#[tokio::test]
async fn run_shell_fails_fast_on_error() {
    let dir = TempDir::new().unwrap();
    let out = run_shell("false\necho unreachable", dir.path(), &HashMap::new(), None)
        .await
        .unwrap();
    assert!(!out.success);
    assert!(!out.stdout.contains("unreachable"));
}

#[tokio::test]
async fn run_shell_passes_env() {
    let dir = TempDir::new().unwrap();
    let mut env = HashMap::new();
    env.insert("STEP_NAME".to_string(), "implement".to_string());
    let out = run_shell("echo $STEP_NAME", dir.path(), &env, None)
        .await
        .unwrap();
    assert_eq!(out.stdout.trim(), "implement");
}

#[tokio::test]
async fn run_shell_times_out() {
    let dir = TempDir::new().unwrap();
    let err = run_shell(
        "sleep 5",
        dir.path(),
        &HashMap::new(),
        Some(Duration::from_millis(100)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SubprocessError::Timeout(_)));
}
