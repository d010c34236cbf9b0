// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git-based file change detection for forensic step analysis.
//!
//! Tool telemetry misses bash scripts, formatters and generators; a post-step
//! git scan captures everything that actually changed. Scan failures surface
//! through `scan_error` and never abort the step.

use crate::subprocess::run_sync;
use std::collections::HashMap;
use std::path::Path;
use swarm_core::{FileChanges, FileDiff};

/// Synchronously scan a repository for changes since `HEAD`.
///
/// Captures unstaged changes, staged changes and (optionally) untracked
/// files. Line counts come from `diff HEAD --numstat`, the file list from
/// `status --porcelain -uall`.
pub fn scan_file_changes_sync(
    repo_root: &Path,
    include_untracked: bool,
    include_staged: bool,
) -> FileChanges {
    let mut result = FileChanges::default();

    match run_sync("git", &["rev-parse", "--git-dir"], repo_root) {
        Ok(out) if out.success => {}
        Ok(out) => {
            result.scan_error = Some(format!("Not a git repository: {}", out.stderr.trim()));
            return result;
        }
        Err(e) => {
            result.scan_error = Some(format!("Git not available: {e}"));
            return result;
        }
    }

    // numstat over both staged and unstaged changes; empty repos have no HEAD
    let numstat = run_sync(
        "git",
        &["diff", "HEAD", "--numstat", "--find-renames"],
        repo_root,
    )
    .ok()
    .filter(|out| out.success)
    .or_else(|| {
        run_sync("git", &["diff", "--numstat", "--find-renames"], repo_root)
            .ok()
            .filter(|out| out.success)
    });

    let mut numstat_map: HashMap<String, (u64, u64)> = HashMap::new();
    if let Some(out) = numstat {
        for line in out.stdout.lines() {
            if let Some((ins, dels, path)) = parse_numstat_line(line) {
                numstat_map.insert(path, (ins, dels));
            }
        }
    }

    let status = match run_sync("git", &["status", "--porcelain", "-uall"], repo_root) {
        Ok(out) if out.success => out,
        Ok(out) => {
            result.scan_error = Some(format!("Failed to get git status: {}", out.stderr.trim()));
            return result;
        }
        Err(e) => {
            result.scan_error = Some(format!("Failed to get git status: {e}"));
            return result;
        }
    };

    for line in status.stdout.lines() {
        let Some((status_code, path, old_path)) = parse_status_line(line) else {
            continue;
        };

        if status_code == "??" {
            if include_untracked {
                result.untracked.push(path);
            }
            continue;
        }

        // Index column non-space and non-? means the path is staged
        let index_status = status_code.chars().next().unwrap_or(' ');
        if include_staged && index_status != ' ' && index_status != '?' {
            result.staged.push(path.clone());
        }

        let (insertions, deletions) = numstat_map.get(&path).copied().unwrap_or((0, 0));
        result.total_insertions += insertions;
        result.total_deletions += deletions;

        let simplified = status_code
            .chars()
            .find(|c| *c != ' ')
            .map(|c| c.to_string())
            .unwrap_or_else(|| "M".to_string());

        result.files.push(FileDiff {
            path,
            status: simplified,
            insertions,
            deletions,
            old_path,
        });
    }

    result
}

/// Async scan; runs the git commands on a blocking thread.
pub async fn scan_file_changes(
    repo_root: &Path,
    include_untracked: bool,
    include_staged: bool,
) -> FileChanges {
    let root = repo_root.to_owned();
    tokio::task::spawn_blocking(move || {
        scan_file_changes_sync(&root, include_untracked, include_staged)
    })
    .await
    .unwrap_or_else(|e| FileChanges {
        scan_error: Some(format!("Diff scan task failed: {e}")),
        ..FileChanges::default()
    })
}

/// Parse `<insertions>\t<deletions>\t<path>`. Binary files show `-\t-\t<path>`.
fn parse_numstat_line(line: &str) -> Option<(u64, u64, String)> {
    let mut parts = line.splitn(3, '\t');
    let ins_str = parts.next()?;
    let del_str = parts.next()?;
    let path = parts.next()?;

    if ins_str == "-" || del_str == "-" {
        return Some((0, 0, path.to_string()));
    }

    let ins = ins_str.parse().ok()?;
    let dels = del_str.parse().ok()?;
    Some((ins, dels, path.to_string()))
}

/// Parse a `status --porcelain` line: `XY path` or `XY old -> new`.
fn parse_status_line(line: &str) -> Option<(String, String, Option<String>)> {
    if line.len() < 3 {
        return None;
    }

    let status = &line[..2];
    let rest = if line.as_bytes().get(2) == Some(&b' ') {
        &line[3..]
    } else {
        line[2..].trim_start_matches(' ')
    };

    if rest.is_empty() {
        return None;
    }

    let status = status.trim().to_string();

    if let Some((old, new)) = rest.split_once(" -> ") {
        return Some((status, new.to_string(), Some(old.to_string())));
    }

    Some((status, rest.to_string(), None))
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
