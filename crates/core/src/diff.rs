// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-change records produced by the diff scanner.
//!
//! Disk state is truth; agent claims are hypotheses. These records capture
//! what actually changed between step boundaries and ride along in the
//! handoff envelope as `file_changes`.

use serde::{Deserialize, Serialize};

/// Single file change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Relative path from repo root.
    pub path: String,
    /// Status code (A=added, M=modified, D=deleted, R=renamed, ...).
    pub status: String,
    #[serde(default)]
    pub insertions: u64,
    #[serde(default)]
    pub deletions: u64,
    /// Original path for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

impl FileDiff {
    pub fn is_rename(&self) -> bool {
        self.status.starts_with('R')
    }

    /// Binary file changes carry no line counts.
    pub fn is_binary(&self) -> bool {
        self.insertions == 0 && self.deletions == 0 && self.status == "M"
    }
}

/// Complete file change scan result for a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChanges {
    #[serde(default)]
    pub files: Vec<FileDiff>,
    #[serde(default)]
    pub total_insertions: u64,
    #[serde(default)]
    pub total_deletions: u64,
    #[serde(default)]
    pub untracked: Vec<String>,
    /// Paths in the index but not committed.
    #[serde(default)]
    pub staged: Vec<String>,
    /// Error message when the scan failed. Scans never abort the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

impl FileChanges {
    pub fn has_changes(&self) -> bool {
        !self.files.is_empty() || !self.untracked.is_empty() || !self.staged.is_empty()
    }

    /// Total number of changed files (tracked + untracked).
    pub fn file_count(&self) -> usize {
        self.files.len() + self.untracked.len()
    }

    pub fn summary(&self) -> String {
        if let Some(err) = &self.scan_error {
            return format!("Scan error: {err}");
        }
        if !self.has_changes() {
            return "No changes detected".to_string();
        }
        let mut parts = Vec::new();
        if !self.files.is_empty() {
            parts.push(format!("{} files changed", self.files.len()));
        }
        if self.total_insertions > 0 {
            parts.push(format!("+{}", self.total_insertions));
        }
        if self.total_deletions > 0 {
            parts.push(format!("-{}", self.total_deletions));
        }
        if !self.untracked.is_empty() {
            parts.push(format!("{} untracked", self.untracked.len()));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
