// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw LLM transcript entries, one JSON object per line.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// One message or tool exchange in a session transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// "system" | "user" | "assistant" | "tool_use" | "tool_result"
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// Tool result success flag. Absent on some providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl TranscriptEntry {
    pub fn message(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Effective success of a tool result. A missing flag counts as success;
    /// treating silence as failure would re-run work that already happened.
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(true)
    }
}

/// Append entries to a transcript JSONL file, creating parents as needed.
pub fn append_transcript(path: &Path, entries: &[TranscriptEntry]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.flush()
}

/// Read a transcript back; malformed lines are skipped.
pub fn read_transcript(path: &Path) -> Vec<TranscriptEntry> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;
