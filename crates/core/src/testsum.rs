// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified test summaries and stable error signatures.
//!
//! Error signatures feed stall detection: two iterations producing the same
//! signature set made no real progress, however much activity they showed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Category of a test failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Assertion,
    Exception,
    Timeout,
    Setup,
    Teardown,
    #[default]
    Unknown,
}

/// Detail for a single failing test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub failure_type: FailureType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Framework that produced the parsed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pytest,
    Junit,
    Jest,
    Playwright,
    #[default]
    Unknown,
}

/// Standardized test result view, independent of the source framework.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub duration_ms: u64,
    /// Normalized failure signatures for stall detection.
    #[serde(default)]
    pub error_signatures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_percent: Option<f64>,
    #[serde(default)]
    pub source_format: SourceFormat,
    #[serde(default)]
    pub failures: Vec<TestFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output_path: Option<PathBuf>,
}

impl TestSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.passed as f64 / self.total as f64) * 100.0
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errors > 0
    }
}

fn line_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"line \d+").unwrap_or_else(|_| unreachable!()))
}

fn path_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(/[^\s]+)+").unwrap_or_else(|_| unreachable!()))
}

fn addr_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"0x[0-9a-f]+").unwrap_or_else(|_| unreachable!()))
}

/// Compute a stable 16-hex-char signature for a test failure.
///
/// Line numbers, file paths and memory addresses are scrubbed so the same
/// logical failure hashes identically across iterations.
pub fn error_signature(test_name: &str, error_message: &str) -> String {
    let normalized_name = test_name.to_lowercase();
    let normalized_name = normalized_name.trim();

    let msg = error_message.to_lowercase();
    let msg = line_re().replace_all(msg.trim(), "line N");
    let msg = path_re().replace_all(&msg, "<path>");
    let msg = addr_re().replace_all(&msg, "0xADDR");

    let combined = format!("{normalized_name}::{msg}");
    let digest = Sha256::digest(combined.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[cfg(test)]
#[path = "testsum_tests.rs"]
mod tests;
