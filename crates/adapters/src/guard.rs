// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-tool guard for high-trust sessions.
//!
//! Session-mode steps run with broad tool access; the guard rejects
//! destructive command patterns before they reach a shell.

use thiserror::Error;

/// A rejected tool invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("destructive command rejected (matched \"{pattern}\"): {command}")]
pub struct GuardViolation {
    pub pattern: String,
    pub command: String,
}

const DESTRUCTIVE_PATTERNS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "sudo rm",
    "git push --force",
    "git push -f",
    "git reset --hard",
    "git clean -fd",
    "> /dev/",
    ">/dev/",
    ":(){ :|:& };:",
    "mkfs",
    "dd if=",
];

/// Checks shell commands against the destructive-pattern list.
#[derive(Debug, Clone, Default)]
pub struct ToolGuard {
    extra_patterns: Vec<String>,
}

impl ToolGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add project-specific patterns on top of the built-in list.
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.extra_patterns.extend(patterns);
        self
    }

    /// Check a command string. `Err` means the command must not run.
    pub fn check_command(&self, command: &str) -> Result<(), GuardViolation> {
        let normalized = normalize(command);
        for pattern in DESTRUCTIVE_PATTERNS
            .iter()
            .copied()
            .chain(self.extra_patterns.iter().map(String::as_str))
        {
            if normalized.contains(pattern) {
                return Err(GuardViolation {
                    pattern: pattern.to_string(),
                    command: command.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Collapse whitespace runs so `rm   -rf` still matches `rm -rf`.
fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
