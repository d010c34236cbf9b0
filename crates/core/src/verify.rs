// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step verification results (artifact existence + command checks).

use crate::envelope::EnvelopeStatus;
use crate::event::RunEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Artifact,
    Command,
}

/// Result of a single verification check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub check_type: CheckType,
    /// Artifact name or command string.
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub output: String,
}

/// Result of running all verification checks for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    #[serde(default)]
    pub artifact_checks: Vec<VerificationCheck>,
    #[serde(default)]
    pub command_checks: Vec<VerificationCheck>,
    /// Status the envelope is demoted to when verification fails.
    pub gate_status_on_fail: EnvelopeStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<RunEvent>,
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self {
            passed: true,
            artifact_checks: Vec::new(),
            command_checks: Vec::new(),
            gate_status_on_fail: EnvelopeStatus::Unverified,
            events: Vec::new(),
        }
    }
}

impl VerificationResult {
    pub fn record(&mut self, check: VerificationCheck) {
        if !check.passed {
            self.passed = false;
        }
        match check.check_type {
            CheckType::Artifact => self.artifact_checks.push(check),
            CheckType::Command => self.command_checks.push(check),
        }
    }
}
