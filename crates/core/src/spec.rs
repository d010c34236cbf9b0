// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run specifications and summaries.

use crate::id::{FlowKey, RunId};
use serde::{Deserialize, Serialize};

/// Immutable description of a run, persisted to `<run>/spec.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub flow_keys: Vec<FlowKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub backend: String,
    pub initiator: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub no_human_mid_flow: bool,
}

impl RunSpec {
    pub fn new(flow_keys: Vec<FlowKey>, backend: impl Into<String>, initiator: impl Into<String>) -> Self {
        Self {
            flow_keys,
            profile_id: None,
            backend: backend.into(),
            initiator: initiator.into(),
            params: serde_json::Map::new(),
            no_human_mid_flow: false,
        }
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of the SDLC portion of a run, independent of process status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdlcStatus {
    #[default]
    Unknown,
    Ok,
    Error,
}

/// Run metadata persisted to `<run>/meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub spec: RunSpec,
    pub status: RunStatus,
    #[serde(default)]
    pub sdlc_status: SdlcStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(id: RunId, spec: RunSpec, created_at: String) -> Self {
        Self {
            id,
            spec,
            status: RunStatus::Pending,
            sdlc_status: SdlcStatus::Unknown,
            updated_at: created_at.clone(),
            created_at,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
