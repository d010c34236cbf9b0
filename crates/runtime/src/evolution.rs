// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evolution patches: spec improvements suggested by the Wisdom flow.
//!
//! The Wisdom flow emits candidate patches as JSON artifacts. Patches are
//! validated before anything touches disk; application is find/replace with
//! a backup, and dry-run mode validates without writing.

use serde::{Deserialize, Serialize};
use std::path::Path;
use swarm_core::RunId;
use tracing::{debug, warn};

/// What kind of spec a patch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchType {
    FlowSpec,
    StationSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }
}

/// A candidate spec change emitted by the Wisdom flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionPatch {
    pub id: String,
    /// Repo-relative path of the file to change.
    pub target_file: String,
    pub patch_type: PatchType,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: Confidence,
    pub risk: Risk,
    #[serde(default)]
    pub human_review_required: bool,
    /// Text to find in the target file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find: Option<String>,
    /// Replacement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
}

impl EvolutionPatch {
    /// Safe to auto-apply under the SAFE policy.
    pub fn is_safe(&self) -> bool {
        self.risk == Risk::Low && self.confidence == Confidence::High && !self.human_review_required
    }
}

/// Validation outcome for a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Application outcome for a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyResult {
    pub success: bool,
    pub changes_made: u32,
    pub backup_path: Option<String>,
    pub errors: Vec<String>,
}

/// Audit record for one processed patch, applied or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSuggestion {
    pub patch_id: String,
    pub target_file: String,
    pub patch_type: PatchType,
    pub reasoning: String,
    pub confidence: Confidence,
    pub risk: Risk,
    /// "suggested" | "applied" | "rejected"
    pub action_taken: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_run_id: Option<RunId>,
}

impl EvolutionSuggestion {
    pub fn from_patch(patch: &EvolutionPatch, run_id: &RunId) -> Self {
        Self {
            patch_id: patch.id.clone(),
            target_file: patch.target_file.clone(),
            patch_type: patch.patch_type,
            reasoning: patch.reasoning.clone(),
            confidence: patch.confidence,
            risk: patch.risk,
            action_taken: "suggested".to_string(),
            rejection_reason: None,
            applied_at: None,
            source_run_id: Some(run_id.clone()),
        }
    }
}

/// Read candidate patches from a Wisdom output directory.
///
/// Patches live in `evolution_patches.json` (a JSON array). A missing file
/// means no candidates; a malformed file is logged and treated as empty.
pub fn generate_evolution_patches(wisdom_dir: &Path) -> Vec<EvolutionPatch> {
    let path = wisdom_dir.join("evolution_patches.json");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        debug!(path = %path.display(), "no evolution patches artifact");
        return Vec::new();
    };
    match serde_json::from_str::<Vec<EvolutionPatch>>(&raw) {
        Ok(patches) => patches,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed evolution patches artifact");
            Vec::new()
        }
    }
}

/// Validate a patch against the working tree without modifying anything.
pub fn validate_evolution_patch(patch: &EvolutionPatch, repo_root: &Path) -> PatchValidation {
    let mut errors = Vec::new();

    if patch.id.is_empty() {
        errors.push("patch id must be non-empty".to_string());
    }
    if patch.target_file.is_empty() {
        errors.push("target_file must be non-empty".to_string());
    }
    if patch.target_file.starts_with('/') || patch.target_file.contains("..") {
        errors.push(format!("target_file must be repo-relative: {}", patch.target_file));
    }

    let target = repo_root.join(&patch.target_file);
    if !target.exists() {
        errors.push(format!("target file not found: {}", patch.target_file));
    } else if let Some(find) = &patch.find {
        match std::fs::read_to_string(&target) {
            Ok(content) if !content.contains(find.as_str()) => {
                errors.push("find text not present in target file".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("cannot read target file: {e}")),
        }
    }
    if patch.find.is_some() && patch.replace.is_none() {
        errors.push("find without replace".to_string());
    }
    if patch.find.is_none() {
        errors.push("patch has no operation".to_string());
    }

    PatchValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Apply a patch. With `dry_run` this only validates; with `create_backup`
/// the original content is saved next to the target first.
pub fn apply_evolution_patch(
    patch: &EvolutionPatch,
    repo_root: &Path,
    dry_run: bool,
    create_backup: bool,
) -> ApplyResult {
    let validation = validate_evolution_patch(patch, repo_root);
    if !validation.valid {
        return ApplyResult {
            success: false,
            errors: validation.errors,
            ..ApplyResult::default()
        };
    }
    if dry_run {
        return ApplyResult {
            success: true,
            ..ApplyResult::default()
        };
    }

    let target = repo_root.join(&patch.target_file);
    let content = match std::fs::read_to_string(&target) {
        Ok(content) => content,
        Err(e) => {
            return ApplyResult {
                success: false,
                errors: vec![format!("cannot read target file: {e}")],
                ..ApplyResult::default()
            }
        }
    };

    let (find, replace) = match (&patch.find, &patch.replace) {
        (Some(find), Some(replace)) => (find, replace),
        _ => {
            return ApplyResult {
                success: false,
                errors: vec!["patch has no operation".to_string()],
                ..ApplyResult::default()
            }
        }
    };

    let changes_made = content.matches(find.as_str()).count() as u32;
    let updated = content.replace(find.as_str(), replace);

    let mut backup_path = None;
    if create_backup {
        let backup = target.with_extension(format!("bak.{}", patch.id));
        if let Err(e) = std::fs::write(&backup, &content) {
            return ApplyResult {
                success: false,
                errors: vec![format!("failed to write backup: {e}")],
                ..ApplyResult::default()
            };
        }
        backup_path = Some(backup.to_string_lossy().into_owned());
    }

    if let Err(e) = std::fs::write(&target, updated) {
        return ApplyResult {
            success: false,
            backup_path,
            errors: vec![format!("failed to write target: {e}")],
            ..ApplyResult::default()
        };
    }

    ApplyResult {
        success: true,
        changes_made,
        backup_path,
        errors: Vec::new(),
    }
}

#[cfg(test)]
#[path = "evolution_tests.rs"]
mod tests;
