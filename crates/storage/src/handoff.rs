// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified handoff envelope persistence.
//!
//! All envelope writes go through [`write_handoff_envelope`]: one place for
//! path handling (draft + committed), timestamp injection, validation, and
//! atomic rewrites. Validation logs warnings by default and fails loudly when
//! `SWARM_STRICT_ENVELOPE_VALIDATION` is set.

use crate::env::strict_envelope_validation;
use crate::paths::{ensure_handoff_dir, handoff_draft_path, handoff_envelope_path};
use crate::store::write_json_atomic;
use crate::StoreError;
use std::path::Path;
use swarm_core::{utc_now_iso, HandoffEnvelope, RoutingSignal, StepId};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from handoff envelope I/O
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope validation failed: {0}")]
    Validation(String),
}

impl From<StoreError> for HandoffError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(io) => HandoffError::Io(io),
            StoreError::Json(json) => HandoffError::Json(json),
            other => HandoffError::Validation(other.to_string()),
        }
    }
}

/// Options for [`write_handoff_envelope`].
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Also write `<step_id>.draft.json`.
    pub write_draft: bool,
    /// Validate before writing.
    pub validate: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            write_draft: true,
            validate: true,
        }
    }
}

/// Structural validation of an envelope. Returns a list of problems,
/// empty when the envelope is well-formed.
pub fn validate_envelope(envelope: &HandoffEnvelope) -> Vec<String> {
    let mut errors = Vec::new();
    if envelope.step_id.is_empty() {
        errors.push("step_id must be non-empty".to_string());
    }
    if envelope.flow_key.is_empty() {
        errors.push("flow_key must be non-empty".to_string());
    }
    if envelope.run_id.is_empty() {
        errors.push("run_id must be non-empty".to_string());
    }
    if envelope.summary.len() > 4096 {
        errors.push(format!(
            "summary exceeds 4096 chars ({})",
            envelope.summary.len()
        ));
    }
    if let Some(signal) = &envelope.routing_signal {
        if !(0.0..=1.0).contains(&signal.confidence) {
            errors.push(format!(
                "routing_signal.confidence out of range: {}",
                signal.confidence
            ));
        }
    }
    errors
}

/// Persist a handoff envelope to disk. THE canonical write path.
///
/// Injects `timestamp` when absent, validates (strict mode fails, default
/// logs warnings), optionally writes the draft, then writes the committed
/// envelope at the canonical path.
pub fn write_handoff_envelope(
    run_base: &Path,
    envelope: &mut HandoffEnvelope,
    options: WriteOptions,
) -> Result<(), HandoffError> {
    ensure_handoff_dir(run_base)?;

    if envelope.timestamp.is_none() {
        envelope.timestamp = Some(utc_now_iso());
    }

    if options.validate {
        let errors = validate_envelope(envelope);
        if !errors.is_empty() {
            if strict_envelope_validation() {
                return Err(HandoffError::Validation(errors.join("; ")));
            }
            warn!(
                step_id = %envelope.step_id,
                errors = ?errors,
                "envelope validation warnings"
            );
        }
    }

    if options.write_draft {
        let draft = handoff_draft_path(run_base, &envelope.step_id);
        write_json_atomic(&draft, envelope)?;
        debug!(path = %draft.display(), "wrote draft envelope");
    }

    let committed = handoff_envelope_path(run_base, &envelope.step_id);
    write_json_atomic(&committed, envelope)?;
    debug!(path = %committed.display(), "wrote committed envelope");

    Ok(())
}

/// Read an envelope from disk, preferring the draft when requested.
pub fn read_handoff_envelope(
    run_base: &Path,
    step_id: &StepId,
    prefer_draft: bool,
) -> Option<HandoffEnvelope> {
    if prefer_draft {
        if let Some(envelope) = read_envelope_file(&handoff_draft_path(run_base, step_id)) {
            return Some(envelope);
        }
    }
    read_envelope_file(&handoff_envelope_path(run_base, step_id))
}

fn read_envelope_file(path: &Path) -> Option<HandoffEnvelope> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse envelope");
            None
        }
    }
}

/// Patch `routing_signal` into a committed envelope after the route phase.
///
/// Returns the updated envelope, or `None` when no committed envelope exists.
pub fn update_envelope_routing(
    run_base: &Path,
    step_id: &StepId,
    signal: &RoutingSignal,
) -> Option<HandoffEnvelope> {
    let committed = handoff_envelope_path(run_base, step_id);
    if !committed.exists() {
        warn!(path = %committed.display(), "cannot update routing: envelope not found");
        return None;
    }

    let mut envelope = read_envelope_file(&committed)?;
    envelope.routing_signal = Some(signal.clone());

    match write_json_atomic(&committed, &envelope) {
        Ok(()) => {
            debug!(%step_id, decision = %signal.decision, "updated envelope routing_signal");
            Some(envelope)
        }
        Err(e) => {
            warn!(%step_id, error = %e, "failed to update envelope routing");
            None
        }
    }
}

/// Envelope-first routing read: the committed envelope's `routing_signal`,
/// if present. The orchestrator falls back to the routing driver otherwise.
pub fn read_routing_from_envelope(run_base: &Path, step_id: &StepId) -> Option<RoutingSignal> {
    let envelope = read_handoff_envelope(run_base, step_id, false)?;
    envelope.routing_signal
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
