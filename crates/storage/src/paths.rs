// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical on-disk layout for runs, envelopes, receipts and transcripts.
//!
//! Per-run base: `<runs_root>/<run_id>/`, flow base: `<run>/<flow_key>/`.
//! Step ids use `_` only and agent keys may use `-`, so transcript names
//! (`<step>-<agent>-<engine>.jsonl`) parse unambiguously: the step id ends at
//! the first hyphen and the engine is the final hyphen-delimited token.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use swarm_core::{AgentKey, FlowKey, RunId, StepId};

pub const LLM_DIR: &str = "llm";
pub const RECEIPTS_DIR: &str = "receipts";
pub const HANDOFF_DIR: &str = "handoff";
pub const FORENSICS_DIR: &str = "forensics";

pub const SPEC_FILE: &str = "spec.json";
pub const META_FILE: &str = "meta.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const STATE_FILE: &str = "state.json";

pub fn run_path(runs_root: &Path, run_id: &RunId) -> PathBuf {
    runs_root.join(run_id.as_str())
}

pub fn flow_base(runs_root: &Path, run_id: &RunId, flow_key: &FlowKey) -> PathBuf {
    run_path(runs_root, run_id).join(flow_key.as_str())
}

pub fn spec_path(runs_root: &Path, run_id: &RunId) -> PathBuf {
    run_path(runs_root, run_id).join(SPEC_FILE)
}

pub fn meta_path(runs_root: &Path, run_id: &RunId) -> PathBuf {
    run_path(runs_root, run_id).join(META_FILE)
}

pub fn events_path(runs_root: &Path, run_id: &RunId) -> PathBuf {
    run_path(runs_root, run_id).join(EVENTS_FILE)
}

pub fn state_path(run_base: &Path) -> PathBuf {
    run_base.join(STATE_FILE)
}

/// Committed envelope: `<flow>/handoff/<step_id>.json`.
pub fn handoff_envelope_path(run_base: &Path, step_id: &StepId) -> PathBuf {
    run_base.join(HANDOFF_DIR).join(format!("{step_id}.json"))
}

/// Working draft envelope: `<flow>/handoff/<step_id>.draft.json`.
pub fn handoff_draft_path(run_base: &Path, step_id: &StepId) -> PathBuf {
    run_base
        .join(HANDOFF_DIR)
        .join(format!("{step_id}.draft.json"))
}

/// Raw LLM transcript: `<flow>/llm/<step_id>-<agent_key>-<engine>.jsonl`.
pub fn transcript_path(run_base: &Path, step_id: &StepId, agent_key: &AgentKey, engine: &str) -> PathBuf {
    run_base
        .join(LLM_DIR)
        .join(format!("{step_id}-{agent_key}-{engine}.jsonl"))
}

/// Step receipt: `<flow>/receipts/<step_id>-<agent_key>.json`.
pub fn receipt_path(run_base: &Path, step_id: &StepId, agent_key: &AgentKey) -> PathBuf {
    run_base
        .join(RECEIPTS_DIR)
        .join(format!("{step_id}-{agent_key}.json"))
}

/// Out-of-line diff store: `<flow>/forensics/file_changes_<step_id>.json`.
pub fn file_changes_path(run_base: &Path, step_id: &StepId) -> PathBuf {
    run_base
        .join(FORENSICS_DIR)
        .join(format!("file_changes_{step_id}.json"))
}

pub fn ensure_dir(path: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(path)?;
    Ok(path.to_owned())
}

pub fn ensure_handoff_dir(run_base: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(&run_base.join(HANDOFF_DIR))
}

pub fn ensure_llm_dir(run_base: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(&run_base.join(LLM_DIR))
}

pub fn ensure_receipts_dir(run_base: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(&run_base.join(RECEIPTS_DIR))
}

pub fn ensure_forensics_dir(run_base: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(&run_base.join(FORENSICS_DIR))
}

fn transcript_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^([a-zA-Z0-9_]+)-(.+)-([a-zA-Z0-9]+)\.jsonl$")
            .unwrap_or_else(|_| unreachable!())
    })
}

fn receipt_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^([a-zA-Z0-9_]+)-(.+)\.json$").unwrap_or_else(|_| unreachable!())
    })
}

/// Parse `<step_id>-<agent_key>-<engine>.jsonl` into its parts.
pub fn parse_transcript_filename(filename: &str) -> Option<(StepId, AgentKey, String)> {
    let caps = transcript_re().captures(filename)?;
    let step_id = caps.get(1)?.as_str();
    let agent_key = caps.get(2)?.as_str();
    let engine = caps.get(3)?.as_str();
    if step_id.is_empty() || agent_key.is_empty() || engine.is_empty() {
        return None;
    }
    Some((StepId::new(step_id), AgentKey::new(agent_key), engine.to_string()))
}

/// Parse `<step_id>-<agent_key>.json` into its parts.
pub fn parse_receipt_filename(filename: &str) -> Option<(StepId, AgentKey)> {
    let caps = receipt_re().captures(filename)?;
    let step_id = caps.get(1)?.as_str();
    let agent_key = caps.get(2)?.as_str();
    if step_id.is_empty() || agent_key.is_empty() {
        return None;
    }
    Some((StepId::new(step_id), AgentKey::new(agent_key)))
}

/// List transcript files, optionally filtered by engine, sorted by name.
pub fn list_transcripts(run_base: &Path, engine: Option<&str>) -> Vec<PathBuf> {
    let llm_dir = run_base.join(LLM_DIR);
    let Ok(entries) = std::fs::read_dir(&llm_dir) else {
        return Vec::new();
    };
    let mut transcripts: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".jsonl") {
                return None;
            }
            if let Some(engine) = engine {
                let (_, _, parsed_engine) = parse_transcript_filename(&name)?;
                if parsed_engine != engine {
                    return None;
                }
            }
            Some(e.path())
        })
        .collect();
    transcripts.sort();
    transcripts
}

/// List receipt files, sorted by name.
pub fn list_receipts(run_base: &Path) -> Vec<PathBuf> {
    let receipts_dir = run_base.join(RECEIPTS_DIR);
    let Ok(entries) = std::fs::read_dir(&receipts_dir) else {
        return Vec::new();
    };
    let mut receipts: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
        .map(|e| e.path())
        .collect();
    receipts.sort();
    receipts
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
