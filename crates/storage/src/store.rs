// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run store: owns the run directory layout and the per-run journals.
//!
//! A single orchestrator owns writes within a run; the store serializes
//! journal appends and fills in `seq`, `event_id` and `ts` at append time.

use crate::journal::{read_events, EventJournal, JournalError};
use crate::paths;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swarm_core::{
    utc_now_iso, FlowKey, IdGen, RunEvent, RunId, RunSpec, RunState, RunSummary, UuidIdGen,
};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur in run store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("run not found: {0}")]
    RunNotFound(RunId),
}

/// Filesystem store for runs under a single `runs_root`.
pub struct RunStore<G: IdGen = UuidIdGen> {
    runs_root: PathBuf,
    id_gen: G,
    journals: Mutex<HashMap<RunId, Arc<EventJournal>>>,
}

impl RunStore<UuidIdGen> {
    pub fn new(runs_root: impl Into<PathBuf>) -> Self {
        Self::with_id_gen(runs_root, UuidIdGen)
    }
}

impl<G: IdGen> RunStore<G> {
    pub fn with_id_gen(runs_root: impl Into<PathBuf>, id_gen: G) -> Self {
        Self {
            runs_root: runs_root.into(),
            id_gen,
            journals: Mutex::new(HashMap::new()),
        }
    }

    pub fn runs_root(&self) -> &Path {
        &self.runs_root
    }

    pub fn run_path(&self, run_id: &RunId) -> PathBuf {
        paths::run_path(&self.runs_root, run_id)
    }

    pub fn flow_base(&self, run_id: &RunId, flow_key: &FlowKey) -> PathBuf {
        paths::flow_base(&self.runs_root, run_id, flow_key)
    }

    /// Create the run directory. Idempotent.
    pub fn create_run_dir(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        let path = self.run_path(run_id);
        std::fs::create_dir_all(&path)?;
        debug!(%run_id, path = %path.display(), "run directory ready");
        Ok(path)
    }

    pub fn write_spec(&self, run_id: &RunId, spec: &RunSpec) -> Result<(), StoreError> {
        self.create_run_dir(run_id)?;
        let path = paths::spec_path(&self.runs_root, run_id);
        write_json_atomic(&path, spec)?;
        Ok(())
    }

    pub fn read_spec(&self, run_id: &RunId) -> Result<Option<RunSpec>, StoreError> {
        read_json_opt(&paths::spec_path(&self.runs_root, run_id))
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), StoreError> {
        self.create_run_dir(&summary.id)?;
        let path = paths::meta_path(&self.runs_root, &summary.id);
        write_json_atomic(&path, summary)?;
        Ok(())
    }

    pub fn read_summary(&self, run_id: &RunId) -> Result<Option<RunSummary>, StoreError> {
        read_json_opt(&paths::meta_path(&self.runs_root, run_id))
    }

    /// Read-modify-write on the run summary.
    pub fn update_summary(
        &self,
        run_id: &RunId,
        update: impl FnOnce(&mut RunSummary),
    ) -> Result<(), StoreError> {
        let mut summary = self
            .read_summary(run_id)?
            .ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        update(&mut summary);
        summary.updated_at = utc_now_iso();
        self.write_summary(&summary)
    }

    /// Append an event, filling `ts`, `event_id` and `seq` when unset.
    pub fn append_event(&self, mut event: RunEvent) -> Result<RunEvent, StoreError> {
        if event.ts.is_empty() {
            event.ts = utc_now_iso();
        }
        if event.event_id.is_empty() {
            event.event_id = self.id_gen.next();
        }
        let journal = self.journal(&event.run_id)?;
        Ok(journal.append(event)?)
    }

    pub fn get_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>, StoreError> {
        Ok(read_events(&paths::events_path(&self.runs_root, run_id))?)
    }

    /// All run ids under the root, sorted.
    pub fn list_runs(&self) -> Vec<RunId> {
        let Ok(entries) = std::fs::read_dir(&self.runs_root) else {
            return Vec::new();
        };
        let mut runs: Vec<RunId> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| RunId::new(e.file_name().to_string_lossy().into_owned()))
            .collect();
        runs.sort();
        runs
    }

    pub fn write_state(&self, state: &RunState) -> Result<(), StoreError> {
        let base = self.flow_base(&state.run_id, &state.flow_key);
        std::fs::create_dir_all(&base)?;
        write_json_atomic(&paths::state_path(&base), state)?;
        Ok(())
    }

    pub fn read_state(
        &self,
        run_id: &RunId,
        flow_key: &FlowKey,
    ) -> Result<Option<RunState>, StoreError> {
        read_json_opt(&paths::state_path(&self.flow_base(run_id, flow_key)))
    }

    fn journal(&self, run_id: &RunId) -> Result<Arc<EventJournal>, StoreError> {
        let mut journals = self.journals.lock();
        if let Some(journal) = journals.get(run_id) {
            return Ok(Arc::clone(journal));
        }
        self.create_run_dir(run_id)?;
        let journal = Arc::new(EventJournal::open(&paths::events_path(
            &self.runs_root,
            run_id,
        ))?);
        journals.insert(run_id.clone(), Arc::clone(&journal));
        Ok(journal)
    }
}

/// Write JSON via a temp file + rename so readers never see partial content.
pub(crate) fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
