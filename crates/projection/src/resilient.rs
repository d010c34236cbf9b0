// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient projection wrapper for API consumers.
//!
//! Queries have `_safe` variants that never raise: errors are logged,
//! counted, and answered with typed defaults. After enough consecutive
//! failures the wrapper runs a health check, recreating and rebuilding the
//! store if the file vanished.

use crate::db::{ProjectionDb, RunStats, StepRow};
use crate::tailer::RunTailer;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use swarm_core::RunId;
use thiserror::Error;
use tracing::{info, warn};

/// Consecutive `_safe` failures before a health check runs.
pub const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 3;

/// Wrapper health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Health {
    pub rebuild_count: u32,
    pub consecutive_failures: u32,
}

#[derive(Debug, Error)]
enum ResilientError {
    #[error("projection unavailable: {0}")]
    Unavailable(String),
}

/// Projection facade that favors availability over errors.
pub struct ResilientProjection {
    db: Arc<Mutex<ProjectionDb>>,
    tailer: RunTailer,
    db_path: PathBuf,
    health: Mutex<Health>,
}

impl ResilientProjection {
    /// Open the projection, rebuilding from `events.jsonl` when the store
    /// is fresh or was rotated on a version mismatch.
    pub fn open(
        db_path: impl Into<PathBuf>,
        runs_dir: impl Into<PathBuf>,
    ) -> Result<Self, crate::TailerError> {
        let db_path = db_path.into();
        let runs_dir = runs_dir.into();

        let db = Arc::new(Mutex::new(ProjectionDb::open(&db_path)?));
        let tailer = RunTailer::new(Arc::clone(&db), &runs_dir);

        let wrapper = Self {
            db,
            tailer,
            db_path,
            health: Mutex::new(Health::default()),
        };

        if wrapper.db.lock().needs_rebuild() {
            wrapper.rebuild()?;
        }

        Ok(wrapper)
    }

    pub fn tailer(&self) -> &RunTailer {
        &self.tailer
    }

    pub fn health(&self) -> Health {
        *self.health.lock()
    }

    fn rebuild(&self) -> Result<usize, crate::TailerError> {
        let ingested = self.tailer.rebuild_all()?;
        let mut health = self.health.lock();
        health.rebuild_count += 1;
        health.consecutive_failures = 0;
        info!(ingested, "projection rebuilt");
        Ok(ingested)
    }

    /// Recreate the store if the file vanished, then rebuild.
    fn health_check(&self) {
        if self.db_path.exists() {
            return;
        }
        warn!(path = %self.db_path.display(), "projection file vanished, recreating");
        match ProjectionDb::open(&self.db_path) {
            Ok(fresh) => {
                *self.db.lock() = fresh;
                if let Err(e) = self.rebuild() {
                    warn!(error = %e, "rebuild after recreate failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to recreate projection"),
        }
    }

    fn record_failure(&self, context: &str, error: &dyn std::fmt::Display) {
        warn!(%context, %error, "safe projection query failed");
        let failures = {
            let mut health = self.health.lock();
            health.consecutive_failures += 1;
            health.consecutive_failures
        };
        if failures >= CONSECUTIVE_FAILURE_THRESHOLD {
            self.health_check();
        }
    }

    fn record_success(&self) {
        self.health.lock().consecutive_failures = 0;
    }

    fn db_guard(&self) -> Result<parking_lot::MutexGuard<'_, ProjectionDb>, ResilientError> {
        if !self.db_path.exists() {
            return Err(ResilientError::Unavailable("file missing".to_string()));
        }
        Ok(self.db.lock())
    }

    /// Run stats, or `None` on any failure.
    pub fn get_run_stats_safe(&self, run_id: &RunId) -> Option<RunStats> {
        let result = self
            .db_guard()
            .map_err(|e| e.to_string())
            .and_then(|db| db.get_run_stats(run_id).map_err(|e| e.to_string()));
        match result {
            Ok(stats) => {
                self.record_success();
                stats
            }
            Err(e) => {
                self.record_failure("get_run_stats", &e);
                None
            }
        }
    }

    /// Step rows, or an empty list on any failure.
    pub fn get_step_rows_safe(&self, run_id: &RunId) -> Vec<StepRow> {
        let result = self
            .db_guard()
            .map_err(|e| e.to_string())
            .and_then(|db| db.get_step_rows(run_id).map_err(|e| e.to_string()));
        match result {
            Ok(rows) => {
                self.record_success();
                rows
            }
            Err(e) => {
                self.record_failure("get_step_rows", &e);
                Vec::new()
            }
        }
    }

    /// Event count, or 0 on any failure.
    pub fn event_count_safe(&self, run_id: &RunId) -> u64 {
        let result = self
            .db_guard()
            .map_err(|e| e.to_string())
            .and_then(|db| db.event_count(run_id).map_err(|e| e.to_string()));
        match result {
            Ok(count) => {
                self.record_success();
                count
            }
            Err(e) => {
                self.record_failure("event_count", &e);
                0
            }
        }
    }
}

#[cfg(test)]
#[path = "resilient_tests.rs"]
mod tests;
