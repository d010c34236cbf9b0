// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental, crash-safe ingestion of `events.jsonl` into the projection.
//!
//! Disk is the source of truth; the projection is a derived view. Offsets
//! only advance after a successful ingest, so a crash mid-ingest re-reads
//! and re-ingests idempotently from the same position. A trailing line
//! without `\n` is a partial write: the tailer stops before it and does not
//! advance past it.

use crate::db::{ProjectionDb, ProjectionError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swarm_core::{RunEvent, RunId};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from event tailing
#[derive(Debug, Error)]
pub enum TailerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ingestion failed for {run_id}: {source}")]
    Ingest {
        run_id: RunId,
        #[source]
        source: ProjectionError,
    },
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
}

/// Tails per-run journals into the projection.
pub struct RunTailer {
    db: Arc<Mutex<ProjectionDb>>,
    runs_dir: PathBuf,
}

impl RunTailer {
    pub fn new(db: Arc<Mutex<ProjectionDb>>, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            runs_dir: runs_dir.into(),
        }
    }

    pub fn db(&self) -> Arc<Mutex<ProjectionDb>> {
        Arc::clone(&self.db)
    }

    /// Tail one run's journal from the last stored offset.
    ///
    /// Returns the number of newly ingested events. On ingest failure the
    /// offset is left unchanged and the error is raised.
    pub fn tail_run(&self, run_id: &RunId) -> Result<usize, TailerError> {
        let events_file = self.runs_dir.join(run_id.as_str()).join("events.jsonl");
        if !events_file.exists() {
            return Ok(0);
        }

        let (last_offset, last_seq) = self.db.lock().get_ingestion_offset(run_id)?;

        let file_size = std::fs::metadata(&events_file)?.len();
        if file_size <= last_offset {
            return Ok(0);
        }

        let mut reader = BufReader::new(std::fs::File::open(&events_file)?);
        reader.seek(SeekFrom::Start(last_offset))?;

        let mut new_events: Vec<RunEvent> = Vec::new();
        let mut new_offset = last_offset;
        let mut max_seq = last_seq;
        let mut buf: Vec<u8> = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf)?;
            if bytes_read == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                // Partial line mid-write: stop here, do not advance past it
                debug!(%run_id, len = buf.len(), "stopping at partial line");
                break;
            }

            new_offset += bytes_read as u64;
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(line) {
                Ok(event) => {
                    max_seq = max_seq.max(event.seq);
                    new_events.push(event);
                }
                Err(e) => {
                    // Complete but invalid line: a real error, log and skip
                    warn!(%run_id, offset = new_offset - bytes_read as u64, error = %e,
                          "skipping malformed event line");
                }
            }
        }

        if new_events.is_empty() {
            return Ok(0);
        }

        let ingested = {
            let mut db = self.db.lock();
            let ingested = db
                .ingest_events(&new_events)
                .map_err(|source| TailerError::Ingest {
                    run_id: run_id.clone(),
                    source,
                })?;
            // Offset advances only after the ingest succeeded
            db.set_ingestion_offset(run_id, new_offset, max_seq)?;
            ingested
        };

        debug!(
            %run_id,
            events = new_events.len(),
            ingested,
            offset_from = last_offset,
            offset_to = new_offset,
            "tailed run"
        );

        Ok(ingested)
    }

    /// Tail every run under the runs directory. Per-run errors are logged
    /// and skipped; only runs with new events appear in the result.
    pub fn tail_all_runs(&self) -> HashMap<RunId, usize> {
        let mut results = HashMap::new();
        for run_id in self.list_runs() {
            match self.tail_run(&run_id) {
                Ok(0) => {}
                Ok(count) => {
                    results.insert(run_id, count);
                }
                Err(e) => {
                    warn!(%run_id, error = %e, "tail failed for run");
                }
            }
        }
        results
    }

    fn list_runs(&self) -> Vec<RunId> {
        let Ok(entries) = std::fs::read_dir(&self.runs_dir) else {
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

    /// Watch a run, invoking `on_new` with each batch of freshly ingested
    /// events. With `stop_on_complete`, stops (after one final tail) once a
    /// terminal run event has been ingested. Returns the total ingested.
    pub async fn watch_run(
        &self,
        run_id: &RunId,
        poll_interval: Duration,
        stop_on_complete: bool,
        mut on_new: impl FnMut(usize) + Send,
    ) -> usize {
        let mut total = 0usize;
        loop {
            match self.tail_run(run_id) {
                Ok(count) if count > 0 => {
                    total += count;
                    on_new(count);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%run_id, error = %e, "watch tail failed, continuing");
                }
            }

            if stop_on_complete {
                let complete = self
                    .db
                    .lock()
                    .run_is_complete(run_id)
                    .unwrap_or(false);
                if complete {
                    // One final tail to catch any remaining events
                    if let Ok(count) = self.tail_run(run_id) {
                        if count > 0 {
                            total += count;
                            on_new(count);
                        }
                    }
                    return total;
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Rebuild the projection from scratch: clear all derived state, then
    /// ingest every run's journal from offset 0.
    pub fn rebuild_all(&self) -> Result<usize, TailerError> {
        self.db.lock().reset_for_rebuild()?;
        let mut total = 0;
        for run_id in self.list_runs() {
            total += self.tail_run(&run_id)?;
        }
        self.db.lock().mark_rebuilt();
        Ok(total)
    }
}

#[cfg(test)]
#[path = "tailer_tests.rs"]
mod tests;
