// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tabular projection of run events, backed by SQLite.
//!
//! The orchestrator writes `events.jsonl`; this store mirrors it for fast
//! queries and can be rebuilt from the journal at any time. Writes are only
//! legal inside the ingest bracket: direct `record_*` calls are silently
//! dropped by default and rejected under `SWARM_DB_PROJECTION_STRICT`.

use crate::env::projection_strict;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use swarm_core::{normalize_kind, RunEvent, RunId};
use thiserror::Error;
use tracing::{debug, warn};

/// Schema version. A mismatch at open rotates the old file aside and flags
/// the store for rebuild.
pub const PROJECTION_VERSION: i64 = 1;

/// Errors from projection operations
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("projection write outside ingest bracket")]
    WriteOutsideIngest,
}

/// Aggregate view of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub run_id: RunId,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub event_count: u64,
    pub last_seq: u64,
}

/// One step's projected row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRow {
    pub run_id: RunId,
    pub flow_key: String,
    pub step_id: String,
    pub agent_key: Option<String>,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_ms: u64,
}

/// SQLite-backed projection store.
pub struct ProjectionDb {
    conn: Connection,
    path: PathBuf,
    in_ingest: bool,
    needs_rebuild: bool,
}

impl ProjectionDb {
    /// Open (or create) the projection at `path`.
    ///
    /// On a version mismatch the old file is renamed to
    /// `<path>.old.<epoch_ms>` and a fresh store is created with
    /// `needs_rebuild` set.
    pub fn open(path: &Path) -> Result<Self, ProjectionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let existed = path.exists();
        let mut needs_rebuild = !existed;

        if existed {
            match Self::stored_version(path) {
                Ok(Some(version)) if version == PROJECTION_VERSION => {}
                other => {
                    let suffix = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis();
                    let rotated = path.with_file_name(format!(
                        "{}.old.{suffix}",
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "projection.db".to_string())
                    ));
                    warn!(
                        path = %path.display(),
                        rotated = %rotated.display(),
                        found = ?other,
                        "projection version mismatch, rotating old file"
                    );
                    std::fs::rename(path, &rotated)?;
                    needs_rebuild = true;
                }
            }
        }

        let conn = Connection::open(path)?;
        let mut db = Self {
            conn,
            path: path.to_owned(),
            in_ingest: false,
            needs_rebuild,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn stored_version(path: &Path) -> Result<Option<i64>, ProjectionError> {
        let conn = Connection::open(path)?;
        let result = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'projection_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .map(|v| v.parse::<i64>().ok());
        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::SqliteFailure(..)) | Err(rusqlite::Error::QueryReturnedNoRows) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn init_schema(&mut self) -> Result<(), ProjectionError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE IF NOT EXISTS events (
                 event_id TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL,
                 seq INTEGER NOT NULL,
                 ts TEXT,
                 kind TEXT NOT NULL,
                 flow_key TEXT,
                 step_id TEXT,
                 agent_key TEXT,
                 payload TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_events_run_seq ON events (run_id, seq);
             CREATE TABLE IF NOT EXISTS runs (
                 run_id TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 started_at TEXT,
                 completed_at TEXT,
                 last_seq INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS steps (
                 run_id TEXT NOT NULL,
                 flow_key TEXT NOT NULL,
                 step_id TEXT NOT NULL,
                 agent_key TEXT,
                 status TEXT NOT NULL,
                 started_at TEXT,
                 completed_at TEXT,
                 duration_ms INTEGER NOT NULL DEFAULT 0,
                 PRIMARY KEY (run_id, flow_key, step_id)
             );
             CREATE TABLE IF NOT EXISTS tool_calls (
                 event_id TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL,
                 step_id TEXT,
                 tool TEXT,
                 tool_use_id TEXT,
                 success INTEGER
             );
             CREATE TABLE IF NOT EXISTS ingest_offsets (
                 run_id TEXT PRIMARY KEY,
                 byte_offset INTEGER NOT NULL DEFAULT 0,
                 last_seq INTEGER NOT NULL DEFAULT 0
             );",
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('projection_version', ?1)",
            params![PROJECTION_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the store was freshly created or version-rotated and the
    /// caller should rebuild from `events.jsonl`.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn mark_rebuilt(&mut self) {
        self.needs_rebuild = false;
    }

    /// Drop all projected data and offsets ahead of a rebuild.
    pub fn reset_for_rebuild(&mut self) -> Result<(), ProjectionError> {
        self.conn.execute_batch(
            "DELETE FROM events;
             DELETE FROM runs;
             DELETE FROM steps;
             DELETE FROM tool_calls;
             DELETE FROM ingest_offsets;",
        )?;
        self.needs_rebuild = true;
        Ok(())
    }

    /// Ingest events inside the bracket. Idempotent on `event_id`: an event
    /// already present is skipped entirely. Returns the number of newly
    /// ingested events.
    pub fn ingest_events(&mut self, events: &[RunEvent]) -> Result<usize, ProjectionError> {
        self.in_ingest = true;
        let result = self.ingest_inner(events);
        self.in_ingest = false;
        result
    }

    fn ingest_inner(&mut self, events: &[RunEvent]) -> Result<usize, ProjectionError> {
        let tx = self.conn.transaction()?;
        let mut ingested = 0usize;

        for event in events {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO events
                 (event_id, run_id, seq, ts, kind, flow_key, step_id, agent_key, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.event_id,
                    event.run_id.as_str(),
                    event.seq as i64,
                    event.ts,
                    event.kind.as_str(),
                    event.flow_key.as_str(),
                    event.step_id.as_ref().map(|s| s.as_str()),
                    event.agent_key.as_ref().map(|a| a.as_str()),
                    serde_json::to_string(&event.payload).unwrap_or_default(),
                ],
            )?;
            if inserted == 0 {
                continue;
            }
            ingested += 1;
            Self::project_event(&tx, event)?;
        }

        tx.commit()?;
        debug!(ingested, total = events.len(), "projection ingest complete");
        Ok(ingested)
    }

    fn project_event(tx: &rusqlite::Transaction<'_>, event: &RunEvent) -> Result<(), ProjectionError> {
        let run_id = event.run_id.as_str();
        tx.execute(
            "INSERT INTO runs (run_id, status, last_seq) VALUES (?1, 'pending', ?2)
             ON CONFLICT(run_id) DO UPDATE SET last_seq = MAX(last_seq, ?2)",
            params![run_id, event.seq as i64],
        )?;

        match normalize_kind(event.kind.as_str()) {
            "run_created" => {}
            "run_started" => {
                tx.execute(
                    "UPDATE runs SET status = 'running', started_at = ?2 WHERE run_id = ?1",
                    params![run_id, event.ts],
                )?;
            }
            "run_completed" => {
                let status = event
                    .payload
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("succeeded")
                    .to_string();
                tx.execute(
                    "UPDATE runs SET status = ?2, completed_at = ?3 WHERE run_id = ?1",
                    params![run_id, status, event.ts],
                )?;
            }
            "run_canceled" => {
                tx.execute(
                    "UPDATE runs SET status = 'canceled', completed_at = ?2 WHERE run_id = ?1",
                    params![run_id, event.ts],
                )?;
            }
            "step_start" => {
                if let Some(step_id) = &event.step_id {
                    tx.execute(
                        "INSERT INTO steps (run_id, flow_key, step_id, agent_key, status, started_at)
                         VALUES (?1, ?2, ?3, ?4, 'running', ?5)
                         ON CONFLICT(run_id, flow_key, step_id)
                         DO UPDATE SET status = 'running', started_at = ?5",
                        params![
                            run_id,
                            event.flow_key.as_str(),
                            step_id.as_str(),
                            event.agent_key.as_ref().map(|a| a.as_str()),
                            event.ts,
                        ],
                    )?;
                }
            }
            "step_end" => {
                if let Some(step_id) = &event.step_id {
                    let status = if event.kind.as_str() == "step_error" {
                        "failed".to_string()
                    } else {
                        event
                            .payload
                            .get("status")
                            .and_then(|v| v.as_str())
                            .unwrap_or("succeeded")
                            .to_string()
                    };
                    let duration_ms = event
                        .payload
                        .get("duration_ms")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    tx.execute(
                        "INSERT INTO steps (run_id, flow_key, step_id, agent_key, status, completed_at, duration_ms)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT(run_id, flow_key, step_id)
                         DO UPDATE SET status = ?5, completed_at = ?6, duration_ms = ?7",
                        params![
                            run_id,
                            event.flow_key.as_str(),
                            step_id.as_str(),
                            event.agent_key.as_ref().map(|a| a.as_str()),
                            status,
                            event.ts,
                            duration_ms as i64,
                        ],
                    )?;
                }
            }
            "tool_start" => {
                tx.execute(
                    "INSERT OR IGNORE INTO tool_calls (event_id, run_id, step_id, tool, tool_use_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        event.event_id,
                        run_id,
                        event.step_id.as_ref().map(|s| s.as_str()),
                        event.payload.get("tool").and_then(|v| v.as_str()),
                        event.tool_use_id(),
                    ],
                )?;
            }
            "tool_end" => {
                if let Some(tool_use_id) = event.tool_use_id() {
                    let success = event
                        .payload
                        .get("success")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(true);
                    tx.execute(
                        "UPDATE tool_calls SET success = ?2 WHERE run_id = ?1 AND tool_use_id = ?3",
                        params![run_id, success, tool_use_id],
                    )?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn guard_direct_write(&self) -> Result<bool, ProjectionError> {
        if self.in_ingest {
            return Ok(true);
        }
        if projection_strict() {
            return Err(ProjectionError::WriteOutsideIngest);
        }
        // Default (and SWARM_DB_PROJECTION_ONLY): silently drop
        Ok(false)
    }

    /// Legacy direct write: no-op outside the ingest bracket.
    pub fn record_step_start(
        &mut self,
        run_id: &RunId,
        flow_key: &str,
        step_id: &str,
        agent_key: Option<&str>,
    ) -> Result<(), ProjectionError> {
        if !self.guard_direct_write()? {
            return Ok(());
        }
        self.conn.execute(
            "INSERT INTO steps (run_id, flow_key, step_id, agent_key, status)
             VALUES (?1, ?2, ?3, ?4, 'running')
             ON CONFLICT(run_id, flow_key, step_id) DO UPDATE SET status = 'running'",
            params![run_id.as_str(), flow_key, step_id, agent_key],
        )?;
        Ok(())
    }

    /// Legacy direct write: no-op outside the ingest bracket.
    pub fn record_step_end(
        &mut self,
        run_id: &RunId,
        flow_key: &str,
        step_id: &str,
        status: &str,
    ) -> Result<(), ProjectionError> {
        if !self.guard_direct_write()? {
            return Ok(());
        }
        self.conn.execute(
            "INSERT INTO steps (run_id, flow_key, step_id, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(run_id, flow_key, step_id) DO UPDATE SET status = ?4",
            params![run_id.as_str(), flow_key, step_id, status],
        )?;
        Ok(())
    }

    pub fn get_ingestion_offset(&self, run_id: &RunId) -> Result<(u64, u64), ProjectionError> {
        let result = self.conn.query_row(
            "SELECT byte_offset, last_seq FROM ingest_offsets WHERE run_id = ?1",
            params![run_id.as_str()],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        );
        match result {
            Ok(pair) => Ok(pair),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok((0, 0)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_ingestion_offset(
        &mut self,
        run_id: &RunId,
        byte_offset: u64,
        last_seq: u64,
    ) -> Result<(), ProjectionError> {
        self.conn.execute(
            "INSERT INTO ingest_offsets (run_id, byte_offset, last_seq) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id) DO UPDATE SET byte_offset = ?2, last_seq = ?3",
            params![run_id.as_str(), byte_offset as i64, last_seq as i64],
        )?;
        Ok(())
    }

    pub fn get_run_stats(&self, run_id: &RunId) -> Result<Option<RunStats>, ProjectionError> {
        let result = self.conn.query_row(
            "SELECT status, started_at, completed_at, last_seq FROM runs WHERE run_id = ?1",
            params![run_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        );
        let (status, started_at, completed_at, last_seq) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let event_count = self.event_count(run_id)?;
        Ok(Some(RunStats {
            run_id: run_id.clone(),
            status,
            started_at,
            completed_at,
            event_count,
            last_seq: last_seq as u64,
        }))
    }

    pub fn event_count(&self, run_id: &RunId) -> Result<u64, ProjectionError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE run_id = ?1",
            params![run_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_step_rows(&self, run_id: &RunId) -> Result<Vec<StepRow>, ProjectionError> {
        let mut stmt = self.conn.prepare(
            "SELECT flow_key, step_id, agent_key, status, started_at, completed_at, duration_ms
             FROM steps WHERE run_id = ?1 ORDER BY flow_key, step_id",
        )?;
        let rows = stmt.query_map(params![run_id.as_str()], |row| {
            Ok(StepRow {
                run_id: run_id.clone(),
                flow_key: row.get(0)?,
                step_id: row.get(1)?,
                agent_key: row.get(2)?,
                status: row.get(3)?,
                started_at: row.get(4)?,
                completed_at: row.get(5)?,
                duration_ms: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Whether a terminal run event has been ingested for this run.
    pub fn run_is_complete(&self, run_id: &RunId) -> Result<bool, ProjectionError> {
        Ok(self
            .get_run_stats(run_id)?
            .map(|s| matches!(s.status.as_str(), "succeeded" | "failed" | "canceled"))
            .unwrap_or(false))
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
