// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-run event journal (`events.jsonl`).
//!
//! Each entry is a single line of JSON terminated by `\n`. Writes are
//! serialized under a process-local lock and flushed before the lock is
//! released, so readers only ever see complete lines. `seq` is assigned at
//! append time and is strictly monotonic per run.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use swarm_core::RunEvent;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

struct JournalInner {
    file: File,
    next_seq: u64,
}

/// Single-writer append handle for one run's `events.jsonl`.
pub struct EventJournal {
    path: PathBuf,
    inner: Mutex<JournalInner>,
}

impl EventJournal {
    /// Open or create the journal, scanning existing entries to resume `seq`.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let max_seq = if path.exists() {
            read_events(path)?.iter().map(|e| e.seq).max().unwrap_or(0)
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_owned(),
            inner: Mutex::new(JournalInner {
                file,
                next_seq: max_seq + 1,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event, assigning the next sequence number.
    ///
    /// The line is written and flushed before the lock is released; once
    /// this returns, the event is visible to readers as a complete line.
    pub fn append(&self, mut event: RunEvent) -> Result<RunEvent, JournalError> {
        let mut inner = self.inner.lock();
        event.seq = inner.next_seq;

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        inner.file.write_all(&line)?;
        inner.file.flush()?;

        inner.next_seq += 1;
        Ok(event)
    }

    /// Highest sequence number assigned so far (0 when empty).
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().next_seq - 1
    }
}

/// Read all complete events from a journal file.
///
/// A trailing line without `\n` is a partial write and is not returned.
/// Malformed complete lines are logged and skipped.
pub fn read_events(path: &Path) -> Result<Vec<RunEvent>, JournalError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let bytes_read = reader.read_until(b'\n', &mut buf)?;
        if bytes_read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            // Partial line mid-write; not visible to readers
            break;
        }
        let trimmed = String::from_utf8_lossy(&buf);
        let trimmed = trimmed.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<RunEvent>(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed journal line");
            }
        }
    }

    Ok(events)
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
