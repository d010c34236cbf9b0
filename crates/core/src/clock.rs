// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time

use chrono::{SecondsFormat, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant for durations and deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock time as epoch milliseconds.
    fn epoch_ms(&self) -> u64;

    /// Wall-clock time as an ISO-8601 UTC string with `Z` suffix.
    fn now_iso(&self) -> String {
        iso_from_epoch_ms(self.epoch_ms())
    }
}

/// Production clock backed by the system time sources.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Controllable clock for tests. Clones share the same offset.
#[derive(Clone)]
pub struct FakeClock {
    start: Instant,
    base_epoch_ms: u64,
    offset_ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            base_epoch_ms: 1_700_000_000_000,
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        self.offset_ms
            .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn epoch_ms(&self) -> u64 {
        self.base_epoch_ms + self.offset_ms.load(Ordering::SeqCst)
    }
}

/// Current wall-clock time as ISO-8601 UTC with `Z` suffix.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Format epoch milliseconds as ISO-8601 UTC with `Z` suffix.
pub fn iso_from_epoch_ms(epoch_ms: u64) -> String {
    match Utc.timestamp_millis_opt(epoch_ms as i64) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        _ => utc_now_iso(),
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
