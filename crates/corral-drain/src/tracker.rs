// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A metrics sink for drain accounting, decorating [`DrainTracker`] without
/// changing its semantics.
pub trait DrainMetrics: Send + Sync {
    /// Called with the number of devices successfully disconnected in a
    /// batch.
    fn add_drained(&self, _n: u64) {}
    /// Called once with `true` when a job becomes active, `false` when it
    /// stops.
    fn set_draining(&self, _active: bool) {}
}

/// A no-op [`DrainMetrics`] sink.
pub struct NoopDrainMetrics;

impl DrainMetrics for NoopDrainMetrics {}

/// Atomic progress counters for one drain job, plus its start/finish
/// timestamps.
pub struct DrainTracker {
    visited: AtomicU64,
    drained: AtomicU64,
    skipped: AtomicU64,
    started: DateTime<Utc>,
    finished: AtomicI64,
}

/// A point-in-time, value-copy snapshot of a [`DrainTracker`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Progress {
    /// Devices the enqueue phase considered, whether drained or skipped.
    pub visited: u64,
    /// Devices successfully disconnected.
    pub drained: u64,
    /// Devices skipped because they did not match the job's `DrainFilter`.
    pub skipped: u64,
    /// When the job started.
    pub started: DateTime<Utc>,
    /// When the job finished; absent while still running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
}

impl DrainTracker {
    /// Creates a tracker whose `started` timestamp is `started`.
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            visited: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            started,
            finished: AtomicI64::new(0),
        }
    }

    /// Adds `n` to the visited counter.
    pub fn add_visited(&self, n: u64) {
        self.visited.fetch_add(n, Ordering::Relaxed);
    }

    /// Adds `n` to the drained counter, also reporting it to `metrics`.
    pub fn add_drained(&self, n: u64, metrics: &dyn DrainMetrics) {
        self.drained.fetch_add(n, Ordering::Relaxed);
        metrics.add_drained(n);
    }

    /// Adds `n` to the skipped counter.
    pub fn add_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    /// Records the finish timestamp. Idempotent in the sense that later
    /// calls simply overwrite it; the drainer only calls this once.
    pub fn done(&self, ts: DateTime<Utc>) {
        self.finished.store(ts.timestamp(), Ordering::Release);
    }

    /// Reads the counters and timestamps atomically (with respect to each
    /// individual field) and returns a value snapshot.
    pub fn progress(&self) -> Progress {
        let finished = self.finished.load(Ordering::Acquire);
        Progress {
            visited: self.visited.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            started: self.started,
            finished: (finished != 0).then(|| DateTime::from_timestamp(finished, 0).unwrap_or(self.started)),
        }
    }
}
